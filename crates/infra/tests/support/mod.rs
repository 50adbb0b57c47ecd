//! Shared helpers for infra integration tests
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use retryflow_core::{BodyInvoker, BodyPoll, ConstructStore, RetryService, RunConsole};
use retryflow_domain::{
    BodyInvocation, BodyOutcome, BodySpec, Result as DomainResult, ResumeToken, RetryFlowError,
    StepError,
};
use retryflow_infra::BufferedConsole;
use serde_json::{json, Value};

/// What the body does on one invocation
#[derive(Debug, Clone)]
pub enum Step {
    Succeed(Value),
    Fail(StepError),
    Suspend(ResumeToken),
    /// The process dies before the attempt reports anything
    Crash,
}

pub struct ScriptedInvoker {
    steps: Mutex<VecDeque<Step>>,
    invocations: Mutex<Vec<u32>>,
}

impl ScriptedInvoker {
    pub fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self { steps: Mutex::new(steps.into()), invocations: Mutex::new(Vec::new()) })
    }

    pub fn invocations(&self) -> Vec<u32> {
        self.invocations.lock().clone()
    }
}

#[async_trait]
impl BodyInvoker for ScriptedInvoker {
    async fn start(&self, invocation: &BodyInvocation) -> DomainResult<BodyPoll> {
        self.invocations.lock().push(invocation.attempt);
        let step = self.steps.lock().pop_front();
        match step {
            Some(Step::Succeed(output)) => Ok(BodyPoll::Completed(BodyOutcome::success(output))),
            Some(Step::Fail(error)) => Ok(BodyPoll::Completed(BodyOutcome::failure(error))),
            Some(Step::Suspend(token)) => Ok(BodyPoll::Suspended(token)),
            Some(Step::Crash) | None => Err(RetryFlowError::Invoker("executor went away".into())),
        }
    }
}

/// A service instance as one process would hold it
pub struct Process {
    pub service: RetryService,
    pub invoker: Arc<ScriptedInvoker>,
    pub console: Arc<BufferedConsole>,
}

impl Process {
    pub fn boot(store: Arc<dyn ConstructStore>, steps: Vec<Step>) -> Self {
        let invoker = ScriptedInvoker::new(steps);
        let console = Arc::new(BufferedConsole::new());
        let service = RetryService::new(
            Arc::clone(&invoker) as Arc<dyn BodyInvoker>,
            store,
            Arc::clone(&console) as Arc<dyn RunConsole>,
        );
        Self { service, invoker, console }
    }
}

pub fn deploy_body() -> BodySpec {
    BodySpec::new("sh", json!({ "script": "./deploy.sh" }))
}
