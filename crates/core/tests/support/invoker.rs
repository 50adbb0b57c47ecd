//! Body invoker driven by a fixed script of attempt results

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use retryflow_core::{BodyInvoker, BodyPoll, RunConsole};
use retryflow_domain::{
    BodyInvocation, BodyOutcome, ResumeToken, Result as DomainResult, RetryFlowError, StepError,
};
use serde_json::Value;

/// What the body does on one invocation, after writing its output line
#[derive(Debug, Clone)]
pub enum Step {
    Succeed(Value),
    Fail(StepError),
    Suspend(ResumeToken),
    /// The invoker dies without reporting anything
    Crash,
}

pub struct ScriptedInvoker {
    console: Arc<dyn RunConsole>,
    output: String,
    steps: Mutex<VecDeque<Step>>,
    invocations: Mutex<Vec<u32>>,
}

impl ScriptedInvoker {
    pub fn new(console: Arc<dyn RunConsole>, steps: Vec<Step>) -> Self {
        Self {
            console,
            output: "Trying!".to_string(),
            steps: Mutex::new(steps.into()),
            invocations: Mutex::new(Vec::new()),
        }
    }

    /// Attempt numbers in the order they were invoked
    pub fn invocations(&self) -> Vec<u32> {
        self.invocations.lock().clone()
    }
}

#[async_trait]
impl BodyInvoker for ScriptedInvoker {
    async fn start(&self, invocation: &BodyInvocation) -> DomainResult<BodyPoll> {
        self.invocations.lock().push(invocation.attempt);
        self.console.write_line(invocation.construct_id, &self.output);

        let step = self.steps.lock().pop_front();
        match step {
            Some(Step::Succeed(output)) => Ok(BodyPoll::Completed(BodyOutcome::success(output))),
            Some(Step::Fail(error)) => Ok(BodyPoll::Completed(BodyOutcome::failure(error))),
            Some(Step::Suspend(token)) => Ok(BodyPoll::Suspended(token)),
            Some(Step::Crash) => Err(RetryFlowError::Invoker("worker lost".into())),
            None => Err(RetryFlowError::Invoker(format!(
                "no scripted step for attempt {}",
                invocation.attempt
            ))),
        }
    }
}
