//! Resume dispatcher
//!
//! Owns a background task that receives resume events from the host (an
//! approval arriving, a sub-job finishing, a timer firing) and hands each
//! one to `RetryService::resume`. Events are processed one at a time in
//! arrival order.
//!
//! Results are reported on an optional completion channel. Stopping the
//! dispatcher drops events still queued; the constructs they target stay
//! suspended in the store, so the host can deliver them again.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use retryflow_core::RetryService;
//! use retryflow_infra::scheduling::{DispatcherConfig, ResumeDispatcher, ResumeEvent};
//!
//! # async fn example(service: Arc<RetryService>, event: ResumeEvent)
//! #     -> Result<(), retryflow_infra::scheduling::DispatcherError> {
//! let (completions, mut rx) = tokio::sync::mpsc::unbounded_channel();
//! let mut dispatcher = ResumeDispatcher::new(service, DispatcherConfig::default())
//!     .with_completions(completions);
//!
//! dispatcher.start().await?;
//! dispatcher.dispatch(event).await?;
//! let completion = rx.recv().await;
//! dispatcher.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use retryflow_core::{ConstructStatus, RetryService};
use retryflow_domain::{BodyOutcome, ConstructId, Result as DomainResult, ResumeToken};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::scheduling::error::{DispatcherError, DispatcherResult};

/// Type alias for task handle to avoid complexity warnings
type TaskHandle = Arc<Mutex<Option<JoinHandle<()>>>>;

/// Outcome delivered for a suspended attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeEvent {
    pub construct_id: ConstructId,
    pub token: ResumeToken,
    pub outcome: BodyOutcome,
}

/// Result of handling one `ResumeEvent`
#[derive(Debug)]
pub struct ResumeCompletion {
    pub construct_id: ConstructId,
    pub result: DomainResult<ConstructStatus>,
}

/// Configuration for the resume dispatcher
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Events buffered before `dispatch` waits
    pub queue_capacity: usize,
    /// How long `stop` waits for the background task
    pub shutdown_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self { queue_capacity: 64, shutdown_timeout: Duration::from_secs(5) }
    }
}

pub struct ResumeDispatcher {
    service: Arc<RetryService>,
    config: DispatcherConfig,
    sender: Option<mpsc::Sender<ResumeEvent>>,
    completions: Option<mpsc::UnboundedSender<ResumeCompletion>>,
    cancellation_token: CancellationToken,
    task_handle: TaskHandle,
}

impl ResumeDispatcher {
    pub fn new(service: Arc<RetryService>, config: DispatcherConfig) -> Self {
        Self {
            service,
            config,
            sender: None,
            completions: None,
            cancellation_token: CancellationToken::new(),
            task_handle: Arc::new(Mutex::new(None)),
        }
    }

    /// Report every handled event on `completions`
    pub fn with_completions(mut self, completions: mpsc::UnboundedSender<ResumeCompletion>) -> Self {
        self.completions = Some(completions);
        self
    }

    /// Start the background task
    ///
    /// # Errors
    ///
    /// Returns error if the dispatcher is already running
    #[instrument(skip(self))]
    pub async fn start(&mut self) -> DispatcherResult<()> {
        if self.is_running() {
            return Err(DispatcherError::AlreadyRunning);
        }

        // Fresh token and queue so the dispatcher can be restarted after stop
        self.cancellation_token = CancellationToken::new();
        let (sender, receiver) = mpsc::channel(self.config.queue_capacity.max(1));
        self.sender = Some(sender);

        let service = Arc::clone(&self.service);
        let completions = self.completions.clone();
        let cancel = self.cancellation_token.clone();

        let handle = tokio::spawn(async move {
            Self::dispatch_loop(service, receiver, completions, cancel).await;
        });
        *self.task_handle.lock().await = Some(handle);

        info!(queue_capacity = self.config.queue_capacity, "Resume dispatcher started");
        Ok(())
    }

    /// Stop the background task and wait for it to finish
    ///
    /// # Errors
    ///
    /// Returns error if the dispatcher is not running or the task does not
    /// finish within `shutdown_timeout`
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> DispatcherResult<()> {
        if !self.is_running() {
            return Err(DispatcherError::NotRunning);
        }

        info!("Stopping resume dispatcher");
        self.cancellation_token.cancel();
        self.sender = None;

        if let Some(handle) = self.task_handle.lock().await.take() {
            let join_timeout = self.config.shutdown_timeout;
            tokio::time::timeout(join_timeout, handle)
                .await
                .map_err(|source| DispatcherError::Timeout { duration: join_timeout, source })??;
        }

        info!("Resume dispatcher stopped");
        Ok(())
    }

    /// Check if the dispatcher is running
    ///
    /// Running means there is a task handle whose task has not finished.
    pub fn is_running(&self) -> bool {
        self.task_handle
            .try_lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|h| !h.is_finished()))
            .unwrap_or(false)
    }

    /// Queue an event, waiting if the queue is full
    ///
    /// # Errors
    ///
    /// Returns `NotRunning` before `start` and `ChannelClosed` if the
    /// background task has exited
    pub async fn dispatch(&self, event: ResumeEvent) -> DispatcherResult<()> {
        let sender = self.sender.as_ref().ok_or(DispatcherError::NotRunning)?;
        sender.send(event).await.map_err(|_| DispatcherError::ChannelClosed)
    }

    /// A handle for producers on other tasks, or `None` before `start`
    pub fn sender(&self) -> Option<mpsc::Sender<ResumeEvent>> {
        self.sender.clone()
    }

    async fn dispatch_loop(
        service: Arc<RetryService>,
        mut receiver: mpsc::Receiver<ResumeEvent>,
        completions: Option<mpsc::UnboundedSender<ResumeCompletion>>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(dropped = receiver.len(), "Dispatch loop cancelled");
                    break;
                }
                event = receiver.recv() => {
                    let Some(event) = event else {
                        debug!("Resume queue closed");
                        break;
                    };
                    let construct_id = event.construct_id;
                    let result = service.resume(construct_id, event.token, event.outcome).await;
                    if let Err(err) = &result {
                        warn!(%construct_id, error = %err, "Resume event rejected");
                    }

                    if let Some(completions) = &completions {
                        if completions.send(ResumeCompletion { construct_id, result }).is_err() {
                            debug!("Completion receiver dropped");
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use retryflow_core::{BodyInvoker, BodyPoll};
    use retryflow_domain::{BodyInvocation, BodySpec, RetryFlowError, RunStatus, StepError};
    use serde_json::json;

    use super::*;
    use crate::console::BufferedConsole;
    use crate::store::InMemoryConstructStore;

    /// Every attempt waits for an approval
    struct ApprovalInvoker;

    #[async_trait]
    impl BodyInvoker for ApprovalInvoker {
        async fn start(&self, invocation: &BodyInvocation) -> DomainResult<BodyPoll> {
            Ok(BodyPoll::Suspended(ResumeToken::new(format!("approval-{}", invocation.attempt))))
        }
    }

    fn service() -> Arc<RetryService> {
        Arc::new(RetryService::new(
            Arc::new(ApprovalInvoker),
            Arc::new(InMemoryConstructStore::new()),
            Arc::new(BufferedConsole::new()),
        ))
    }

    fn event(id: ConstructId, token: &str, outcome: BodyOutcome) -> ResumeEvent {
        ResumeEvent { construct_id: id, token: ResumeToken::new(token), outcome }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_dispatcher_lifecycle() {
        let mut dispatcher = ResumeDispatcher::new(service(), DispatcherConfig::default());
        assert!(!dispatcher.is_running());
        assert!(dispatcher.sender().is_none());

        dispatcher.start().await.unwrap();
        assert!(dispatcher.is_running());
        assert!(matches!(dispatcher.start().await, Err(DispatcherError::AlreadyRunning)));

        dispatcher.stop().await.unwrap();
        assert!(!dispatcher.is_running());
        assert!(matches!(dispatcher.stop().await, Err(DispatcherError::NotRunning)));

        dispatcher.start().await.unwrap();
        assert!(dispatcher.is_running());
        dispatcher.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_dispatch_before_start_fails() {
        let dispatcher = ResumeDispatcher::new(service(), DispatcherConfig::default());
        let err = dispatcher
            .dispatch(event(ConstructId::new(), "approval-1", BodyOutcome::success(json!(null))))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatcherError::NotRunning));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_events_drive_the_construct_to_completion() {
        let service = service();
        let status = service.run(BodySpec::new("input", json!({})), 2).await.unwrap();
        let id = status.id();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut dispatcher =
            ResumeDispatcher::new(Arc::clone(&service), DispatcherConfig::default())
                .with_completions(tx);
        dispatcher.start().await.unwrap();

        dispatcher
            .dispatch(event(id, "approval-1", BodyOutcome::failure(StepError::execution("denied"))))
            .await
            .unwrap();
        let first = rx.recv().await.unwrap();
        assert_eq!(first.construct_id, id);
        assert!(matches!(first.result, Ok(ConstructStatus::Suspended { attempt: 2, .. })));

        // The first token was consumed
        dispatcher
            .dispatch(event(id, "approval-1", BodyOutcome::success(json!("late"))))
            .await
            .unwrap();
        let stale = rx.recv().await.unwrap();
        assert!(matches!(stale.result, Err(RetryFlowError::StaleResume(_))));

        dispatcher
            .dispatch(event(id, "approval-2", BodyOutcome::success(json!("ok"))))
            .await
            .unwrap();
        match rx.recv().await.unwrap().result {
            Ok(ConstructStatus::Finished { attempts, run_status, .. }) => {
                assert_eq!(attempts, 2);
                assert_eq!(run_status, RunStatus::Success);
            }
            other => panic!("expected finished status, got {other:?}"),
        }

        dispatcher.stop().await.unwrap();
    }
}
