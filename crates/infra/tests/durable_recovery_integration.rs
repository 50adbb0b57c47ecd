//! Integration tests for restart durability
//!
//! Each scenario runs part of a construct in one "process", drops it, and
//! continues from a fresh service over a reopened store.

mod support;

use std::path::Path;
use std::sync::Arc;

use retryflow_core::{ConstructStatus, ConstructStore};
use retryflow_domain::constants::{
    ATTEMPT_CLOSE_MARKER, ATTEMPT_OPEN_MARKER, BLOCK_END_MARKER, RETRY_NOTICE,
};
use retryflow_domain::{
    BodyOutcome, ConstructState, FinalResult, FlowInterruption, ResumeToken, RetryFlowError,
    RunStatus, StepError,
};
use retryflow_infra::{FileConstructStore, SqliteConstructStore};
use serde_json::json;
use support::{deploy_body, Process, Step};
use tempfile::TempDir;

#[derive(Debug, Clone, Copy)]
enum Backend {
    File,
    Sqlite,
}

const BACKENDS: [Backend; 2] = [Backend::File, Backend::Sqlite];

async fn open_store(backend: Backend, dir: &Path) -> Arc<dyn ConstructStore> {
    match backend {
        Backend::File => Arc::new(FileConstructStore::open(dir.join("constructs")).await.unwrap()),
        Backend::Sqlite => Arc::new(SqliteConstructStore::open(dir.join("constructs.db")).unwrap()),
    }
}

#[tokio::test]
async fn suspended_attempt_resumes_after_restart() {
    for backend in BACKENDS {
        let dir = TempDir::new().unwrap();
        let token = ResumeToken::new("approval-1");

        let id = {
            let first = Process::boot(
                open_store(backend, dir.path()).await,
                vec![Step::Suspend(token.clone())],
            );
            let status = first.service.run(deploy_body(), 3).await.unwrap();
            assert!(matches!(status, ConstructStatus::Suspended { attempt: 1, .. }), "{backend:?}");
            status.id()
        };

        let second = Process::boot(
            open_store(backend, dir.path()).await,
            vec![Step::Succeed(json!("unused"))],
        );
        let recovered = second.service.recover().await.unwrap();
        assert_eq!(recovered.len(), 1, "{backend:?}");
        assert!(second.invoker.invocations().is_empty(), "suspended attempt is not re-run");

        let status = second
            .service
            .resume(id, token.clone(), BodyOutcome::success(json!({ "approved": true })))
            .await
            .unwrap();
        match status {
            ConstructStatus::Finished { attempts, run_status, result, .. } => {
                assert_eq!(attempts, 1);
                assert_eq!(run_status, RunStatus::Success);
                assert_eq!(result, FinalResult::Succeeded { output: json!({ "approved": true }) });
            }
            other => panic!("{backend:?}: expected finished, got {other:?}"),
        }
        assert_eq!(second.console.lines_for(id), vec![ATTEMPT_CLOSE_MARKER, BLOCK_END_MARKER]);

        // Exactly once: a redelivered resume after another restart is stale
        let third = Process::boot(open_store(backend, dir.path()).await, vec![]);
        let err = third
            .service
            .resume(id, token, BodyOutcome::success(json!("again")))
            .await
            .unwrap_err();
        assert!(matches!(err, RetryFlowError::StaleResume(_)), "{backend:?}");
        assert!(third.service.recover().await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn lost_attempt_is_rerun_with_the_same_number() {
    for backend in BACKENDS {
        let dir = TempDir::new().unwrap();

        let id = {
            let first = Process::boot(
                open_store(backend, dir.path()).await,
                vec![Step::Fail(StepError::execution("exit 1")), Step::Crash],
            );
            let err = first.service.run(deploy_body(), 3).await.unwrap_err();
            assert!(matches!(err, RetryFlowError::Invoker(_)), "{backend:?}");
            assert_eq!(first.invoker.invocations(), vec![1, 2]);

            let store = open_store(backend, dir.path()).await;
            let unfinished = store.list_unfinished().await.unwrap();
            assert_eq!(unfinished.len(), 1);
            assert_eq!(unfinished[0].state(), ConstructState::Running);
            unfinished[0].id()
        };

        let second = Process::boot(
            open_store(backend, dir.path()).await,
            vec![Step::Succeed(json!("deployed"))],
        );
        let recovered = second.service.recover().await.unwrap();
        assert_eq!(second.invoker.invocations(), vec![2], "{backend:?}");
        assert_eq!(recovered.len(), 1);
        assert!(matches!(
            &recovered[0],
            ConstructStatus::Finished { attempts: 2, run_status: RunStatus::Success, .. }
        ));
        assert_eq!(
            second.console.lines_for(id),
            vec![ATTEMPT_OPEN_MARKER, ATTEMPT_CLOSE_MARKER, BLOCK_END_MARKER]
        );
    }
}

#[tokio::test]
async fn retry_budget_is_not_reset_by_restart() {
    for backend in BACKENDS {
        let dir = TempDir::new().unwrap();
        let token = ResumeToken::new("callback-2");

        let id = {
            let first = Process::boot(
                open_store(backend, dir.path()).await,
                vec![Step::Fail(StepError::execution("flaky")), Step::Suspend(token.clone())],
            );
            first.service.run(deploy_body(), 2).await.unwrap().id()
        };

        let second = Process::boot(open_store(backend, dir.path()).await, vec![]);
        let status = second
            .service
            .resume(id, token, BodyOutcome::failure(StepError::execution("still flaky")))
            .await
            .unwrap();
        match status {
            ConstructStatus::Finished { attempts, run_status, result, .. } => {
                assert_eq!(attempts, 2, "{backend:?}");
                assert_eq!(run_status, RunStatus::Failure);
                assert_eq!(result, FinalResult::Failed { error: StepError::execution("still flaky") });
            }
            other => panic!("{backend:?}: expected finished, got {other:?}"),
        }
        assert!(second.invoker.invocations().is_empty());
        assert!(!second.console.lines_for(id).iter().any(|line| line == RETRY_NOTICE));
    }
}

#[tokio::test]
async fn interruption_delivered_after_restart_aborts_the_run() {
    for backend in BACKENDS {
        let dir = TempDir::new().unwrap();
        let token = ResumeToken::new("input-1");

        let id = {
            let first = Process::boot(
                open_store(backend, dir.path()).await,
                vec![Step::Suspend(token.clone())],
            );
            first.service.run(deploy_body(), 5).await.unwrap().id()
        };

        let second = Process::boot(open_store(backend, dir.path()).await, vec![]);
        let withdrawn = StepError::interrupted(FlowInterruption::rejected_by("release-manager"))
            .wrap("input step");
        let status = second
            .service
            .resume(id, token, BodyOutcome::failure(withdrawn.clone()))
            .await
            .unwrap();

        assert_eq!(
            status,
            ConstructStatus::Finished {
                id,
                attempts: 1,
                run_status: RunStatus::Aborted,
                result: FinalResult::Failed { error: withdrawn },
            },
            "{backend:?}"
        );
        assert!(second.invoker.invocations().is_empty());
    }
}

#[tokio::test]
async fn corrupt_sqlite_row_does_not_block_recovery_of_the_others() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("constructs.db");

    let (damaged, healthy) = {
        let first = Process::boot(
            open_store(Backend::Sqlite, dir.path()).await,
            vec![Step::Crash, Step::Crash],
        );
        assert!(first.service.run(deploy_body(), 2).await.is_err());
        assert!(first.service.run(deploy_body(), 2).await.is_err());

        let store = SqliteConstructStore::open(&db_path).unwrap();
        let ids: Vec<_> = store.list_unfinished().await.unwrap().iter().map(|c| c.id()).collect();
        assert_eq!(ids.len(), 2);
        (ids[0], ids[1])
    };

    let conn = rusqlite::Connection::open(&db_path).unwrap();
    conn.execute(
        "UPDATE retry_constructs SET record = '{not json' WHERE id = ?1",
        rusqlite::params![damaged.to_string()],
    )
    .unwrap();
    drop(conn);

    let second = Process::boot(
        open_store(Backend::Sqlite, dir.path()).await,
        vec![Step::Succeed(json!("deployed"))],
    );
    let recovered = second.service.recover().await.unwrap();

    assert_eq!(recovered.len(), 1);
    assert_eq!(recovered[0].id(), healthy);
    assert!(recovered[0].is_finished());
    assert_eq!(second.invoker.invocations(), vec![1]);
}
