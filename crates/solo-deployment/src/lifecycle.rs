//! Container lifecycle: waiting for exit and tearing down
//!
//! Waiting blocks on the daemon until the container is no longer running,
//! optionally bounded by a caller timeout. Teardown is stop followed by a
//! forced remove, and treats a container that is already gone as success so it
//! can be called from every failure branch and repeatedly by the caller.

use crate::engine::ContainerEngine;
use crate::error::{DeploymentError, EngineError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Observed exit of a container
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "code", rename_all = "snake_case")]
pub enum ExitStatus {
    Success,
    Failure(i64),
}

impl ExitStatus {
    pub fn from_code(code: i64) -> Self {
        if code == 0 {
            ExitStatus::Success
        } else {
            ExitStatus::Failure(code)
        }
    }

    pub fn code(&self) -> i64 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::Failure(code) => *code,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExitStatus::Success)
    }

    /// `Ok` for a clean exit, `ContainerExitFailure` otherwise
    pub fn check(self, container_id: &str) -> Result<()> {
        match self {
            ExitStatus::Success => Ok(()),
            ExitStatus::Failure(code) => Err(DeploymentError::ContainerExitFailure {
                container_id: container_id.to_string(),
                code,
            }),
        }
    }
}

/// Blocks until a container exits
pub struct LifecycleWaiter<'a> {
    engine: &'a dyn ContainerEngine,
}

impl<'a> LifecycleWaiter<'a> {
    pub fn new(engine: &'a dyn ContainerEngine) -> Self {
        Self { engine }
    }

    /// Wait for `container_id` to exit and report how it exited.
    ///
    /// A nonzero exit is returned as `ExitStatus::Failure`; only transport
    /// failures and timeouts are errors here. On timeout the container is left
    /// running.
    pub async fn wait(
        &self,
        container_id: &str,
        timeout: Option<Duration>,
    ) -> Result<ExitStatus> {
        debug!(container_id = %container_id, timeout = ?timeout, "Waiting for container exit");

        let wait = self.engine.wait_container(container_id);
        let outcome = match timeout {
            Some(limit) => tokio::time::timeout(limit, wait).await.map_err(|_| {
                DeploymentError::WaitTimeout {
                    container_id: container_id.to_string(),
                    timeout: limit,
                }
            })?,
            None => wait.await,
        };

        let code = outcome.map_err(|source| DeploymentError::WaitTransport {
            container_id: container_id.to_string(),
            source,
        })?;

        let status = ExitStatus::from_code(code);
        info!(
            container_id = %container_id,
            exit_code = code,
            success = status.is_success(),
            "Container exited"
        );
        Ok(status)
    }
}

fn is_already_gone(err: &EngineError) -> bool {
    matches!(err, EngineError::NotFound(_) | EngineError::NotModified)
}

/// Stop and remove a container. A container that is already stopped or gone
/// counts as torn down.
pub async fn teardown(
    engine: &dyn ContainerEngine,
    container_id: &str,
    stop_timeout: Duration,
) -> Result<()> {
    match engine.stop_container(container_id, stop_timeout).await {
        Ok(()) => {}
        Err(e) if is_already_gone(&e) => {
            debug!(container_id = %container_id, "Container already stopped");
        }
        Err(e) => {
            // Remove is forced, so it still kills the container.
            warn!(container_id = %container_id, error = %e, "Stop failed, forcing remove");
        }
    }

    match engine.remove_container(container_id).await {
        Ok(()) => {
            info!(container_id = %container_id, "Container torn down");
            Ok(())
        }
        Err(e) if is_already_gone(&e) => {
            debug!(container_id = %container_id, "Container already removed");
            Ok(())
        }
        Err(source) => Err(DeploymentError::TeardownFailed {
            container_id: container_id.to_string(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::RecordingEngine;

    #[tokio::test]
    async fn test_zero_exit_is_success() {
        let engine = RecordingEngine::default();
        let status = LifecycleWaiter::new(&engine)
            .wait("abc123", None)
            .await
            .unwrap();
        assert_eq!(status, ExitStatus::Success);
        assert!(status.is_success());
        assert!(status.check("abc123").is_ok());
        assert_eq!(engine.operations(), vec!["wait:abc123"]);
    }

    #[tokio::test]
    async fn test_nonzero_exit_surfaces_code() {
        let engine = RecordingEngine::default();
        engine.set_exit_code("abc123", 137);

        let status = LifecycleWaiter::new(&engine)
            .wait("abc123", Some(Duration::from_secs(5)))
            .await
            .unwrap();
        assert_eq!(status, ExitStatus::Failure(137));

        let err = status.check("abc123").unwrap_err();
        assert!(matches!(
            err,
            DeploymentError::ContainerExitFailure { ref container_id, code: 137 } if container_id == "abc123"
        ));
        assert_eq!(err.exit_code(), Some(137));
    }

    #[tokio::test]
    async fn test_transport_failure_is_not_an_exit() {
        let engine = RecordingEngine::default();
        engine.fail_on("wait", EngineError::Transport("connection reset".into()));

        let err = LifecycleWaiter::new(&engine)
            .wait("abc123", None)
            .await
            .unwrap_err();
        assert!(matches!(err, DeploymentError::WaitTransport { .. }));
        assert_eq!(err.exit_code(), None);
    }

    #[tokio::test]
    async fn test_timeout_expires() {
        let engine = RecordingEngine::default();
        engine.set_wait_delay(Duration::from_secs(30));

        let err = LifecycleWaiter::new(&engine)
            .wait("abc123", Some(Duration::from_millis(50)))
            .await
            .unwrap_err();
        match &err {
            DeploymentError::WaitTimeout { timeout, .. } => {
                assert_eq!(*timeout, Duration::from_millis(50))
            }
            other => panic!("expected WaitTimeout, got {other:?}"),
        }
        assert!(err.to_string().contains("50ms"));
        // the container is left for the caller
        assert!(!engine.operations().iter().any(|op| op.starts_with("remove")));
    }

    #[tokio::test]
    async fn test_teardown_stops_then_removes() {
        let engine = RecordingEngine::default();
        teardown(&engine, "abc123", Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(engine.operations(), vec!["stop:abc123", "remove:abc123"]);
    }

    #[tokio::test]
    async fn test_teardown_is_idempotent() {
        let engine = RecordingEngine::default();
        engine.fail_on("stop", EngineError::NotModified);
        engine.fail_on("remove", EngineError::NotFound("abc123".into()));

        teardown(&engine, "abc123", Duration::from_secs(10))
            .await
            .unwrap();
        teardown(&engine, "abc123", Duration::from_secs(10))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_teardown_removes_even_if_stop_fails() {
        let engine = RecordingEngine::default();
        engine.fail_on("stop", EngineError::Transport("timeout".into()));

        teardown(&engine, "abc123", Duration::from_secs(10))
            .await
            .unwrap();
        assert!(engine.operations().contains(&"remove:abc123".to_string()));
    }

    #[tokio::test]
    async fn test_teardown_remove_failure() {
        let engine = RecordingEngine::default();
        engine.fail_on(
            "remove",
            EngineError::Server {
                status: 500,
                message: "driver failed".into(),
            },
        );

        let err = teardown(&engine, "abc123", Duration::from_secs(10))
            .await
            .unwrap_err();
        assert!(matches!(err, DeploymentError::TeardownFailed { .. }));
    }

    #[test]
    fn test_exit_status_serialization() {
        let json = serde_json::to_value(ExitStatus::Failure(137)).unwrap();
        assert_eq!(json, serde_json::json!({"status": "failure", "code": 137}));
        let json = serde_json::to_value(ExitStatus::Success).unwrap();
        assert_eq!(json, serde_json::json!({"status": "success"}));
        assert_eq!(ExitStatus::from_code(0).code(), 0);
    }
}
