//! Polling-friendly handles for asynchronous executions.

use std::time::Duration;

use quiver_core::{ExecutionResult, RequestId};
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::watch;

/// Coarse status of an asynchronous execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HandleStatus {
    /// Accepted, waiting for a slot.
    Pending,
    /// The sandbox is running.
    Running,
    /// Finished; the result is available.
    Terminal,
}

impl HandleStatus {
    /// Wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Terminal => "terminal",
        }
    }
}

#[derive(Debug, Clone)]
enum HandleState {
    Pending,
    Running,
    Terminal(ExecutionResult),
}

impl HandleState {
    fn status(&self) -> HandleStatus {
        match self {
            Self::Pending => HandleStatus::Pending,
            Self::Running => HandleStatus::Running,
            Self::Terminal(_) => HandleStatus::Terminal,
        }
    }
}

/// Create a connected completer/handle pair in the pending state.
#[must_use]
pub fn handle_pair(id: RequestId) -> (HandleCompleter, AsyncHandle) {
    let (tx, rx) = watch::channel(HandleState::Pending);
    (HandleCompleter { tx }, AsyncHandle { id, rx })
}

/// The caller's view of an asynchronous execution.
#[derive(Debug, Clone)]
pub struct AsyncHandle {
    id: RequestId,
    rx: watch::Receiver<HandleState>,
}

impl AsyncHandle {
    /// Request the handle tracks.
    #[must_use]
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> HandleStatus {
        self.rx.borrow().status()
    }

    /// The result, when terminal.
    #[must_use]
    pub fn result(&self) -> Option<ExecutionResult> {
        match &*self.rx.borrow() {
            HandleState::Terminal(result) => Some(result.clone()),
            HandleState::Pending | HandleState::Running => None,
        }
    }

    /// Wait up to `timeout` for the terminal result.
    ///
    /// Returns `None` if the execution is still running when the timeout
    /// elapses, or if its driver went away without completing.
    pub async fn wait(&mut self, timeout: Duration) -> Option<ExecutionResult> {
        let waited = tokio::time::timeout(
            timeout,
            self.rx
                .wait_for(|state| matches!(state, HandleState::Terminal(_))),
        )
        .await;
        match waited {
            Ok(Ok(state)) => match &*state {
                HandleState::Terminal(result) => Some(result.clone()),
                HandleState::Pending | HandleState::Running => None,
            },
            Ok(Err(_)) | Err(_) => None,
        }
    }

    /// Wire descriptor `{status, id}`.
    #[must_use]
    pub fn descriptor(&self) -> Value {
        json!({
            "status": self.status().as_str(),
            "id": self.id.0.to_string(),
        })
    }
}

/// The driver's side: moves the handle forward.
#[derive(Debug)]
pub struct HandleCompleter {
    tx: watch::Sender<HandleState>,
}

impl HandleCompleter {
    /// Mark the execution as running. No effect once terminal.
    pub fn mark_running(&self) {
        self.tx.send_if_modified(|state| {
            if matches!(state, HandleState::Pending) {
                *state = HandleState::Running;
                true
            } else {
                false
            }
        });
    }

    /// Publish the terminal result. Only the first call has an effect.
    pub fn complete(&self, result: ExecutionResult) {
        self.tx.send_if_modified(|state| {
            if matches!(state, HandleState::Terminal(_)) {
                false
            } else {
                *state = HandleState::Terminal(result);
                true
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lifecycle() {
        let (completer, mut handle) = handle_pair(RequestId::new());
        assert_eq!(handle.status(), HandleStatus::Pending);
        assert_eq!(handle.descriptor()["status"], "pending");

        completer.mark_running();
        assert_eq!(handle.status(), HandleStatus::Running);
        assert!(handle.wait(Duration::from_millis(20)).await.is_none());

        let result = ExecutionResult::success(json!({"x": 1}), Duration::from_millis(3));
        completer.complete(result.clone());
        completer.complete(ExecutionResult::success(json!({"x": 2}), Duration::ZERO));
        completer.mark_running();

        assert_eq!(handle.status(), HandleStatus::Terminal);
        assert_eq!(handle.wait(Duration::from_secs(1)).await, Some(result.clone()));
        assert_eq!(handle.result(), Some(result));
        assert_eq!(handle.descriptor()["id"], handle.id().0.to_string());
    }

    #[tokio::test]
    async fn test_wait_wakes_on_completion() {
        let (completer, mut handle) = handle_pair(RequestId::new());
        let driver = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            completer.complete(ExecutionResult::success(json!(null), Duration::ZERO));
        });
        assert!(handle.wait(Duration::from_secs(5)).await.is_some());
        driver.await.unwrap();
    }

    #[tokio::test]
    async fn test_dropped_driver() {
        let (completer, mut handle) = handle_pair(RequestId::new());
        drop(completer);
        assert!(handle.wait(Duration::from_secs(1)).await.is_none());
    }
}
