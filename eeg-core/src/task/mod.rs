//! Long-lived background tasks with cooperative cancellation.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A named tokio task paired with the token that stops it.
///
/// Shutdown order is always: cancel the token, then join with a bounded
/// wait. A task that does not finish in time is aborted and logged.
pub struct Worker {
    name: &'static str,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawns `f` on the current runtime, handing it a child of a fresh token.
    pub fn spawn<F, Fut>(name: &'static str, f: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::spawn_with_token(name, CancellationToken::new(), f)
    }

    /// Like [`Worker::spawn`] but driven by an existing token, so several
    /// workers can be stopped together.
    pub fn spawn_with_token<F, Fut>(name: &'static str, cancel: CancellationToken, f: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let fut = f(cancel.clone());
        let handle = tokio::spawn(async move {
            fut.await;
            tracing::debug!("worker '{name}' exited");
        });
        Self {
            name,
            cancel,
            handle: Some(handle),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(|h| h.is_finished())
    }

    /// Request cancellation without waiting.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Cancel, then wait up to `timeout` for the task to exit.
    ///
    /// Returns `true` when the task finished within the bound.
    pub async fn shutdown(mut self, timeout: Duration) -> bool {
        self.cancel.cancel();
        let Some(handle) = self.handle.take() else {
            return true;
        };
        let abort = handle.abort_handle();
        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::warn!("worker '{}' ended abnormally: {e}", self.name);
                true
            }
            Err(_) => {
                tracing::warn!(
                    "worker '{}' did not stop within {timeout:?}, aborting",
                    self.name
                );
                abort.abort();
                false
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn shutdown_cancels_and_joins() {
        let stopped = Arc::new(AtomicBool::new(false));
        let flag = stopped.clone();
        let worker = Worker::spawn("test", move |token| async move {
            token.cancelled().await;
            flag.store(true, Ordering::SeqCst);
        });

        assert!(!worker.is_finished());
        assert!(worker.shutdown(Duration::from_secs(1)).await);
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn stuck_task_is_aborted_after_timeout() {
        let worker = Worker::spawn("stuck", |_token| async move {
            std::future::pending::<()>().await;
        });
        assert!(!worker.shutdown(Duration::from_millis(50)).await);
    }

    #[tokio::test]
    async fn shared_token_stops_siblings() {
        let token = CancellationToken::new();
        let a = Worker::spawn_with_token("a", token.clone(), |t| async move { t.cancelled().await });
        let b = Worker::spawn_with_token("b", token.clone(), |t| async move { t.cancelled().await });
        token.cancel();
        assert!(a.shutdown(Duration::from_secs(1)).await);
        assert!(b.shutdown(Duration::from_secs(1)).await);
    }
}
