//! Cancellable background fetches.
//!
//! A fetch runs on a tokio runtime and reports exactly once through its
//! completion callback. The returned [`FetchHandle`] cancels the fetch when
//! `cancel` is called or when the handle is dropped, which ties a request to
//! the lifetime of whatever screen started it.

use std::future::Future;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// How a background fetch ended
#[derive(Debug)]
pub enum FetchOutcome<T> {
    Completed(T),
    Failed(anyhow::Error),
    TimedOut(Duration),
    Cancelled,
}

impl<T> FetchOutcome<T> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchOutcome::Cancelled)
    }
}

/// Owner side of a running fetch
pub struct FetchHandle {
    stop_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl FetchHandle {
    /// Ask the fetch to stop; the callback then receives `Cancelled` unless the
    /// fetch already finished
    pub fn cancel(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for FetchHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Run `fut` on `runtime`, racing it against `timeout` and the returned handle.
///
/// `on_complete` is called from the runtime's worker, never from the caller.
pub fn spawn_cancellable<T, Fut, F>(
    runtime: &Handle,
    fut: Fut,
    timeout: Duration,
    on_complete: F,
) -> FetchHandle
where
    T: Send + 'static,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    F: FnOnce(FetchOutcome<T>) + Send + 'static,
{
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let task = runtime.spawn(async move {
        let outcome = tokio::select! {
            biased;
            // a dropped sender counts as a stop request too
            _ = stop_rx => FetchOutcome::Cancelled,
            result = tokio::time::timeout(timeout, fut) => match result {
                Ok(Ok(value)) => FetchOutcome::Completed(value),
                Ok(Err(e)) => FetchOutcome::Failed(e),
                Err(_) => FetchOutcome::TimedOut(timeout),
            },
        };
        match &outcome {
            FetchOutcome::Completed(_) => debug!("fetch completed"),
            FetchOutcome::Failed(e) => warn!("fetch failed: {}", e),
            FetchOutcome::TimedOut(t) => warn!("fetch timed out after {:?}", t),
            FetchOutcome::Cancelled => info!("fetch cancelled"),
        }
        on_complete(outcome);
    });

    FetchHandle {
        stop_tx: Some(stop_tx),
        task,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn run<T, Fut>(fut: Fut, timeout: Duration, cancel_after: Option<Duration>) -> FetchOutcome<T>
    where
        T: Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let mut handle = spawn_cancellable(&Handle::current(), fut, timeout, move |outcome| {
            let _ = tx.send(outcome);
        });
        if let Some(delay) = cancel_after {
            tokio::time::sleep(delay).await;
            handle.cancel();
        }
        let outcome = rx.await.unwrap();
        drop(handle);
        outcome
    }

    #[tokio::test]
    async fn test_completed() {
        let outcome = run(async { Ok(42) }, Duration::from_secs(5), None).await;
        assert!(matches!(outcome, FetchOutcome::Completed(42)));
    }

    #[tokio::test]
    async fn test_failed() {
        let outcome: FetchOutcome<()> =
            run(async { Err(anyhow::anyhow!("boom")) }, Duration::from_secs(5), None).await;
        match outcome {
            FetchOutcome::Failed(e) => assert_eq!(e.to_string(), "boom"),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_timed_out() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        };
        let outcome = run(slow, Duration::from_millis(20), None).await;
        assert!(matches!(outcome, FetchOutcome::TimedOut(_)));
    }

    #[tokio::test]
    async fn test_cancelled() {
        let pending = async {
            std::future::pending::<()>().await;
            Ok(())
        };
        let outcome = run(pending, Duration::from_secs(30), Some(Duration::from_millis(10))).await;
        assert!(outcome.is_cancelled());
    }

    #[tokio::test]
    async fn test_drop_cancels() {
        let (tx, rx) = oneshot::channel();
        let handle = spawn_cancellable(
            &Handle::current(),
            async {
                std::future::pending::<()>().await;
                Ok(())
            },
            Duration::from_secs(30),
            move |outcome: FetchOutcome<()>| {
                let _ = tx.send(outcome.is_cancelled());
            },
        );
        drop(handle);
        assert!(rx.await.unwrap());
    }
}
