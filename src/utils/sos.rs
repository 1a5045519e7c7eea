use std::future::Future;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Shared stop signal for the drain loops, tickers and track readers.
///
/// Clones observe the same signal; `child()` derives a signal that is
/// cancelled together with its parent but can also be cancelled on its own.
#[derive(Debug, Clone, Default)]
pub struct SignalOfStop {
    token: CancellationToken,
}

impl SignalOfStop {
    pub fn new() -> SignalOfStop {
        SignalOfStop {
            token: CancellationToken::new(),
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Signal scoped to a single track: stopping it leaves the parent running.
    pub fn child(&self) -> SignalOfStop {
        SignalOfStop {
            token: self.token.child_token(),
        }
    }

    /// Run `fut` until it completes or the signal fires, whichever comes first.
    pub async fn select<F>(&self, fut: F) -> Option<F::Output>
    where
        F: Future,
    {
        tokio::select! {
            _ = self.token.cancelled() => None,
            out = fut => Some(out),
        }
    }

    /// Spawn `fut` on the runtime, aborting it early when the signal fires.
    pub fn spawn<F>(&self, fut: F) -> JoinHandle<Option<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let sos = self.clone();
        tokio::spawn(async move { sos.select(fut).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_clone_shares_signal() {
        let sos = SignalOfStop::new();
        let other = sos.clone();
        assert!(!other.cancelled());
        sos.cancel();
        assert!(other.cancelled());
    }

    #[test]
    fn test_child_does_not_cancel_parent() {
        let parent = SignalOfStop::new();
        let child = parent.child();
        child.cancel();
        assert!(child.cancelled());
        assert!(!parent.cancelled());

        let child = parent.child();
        parent.cancel();
        assert!(child.cancelled());
    }

    #[tokio::test]
    async fn test_spawn_is_aborted_on_cancel() {
        let sos = SignalOfStop::new();
        let handle = sos.spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            42
        });
        sos.cancel();
        let out = handle.await.expect("task panicked");
        assert_eq!(out, None);
    }

    #[tokio::test]
    async fn test_select_completes_first() {
        let sos = SignalOfStop::new();
        assert_eq!(sos.select(async { 7 }).await, Some(7));

        sos.cancel();
        assert_eq!(sos.select(std::future::pending::<u8>()).await, None);
    }
}
