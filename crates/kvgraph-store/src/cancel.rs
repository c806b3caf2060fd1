use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;

use crate::error::{StoreError, StoreResult};

/// Cooperative cancellation for store round trips.
///
/// Clones share one signal. Cancelling any clone cancels them all, and every
/// future driven through [`run`](Self::run) resolves to
/// [`StoreError::Cancelled`] at its next await point. Cancellation is sticky.
#[derive(Clone, Debug)]
pub struct CancelToken {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            receiver,
        }
    }

    /// Signal cancellation to every clone of this token.
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once the token is cancelled.
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        if receiver.wait_for(|cancelled| *cancelled).await.is_err() {
            // The sender lives as long as any clone, so this never fires.
            std::future::pending::<()>().await;
        }
    }

    /// Drive `fut` unless the token is (or becomes) cancelled first.
    pub async fn run<T, F>(&self, fut: F) -> StoreResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        if self.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(StoreError::Cancelled),
            result = fut => result,
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn uncancelled_token_passes_result_through() {
        let token = CancelToken::new();
        assert_eq!(token.run(async { Ok(7) }).await, Ok(7));
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits() {
        let token = CancelToken::new();
        token.clone().cancel();
        assert!(token.is_cancelled());
        let result = token.run(async { Ok::<_, StoreError>(()) }).await;
        assert_eq!(result, Err(StoreError::Cancelled));
    }

    #[tokio::test]
    async fn cancel_interrupts_pending_future() {
        let token = CancelToken::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move {
            waiter
                .run(async {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(())
                })
                .await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();
        assert_eq!(handle.await.unwrap(), Err(StoreError::Cancelled));
    }
}
