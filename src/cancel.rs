//! Purpose: Cooperative cancellation for blocking stream operations.
//! Exports: `CancelHandle`, `CancelToken`, `cancel_pair`.
//! Role: Every suspending operation in the crate takes a token and aborts
//! with `ErrorKind::Canceled` when it fires; a dropped handle never cancels.
//! Invariants: Cancellation is sticky; tokens are cheap to clone.

use tokio::sync::watch;

use crate::error::{Error, ErrorKind};

/// Create a linked handle/token pair. Clone the token for every operation
/// that should be abandoned together when `cancel` is called.
pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelToken { rx })
}

#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

#[derive(Clone, Debug)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// A token that never fires, for callers without a cancellation story.
    pub fn never() -> Self {
        let (_, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_canceled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the handle fires. Pends forever if the handle was
    /// dropped without canceling.
    pub async fn canceled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    pub(crate) fn check(&self) -> Result<(), Error> {
        if self.is_canceled() {
            Err(Error::new(ErrorKind::Canceled).with_message("operation canceled"))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::cancel_pair;
    use super::CancelToken;

    #[tokio::test]
    async fn fires_for_existing_and_future_waiters() {
        let (handle, token) = cancel_pair();
        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.canceled().await })
        };
        handle.cancel();
        waiter.await.expect("waiter");
        assert!(token.is_canceled());
        token.canceled().await;
    }

    #[tokio::test]
    async fn never_token_does_not_fire() {
        let token = CancelToken::never();
        assert!(!token.is_canceled());
        assert!(token.check().is_ok());
    }
}
