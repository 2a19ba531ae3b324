use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use vellum_error::{Result, VellumError};

/// A clonable cancellation token threaded through transactions and scans.
///
/// Cancellation is cooperative: engine operations and scan emissions call
/// [`CancelToken::check`] and return `Canceled` once the token has fired.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    fired: Arc<AtomicBool>,
}

impl CancelToken {
    /// A fresh, unfired token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.fired.store(true, Ordering::Release);
    }

    /// Whether cancellation has been requested.
    pub fn is_canceled(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Return `Canceled` if the token has fired.
    pub fn check(&self) -> Result<()> {
        if self.is_canceled() {
            Err(VellumError::Canceled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_once_for_all_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(token.check().is_ok());
        clone.cancel();
        assert!(token.is_canceled());
        assert!(matches!(token.check(), Err(VellumError::Canceled)));
        // Idempotent.
        token.cancel();
        assert!(clone.is_canceled());
    }
}
