//! Cooperative cancellation for verification requests
//!
//! A [`CancelToken`] is shared between the caller of a verification request
//! and the evidence tasks it fans out. Cancelling is one-way and idempotent.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared, clonable cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    ///
    /// Returns true if this call performed the transition.
    pub fn cancel(&self) -> bool {
        !self.cancelled.swap(true, Ordering::SeqCst)
    }

    /// Check if cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// What a cancelled verification request produces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelPolicy {
    /// Wait out the grace period, then decide on whatever evidence arrived.
    /// Layers still outstanding become unavailable.
    #[default]
    CompleteWithGrace,
    /// Discard the request; no verification record is produced.
    Discard,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_cancel_is_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());

        assert!(token.cancel());
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let token = CancelToken::new();
        assert!(token.cancel());
        assert!(!token.cancel());
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_cancel_across_threads() {
        let token = CancelToken::new();
        let remote = token.clone();
        thread::spawn(move || {
            remote.cancel();
        })
        .join()
        .expect("Thread panicked");
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_default_policy_completes() {
        assert_eq!(CancelPolicy::default(), CancelPolicy::CompleteWithGrace);
    }
}
