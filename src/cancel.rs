//! Cooperative cancellation for long-running operations
//!
//! The assembler checks the flag between files; the query engine checks it
//! at transaction boundaries. The CLI wires Ctrl-C to `cancel()`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Error returned when an operation observes a cancellation request.
///
/// Distinct from all failure kinds: callers that receive it should surface
/// it as-is rather than wrapping it in a failure message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Shared cancellation signal.
///
/// Cheap to clone; all clones observe the same flag. A default flag is
/// never cancelled, so library callers that don't care can pass
/// `CancelFlag::default()`.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Return `Err(Cancelled)` if cancellation has been requested.
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_flag_not_cancelled() {
        let flag = CancelFlag::new();
        assert!(!flag.is_cancelled());
        assert!(flag.check().is_ok());
    }

    #[test]
    fn test_cancel_visible_through_clones() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        clone.cancel();
        assert!(flag.is_cancelled());
        assert_eq!(flag.check(), Err(Cancelled));
    }
}
