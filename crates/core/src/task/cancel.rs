use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cooperative cancellation flag.
///
/// Converters poll it between progress updates; raising it never
/// interrupts anything by itself.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let flag = CancelFlag::new();
        let other = flag.clone();
        assert!(!other.is_cancelled());

        flag.cancel();
        assert!(other.is_cancelled());

        // second cancel is harmless
        other.cancel();
        assert!(flag.is_cancelled());
    }
}
