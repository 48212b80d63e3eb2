use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cross-thread run/cancel signal for one session.
///
/// The result consumer lowers it; the capture thread polls it before using
/// each block and before each send. All accesses are `SeqCst`, so a lowered
/// flag is observed by the capture thread on its next check.
#[derive(Debug, Clone, Default)]
pub struct RunFlag(Arc<AtomicBool>);

impl RunFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// false → true. Returns whether this call made the transition.
    pub fn raise(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// true → false. Returns whether this call made the transition, so
    /// concurrent stops can tell which one owns the shutdown.
    pub fn lower(&self) -> bool {
        self.0
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions_happen_once() {
        let flag = RunFlag::new();
        assert!(!flag.is_running());
        assert!(!flag.lower());

        assert!(flag.raise());
        assert!(!flag.raise());
        assert!(flag.is_running());

        assert!(flag.lower());
        assert!(!flag.lower());
        assert!(!flag.is_running());
    }

    #[test]
    fn test_clones_share_state() {
        let flag = RunFlag::new();
        let observer = flag.clone();
        flag.raise();

        let handle = std::thread::spawn(move || observer.is_running());
        assert!(handle.join().unwrap());
    }
}
