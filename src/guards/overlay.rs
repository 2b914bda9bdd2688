use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Screen blocking overlay and input lock.
pub trait Overlay: Send + Sync {
    fn engage(&self, reason: &str);

    fn release(&self);

    fn is_engaged(&self) -> bool;
}

/// Records the overlay state and logs transitions. Desktop integration
/// subscribes to the daemon's guard status rather than being driven from here.
#[derive(Default)]
pub struct LoggingOverlay {
    engaged: AtomicBool,
}

impl LoggingOverlay {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Overlay for LoggingOverlay {
    fn engage(&self, reason: &str) {
        if !self.engaged.swap(true, Ordering::SeqCst) {
            tracing::warn!("Overlay engaged: {}", reason);
        }
    }

    fn release(&self) {
        if self.engaged.swap(false, Ordering::SeqCst) {
            tracing::info!("Overlay released");
        }
    }

    fn is_engaged(&self) -> bool {
        self.engaged.load(Ordering::SeqCst)
    }
}

/// One overlay held by several owners. The inner overlay is engaged while at
/// least one holder remains and released when the last one lets go.
pub struct SharedOverlay {
    inner: Arc<dyn Overlay>,
    holders: Mutex<BTreeSet<String>>,
}

impl SharedOverlay {
    pub fn new(inner: Arc<dyn Overlay>) -> Self {
        Self { inner, holders: Mutex::new(BTreeSet::new()) }
    }

    pub fn hold(&self, holder: &str, reason: &str) {
        let mut holders = self.holders.lock();
        if holders.insert(holder.to_string()) && holders.len() == 1 {
            self.inner.engage(reason);
        }
    }

    /// Releasing a holder that never held is a no-op.
    pub fn unhold(&self, holder: &str) {
        let mut holders = self.holders.lock();
        if holders.remove(holder) && holders.is_empty() {
            self.inner.release();
        }
    }

    pub fn holders(&self) -> Vec<String> {
        self.holders.lock().iter().cloned().collect()
    }

    pub fn is_engaged(&self) -> bool {
        self.inner.is_engaged()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engage_and_release_are_idempotent() {
        let overlay = LoggingOverlay::new();
        overlay.release();
        assert!(!overlay.is_engaged());

        overlay.engage("obs");
        overlay.engage("obs");
        assert!(overlay.is_engaged());

        overlay.release();
        assert!(!overlay.is_engaged());
    }

    #[test]
    fn shared_overlay_stays_engaged_until_last_holder_leaves() {
        let inner = Arc::new(LoggingOverlay::new());
        let shared = SharedOverlay::new(inner.clone());

        shared.hold("s-1", "cell phone");
        shared.hold("s-2", "laptop");
        shared.hold("s-1", "cell phone");
        assert!(inner.is_engaged());

        shared.unhold("s-1");
        assert!(inner.is_engaged());
        assert_eq!(shared.holders(), vec!["s-2".to_string()]);

        shared.unhold("s-3");
        assert!(inner.is_engaged());

        shared.unhold("s-2");
        assert!(!inner.is_engaged());
        assert!(shared.holders().is_empty());
    }
}
