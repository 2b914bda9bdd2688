pub mod guard;
pub mod overlay;
pub mod scanner;

pub use guard::{Guard, GuardKind, GuardStatus};
pub use overlay::{LoggingOverlay, Overlay, SharedOverlay};
pub use scanner::{Detection, ProcessScanner, ThreatScanner};

use crate::common::config::{GuardConfig, GuardsConfig};
use std::sync::Arc;
use std::time::Duration;

/// The enabled guards, started and stopped together.
pub struct GuardSet {
    guards: Vec<Guard>,
}

impl GuardSet {
    pub fn new(guards: Vec<Guard>) -> Self {
        Self { guards }
    }

    /// `overlay_for` is called once per enabled guard, so one guard's
    /// auto-release never clears another guard's overlay.
    pub fn from_config(config: &GuardsConfig, overlay_for: impl Fn(GuardKind) -> Arc<dyn Overlay>) -> Self {
        let guards = [(GuardKind::RemoteAccess, &config.remote_access), (GuardKind::Capture, &config.capture)]
            .into_iter()
            .filter(|(_, guard)| guard.enabled)
            .map(|(kind, guard)| process_guard(kind, guard, overlay_for(kind)))
            .collect();

        Self { guards }
    }

    pub fn start_all(&self) {
        for guard in &self.guards {
            if let Err(e) = guard.start() {
                tracing::error!("Failed to start {} guard: {}", guard.kind().name(), e);
            }
        }
    }

    pub fn stop_all(&self) {
        for guard in &self.guards {
            guard.stop();
        }
    }

    pub fn statuses(&self) -> Vec<GuardStatus> {
        self.guards.iter().map(Guard::get_status).collect()
    }

    pub fn len(&self) -> usize {
        self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }
}

fn process_guard(kind: GuardKind, config: &GuardConfig, overlay: Arc<dyn Overlay>) -> Guard {
    Guard::new(
        kind,
        Arc::new(ProcessScanner::new(&config.keywords)),
        overlay,
        Duration::from_millis(config.interval_ms),
        Duration::from_millis(config.overlay_duration_ms),
    )
}
