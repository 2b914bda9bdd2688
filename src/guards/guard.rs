use crate::guards::overlay::Overlay;
use crate::guards::scanner::{Detection, ThreatScanner};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const MAX_DETECTION_HISTORY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardKind {
    RemoteAccess,
    Capture,
}

impl GuardKind {
    pub fn name(&self) -> &'static str {
        match self {
            GuardKind::RemoteAccess => "remote_access",
            GuardKind::Capture => "capture",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardStatus {
    pub kind: GuardKind,
    pub running: bool,
    /// Every detection since start, oldest first, bounded.
    pub detected: Vec<Detection>,
    /// Whether the most recent scan found anything.
    pub threat_detected: bool,
    pub overlay_active: bool,
}

#[derive(Default)]
struct GuardState {
    running: bool,
    detected: Vec<Detection>,
    threat_detected: bool,
    overlay_until: Option<Instant>,
}

struct GuardCore {
    kind: GuardKind,
    scanner: Arc<dyn ThreatScanner>,
    overlay: Arc<dyn Overlay>,
    overlay_duration: Duration,
    state: Mutex<GuardState>,
}

enum OverlayAction {
    Engage(String),
    Release,
    Keep,
}

impl GuardCore {
    fn tick(&self, now: Instant) {
        let found = match self.scanner.detect() {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!("{} guard scan failed: {}", self.kind.name(), e);
                Vec::new()
            }
        };

        let mut recorded = Vec::with_capacity(found.len());
        for mut detection in found {
            match self.scanner.suppress(&detection) {
                Ok(()) => {
                    detection.suppressed = true;
                    tracing::warn!(
                        "{} guard terminated {} (pid {})",
                        self.kind.name(),
                        detection.name,
                        detection.pid
                    );
                }
                Err(e) => tracing::warn!("{} guard could not terminate {}: {}", self.kind.name(), detection.name, e),
            }
            recorded.push(detection);
        }

        let action = {
            let mut state = self.state.lock();
            state.threat_detected = !recorded.is_empty();

            let action = if !self.overlay_duration.is_zero() && !recorded.is_empty() {
                state.overlay_until = Some(now + self.overlay_duration);
                let names: Vec<&str> = recorded.iter().map(|d| d.name.as_str()).collect();
                OverlayAction::Engage(names.join(", "))
            } else if state.overlay_until.map_or(false, |until| now >= until) {
                state.overlay_until = None;
                OverlayAction::Release
            } else {
                OverlayAction::Keep
            };

            state.detected.extend(recorded);
            let overflow = state.detected.len().saturating_sub(MAX_DETECTION_HISTORY);
            state.detected.drain(..overflow);

            action
        };

        match action {
            OverlayAction::Engage(reason) => self.overlay.engage(&reason),
            OverlayAction::Release => self.overlay.release(),
            OverlayAction::Keep => {}
        }
    }

    fn finish(&self) {
        let had_overlay = {
            let mut state = self.state.lock();
            state.running = false;
            state.threat_detected = false;
            state.overlay_until.take().is_some()
        };
        if had_overlay {
            self.overlay.release();
        }
    }
}

struct Worker {
    handle: JoinHandle<()>,
    stop_tx: Sender<()>,
}

/// A background loop scanning for one class of forbidden programs.
pub struct Guard {
    core: Arc<GuardCore>,
    interval: Duration,
    worker: Mutex<Option<Worker>>,
}

impl Guard {
    pub fn new(
        kind: GuardKind,
        scanner: Arc<dyn ThreatScanner>,
        overlay: Arc<dyn Overlay>,
        interval: Duration,
        overlay_duration: Duration,
    ) -> Self {
        Self {
            core: Arc::new(GuardCore {
                kind,
                scanner,
                overlay,
                overlay_duration,
                state: Mutex::new(GuardState::default()),
            }),
            interval,
            worker: Mutex::new(None),
        }
    }

    pub fn kind(&self) -> GuardKind {
        self.core.kind
    }

    /// Starting a running guard is a no-op.
    pub fn start(&self) -> std::io::Result<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Ok(());
        }

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let core = Arc::clone(&self.core);
        let interval = self.interval;
        core.state.lock().running = true;

        let spawned = std::thread::Builder::new()
            .name(format!("guard-{}", self.core.kind.name()))
            .spawn(move || {
                tracing::info!("{} guard started", core.kind.name());
                loop {
                    core.tick(Instant::now());
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        _ => break,
                    }
                }
                core.finish();
                tracing::info!("{} guard stopped", core.kind.name());
            });

        match spawned {
            Ok(handle) => {
                *worker = Some(Worker { handle, stop_tx });
                Ok(())
            }
            Err(e) => {
                self.core.state.lock().running = false;
                Err(e)
            }
        }
    }

    pub fn stop(&self) {
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            let _ = worker.stop_tx.send(());
            if worker.handle.join().is_err() {
                tracing::error!("{} guard thread panicked", self.core.kind.name());
                self.core.finish();
            }
        }
    }

    /// Runs one scan on the caller's thread.
    pub fn scan_once(&self) {
        self.core.tick(Instant::now());
    }

    pub fn get_status(&self) -> GuardStatus {
        let state = self.core.state.lock();
        GuardStatus {
            kind: self.core.kind,
            running: state.running,
            detected: state.detected.clone(),
            threat_detected: state.threat_detected,
            overlay_active: state.overlay_until.is_some(),
        }
    }
}

impl Drop for Guard {
    fn drop(&mut self) {
        self.stop();
    }
}
