use exam_proctor::guards::{
    Detection, Guard, GuardKind, GuardSet, LoggingOverlay, Overlay, ProcessScanner, ThreatScanner,
};
use exam_proctor::{ProctorError, Result};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Finds the fake processes but is never allowed to kill them.
struct Unkillable(ProcessScanner);

impl ThreatScanner for Unkillable {
    fn detect(&self) -> Result<Vec<Detection>> {
        self.0.detect()
    }

    fn suppress(&self, detection: &Detection) -> Result<()> {
        Err(ProctorError::Guard(format!("EPERM for pid {}", detection.pid)))
    }
}

fn fake_proc(root: &Path, pid: u32, comm: &str) {
    let dir = root.join(pid.to_string());
    fs::create_dir_all(&dir).expect("pid dir");
    fs::write(dir.join("comm"), format!("{}\n", comm)).expect("comm");
    fs::write(dir.join("cmdline"), format!("/usr/bin/{}\0", comm)).expect("cmdline");
}

fn keywords(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

#[test]
fn detection_is_recorded_when_termination_is_denied() {
    let proc_root = TempDir::new().expect("temp dir");
    fake_proc(proc_root.path(), 4000, "anydesk");
    fake_proc(proc_root.path(), 4001, "firefox");

    let scanner = Unkillable(ProcessScanner::with_proc_root(&keywords(&["anydesk"]), proc_root.path()));
    let guard = Guard::new(
        GuardKind::RemoteAccess,
        Arc::new(scanner),
        Arc::new(LoggingOverlay::new()),
        Duration::from_millis(100),
        Duration::ZERO,
    );

    guard.scan_once();

    let status = guard.get_status();
    assert!(status.threat_detected);
    assert_eq!(status.detected.len(), 1);
    assert_eq!(status.detected[0].pid, 4000);
    assert!(!status.detected[0].suppressed);
    assert!(!status.overlay_active);
}

#[test]
fn capture_overlay_clears_after_threat_is_gone() {
    let proc_root = TempDir::new().expect("temp dir");
    fake_proc(proc_root.path(), 5000, "obs");

    let overlay = Arc::new(LoggingOverlay::new());
    let guard = Guard::new(
        GuardKind::Capture,
        Arc::new(Unkillable(ProcessScanner::with_proc_root(&keywords(&["obs", "kazam"]), proc_root.path()))),
        overlay.clone(),
        Duration::from_millis(100),
        Duration::from_millis(50),
    );

    guard.scan_once();
    assert!(overlay.is_engaged());
    assert!(guard.get_status().overlay_active);

    fs::remove_dir_all(proc_root.path().join("5000")).expect("process exits");
    std::thread::sleep(Duration::from_millis(80));
    guard.scan_once();

    let status = guard.get_status();
    assert!(!overlay.is_engaged());
    assert!(!status.threat_detected);
    assert_eq!(status.detected.len(), 1);
}

#[test]
fn running_guard_reports_through_guard_set() {
    let proc_root = TempDir::new().expect("temp dir");
    fake_proc(proc_root.path(), 6000, "teamviewer");

    let guard = Guard::new(
        GuardKind::RemoteAccess,
        Arc::new(Unkillable(ProcessScanner::with_proc_root(&keywords(&["teamviewer"]), proc_root.path()))),
        Arc::new(LoggingOverlay::new()),
        Duration::from_millis(100),
        Duration::ZERO,
    );
    let set = GuardSet::new(vec![guard]);
    set.start_all();

    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while set.statuses()[0].detected.is_empty() && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }

    let status = &set.statuses()[0];
    assert!(status.running);
    assert_eq!(status.detected[0].name, "teamviewer");

    set.stop_all();
    assert!(!set.statuses()[0].running);
}
