mod common;

use common::{wait_until, FakeCamera, Fixture, Scene, ALICE};
use exam_proctor::monitor::{FaceStatus, MonitorContext, MonitorPhase, MonitorRegistry, SessionMonitor};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(5);

#[test]
fn never_started_session_is_inactive() {
    let fixture = Fixture::new();
    let registry = MonitorRegistry::new(fixture.context());

    let status = registry.get_status("nobody");

    assert!(!status.running);
    assert_eq!(status.face_status, FaceStatus::Inactive);
    assert!(!status.identity_confirmed);
    assert_eq!(status.emotion, "unknown");
    assert!(status.detected_objects.is_empty());
    assert!(registry.is_empty());
}

#[test]
fn double_start_is_idempotent() {
    let fixture = Fixture::new();
    let registry = MonitorRegistry::new(fixture.context());

    assert!(registry.start_monitoring("s-1", 1, "alice"));
    assert!(registry.start_monitoring("s-1", 1, "alice"));

    assert_eq!(registry.len(), 1);
    assert_eq!(fixture.camera.opened.load(Ordering::SeqCst), 1);
    assert!(registry.stop_monitoring("s-1"));
}

#[test]
fn running_monitor_confirms_enrolled_student() {
    let fixture = Fixture::new();
    let registry = MonitorRegistry::new(fixture.context());

    assert!(registry.start_monitoring("s-1", 1, "alice"));
    assert!(wait_until(WAIT, || registry.get_status("s-1").face_status == FaceStatus::Confirmed));

    let status = registry.get_status("s-1");
    assert!(status.running);
    assert!(status.camera_acquired);
    assert!(status.identity_confirmed);
    assert_eq!(status.student_label.as_deref(), Some("alice"));
    assert!(status.last_update_time.is_some());

    fixture.camera.set_scene(Scene::student(common::BOB));
    assert!(wait_until(WAIT, || registry.get_status("s-1").face_status == FaceStatus::Mismatch));
    assert!(!registry.get_status("s-1").identity_confirmed);
}

#[test]
fn missing_signature_file_fails_start() {
    let fixture = Fixture::new();
    let registry = MonitorRegistry::new(fixture.context());

    assert!(!registry.start_monitoring("s-2", 404, "alice"));

    let status = registry.get_status("s-2");
    assert!(!status.running);
    assert_eq!(status.face_status, FaceStatus::ErrorNoSignatures);
    // the camera opened before the signature lookup is released
    assert_eq!(fixture.camera.open_handles(), 0);
    assert!(!status.camera_acquired);
}

#[test]
fn unknown_student_fails_start() {
    let fixture = Fixture::new();
    let registry = MonitorRegistry::new(fixture.context());

    assert!(!registry.start_monitoring("s-3", 1, "mallory"));
    assert_eq!(registry.get_status("s-3").face_status, FaceStatus::ErrorStudentNotFound);
    assert_eq!(fixture.camera.open_handles(), 0);
}

#[test]
fn no_camera_fails_start() {
    let fixture = Fixture::new();
    let camera = FakeCamera::with_devices(Scene::student(ALICE), vec![7]);
    let context = MonitorContext { camera: Arc::new(camera), ..fixture.context() };
    let registry = MonitorRegistry::new(context);

    assert!(!registry.start_monitoring("s-4", 1, "alice"));
    assert_eq!(registry.get_status("s-4").face_status, FaceStatus::ErrorNoCamera);
}

#[test]
fn failed_monitor_stays_registered_until_stopped() {
    let fixture = Fixture::new();
    let registry = MonitorRegistry::new(fixture.context());

    assert!(!registry.start_monitoring("s-5", 404, "alice"));
    assert!(!registry.start_monitoring("s-5", 404, "alice"));
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.get_status("s-5").face_status, FaceStatus::ErrorNoSignatures);

    assert!(registry.stop_monitoring("s-5"));
    assert!(registry.is_empty());
    assert_eq!(registry.get_status("s-5").face_status, FaceStatus::Inactive);
}

#[test]
fn stop_on_unknown_session_changes_nothing() {
    let fixture = Fixture::new();
    let registry = MonitorRegistry::new(fixture.context());
    assert!(registry.start_monitoring("s-1", 1, "alice"));

    assert!(!registry.stop_monitoring("ghost"));
    assert_eq!(registry.active_sessions(), vec!["s-1".to_string()]);
}

#[test]
fn stop_releases_camera_and_is_idempotent() {
    let fixture = Fixture::new();
    let registry = MonitorRegistry::new(fixture.context());

    assert!(registry.start_monitoring("s-1", 1, "alice"));
    assert_eq!(fixture.camera.open_handles(), 1);

    assert!(registry.stop_monitoring("s-1"));
    assert_eq!(fixture.camera.open_handles(), 0);
    assert!(!registry.stop_monitoring("s-1"));
    assert!(!registry.get_status("s-1").running);
}

#[test]
fn fifty_concurrent_starts() {
    let fixture = Fixture::new();
    let registry = Arc::new(MonitorRegistry::new(fixture.context()));

    let handles: Vec<_> = (0..50)
        .map(|i| {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || registry.start_monitoring(&format!("session-{}", i), 1, "alice"))
        })
        .collect();
    for handle in handles {
        assert!(handle.join().expect("start thread"));
    }

    assert_eq!(registry.len(), 50);
    assert_eq!(fixture.camera.open_handles(), 50);

    registry.shutdown();
    assert!(registry.is_empty());
    assert_eq!(fixture.camera.open_handles(), 0);
}

#[test]
fn concurrent_starts_of_one_session_create_one_monitor() {
    let fixture = Fixture::new();
    let registry = Arc::new(MonitorRegistry::new(fixture.context()));

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || registry.start_monitoring("shared", 1, "alice"))
        })
        .collect();
    for handle in handles {
        assert!(handle.join().expect("start thread"));
    }

    assert_eq!(registry.len(), 1);
    assert_eq!(fixture.camera.opened.load(Ordering::SeqCst), 1);
}

#[test]
fn stopped_monitor_cannot_restart() {
    let fixture = Fixture::new();
    let monitor = SessionMonitor::new("s-9", Arc::new(fixture.context()));

    assert!(monitor.start(1, "alice"));
    assert_eq!(monitor.phase(), MonitorPhase::Running);
    monitor.stop();
    monitor.stop();

    assert_eq!(monitor.phase(), MonitorPhase::Stopped);
    assert!(!monitor.start(1, "alice"));
    assert_eq!(fixture.camera.open_handles(), 0);
}

#[test]
fn dropping_registry_stops_monitors() {
    let fixture = Fixture::new();
    {
        let registry = MonitorRegistry::new(fixture.context());
        assert!(registry.start_monitoring("s-1", 1, "alice"));
        assert!(registry.start_monitoring("s-2", 1, "bob"));
        assert_eq!(fixture.camera.open_handles(), 2);
    }
    assert_eq!(fixture.camera.open_handles(), 0);
}

#[test]
fn restart_with_other_exam_keeps_original_binding() {
    let fixture = Fixture::new();
    let registry = MonitorRegistry::new(fixture.context());

    assert!(registry.start_monitoring("s-1", 1, "alice"));
    assert!(registry.start_monitoring("s-1", 404, "bob"));

    let status = registry.get_status("s-1");
    assert_eq!(status.exam_id, Some(1));
    assert_eq!(status.student_label.as_deref(), Some("alice"));
    assert!(status.running);
    assert_eq!(fixture.camera.opened.load(Ordering::SeqCst), 1);
}

#[test]
fn stop_during_slow_frame_read_is_bounded() {
    let fixture = Fixture::new();
    fixture.camera.set_read_delay(Duration::from_millis(300));
    let registry = MonitorRegistry::new(fixture.context());
    assert!(registry.start_monitoring("s-1", 1, "alice"));
    assert!(wait_until(WAIT, || fixture.camera.reads() >= 2));

    let started = Instant::now();
    assert!(registry.stop_monitoring("s-1"));
    let elapsed = started.elapsed();

    // one in-flight read plus one frame interval, with slack for loaded machines
    assert!(elapsed < Duration::from_millis(1500), "stop took {:?}", elapsed);
    assert_eq!(fixture.camera.open_handles(), 0);
    assert!(!registry.get_status("s-1").running);

    let reads = fixture.camera.reads();
    std::thread::sleep(Duration::from_millis(400));
    assert_eq!(fixture.camera.reads(), reads);
}

#[test]
fn stop_racing_slow_camera_open_leaves_nothing_running() {
    let fixture = Fixture::new();
    fixture.camera.set_open_delay(Duration::from_millis(300));
    let registry = Arc::new(MonitorRegistry::new(fixture.context()));

    let starter = {
        let registry = Arc::clone(&registry);
        std::thread::spawn(move || registry.start_monitoring("s-1", 1, "alice"))
    };
    std::thread::sleep(Duration::from_millis(50));

    assert!(registry.stop_monitoring("s-1"));
    assert!(starter.join().expect("start thread"));

    assert!(registry.is_empty());
    let status = registry.get_status("s-1");
    assert!(!status.running);
    assert_eq!(status.face_status, FaceStatus::Inactive);
    assert_eq!(fixture.camera.open_handles(), 0);

    let reads = fixture.camera.reads();
    std::thread::sleep(Duration::from_millis(200));
    assert_eq!(fixture.camera.reads(), reads);
}
