mod common;

use common::{render, FakeDetector, FakeEmbedder, Fixture, Scene, ALICE};
use exam_proctor::enrollment::SignatureExtractor;
use exam_proctor::guards::GuardSet;
use exam_proctor::monitor::{FaceStatus, MonitorRegistry};
use exam_proctor::service::protocol::{Request, Response, StatusRequest};
use exam_proctor::service::{ProctorServer, ProctorService, ServiceClient};
use std::sync::Arc;
use std::time::Duration;

fn service(fixture: &Fixture) -> ProctorService {
    let registry = Arc::new(MonitorRegistry::new(fixture.context()));
    let extractor = Arc::new(SignatureExtractor::new(
        Arc::new(FakeDetector),
        Arc::new(FakeEmbedder),
        fixture.store.clone(),
    ));
    ProctorService::new(registry, fixture.store.clone(), Arc::new(GuardSet::new(Vec::new())))
        .with_extractor(extractor)
        .with_uploads_dir(fixture.dir.path().join("uploads"))
}

#[test]
fn handler_maps_requests_to_registry() {
    let fixture = Fixture::new();
    let service = service(&fixture);

    let response = service.handle(Request::Status(StatusRequest { session_id: "none".into() }));
    match response {
        Response::Status(status) => {
            assert!(!status.running);
            assert_eq!(status.face_status, FaceStatus::Inactive);
        }
        other => panic!("unexpected response {:?}", other),
    }

    assert_eq!(service.handle(Request::GuardStatus), Response::Guards(Vec::new()));
}

#[test]
fn empty_session_id_is_rejected() {
    let fixture = Fixture::new();
    let service = service(&fixture);

    let response = service.handle(Request::Start(exam_proctor::service::protocol::StartRequest {
        session_id: String::new(),
        exam_id: 1,
        student_label: "alice".into(),
    }));

    assert!(matches!(response, Response::Error(_)));
    assert!(service.registry().is_empty());
}

#[test]
fn client_and_daemon_over_unix_socket() {
    let fixture = Fixture::new();
    let uploads = fixture.dir.path().join("uploads").join("exam-2");
    std::fs::create_dir_all(&uploads).expect("uploads");
    render(Scene::student(ALICE)).save(uploads.join("alice.png")).expect("photo");

    let socket = fixture.dir.path().join("proctor.sock");
    let server = ProctorServer::bind(&socket, Arc::new(service(&fixture))).expect("bind");
    std::thread::spawn(move || server.serve());

    let client = ServiceClient::new(&socket);

    assert!(client.verify_student(1, "alice").expect("verify"));
    assert!(!client.verify_student(1, "mallory").expect("verify"));

    assert!(client.start("s-1", 1, "alice").expect("start"));
    assert!(client.start("s-1", 1, "alice").expect("second start"));

    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    let mut status = client.status("s-1").expect("status");
    while status.face_status != FaceStatus::Confirmed && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
        status = client.status("s-1").expect("status");
    }
    assert!(status.running);
    assert!(status.identity_confirmed);

    assert!(client.stop("s-1").expect("stop"));
    assert!(!client.stop("s-1").expect("second stop"));
    assert_eq!(client.status("s-1").expect("status").face_status, FaceStatus::Inactive);

    let report = client.extract_signatures(2, std::path::Path::new("exam-2")).expect("extract");
    assert!(report.success);
    assert_eq!(report.processed_count, 1);
    assert!(client.verify_student(2, "alice").expect("verify"));

    assert!(client.guard_status().expect("guards").is_empty());
}

#[test]
fn malformed_frame_gets_error_response() {
    use exam_proctor::service::protocol::read_frame;
    use std::io::Write;
    use std::os::unix::net::UnixStream;

    let fixture = Fixture::new();
    let socket = fixture.dir.path().join("malformed.sock");
    let server = ProctorServer::bind(&socket, Arc::new(service(&fixture))).expect("bind");
    std::thread::spawn(move || server.serve());

    let mut stream = UnixStream::connect(&socket).expect("connect");
    stream.write_all(&3u32.to_le_bytes()).expect("len");
    stream.write_all(&[0xff, 0xff, 0xff]).expect("payload");

    let response: Response = read_frame(&mut stream).expect("response");
    assert!(matches!(response, Response::Error(_)));
}
