// Integration tests for the AXIS camera client against a local digest-protected server

use axum::extract::{RawQuery, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::tempdir;

use panlapse::camera::{AxisCamera, Camera, CameraError};
use panlapse::config::{CameraConfig, Credentials};
use panlapse::file_manager::FrameStore;
use panlapse::sweep::{PanPlan, SweepRunner, SweepSettings};

const CHALLENGE: &str = r#"Digest realm="AXIS_ACCC8E000000", nonce="0009c5e1Y2a3b4c5d6", qop="auth", algorithm=MD5"#;
const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0xFF, 0xD9];
const REJECTED_PAN: &str = "pan=999&";

#[derive(Clone, Default)]
struct FakeAxis {
    challenges: Arc<AtomicUsize>,
    ptz_queries: Arc<Mutex<Vec<String>>>,
    authorizations: Arc<Mutex<Vec<String>>>,
}

impl FakeAxis {
    fn challenges(&self) -> usize {
        self.challenges.load(Ordering::SeqCst)
    }

    fn ptz_queries(&self) -> Vec<String> {
        self.ptz_queries.lock().unwrap().clone()
    }

    /// Accepts any digest answer for `root`; anything else gets the challenge.
    fn check(&self, headers: &HeaderMap) -> Result<(), Response> {
        let answer = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .filter(|value| value.starts_with("Digest ") && value.contains(r#"username="root""#));
        match answer {
            Some(answer) => {
                self.authorizations.lock().unwrap().push(answer.to_string());
                Ok(())
            }
            None => {
                self.challenges.fetch_add(1, Ordering::SeqCst);
                Err((StatusCode::UNAUTHORIZED, [(header::WWW_AUTHENTICATE, CHALLENGE)]).into_response())
            }
        }
    }
}

async fn ptz(State(axis): State<FakeAxis>, RawQuery(query): RawQuery, headers: HeaderMap) -> Response {
    if let Err(challenge) = axis.check(&headers) {
        return challenge;
    }
    let query = query.unwrap_or_default();
    axis.ptz_queries.lock().unwrap().push(query.clone());
    if query.starts_with(REJECTED_PAN) {
        StatusCode::SERVICE_UNAVAILABLE.into_response()
    } else {
        StatusCode::NO_CONTENT.into_response()
    }
}

async fn jpeg(State(axis): State<FakeAxis>, headers: HeaderMap) -> Response {
    if let Err(challenge) = axis.check(&headers) {
        return challenge;
    }
    (StatusCode::OK, [(header::CONTENT_TYPE, "image/jpeg")], JPEG.to_vec()).into_response()
}

async fn serve(axis: FakeAxis) -> SocketAddr {
    let app = Router::new()
        .route("/axis-cgi/com/ptz.cgi", get(ptz))
        .route("/jpg/image.jpg", get(jpeg))
        .with_state(axis);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn camera_at(addr: SocketAddr) -> AxisCamera {
    let credentials = Credentials {
        host: addr.to_string(),
        username: "root".to_string(),
        password: "secret".to_string(),
    };
    AxisCamera::new(&credentials, &CameraConfig::default(), Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_challenge_is_answered_once_and_reused() {
    let axis = FakeAxis::default();
    let camera = camera_at(serve(axis.clone()).await);

    camera.move_to(-120, 14).await.unwrap();
    camera.move_to(-118, 14).await.unwrap();
    camera.capture_frame().await.unwrap();

    assert_eq!(axis.challenges(), 1);
    assert_eq!(axis.ptz_queries(), vec!["pan=-120&tilt=14&zoom=1", "pan=-118&tilt=14&zoom=1"]);

    let answers = axis.authorizations.lock().unwrap().clone();
    assert_eq!(answers.len(), 3);
    assert!(answers[0].contains("nc=00000001"));
    assert!(answers[1].contains("nc=00000002"));
    assert!(answers[1].contains(r#"uri="/axis-cgi/com/ptz.cgi?pan=-118&tilt=14&zoom=1""#));
}

#[tokio::test]
async fn test_capture_returns_image_bytes() {
    let camera = camera_at(serve(FakeAxis::default()).await);
    assert_eq!(camera.capture_frame().await.unwrap(), JPEG);
}

#[tokio::test]
async fn test_non_success_status_is_an_error() {
    let camera = camera_at(serve(FakeAxis::default()).await);
    match camera.move_to(999, 14).await {
        Err(CameraError::Status { status, url }) => {
            assert_eq!(status, 503);
            assert!(url.contains("pan=999"));
        }
        other => panic!("expected status error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unreachable_camera() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let camera = camera_at(addr);
    assert!(matches!(camera.move_to(0, 14).await, Err(CameraError::Http(_))));
}

#[tokio::test]
async fn test_recorded_sweep_against_camera() {
    let axis = FakeAxis::default();
    let camera = camera_at(serve(axis.clone()).await);
    let dir = tempdir().unwrap();
    let frames = FrameStore::new(dir.path(), "frame");
    let settings = SweepSettings {
        oscillate: false,
        tilt: 14,
        interval: Duration::ZERO,
        lag: Duration::ZERO,
        max_steps: None,
    };

    let plan = PanPlan::build(-30, 0, 3).unwrap();
    let report = SweepRunner::new(&camera, Some(&frames), settings).run(&plan).await;

    assert_eq!(report.steps, 3);
    assert_eq!(report.failed_captures, 0);
    assert_eq!(axis.challenges(), 1);

    let saved = frames.list_frames().await.unwrap();
    let names: Vec<String> = saved
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["frame_000000_30.jpg", "frame_000001_20.jpg", "frame_000002_10.jpg"]);
    assert_eq!(std::fs::read(&saved[2]).unwrap(), JPEG);
}
