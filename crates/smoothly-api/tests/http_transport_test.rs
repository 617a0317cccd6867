#![allow(clippy::unwrap_used)]
// Integration tests for `HttpTransport` using wiremock.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use smoothly_api::{FailureKind, HttpTransport, Transport, TransportConfig, WireRequest};

const VERSION_LINE: &str = "Build version: edge-9ab4538, Build date: Oct 10 2016 04:09:42, MCU: LPC1769, System Clock: 120MHz\r\n";

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, HttpTransport) {
    let server = MockServer::start().await;
    let transport = HttpTransport::new(&TransportConfig::default()).unwrap();
    (server, transport)
}

/// `host:port` of the mock server, the way a board address is written.
fn address(server: &MockServer) -> String {
    server.address().to_string()
}

fn request(server: &MockServer, command: &str, timeout_ms: u64) -> WireRequest {
    WireRequest::command(&address(server), command, Duration::from_millis(timeout_ms)).unwrap()
}

// ── Success ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_command_posts_text_body() {
    let (server, transport) = setup().await;

    Mock::given(method("POST"))
        .and(path("/command"))
        .and(header("content-type", "text/plain"))
        .and(body_string("version\n"))
        .respond_with(ResponseTemplate::new(200).set_body_string(VERSION_LINE))
        .expect(1)
        .mount(&server)
        .await;

    let response = transport
        .execute(request(&server, "  version ", 2000))
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.body, VERSION_LINE);
    assert_eq!(response.url.path(), "/command");
}

#[tokio::test]
async fn test_unsupported_marker_is_still_a_transport_success() {
    let (server, transport) = setup().await;

    Mock::given(method("POST"))
        .and(path("/command"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("error:Unsupported command - foo\n"),
        )
        .mount(&server)
        .await;

    let response = transport.execute(request(&server, "foo", 2000)).await.unwrap();
    assert!(response.body.starts_with(smoothly_api::wire::UNSUPPORTED_MARKER));
}

// ── Failures ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_non_2xx_is_load_failure() {
    let (server, transport) = setup().await;

    Mock::given(method("POST"))
        .and(path("/command"))
        .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
        .mount(&server)
        .await;

    let failure = transport
        .execute(request(&server, "version", 2000))
        .await
        .unwrap_err();

    assert_eq!(failure.kind, FailureKind::Status(503));
    assert_eq!(failure.kind.to_string(), "load");
    assert!(failure.message.unwrap().contains("busy"));
}

#[tokio::test]
async fn test_slow_board_times_out_in_upload_phase() {
    let (server, transport) = setup().await;

    Mock::given(method("POST"))
        .and(path("/command"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(VERSION_LINE)
                .set_delay(Duration::from_millis(1500)),
        )
        .mount(&server)
        .await;

    let failure = transport
        .execute(request(&server, "version", 100))
        .await
        .unwrap_err();

    assert_eq!(failure.kind, FailureKind::UploadTimeout);
    assert!(failure.kind.is_timeout());
}

#[tokio::test]
async fn test_unreachable_board_is_upload_error() {
    // Reserve a port, then release it so nothing is listening there.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let transport = HttpTransport::new(&TransportConfig::default()).unwrap();
    let req = WireRequest::command(&addr.to_string(), "version", Duration::from_millis(1000)).unwrap();

    let failure = transport.execute(req).await.unwrap_err();
    assert!(failure.kind.is_upload(), "got {:?}", failure.kind);
}

#[tokio::test]
async fn test_cancelled_request_is_aborted() {
    let (server, transport) = setup().await;

    Mock::given(method("POST"))
        .and(path("/command"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    cancel.cancel();

    let failure = transport
        .execute(request(&server, "ok", 2000).with_cancel(cancel))
        .await
        .unwrap_err();

    assert_eq!(failure.kind, FailureKind::UploadAbort);
    assert!(failure.kind.is_abort());
}

// ── Progress ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_progress_reports_full_body() {
    let (server, transport) = setup().await;
    let listing = "config.txt\nfirmware.cur\n".repeat(64);

    Mock::given(method("POST"))
        .and(path("/command"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing.clone()))
        .mount(&server)
        .await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let response = transport
        .execute(request(&server, "ls /sd", 2000).with_progress(tx))
        .await
        .unwrap();
    assert_eq!(response.body, listing);

    let mut last = None;
    while let Ok(event) = rx.try_recv() {
        last = Some(event);
    }
    let last = last.expect("at least one progress event");
    let len = u64::try_from(listing.len()).unwrap();
    assert_eq!(last.loaded, len);
    assert_eq!(last.total, len);
    assert!((last.percent - 100.0).abs() < f64::EPSILON);
}
