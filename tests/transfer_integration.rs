//! Integration tests for the transfer engine against mock HTTP servers.
//!
//! The engine probes the remote size with a `Range: bytes=0-0` GET before
//! transferring, so most tests mount that probe mock first (wiremock
//! matches mocks in mount order) and a catch-all data mock after it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dlm_core::{FileTransfer, TransferError, TransferOptions};
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Deterministic non-trivial body.
fn body(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn options(retries: u32) -> TransferOptions {
    TransferOptions {
        retries,
        timeout: Duration::from_secs(5),
        ..TransferOptions::default()
    }
}

/// Mounts the size-probe mock answering `Range: bytes=0-0` with a 206.
async fn mount_probe(server: &MockServer, route: &str, content: &[u8]) {
    Mock::given(method("GET"))
        .and(path(route))
        .and(header("Range", "bytes=0-0"))
        .respond_with(
            ResponseTemplate::new(206)
                .insert_header(
                    "Content-Range",
                    format!("bytes 0-0/{}", content.len()).as_str(),
                )
                .set_body_bytes(content[..1].to_vec()),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn download_writes_full_content() {
    let content = body(2048);
    let server = MockServer::start().await;
    mount_probe(&server, "/data.bin", &content).await;
    Mock::given(method("GET"))
        .and(path("/data.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(content.clone()))
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("temp dir");
    let transfer = FileTransfer::with_options(
        &format!("{}/data.bin", server.uri()),
        dir.path(),
        options(0),
    )
    .expect("construct transfer");

    let bytes = transfer.download().await.expect("download should succeed");
    assert_eq!(bytes, 2048);

    let written = std::fs::read(transfer.local_path()).expect("read downloaded file");
    assert_eq!(written, content);
}

#[tokio::test]
async fn download_reports_progress_up_to_total() {
    let content = body(4096);
    let server = MockServer::start().await;
    mount_probe(&server, "/data.bin", &content).await;
    Mock::given(method("GET"))
        .and(path("/data.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(content))
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("temp dir");
    let transfer = FileTransfer::with_options(
        &format!("{}/data.bin", server.uri()),
        dir.path(),
        options(0),
    )
    .expect("construct transfer");

    let last_seen = Arc::new(AtomicU64::new(0));
    let observer = Arc::clone(&last_seen);
    let bytes = transfer
        .download_with_progress(Arc::new(move |so_far| {
            // Progress is monotonic within one attempt.
            assert!(so_far >= observer.load(Ordering::SeqCst));
            observer.store(so_far, Ordering::SeqCst);
        }))
        .await
        .expect("download should succeed");

    assert_eq!(bytes, 4096);
    assert_eq!(last_seen.load(Ordering::SeqCst), 4096);
}

#[tokio::test]
async fn remote_size_resolves_from_content_range() {
    let content = body(1234);
    let server = MockServer::start().await;
    mount_probe(&server, "/data.bin", &content).await;

    let dir = TempDir::new().expect("temp dir");
    let transfer = FileTransfer::with_options(
        &format!("{}/data.bin", server.uri()),
        dir.path(),
        options(0),
    )
    .expect("construct transfer");

    assert_eq!(transfer.remote_size().await.expect("probe"), Some(1234));
    assert!(transfer.exists().await.expect("exists probe"));
}

#[tokio::test]
async fn not_found_fails_fast_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing.bin"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("temp dir");
    let transfer = FileTransfer::with_options(
        &format!("{}/missing.bin", server.uri()),
        dir.path(),
        options(3),
    )
    .expect("construct transfer");

    let result = transfer.download().await;
    assert!(matches!(
        result,
        Err(TransferError::NotFound { status: 404, .. })
    ));
    assert!(
        !transfer.local_path().exists(),
        "destination must stay untouched on not-found"
    );
}

#[tokio::test]
async fn auth_rejection_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/secret.bin"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("temp dir");
    let transfer = FileTransfer::with_options(
        &format!("{}/secret.bin", server.uri()),
        dir.path(),
        options(3),
    )
    .expect("construct transfer");

    let result = transfer.download().await;
    assert!(matches!(
        result,
        Err(TransferError::AuthRequired { status: 401, .. })
    ));
}

#[tokio::test]
async fn credentials_sent_preemptively_as_basic_auth() {
    let content = body(256);
    let server = MockServer::start().await;

    // Only requests carrying the expected Authorization header are
    // answered; anything else falls through to wiremock's 404.
    Mock::given(method("GET"))
        .and(path("/secret.bin"))
        .and(header("Authorization", "Basic ZmVycmlzOmNyYWI="))
        .and(header("Range", "bytes=0-0"))
        .respond_with(
            ResponseTemplate::new(206)
                .insert_header("Content-Range", "bytes 0-0/256")
                .set_body_bytes(content[..1].to_vec()),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/secret.bin"))
        .and(header("Authorization", "Basic ZmVycmlzOmNyYWI="))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(content.clone()))
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("temp dir");
    let transfer = FileTransfer::with_options(
        &format!("{}/secret.bin", server.uri()),
        dir.path(),
        TransferOptions {
            username: Some("ferris".to_string()),
            password: Some("crab".to_string()),
            ..options(0)
        },
    )
    .expect("construct transfer");

    let bytes = transfer.download().await.expect("authenticated download");
    assert_eq!(bytes, 256);
    assert_eq!(
        std::fs::read(transfer.local_path()).expect("read file"),
        content
    );
}

#[tokio::test]
async fn resume_appends_missing_tail() {
    let content = body(2048);
    let server = MockServer::start().await;
    mount_probe(&server, "/data.bin", &content).await;
    Mock::given(method("GET"))
        .and(path("/data.bin"))
        .and(header("Range", "bytes=1024-"))
        .respond_with(
            ResponseTemplate::new(206)
                .insert_header("Content-Range", "bytes 1024-2047/2048")
                .set_body_bytes(content[1024..].to_vec()),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("temp dir");
    let transfer = FileTransfer::with_options(
        &format!("{}/data.bin", server.uri()),
        dir.path(),
        options(0),
    )
    .expect("construct transfer");
    std::fs::write(transfer.local_path(), &content[..1024]).expect("seed partial file");

    let bytes = transfer.resume().await.expect("resume should succeed");
    assert_eq!(bytes, 2048);
    assert_eq!(
        std::fs::read(transfer.local_path()).expect("read file"),
        content
    );
}

#[tokio::test]
async fn resume_of_complete_file_is_a_no_op() {
    let content = body(2048);
    let server = MockServer::start().await;

    // Only the size probe is mounted: any data request would hit
    // wiremock's fall-through 404 and fail the transfer.
    Mock::given(method("GET"))
        .and(path("/data.bin"))
        .and(header("Range", "bytes=0-0"))
        .respond_with(
            ResponseTemplate::new(206)
                .insert_header("Content-Range", "bytes 0-0/2048")
                .set_body_bytes(content[..1].to_vec()),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("temp dir");
    let transfer = FileTransfer::with_options(
        &format!("{}/data.bin", server.uri()),
        dir.path(),
        options(0),
    )
    .expect("construct transfer");
    std::fs::write(transfer.local_path(), &content).expect("seed complete file");

    let bytes = transfer.resume().await.expect("no-op resume");
    assert_eq!(bytes, 2048);
}

#[tokio::test]
async fn resume_restarts_when_server_ignores_range() {
    let content = body(2048);
    let server = MockServer::start().await;
    mount_probe(&server, "/data.bin", &content).await;
    // Replays the full body with a 200 regardless of the Range header.
    Mock::given(method("GET"))
        .and(path("/data.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(content.clone()))
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("temp dir");
    let transfer = FileTransfer::with_options(
        &format!("{}/data.bin", server.uri()),
        dir.path(),
        options(0),
    )
    .expect("construct transfer");
    // Seed a partial file whose bytes do NOT match the remote content.
    std::fs::write(transfer.local_path(), vec![0xFF; 100]).expect("seed partial file");

    let bytes = transfer.resume().await.expect("resume should succeed");
    assert_eq!(bytes, 2048);
    assert_eq!(
        std::fs::read(transfer.local_path()).expect("read file"),
        content,
        "restart must replace the stale partial bytes"
    );
}

#[tokio::test]
async fn transient_failures_exhaust_the_retry_budget() {
    let server = MockServer::start().await;
    // Every request fails: 1 probe + 1 initial attempt + 2 resumes.
    Mock::given(method("GET"))
        .and(path("/flaky.bin"))
        .respond_with(ResponseTemplate::new(500))
        .expect(4)
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("temp dir");
    let transfer = FileTransfer::with_options(
        &format!("{}/flaky.bin", server.uri()),
        dir.path(),
        options(2),
    )
    .expect("construct transfer");

    let result = transfer.download().await;
    match result {
        Err(TransferError::RetriesExhausted { attempts, .. }) => assert_eq!(attempts, 2),
        other => panic!("expected RetriesExhausted, got {other:?}"),
    }
}

#[tokio::test]
async fn transient_failures_recover_within_the_budget() {
    let content = body(1024);
    let server = MockServer::start().await;
    // First two GETs (the probe and the initial attempt) fail, later
    // requests fall through to the success mock.
    Mock::given(method("GET"))
        .and(path("/flaky.bin"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(content.clone()))
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("temp dir");
    let transfer = FileTransfer::with_options(
        &format!("{}/flaky.bin", server.uri()),
        dir.path(),
        options(3),
    )
    .expect("construct transfer");

    let bytes = transfer.download().await.expect("should recover via retry");
    assert_eq!(bytes, 1024);
    assert_eq!(
        std::fs::read(transfer.local_path()).expect("read file"),
        content
    );
}
