//! Integration tests for the worker pool against mock HTTP servers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dlm_core::{
    DownloadManager, DownloadRequest, LIVENESS_ACK, PoolError, PoolSettings, TransferError,
    WorkerState,
};
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn settings(threads: usize) -> PoolSettings {
    PoolSettings {
        thread_count: threads,
        timeout: Duration::from_secs(5),
        retries: 0,
        ..PoolSettings::default()
    }
}

/// Polls `condition` until it holds or `deadline` elapses.
async fn wait_until(deadline: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}

/// Mounts a size probe and a catch-all data mock for `route`.
async fn mount_file(server: &MockServer, route: &str, content: Vec<u8>) {
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
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(content))
        .mount(server)
        .await;
}

#[tokio::test]
async fn workers_report_running_before_any_work() {
    let manager = DownloadManager::start(settings(4)).expect("start pool");

    let states_running = wait_until(Duration::from_secs(2), || {
        manager
            .worker_states()
            .iter()
            .all(|state| *state == WorkerState::Running)
    })
    .await;
    assert!(states_running, "got {:?}", manager.worker_states());
    assert_eq!(manager.worker_states().len(), 4);
    assert!(!manager.is_busy());

    manager.stop().await;
}

#[tokio::test]
async fn pool_downloads_every_request() {
    let content = vec![0xA5u8; 1 << 20]; // 1 MiB
    let server = MockServer::start().await;
    mount_file(&server, "/disc.iso", content.clone()).await;

    let dir = TempDir::new().expect("temp dir");
    let manager = DownloadManager::start(settings(3)).expect("start pool");

    let outcomes: Arc<Mutex<Vec<(String, bool)>>> = Arc::new(Mutex::new(Vec::new()));
    let mut handles = Vec::new();
    for i in 0..5 {
        let outcomes = Arc::clone(&outcomes);
        let request = DownloadRequest::new(format!("{}/disc.iso", server.uri()), dir.path())
            .file_name(format!("copy{i}.iso"))
            .on_complete(move |source, error| {
                outcomes
                    .lock()
                    .unwrap()
                    .push((source.to_string(), error.is_none()));
            });
        handles.push(manager.append(request));
    }

    let drained = wait_until(Duration::from_secs(20), || {
        outcomes.lock().unwrap().len() == 5 && !manager.is_busy()
    })
    .await;
    assert!(drained, "pool did not drain: {:?}", manager.worker_states());

    for (_, success) in outcomes.lock().unwrap().iter() {
        assert!(success, "all downloads should succeed");
    }
    for (i, handle) in handles.iter().enumerate() {
        assert!(handle.is_completed(), "request {i} should be completed");
        let written = std::fs::metadata(dir.path().join(format!("copy{i}.iso")))
            .expect("downloaded file exists");
        assert_eq!(written.len(), 1 << 20);
    }

    manager.stop().await;
}

#[tokio::test]
async fn append_keeps_pool_busy_until_callbacks_fire() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow.bin"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(vec![1u8; 4096])
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("temp dir");
    let manager = DownloadManager::start(settings(1)).expect("start pool");

    let completions = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&completions);
    manager.append(
        DownloadRequest::new(format!("{}/slow.bin", server.uri()), dir.path()).on_complete(
            move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        ),
    );

    assert!(manager.is_busy(), "busy right after append");

    let done = wait_until(Duration::from_secs(10), || {
        completions.load(Ordering::SeqCst) == 1 && !manager.is_busy()
    })
    .await;
    assert!(done);

    manager.stop().await;
}

#[tokio::test]
async fn not_found_reaches_callback_exactly_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing.bin"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("temp dir");
    let manager = DownloadManager::start(settings(2)).expect("start pool");

    let fired = Arc::new(AtomicUsize::new(0));
    let saw_not_found = Arc::new(AtomicUsize::new(0));
    let fired_counter = Arc::clone(&fired);
    let not_found_counter = Arc::clone(&saw_not_found);
    let handle = manager.append(
        DownloadRequest::new(format!("{}/missing.bin", server.uri()), dir.path()).on_complete(
            move |_, error| {
                fired_counter.fetch_add(1, Ordering::SeqCst);
                if matches!(error, Some(TransferError::NotFound { .. })) {
                    not_found_counter.fetch_add(1, Ordering::SeqCst);
                }
            },
        ),
    );

    let done = wait_until(Duration::from_secs(5), || {
        fired.load(Ordering::SeqCst) == 1 && !manager.is_busy()
    })
    .await;
    assert!(done);
    assert_eq!(saw_not_found.load(Ordering::SeqCst), 1);
    assert!(
        !handle.is_completed(),
        "failed requests never set the completed flag"
    );

    // Give any (buggy) duplicate dispatch a chance to show up.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    manager.stop().await;
}

#[tokio::test]
async fn pause_parks_workers_and_resume_drains() {
    let server = MockServer::start().await;
    mount_file(&server, "/data.bin", vec![7u8; 4096]).await;

    let dir = TempDir::new().expect("temp dir");
    let manager = DownloadManager::start(settings(2)).expect("start pool");

    manager.pause();
    let parked = wait_until(Duration::from_secs(2), || {
        manager
            .worker_states()
            .iter()
            .all(|state| *state == WorkerState::Paused)
    })
    .await;
    assert!(parked, "got {:?}", manager.worker_states());

    // A paused pool is alive, not dead.
    assert_eq!(manager.liveness_check().expect("paused pool is alive"), LIVENESS_ACK);

    let completions = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&completions);
    manager.append(
        DownloadRequest::new(format!("{}/data.bin", server.uri()), dir.path()).on_complete(
            move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        ),
    );

    // Paused workers perform no dequeues.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(manager.queued(), 1);
    assert_eq!(completions.load(Ordering::SeqCst), 0);
    assert!(manager.is_busy());

    manager.resume();
    let drained = wait_until(Duration::from_secs(10), || {
        completions.load(Ordering::SeqCst) == 1 && !manager.is_busy()
    })
    .await;
    assert!(drained);

    manager.stop().await;
}

#[tokio::test]
async fn stop_joins_workers_and_fails_liveness() {
    let manager = DownloadManager::start(settings(3)).expect("start pool");
    assert_eq!(manager.liveness_check().expect("fresh pool"), LIVENESS_ACK);

    manager.stop().await;

    assert!(manager
        .worker_states()
        .iter()
        .all(|state| *state == WorkerState::Stopped));
    assert!(matches!(
        manager.liveness_check(),
        Err(PoolError::WorkerDead { .. })
    ));
}

#[tokio::test]
async fn single_worker_preserves_fifo_completion_order() {
    let server = MockServer::start().await;
    for route in ["/a.bin", "/b.bin", "/c.bin"] {
        mount_file(&server, route, vec![3u8; 1024]).await;
    }

    let dir = TempDir::new().expect("temp dir");
    let manager = DownloadManager::start(settings(1)).expect("start pool");

    let order: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    for route in ["/a.bin", "/b.bin", "/c.bin"] {
        let order = Arc::clone(&order);
        manager.append(
            DownloadRequest::new(format!("{}{route}", server.uri()), dir.path()).on_complete(
                move |source, _| {
                    order.lock().unwrap().push(source.to_string());
                },
            ),
        );
    }

    let drained = wait_until(Duration::from_secs(10), || order.lock().unwrap().len() == 3).await;
    assert!(drained);

    let completed = order.lock().unwrap().clone();
    let suffixes: Vec<&str> = completed
        .iter()
        .map(|source| &source[source.len() - 6..])
        .collect();
    assert_eq!(suffixes, ["/a.bin", "/b.bin", "/c.bin"]);

    manager.stop().await;
}

#[tokio::test]
async fn panicking_callback_kills_its_worker() {
    let server = MockServer::start().await;
    mount_file(&server, "/data.bin", vec![9u8; 512]).await;

    let dir = TempDir::new().expect("temp dir");
    let manager = DownloadManager::start(settings(1)).expect("start pool");

    manager.append(
        DownloadRequest::new(format!("{}/data.bin", server.uri()), dir.path())
            .on_complete(|_, _| panic!("callback bug")),
    );

    // The transfer succeeds, the callback panics, the worker dies and the
    // pool reports it.
    let dead = wait_until(Duration::from_secs(10), || {
        manager.liveness_check().is_err()
    })
    .await;
    assert!(dead, "liveness check should fail after a callback panic");
}
