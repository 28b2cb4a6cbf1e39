//! End-to-end download runs against a mock Danbooru
//!
//! These tests use wiremock to serve listing pages and media files and run
//! the full coordinator pipeline over them.

use booru_harvester::booru::DanbooruSource;
use booru_harvester::config::Config;
use booru_harvester::downloader::RetryingFetcher;
use booru_harvester::{Coordinator, RunState};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a fast test configuration writing into `output`
fn create_test_config(output: &Path) -> Config {
    let mut config = Config::default();
    config.download.workers = 2;
    config.download.max_retries = 0;
    config.download.retry_backoff_ms = 1;
    config.download.rate_interval_ms = 1;
    config.download.stop_on_empty_page = true;
    config.output.directory = output.to_path_buf();
    config
}

fn create_coordinator(server: &MockServer, config: Config) -> Arc<Coordinator> {
    let fetcher = Arc::new(RetryingFetcher::new(
        reqwest::Client::new(),
        config.download.max_retries,
        config.retry_backoff(),
    ));
    let base = Url::parse(&server.uri()).expect("Failed to parse mock server URL");
    let source = Arc::new(DanbooruSource::new(base, Arc::clone(&fetcher)));
    Arc::new(Coordinator::new(config, source, fetcher))
}

fn post(server: &MockServer, id: i64, file: &str) -> serde_json::Value {
    let ext = file.rsplit('.').next().unwrap_or_default();
    let duration = if ext == "mp4" { 3.0 } else { 0.0 };
    serde_json::json!({
        "id": id,
        "file_ext": ext,
        "file_size": 16,
        "tag_string_general": "sky",
        "tag_string_artist": "painter",
        "file_url": format!("{}/media/{}", server.uri(), file),
        "media_asset": { "duration": duration }
    })
}

async fn mount_page(server: &MockServer, page: u32, posts: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/posts.json"))
        .and(query_param("page", page.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(posts))
        .mount(server)
        .await;
}

async fn mount_media(server: &MockServer, file: &str, body: &[u8]) {
    Mock::given(method("GET"))
        .and(path(format!("/media/{}", file)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_full_run_saves_media_and_metadata() {
    let mock_server = MockServer::start().await;
    let output = TempDir::new().unwrap();

    mount_page(
        &mock_server,
        1,
        serde_json::json!([post(&mock_server, 1, "a.png"), post(&mock_server, 2, "b.jpg")]),
    )
    .await;
    mount_page(&mock_server, 2, serde_json::json!([])).await;
    mount_media(&mock_server, "a.png", b"first image bytes").await;
    mount_media(&mock_server, "b.jpg", b"second image bytes").await;

    let coordinator = create_coordinator(&mock_server, create_test_config(output.path()));
    let progress = tokio::time::timeout(Duration::from_secs(10), coordinator.run())
        .await
        .expect("run should end at the empty page")
        .unwrap();

    assert_eq!(progress.downloaded, 2);
    assert_eq!(progress.failed, 0);
    assert_eq!(
        progress.downloaded_bytes,
        (b"first image bytes".len() + b"second image bytes".len()) as u64
    );

    let hash = hex::encode(Sha256::digest(b"first image bytes"));
    let media = output.path().join(format!("{}.png", hash));
    assert_eq!(std::fs::read(&media).unwrap(), b"first image bytes");

    let metadata_path = output.path().join(format!("{}_metadata.json", hash));
    let metadata: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&metadata_path).unwrap()).unwrap();
    assert_eq!(metadata["hash"], hash);
    assert_eq!(metadata["artists"], serde_json::json!(["painter"]));
    assert_eq!(coordinator.state(), RunState::Stopped);
}

#[tokio::test]
async fn test_no_metadata_writes_media_only() {
    let mock_server = MockServer::start().await;
    let output = TempDir::new().unwrap();

    mount_page(&mock_server, 1, serde_json::json!([post(&mock_server, 1, "a.png")])).await;
    mount_page(&mock_server, 2, serde_json::json!([])).await;
    mount_media(&mock_server, "a.png", b"pixels").await;

    let mut config = create_test_config(output.path());
    config.output.no_metadata = true;
    let coordinator = create_coordinator(&mock_server, config);
    coordinator.run().await.unwrap();

    let files: Vec<_> = std::fs::read_dir(output.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(files.len(), 1);
    assert!(files[0].ends_with(".png"));
}

#[tokio::test]
async fn test_volume_cap_stops_paging() {
    let mock_server = MockServer::start().await;
    let output = TempDir::new().unwrap();

    mount_page(&mock_server, 1, serde_json::json!([post(&mock_server, 1, "a.png")])).await;
    mount_media(&mock_server, "a.png", &[7u8; 512]).await;

    // Reaching the cap must prevent the next listing request
    Mock::given(method("GET"))
        .and(path("/posts.json"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let mut config = create_test_config(output.path());
    config.download.rate_interval_ms = 500;
    config.download.stop_on_empty_page = false;
    // 256 bytes
    config.filter.download_limit_gb = 256.0 / (1024.0 * 1024.0 * 1024.0);
    let coordinator = create_coordinator(&mock_server, config);

    let progress = tokio::time::timeout(Duration::from_secs(10), coordinator.run())
        .await
        .expect("volume cap should end the run without intervention")
        .unwrap();

    assert_eq!(progress.downloaded, 1);
    assert_eq!(progress.downloaded_bytes, 512);
    assert!(!coordinator.is_running());
}

#[tokio::test]
async fn test_missing_media_fails_without_retry() {
    let mock_server = MockServer::start().await;
    let output = TempDir::new().unwrap();

    mount_page(&mock_server, 1, serde_json::json!([post(&mock_server, 1, "gone.png")])).await;
    mount_page(&mock_server, 2, serde_json::json!([])).await;

    Mock::given(method("GET"))
        .and(path("/media/gone.png"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut config = create_test_config(output.path());
    config.download.max_retries = 3;
    let coordinator = create_coordinator(&mock_server, config);

    let progress = coordinator.run().await.unwrap();
    assert_eq!(progress.total, 1);
    assert_eq!(progress.failed, 1);
    assert_eq!(progress.downloaded, 0);
}

#[tokio::test]
async fn test_failed_page_is_retried_before_advancing() {
    let mock_server = MockServer::start().await;
    let output = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/posts.json"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&mock_server)
        .await;
    mount_page(&mock_server, 1, serde_json::json!([post(&mock_server, 1, "a.png")])).await;
    mount_page(&mock_server, 2, serde_json::json!([])).await;
    mount_media(&mock_server, "a.png", b"late but complete").await;

    let coordinator = create_coordinator(&mock_server, create_test_config(output.path()));
    let progress = tokio::time::timeout(Duration::from_secs(10), coordinator.run())
        .await
        .expect("page 1 should eventually succeed")
        .unwrap();

    assert_eq!(progress.downloaded, 1);
}

#[tokio::test]
async fn test_filtered_post_makes_no_media_request() {
    let mock_server = MockServer::start().await;
    let output = TempDir::new().unwrap();

    mount_page(
        &mock_server,
        1,
        serde_json::json!([post(&mock_server, 1, "clip.mp4"), post(&mock_server, 2, "a.png")]),
    )
    .await;
    mount_page(&mock_server, 2, serde_json::json!([])).await;
    mount_media(&mock_server, "a.png", b"pixels").await;

    Mock::given(method("GET"))
        .and(path("/media/clip.mp4"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"frames".to_vec()))
        .expect(0)
        .mount(&mock_server)
        .await;

    let mut config = create_test_config(output.path());
    config.filter.only_images = true;
    let coordinator = create_coordinator(&mock_server, config);

    let progress = coordinator.run().await.unwrap();
    assert_eq!(progress.skipped, 1);
    assert_eq!(progress.downloaded, 1);
}

#[tokio::test]
async fn test_stop_drains_and_is_idempotent() {
    let mock_server = MockServer::start().await;
    let output = TempDir::new().unwrap();

    // Every page has the same two posts, so the listing never ends
    Mock::given(method("GET"))
        .and(path("/posts.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            post(&mock_server, 1, "a.png"),
            post(&mock_server, 2, "b.png")
        ])))
        .mount(&mock_server)
        .await;
    mount_media(&mock_server, "a.png", b"a").await;
    mount_media(&mock_server, "b.png", b"b").await;

    let mut config = create_test_config(output.path());
    config.download.rate_interval_ms = 20;
    config.output.no_metadata = true;
    let coordinator = create_coordinator(&mock_server, config);

    let runner = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.run().await })
    };
    tokio::time::sleep(Duration::from_millis(300)).await;

    tokio::time::timeout(Duration::from_secs(10), async {
        tokio::join!(coordinator.stop(), coordinator.stop());
        coordinator.stop().await;
    })
    .await
    .expect("repeated stop should not deadlock");

    let progress = runner.await.unwrap().unwrap();
    assert!(progress.total > 0);
    assert_eq!(progress.total, progress.downloaded);
    assert_eq!(coordinator.state(), RunState::Stopped);
}
