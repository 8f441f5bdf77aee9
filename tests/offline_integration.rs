//! Integration tests for the offline interceptor against a mock origin.
//!
//! Covers the full lifecycle:
//! - First load pre-caches the asset list
//! - Reload is served from the store without touching the network
//! - Version bump deletes the previous store
//! - Control messages report and clear the store

use std::sync::Arc;

use reqwest::{Method, Url};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use pwa_camera::offline::{
    CacheStorage, ControlReply, HttpFetcher, Registration, RegistrationError, Request,
    ResponseSource, ServiceWorker, WorkerState, ASSETS,
};

/// Test helper: a mock origin serving every asset with its path as body.
async fn setup_origin() -> MockServer {
    let server = MockServer::builder().start().await;
    for asset in ASSETS {
        Mock::given(method("GET"))
            .and(path(*asset))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!("asset:{}", asset)))
            .mount(&server)
            .await;
    }
    server
}

fn origin(server: &MockServer) -> Url {
    Url::parse(&server.uri()).unwrap()
}

fn worker(server: &MockServer, storage: &CacheStorage, version: u32) -> ServiceWorker {
    let fetcher = Arc::new(HttpFetcher::new(origin(server)).unwrap());
    ServiceWorker::new(
        format!("pwa-camara-v{}", version),
        origin(server),
        storage.clone(),
        fetcher,
    )
}

async fn request_count(server: &MockServer) -> usize {
    server.received_requests().await.unwrap().len()
}

fn get(server: &MockServer, asset: &str) -> Request {
    Request::get(origin(server).join(asset).unwrap())
}

#[tokio::test]
async fn test_first_load_then_reload_from_cache() {
    let server = setup_origin().await;
    let temp_dir = TempDir::new().unwrap();
    let storage = CacheStorage::new(temp_dir.path().to_path_buf());
    let mut registration = Registration::default();

    let active = registration
        .register(worker(&server, &storage, 1))
        .await
        .unwrap();
    assert_eq!(active.state(), WorkerState::Activated);
    assert_eq!(request_count(&server).await, ASSETS.len());

    for asset in ASSETS {
        let fetched = registration.fetch(get(&server, asset)).await.unwrap();
        assert_eq!(fetched.source, ResponseSource::Cache, "asset {}", asset);
        assert_eq!(fetched.response.status, 200);
        assert_eq!(
            std::str::from_utf8(&fetched.response.body).unwrap(),
            format!("asset:{}", asset)
        );
    }

    // Reload touched the network zero times
    assert_eq!(request_count(&server).await, ASSETS.len());
}

#[tokio::test]
async fn test_cached_assets_survive_origin_going_away() {
    let server = setup_origin().await;
    let temp_dir = TempDir::new().unwrap();
    let storage = CacheStorage::new(temp_dir.path().to_path_buf());
    let mut registration = Registration::default();
    registration
        .register(worker(&server, &storage, 1))
        .await
        .unwrap();

    let index = get(&server, "/index.html");
    let missing = get(&server, "/not-cached.html");
    drop(server);

    let fetched = registration.fetch(index).await.unwrap();
    assert_eq!(fetched.source, ResponseSource::Cache);

    // Misses still go to the network, which is gone
    assert!(registration.fetch(missing).await.is_err());
}

#[tokio::test]
async fn test_miss_is_fetched_then_cached() {
    let server = setup_origin().await;
    Mock::given(method("GET"))
        .and(path("/help.html"))
        .respond_with(ResponseTemplate::new(200).set_body_string("help"))
        .expect(1)
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let storage = CacheStorage::new(temp_dir.path().to_path_buf());
    let mut registration = Registration::default();
    registration
        .register(worker(&server, &storage, 1))
        .await
        .unwrap();

    let first = registration
        .fetch(get(&server, "/help.html"))
        .await
        .unwrap();
    assert_eq!(first.source, ResponseSource::Network);
    assert_eq!(&first.response.body[..], b"help");

    registration.flush().await;

    let second = registration
        .fetch(get(&server, "/help.html"))
        .await
        .unwrap();
    assert_eq!(second.source, ResponseSource::Cache);
    assert_eq!(second.response, first.response);
}

#[tokio::test]
async fn test_error_responses_are_not_cached() {
    let server = setup_origin().await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(2)
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let storage = CacheStorage::new(temp_dir.path().to_path_buf());
    let mut registration = Registration::default();
    registration
        .register(worker(&server, &storage, 1))
        .await
        .unwrap();

    for _ in 0..2 {
        let fetched = registration.fetch(get(&server, "/gone")).await.unwrap();
        assert_eq!(fetched.response.status, 404);
        assert_eq!(fetched.source, ResponseSource::Network);
        registration.flush().await;
    }
}

#[tokio::test]
async fn test_cross_origin_responses_are_not_cached() {
    let server = setup_origin().await;
    let cdn = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/lib.js"))
        .respond_with(ResponseTemplate::new(200).set_body_string("lib"))
        .expect(2)
        .mount(&cdn)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let storage = CacheStorage::new(temp_dir.path().to_path_buf());
    let mut registration = Registration::default();
    registration
        .register(worker(&server, &storage, 1))
        .await
        .unwrap();

    let url = Url::parse(&cdn.uri()).unwrap().join("/lib.js").unwrap();
    for _ in 0..2 {
        let fetched = registration.fetch(Request::get(url.clone())).await.unwrap();
        assert_eq!(fetched.source, ResponseSource::Network);
        registration.flush().await;
    }
}

#[tokio::test]
async fn test_non_get_requests_pass_through() {
    let server = setup_origin().await;
    Mock::given(method("POST"))
        .and(path("/upload"))
        .respond_with(ResponseTemplate::new(201))
        .expect(2)
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let storage = CacheStorage::new(temp_dir.path().to_path_buf());
    let mut registration = Registration::default();
    registration
        .register(worker(&server, &storage, 1))
        .await
        .unwrap();

    let url = origin(&server).join("/upload").unwrap();
    for _ in 0..2 {
        let fetched = registration
            .fetch(Request::new(Method::POST, url.clone()))
            .await
            .unwrap();
        assert_eq!(fetched.source, ResponseSource::Passthrough);
        assert_eq!(fetched.response.status, 201);
    }
}

#[tokio::test]
async fn test_version_bump_deletes_previous_store() {
    let server = setup_origin().await;
    let temp_dir = TempDir::new().unwrap();
    let storage = CacheStorage::new(temp_dir.path().to_path_buf());
    let mut registration = Registration::default();

    let v1 = registration
        .register(worker(&server, &storage, 1))
        .await
        .unwrap();
    assert_eq!(storage.keys().await.unwrap(), vec!["pwa-camara-v1"]);

    let v2 = registration
        .register(worker(&server, &storage, 2))
        .await
        .unwrap();
    assert_eq!(storage.keys().await.unwrap(), vec!["pwa-camara-v2"]);
    assert_eq!(v1.state(), WorkerState::Redundant);
    assert_eq!(v2.state(), WorkerState::Activated);
    assert_eq!(
        registration.active().unwrap().cache_name(),
        "pwa-camara-v2"
    );

    // v2 re-fetched the full asset list
    assert_eq!(request_count(&server).await, ASSETS.len() * 2);
}

#[tokio::test]
async fn test_failed_install_keeps_previous_worker() {
    let server = setup_origin().await;
    let temp_dir = TempDir::new().unwrap();
    let storage = CacheStorage::new(temp_dir.path().to_path_buf());
    let mut registration = Registration::default();
    registration
        .register(worker(&server, &storage, 1))
        .await
        .unwrap();

    // The next version lists an asset the origin cannot serve
    let broken = worker(&server, &storage, 2).with_assets(vec![
        "/index.html".to_string(),
        "/missing.css".to_string(),
    ]);
    let err = registration.register(broken).await.unwrap_err();
    assert!(matches!(err, RegistrationError::InstallFailed { .. }));
    assert!(err.to_string().contains("pwa-camara-v2"));

    assert_eq!(
        registration.active().unwrap().cache_name(),
        "pwa-camara-v1"
    );
    assert_eq!(storage.keys().await.unwrap(), vec!["pwa-camara-v1"]);

    let fetched = registration.fetch(get(&server, "/")).await.unwrap();
    assert_eq!(fetched.source, ResponseSource::Cache);
}

#[tokio::test]
async fn test_waiting_worker_activates_after_clients_close() {
    let server = setup_origin().await;
    let temp_dir = TempDir::new().unwrap();
    let storage = CacheStorage::new(temp_dir.path().to_path_buf());
    let mut registration = Registration::default();
    let page = registration.clients().open();

    registration
        .register(worker(&server, &storage, 1))
        .await
        .unwrap();
    assert_eq!(
        registration.clients().controller_of(page).as_deref(),
        Some("pwa-camara-v1")
    );

    let v2 = registration
        .register(worker(&server, &storage, 2).with_skip_waiting(false))
        .await
        .unwrap();
    assert_eq!(v2.state(), WorkerState::Installed);
    assert_eq!(
        registration.waiting().unwrap().cache_name(),
        "pwa-camara-v2"
    );
    assert_eq!(
        registration.active().unwrap().cache_name(),
        "pwa-camara-v1"
    );

    // Still controlled by v1 while the page is open
    assert!(!registration.promote_waiting().await.unwrap());

    registration.clients().close(page);
    assert!(registration.promote_waiting().await.unwrap());
    assert!(registration.waiting().is_none());
    assert_eq!(v2.state(), WorkerState::Activated);
    assert_eq!(storage.keys().await.unwrap(), vec!["pwa-camara-v2"]);
}

#[tokio::test]
async fn test_cache_info_and_clear_messages() {
    let server = setup_origin().await;
    let temp_dir = TempDir::new().unwrap();
    let storage = CacheStorage::new(temp_dir.path().to_path_buf());
    let mut registration = Registration::default();
    registration
        .register(worker(&server, &storage, 1))
        .await
        .unwrap();

    let reply = registration
        .post_message(json!({"action": "getCacheInfo"}))
        .await
        .unwrap()
        .await
        .unwrap();
    assert_eq!(
        reply,
        ControlReply::CacheInfo {
            cache_name: "pwa-camara-v1".to_string(),
            cached_items: ASSETS.len(),
        }
    );
    assert_eq!(
        serde_json::to_value(&reply).unwrap(),
        json!({"cacheName": "pwa-camara-v1", "cachedItems": 6})
    );

    let reply = registration
        .post_message(json!({"action": "clearCache"}))
        .await
        .unwrap()
        .await
        .unwrap();
    assert_eq!(reply, ControlReply::Cleared { success: true });
    assert!(!storage.has("pwa-camara-v1").await);

    // Store is empty, so the next request goes to the network
    let fetched = registration.fetch(get(&server, "/app.js")).await.unwrap();
    assert_eq!(fetched.source, ResponseSource::Network);
}

#[tokio::test]
async fn test_unknown_message_gets_no_reply() {
    let server = setup_origin().await;
    let temp_dir = TempDir::new().unwrap();
    let storage = CacheStorage::new(temp_dir.path().to_path_buf());
    let mut registration = Registration::default();
    registration
        .register(worker(&server, &storage, 1))
        .await
        .unwrap();

    let reply = registration
        .post_message(json!({"action": "selfDestruct"}))
        .await
        .unwrap();
    assert!(reply.await.is_err());
}
