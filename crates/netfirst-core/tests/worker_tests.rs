//! End-to-end behavior of the network-first interceptor.
//!
//! These tests drive a `ServiceWorker` through install/activate and then feed it
//! requests, with a scripted network and both storage backends.

use async_trait::async_trait;
use netfirst_core::{
    CacheStorage, ClientRegistry, FetchOutcome, Fetcher, MemoryCacheStorage, NetfirstError,
    Request, RequestKey, Response, ResponseType, ServiceWorker, SqliteCacheStorage, Url,
    WorkerConfig, WorkerState,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use tempfile::TempDir;

const CACHE_NAME: &str = "birthday-manager-v1";

/// Network double: each URL is either answered or unreachable.
#[derive(Default)]
struct ScriptedNetwork {
    routes: Mutex<HashMap<String, Response>>,
    calls: AtomicUsize,
}

impl ScriptedNetwork {
    fn serve(&self, url: &str, response: Response) {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), response);
    }

    fn go_offline(&self) {
        self.routes.lock().unwrap().clear();
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for ScriptedNetwork {
    async fn fetch(&self, request: &Request) -> netfirst_core::Result<Response> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.routes
            .lock()
            .unwrap()
            .get(request.url.as_str())
            .cloned()
            .ok_or_else(|| NetfirstError::Network {
                message: format!("connection refused: {}", request.url),
                cause: None,
            })
    }
}

/// Storage whose writes or deletions can be made to fail.
struct FlakyStorage {
    inner: MemoryCacheStorage,
    fail_puts: bool,
    fail_delete: Option<String>,
}

impl CacheStorage for FlakyStorage {
    fn keys(&self) -> netfirst_core::Result<Vec<String>> {
        self.inner.keys()
    }
    fn has(&self, namespace: &str) -> netfirst_core::Result<bool> {
        self.inner.has(namespace)
    }
    fn open(&self, namespace: &str) -> netfirst_core::Result<()> {
        self.inner.open(namespace)
    }
    fn delete(&self, namespace: &str) -> netfirst_core::Result<bool> {
        if self.fail_delete.as_deref() == Some(namespace) {
            return Err(NetfirstError::Other("disk full".into()));
        }
        self.inner.delete(namespace)
    }
    fn put(
        &self,
        namespace: &str,
        key: &RequestKey,
        response: &Response,
    ) -> netfirst_core::Result<()> {
        if self.fail_puts {
            return Err(NetfirstError::Other("quota exceeded".into()));
        }
        self.inner.put(namespace, key, response)
    }
    fn match_request(
        &self,
        namespace: &str,
        key: &RequestKey,
    ) -> netfirst_core::Result<Option<Response>> {
        self.inner.match_request(namespace, key)
    }
    fn entries(&self, namespace: &str) -> netfirst_core::Result<Vec<RequestKey>> {
        self.inner.entries(namespace)
    }
    fn remove(&self, namespace: &str, key: &RequestKey) -> netfirst_core::Result<bool> {
        self.inner.remove(namespace, key)
    }
    fn stats(&self) -> netfirst_core::Result<netfirst_core::CacheStats> {
        self.inner.stats()
    }
}

/// Storage whose `put` waits until the test releases it.
struct GatedStorage {
    inner: MemoryCacheStorage,
    release: Mutex<mpsc::Receiver<()>>,
}

impl CacheStorage for GatedStorage {
    fn keys(&self) -> netfirst_core::Result<Vec<String>> {
        self.inner.keys()
    }
    fn has(&self, namespace: &str) -> netfirst_core::Result<bool> {
        self.inner.has(namespace)
    }
    fn open(&self, namespace: &str) -> netfirst_core::Result<()> {
        self.inner.open(namespace)
    }
    fn delete(&self, namespace: &str) -> netfirst_core::Result<bool> {
        self.inner.delete(namespace)
    }
    fn put(
        &self,
        namespace: &str,
        key: &RequestKey,
        response: &Response,
    ) -> netfirst_core::Result<()> {
        self.release
            .lock()
            .unwrap()
            .recv()
            .map_err(|e| NetfirstError::Other(e.to_string()))?;
        self.inner.put(namespace, key, response)
    }
    fn match_request(
        &self,
        namespace: &str,
        key: &RequestKey,
    ) -> netfirst_core::Result<Option<Response>> {
        self.inner.match_request(namespace, key)
    }
    fn entries(&self, namespace: &str) -> netfirst_core::Result<Vec<RequestKey>> {
        self.inner.entries(namespace)
    }
    fn remove(&self, namespace: &str, key: &RequestKey) -> netfirst_core::Result<bool> {
        self.inner.remove(namespace, key)
    }
    fn stats(&self) -> netfirst_core::Result<netfirst_core::CacheStats> {
        self.inner.stats()
    }
}

struct Harness {
    worker: ServiceWorker,
    network: Arc<ScriptedNetwork>,
    storage: Arc<dyn CacheStorage>,
    _temp: Option<TempDir>,
}

fn memory_storage() -> (Arc<dyn CacheStorage>, Option<TempDir>) {
    (Arc::new(MemoryCacheStorage::new()), None)
}

fn sqlite_storage() -> (Arc<dyn CacheStorage>, Option<TempDir>) {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let storage = SqliteCacheStorage::new(temp.path().join("cache.sqlite")).unwrap();
    (Arc::new(storage), Some(temp))
}

async fn activated(storage: (Arc<dyn CacheStorage>, Option<TempDir>)) -> Harness {
    let (storage, temp) = storage;
    let network = Arc::new(ScriptedNetwork::default());
    let worker = ServiceWorker::new(
        WorkerConfig::new(CACHE_NAME).unwrap(),
        Arc::clone(&storage),
        network.clone(),
        Arc::new(ClientRegistry::new()),
    );
    worker.install().await.unwrap();
    worker.activate().await.unwrap();

    Harness {
        worker,
        network,
        storage,
        _temp: temp,
    }
}

fn css() -> Response {
    Response::new(200, ResponseType::Basic, "body{color:red}").with_header("content-type", "text/css")
}

async fn style_css_cached_for_offline(h: Harness) {
    let request = Request::get("http://localhost:8000/style.css").unwrap();
    h.network.serve(request.url.as_str(), css());

    assert_eq!(h.worker.handle_fetch(&request).await, FetchOutcome::Respond(css()));
    h.worker.settle().await;

    h.network.go_offline();
    match h.worker.handle_fetch(&request).await {
        FetchOutcome::Respond(cached) => {
            assert_eq!(cached.status, 200);
            assert_eq!(cached.body.as_ref(), b"body{color:red}");
            assert_eq!(cached.header("content-type"), Some("text/css"));
        }
        other => panic!("expected cached response, got {:?}", other),
    }
}

#[tokio::test]
async fn test_style_css_cached_for_offline_memory() {
    style_css_cached_for_offline(activated(memory_storage()).await).await;
}

#[tokio::test]
async fn test_style_css_cached_for_offline_sqlite() {
    style_css_cached_for_offline(activated(sqlite_storage()).await).await;
}

async fn not_found_is_never_cached(h: Harness) {
    let request = Request::get("http://localhost:8000/api/data").unwrap();
    let not_found = Response::new(404, ResponseType::Basic, "missing");
    h.network.serve(request.url.as_str(), not_found.clone());

    assert_eq!(
        h.worker.handle_fetch(&request).await,
        FetchOutcome::Respond(not_found)
    );
    h.worker.settle().await;
    assert!(h
        .storage
        .match_request(CACHE_NAME, &request.key())
        .unwrap()
        .is_none());

    h.network.go_offline();
    assert_eq!(h.worker.handle_fetch(&request).await, FetchOutcome::Unfulfilled);
}

#[tokio::test]
async fn test_not_found_is_never_cached_memory() {
    not_found_is_never_cached(activated(memory_storage()).await).await;
}

#[tokio::test]
async fn test_not_found_is_never_cached_sqlite() {
    not_found_is_never_cached(activated(sqlite_storage()).await).await;
}

#[tokio::test]
async fn test_error_status_does_not_overwrite_entry() {
    let h = activated(memory_storage()).await;
    let request = Request::get("http://localhost:8000/data.json").unwrap();

    h.network.serve(
        request.url.as_str(),
        Response::new(200, ResponseType::Basic, "[1,2]"),
    );
    h.worker.handle_fetch(&request).await;
    h.worker.settle().await;

    h.network.serve(
        request.url.as_str(),
        Response::new(500, ResponseType::Basic, "oops"),
    );
    h.worker.handle_fetch(&request).await;
    h.worker.settle().await;

    let cached = h
        .storage
        .match_request(CACHE_NAME, &request.key())
        .unwrap()
        .unwrap();
    assert_eq!(cached.body.as_ref(), b"[1,2]");
}

#[tokio::test]
async fn test_opaque_response_served_but_not_cached() {
    let h = activated(memory_storage()).await;
    let request = Request::get("https://cdn.example.com/lib.js").unwrap();
    let opaque = Response::new(200, ResponseType::Opaque, "");
    h.network.serve(request.url.as_str(), opaque.clone());

    assert_eq!(
        h.worker.handle_fetch(&request).await,
        FetchOutcome::Respond(opaque)
    );
    h.worker.settle().await;
    assert!(h.storage.entries(CACHE_NAME).unwrap().is_empty());
}

#[tokio::test]
async fn test_cors_response_is_cached() {
    let h = activated(memory_storage()).await;
    let request = Request::get("https://fonts.example.com/font.css").unwrap();
    h.network.serve(
        request.url.as_str(),
        Response::new(200, ResponseType::Cors, "@font-face{}"),
    );

    h.worker.handle_fetch(&request).await;
    h.worker.settle().await;
    assert_eq!(h.storage.entries(CACHE_NAME).unwrap(), vec![request.key()]);
}

#[tokio::test]
async fn test_non_http_scheme_is_not_intercepted() {
    let h = activated(memory_storage()).await;
    let request = Request::get("chrome-extension://abcdef/popup.html").unwrap();

    assert_eq!(h.worker.handle_fetch(&request).await, FetchOutcome::Passthrough);
    assert_eq!(h.network.calls(), 0);
    assert!(h.storage.entries(CACHE_NAME).unwrap().is_empty());
}

#[tokio::test]
async fn test_offline_without_entry_is_unfulfilled() {
    let h = activated(sqlite_storage()).await;
    let request = Request::get("http://localhost:8000/images/cake.png").unwrap();

    assert_eq!(h.worker.handle_fetch(&request).await, FetchOutcome::Unfulfilled);
    assert_eq!(h.network.calls(), 1);
}

#[tokio::test]
async fn test_network_preferred_over_cache() {
    let h = activated(memory_storage()).await;
    let request = Request::get("http://localhost:8000/index.html").unwrap();
    h.storage
        .put(
            CACHE_NAME,
            &request.key(),
            &Response::new(200, ResponseType::Basic, "stale"),
        )
        .unwrap();
    h.network.serve(
        request.url.as_str(),
        Response::new(200, ResponseType::Basic, "fresh"),
    );

    match h.worker.handle_fetch(&request).await {
        FetchOutcome::Respond(r) => assert_eq!(r.body.as_ref(), b"fresh"),
        other => panic!("expected network response, got {:?}", other),
    }
    assert_eq!(h.network.calls(), 1);

    // The fresh copy replaces the stale one: latest wins, still one entry
    h.worker.settle().await;
    assert_eq!(h.storage.entries(CACHE_NAME).unwrap().len(), 1);
    let cached = h
        .storage
        .match_request(CACHE_NAME, &request.key())
        .unwrap()
        .unwrap();
    assert_eq!(cached.body.as_ref(), b"fresh");
}

#[tokio::test]
async fn test_only_get_responses_are_cached() {
    let h = activated(memory_storage()).await;
    let url = Url::parse("http://localhost:8000/api/birthdays").unwrap();
    let get = Request::new(netfirst_core::Method::GET, url.clone());
    let head = Request::new(netfirst_core::Method::HEAD, url.clone());
    h.network.serve(url.as_str(), Response::new(200, ResponseType::Basic, "[]"));

    h.worker.handle_fetch(&get).await;
    h.worker.handle_fetch(&head).await;
    h.worker.settle().await;
    assert_eq!(h.storage.entries(CACHE_NAME).unwrap(), vec![get.key()]);

    h.network.go_offline();
    assert!(matches!(
        h.worker.handle_fetch(&get).await,
        FetchOutcome::Respond(_)
    ));
    assert_eq!(h.worker.handle_fetch(&head).await, FetchOutcome::Unfulfilled);
}

#[tokio::test]
async fn test_post_is_never_stored_or_replayed() {
    let h = activated(memory_storage()).await;
    let save = Request::new(
        netfirst_core::Method::POST,
        Url::parse("http://localhost:8000/api/save").unwrap(),
    )
    .with_body("{\"name\":\"Ada\"}");
    let saved = Response::new(200, ResponseType::Basic, "{\"saved\":true}");
    h.network.serve(save.url.as_str(), saved.clone());

    assert_eq!(h.worker.handle_fetch(&save).await, FetchOutcome::Respond(saved));
    assert_eq!(h.worker.pending_writes(), 0);
    h.worker.settle().await;
    assert!(h.storage.entries(CACHE_NAME).unwrap().is_empty());

    // A stored entry under the POST key must not be served either
    h.storage
        .put(
            CACHE_NAME,
            &save.key(),
            &Response::new(200, ResponseType::Basic, "stale"),
        )
        .unwrap();
    h.network.go_offline();
    assert_eq!(h.worker.handle_fetch(&save).await, FetchOutcome::Unfulfilled);
}

#[tokio::test]
async fn test_activation_removes_only_stale_namespaces() {
    let storage: Arc<dyn CacheStorage> = Arc::new(MemoryCacheStorage::new());
    let key = Request::get("http://localhost:8000/").unwrap().key();
    let page = Response::new(200, ResponseType::Basic, "<html>");
    storage.put("birthday-manager-v0", &key, &page).unwrap();
    storage.put("other-app", &key, &page).unwrap();
    storage.put(CACHE_NAME, &key, &page).unwrap();

    let h = activated((Arc::clone(&storage), None)).await;

    assert_eq!(h.storage.keys().unwrap(), vec![CACHE_NAME.to_string()]);
    assert_eq!(
        h.storage.match_request(CACHE_NAME, &key).unwrap(),
        Some(page)
    );
}

#[tokio::test]
async fn test_activation_reports_and_claims() {
    let storage: Arc<dyn CacheStorage> = Arc::new(MemoryCacheStorage::new());
    storage.open("v0").unwrap();
    let clients = Arc::new(ClientRegistry::new());
    clients
        .register(Url::parse("http://localhost:8000/").unwrap())
        .unwrap();

    let worker = ServiceWorker::new(
        WorkerConfig::new(CACHE_NAME).unwrap(),
        storage,
        Arc::new(ScriptedNetwork::default()),
        Arc::clone(&clients),
    );
    worker.install().await.unwrap();
    let report = worker.activate().await.unwrap();

    assert_eq!(report.deleted, vec!["v0".to_string()]);
    assert_eq!(report.claimed, 1);
    assert_eq!(clients.controlled_count(CACHE_NAME).unwrap(), 1);
}

#[tokio::test]
async fn test_failed_cleanup_keeps_worker_activating() {
    let inner = MemoryCacheStorage::new();
    inner.open("v0").unwrap();
    let storage = Arc::new(FlakyStorage {
        inner,
        fail_puts: false,
        fail_delete: Some("v0".to_string()),
    });
    let clients = Arc::new(ClientRegistry::new());
    clients
        .register(Url::parse("http://localhost:8000/").unwrap())
        .unwrap();

    let worker = ServiceWorker::new(
        WorkerConfig::new(CACHE_NAME).unwrap(),
        storage,
        Arc::new(ScriptedNetwork::default()),
        Arc::clone(&clients),
    );
    worker.install().await.unwrap();

    assert!(worker.activate().await.is_err());
    assert_eq!(worker.state(), WorkerState::Activating);
    assert_eq!(clients.controlled_count(CACHE_NAME).unwrap(), 0);
}

#[tokio::test]
async fn test_failed_cache_write_does_not_affect_response() {
    let storage = Arc::new(FlakyStorage {
        inner: MemoryCacheStorage::new(),
        fail_puts: true,
        fail_delete: None,
    });
    let network = Arc::new(ScriptedNetwork::default());
    let worker = ServiceWorker::new(
        WorkerConfig::new(CACHE_NAME).unwrap(),
        storage.clone(),
        network.clone(),
        Arc::new(ClientRegistry::new()),
    );
    worker.install().await.unwrap();
    worker.activate().await.unwrap();

    let request = Request::get("http://localhost:8000/style.css").unwrap();
    network.serve(request.url.as_str(), css());

    assert_eq!(worker.handle_fetch(&request).await, FetchOutcome::Respond(css()));
    worker.settle().await;
    assert_eq!(worker.pending_writes(), 0);
    assert!(storage.entries(CACHE_NAME).unwrap().is_empty());
}

#[tokio::test]
async fn test_response_returned_while_write_in_flight() {
    let (release, gate) = mpsc::channel();
    let storage = Arc::new(GatedStorage {
        inner: MemoryCacheStorage::new(),
        release: Mutex::new(gate),
    });
    let network = Arc::new(ScriptedNetwork::default());
    let worker = ServiceWorker::new(
        WorkerConfig::new(CACHE_NAME).unwrap(),
        storage.clone(),
        network.clone(),
        Arc::new(ClientRegistry::new()),
    );
    worker.install().await.unwrap();
    worker.activate().await.unwrap();

    let request = Request::get("http://localhost:8000/style.css").unwrap();
    network.serve(request.url.as_str(), css());

    assert_eq!(worker.handle_fetch(&request).await, FetchOutcome::Respond(css()));
    assert_eq!(worker.pending_writes(), 1);
    assert!(storage.entries(CACHE_NAME).unwrap().is_empty());

    release.send(()).unwrap();
    worker.settle().await;
    assert_eq!(worker.pending_writes(), 0);
    assert_eq!(storage.entries(CACHE_NAME).unwrap(), vec![request.key()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_share_namespace() {
    let h = Arc::new(activated(sqlite_storage()).await);
    for i in 0..16 {
        h.network.serve(
            &format!("http://localhost:8000/asset/{}", i),
            Response::new(200, ResponseType::Basic, format!("asset {}", i)),
        );
    }

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let h = Arc::clone(&h);
            tokio::spawn(async move {
                let request = Request::get(&format!("http://localhost:8000/asset/{}", i)).unwrap();
                h.worker.handle_fetch(&request).await
            })
        })
        .collect();
    for task in tasks {
        assert!(matches!(task.await.unwrap(), FetchOutcome::Respond(_)));
    }
    h.worker.settle().await;

    assert_eq!(h.storage.entries(CACHE_NAME).unwrap().len(), 16);
}
