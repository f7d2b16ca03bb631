use clinica_cache::{CacheService, CacheSettings};
use clinica_server::{AppConfig, build_app};
use serde_json::{Value, json};
use tokio::task::JoinHandle;

async fn start_server() -> (String, tokio::sync::oneshot::Sender<()>, JoinHandle<()>) {
    let cache = CacheService::memory_only(&CacheSettings::default());
    let app = build_app(&AppConfig::default(), cache);

    // Bind to an ephemeral port
    let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0))
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();

    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = rx.await;
            })
            .await;
    });

    (format!("http://{addr}"), tx, server)
}

#[tokio::test]
async fn health_endpoints_work() {
    let (base, shutdown_tx, handle) = start_server().await;
    let client = reqwest::Client::new();

    // GET /
    let resp = client.get(format!("{base}/")).send().await.unwrap();
    assert!(resp.status().is_success());
    assert!(resp.headers().contains_key("x-request-id"));
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["service"], "Clinica Cache");
    assert_eq!(body["status"], "ok");

    // GET /healthz
    let resp = client.get(format!("{base}/healthz")).send().await.unwrap();
    assert!(resp.status().is_success());
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");

    // GET /readyz
    let resp = client.get(format!("{base}/readyz")).send().await.unwrap();
    assert!(resp.status().is_success());
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["mode"], "memory");
    assert_eq!(body["remoteReachable"], Value::Null);

    // Incoming request ids are preserved
    let resp = client
        .get(format!("{base}/healthz"))
        .header("x-request-id", "req-123")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.headers()["x-request-id"], "req-123");

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn cache_entry_lifecycle() {
    let (base, shutdown_tx, handle) = start_server().await;
    let client = reqwest::Client::new();
    let entry = format!("{base}/cache/entries/clinic:1:conversations:list");

    // Missing entry
    let resp = client.get(&entry).send().await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);

    // PUT then GET
    let resp = client
        .put(&entry)
        .json(&json!({ "value": [{ "id": 1 }], "ttlSecs": 300 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::NO_CONTENT);

    let resp = client.get(&entry).send().await.unwrap();
    assert!(resp.status().is_success());
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!([{ "id": 1 }]));

    // Unknown category is rejected
    let resp = client
        .put(&entry)
        .json(&json!({ "value": 1, "category": "appointments" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);

    // TTLs above the cap are rejected and leave the entry untouched
    let resp = client
        .put(&entry)
        .json(&json!({ "value": 2, "ttlSecs": u64::MAX }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: Value = client.get(&entry).send().await.unwrap().json().await.unwrap();
    assert_eq!(body, json!([{ "id": 1 }]));

    // DELETE
    let resp = client.delete(&entry).send().await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::NO_CONTENT);
    let resp = client.get(&entry).send().await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn pattern_invalidation_and_clear() {
    let (base, shutdown_tx, handle) = start_server().await;
    let client = reqwest::Client::new();

    for key in [
        "conversation:42:detail:page:1:limit:20",
        "conversation:42:detail:page:2:limit:20",
        "conversation:43:detail:page:1:limit:20",
    ] {
        let resp = client
            .put(format!("{base}/cache/entries/{key}"))
            .json(&json!({ "value": [], "category": "conversationDetail" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::NO_CONTENT);
    }

    let resp = client
        .post(format!("{base}/cache/invalidate"))
        .json(&json!({ "pattern": "conversation:42:*" }))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["deleted"], 2);

    // Malformed glob
    let resp = client
        .post(format!("{base}/cache/invalidate"))
        .json(&json!({ "pattern": "conversation:[" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);

    // Clear everything
    let resp = client.delete(format!("{base}/cache")).send().await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::NO_CONTENT);
    let resp = client
        .get(format!("{base}/cache/entries/conversation:43:detail:page:1:limit:20"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn metrics_endpoints() {
    clinica_server::metrics::init_metrics();
    let (base, shutdown_tx, handle) = start_server().await;
    let client = reqwest::Client::new();

    client
        .put(format!("{base}/cache/entries/contact:1:metadata"))
        .json(&json!({ "value": { "name": "Ana" } }))
        .send()
        .await
        .unwrap();
    client
        .get(format!("{base}/cache/entries/contact:1:metadata"))
        .send()
        .await
        .unwrap();

    // GET /cache/metrics
    let resp = client.get(format!("{base}/cache/metrics")).send().await.unwrap();
    assert!(resp.status().is_success());
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["mode"], "memory");
    assert_eq!(body["l1Hits"], 1);
    assert_eq!(body["totalRequests"], 1);
    assert!(body["recommendations"].is_array());

    // GET /metrics
    let resp = client.get(format!("{base}/metrics")).send().await.unwrap();
    assert!(resp.status().is_success());
    let text = resp.text().await.unwrap();
    assert!(text.contains("clinica_cache_hits_total"));

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}
