mod common;

use std::time::Duration;

use serde_json::{Value, json};
use session_gate::TokenStore;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{Harness, capture_logs, pair};

#[tokio::test]
async fn concurrent_401s_share_a_single_refresh() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/items/"))
        .and(header("Authorization", "Bearer old"))
        .respond_with(ResponseTemplate::new(401))
        .expect(3)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/items/"))
        .and(header("Authorization", "Bearer new123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(3)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/auth/token/refresh/"))
        .and(body_json(json!({ "refresh": "r1" })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "access": "new123" }))
                .set_delay(Duration::from_millis(300)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let h = Harness::new(&server.uri(), None, Some(pair("old", "r1")));

    let (lines, guard) = capture_logs();
    let (a, b, c) = tokio::join!(
        h.client.get::<Value>("/items/"),
        h.client.get::<Value>("/items/"),
        h.client.get::<Value>("/items/"),
    );
    drop(guard);

    for res in [a, b, c] {
        assert_eq!(res.expect("request should succeed after refresh"), json!({ "ok": true }));
    }
    assert_eq!(h.store.access_token().as_deref(), Some("new123"));
    assert_eq!(h.store.refresh_token().as_deref(), Some("r1"));
    assert_eq!(h.redirect_count(), 0);
    assert!(!h.client.session().is_refreshing());

    let logs = lines.lock().unwrap().clone();
    let starts = logs
        .iter()
        .filter(|line| line.contains("refresh.start"))
        .count();
    assert_eq!(starts, 1, "expected one refresh.start, got {:?}", logs);
    assert!(
        logs.iter()
            .any(|line| line.contains("WARN") && line.contains("401")),
        "expected a warning mentioning 401, got {:?}",
        logs
    );
}

#[tokio::test]
async fn replayed_request_carries_new_token_and_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/items/"))
        .and(header("Authorization", "Bearer expired"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/items/"))
        .and(header("Authorization", "Bearer new123"))
        .and(body_json(json!({ "name": "widget" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": 7 })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/auth/token/refresh/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access": "new123" })))
        .expect(1)
        .mount(&server)
        .await;

    let h = Harness::new(&server.uri(), None, Some(pair("expired", "r1")));

    let created: Value = h
        .client
        .post("/items/", &json!({ "name": "widget" }))
        .await
        .expect("replay should succeed");

    assert_eq!(created, json!({ "id": 7 }));
    assert_eq!(h.store.access_token().as_deref(), Some("new123"));

    let requests = server.received_requests().await.expect("recording enabled");
    let last = requests
        .iter()
        .rev()
        .find(|req| req.url.path() == "/items/")
        .expect("replayed request");
    assert_eq!(
        last.headers.get("Authorization").and_then(|v| v.to_str().ok()),
        Some("Bearer new123")
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn spawned_requests_share_a_single_refresh() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/items/"))
        .and(header("Authorization", "Bearer old"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/items/"))
        .and(header("Authorization", "Bearer new123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(8)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/auth/token/refresh/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "access": "new123" }))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let h = Harness::new(&server.uri(), None, Some(pair("old", "r1")));

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..8 {
        let client = h.client.clone();
        tasks.spawn(async move { client.get::<Value>("/items/").await });
    }
    while let Some(joined) = tasks.join_next().await {
        joined
            .expect("task panicked")
            .expect("request should succeed after refresh");
    }

    assert_eq!(h.store.access_token().as_deref(), Some("new123"));
    assert_eq!(h.client.session().pending(), 0);
}
