use indoc::formatdoc;
use integration_tests::{BackendBehavior, TestBackend, spawn_server};
use serde_json::json;

async fn spawn_full_stack(backend: &TestBackend) -> integration_tests::TestClient {
    let addr = backend.spawn().await;

    let config = formatdoc! {r#"
        [server.cors]
        allow_origins = ["http://localhost:8001"]
        allow_credentials = true

        [backend]
        url = "http://{addr}"
        default_model = "llama3.1:8b"
        models = ["llama3.1:8b"]
        context_length = 4096
        timeout = "5s"
    "#};

    let config: config::Config = toml::from_str(&config).unwrap();
    config.validate().unwrap();

    spawn_server(config).await
}

#[tokio::test]
async fn health_endpoint_reports_healthy() {
    let backend = TestBackend::new(BackendBehavior::Reply {
        chunks: vec!["ok".to_string()],
        usage: json!({}),
    });
    let client = spawn_full_stack(&backend).await;

    let response = client.get("/health").await;
    assert_eq!(200, response.status().as_u16());

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(json!({ "status": "healthy" }), body);
}

#[tokio::test]
async fn full_stack_relays_chat_requests() {
    let backend = TestBackend::new(BackendBehavior::Reply {
        chunks: vec!["Hello from the full stack".to_string()],
        usage: json!({ "total": 7 }),
    });
    let client = spawn_full_stack(&backend).await;

    let request = json!({
        "messages": [{ "role": "user", "content": "hi" }],
    });

    let response = client.post("/chat", &request).await;
    assert_eq!(200, response.status().as_u16());

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!("Hello from the full stack", body["message"]["content"]);
    assert_eq!(1, backend.calls());
}
