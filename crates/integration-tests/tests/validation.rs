use integration_tests::{BackendBehavior, TestBackend, backend_config, spawn_gateway, sse_frames};
use serde_json::json;

fn reply_backend() -> TestBackend {
    TestBackend::new(BackendBehavior::Reply {
        chunks: vec!["Hello".to_string()],
        usage: json!({ "total": 1 }),
    })
}

#[tokio::test]
async fn out_of_range_temperature_is_rejected_without_a_backend_call() {
    let backend = reply_backend();
    let addr = backend.spawn().await;
    let client = spawn_gateway(backend_config(addr)).await;

    let request = json!({
        "messages": [{ "role": "user", "content": "hi" }],
        "temperature": 2.5,
    });

    let response = client.post("/chat", &request).await;
    assert_eq!(400, response.status().as_u16());

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!("validation_error", body["type"]);
    assert_eq!("/chat", body["path"]);
    assert_eq!("temperature must be between 0 and 2, got 2.5", body["detail"]);
    assert!(body["timestamp"].as_u64().unwrap() > 0);

    assert_eq!(0, backend.calls());
}

#[tokio::test]
async fn empty_messages_are_rejected_identically_for_both_endpoints() {
    let backend = reply_backend();
    let addr = backend.spawn().await;
    let client = spawn_gateway(backend_config(addr)).await;

    let request = json!({ "messages": [] });

    let response = client.post("/chat", &request).await;
    assert_eq!(400, response.status().as_u16());

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!("messages must not be empty", body["detail"]);

    // The streaming endpoint commits an SSE response; the same verdict
    // arrives in-band, followed by the closing sentinel.
    let response = client.post("/chat/stream", &request).await;
    assert_eq!(200, response.status().as_u16());

    let frames = sse_frames(&response.text().await.unwrap());
    assert_eq!(2, frames.len());

    let error: serde_json::Value = serde_json::from_str(&frames[0]).unwrap();
    assert_eq!("messages must not be empty", error["error"]["detail"]);
    assert_eq!("validation_error", error["error"]["type"]);
    assert_eq!("[DONE]", frames[1]);

    assert_eq!(0, backend.calls());
}

#[tokio::test]
async fn unknown_model_is_rejected_naming_the_allowed_set() {
    let backend = reply_backend();
    let addr = backend.spawn().await;
    let client = spawn_gateway(backend_config(addr)).await;

    let request = json!({
        "messages": [{ "role": "user", "content": "hi" }],
        "model": "gpt-4",
    });

    let response = client.post("/chat", &request).await;
    assert_eq!(400, response.status().as_u16());

    let body: serde_json::Value = response.json().await.unwrap();
    insta::assert_snapshot!(
        body["detail"].as_str().unwrap(),
        @"model 'gpt-4' is not available, allowed models: [llama3.1:70b, llama3.1:8b]"
    );

    assert_eq!(0, backend.calls());
}

#[tokio::test]
async fn zero_max_tokens_is_rejected() {
    let backend = reply_backend();
    let addr = backend.spawn().await;
    let client = spawn_gateway(backend_config(addr)).await;

    let request = json!({
        "messages": [{ "role": "user", "content": "hi" }],
        "max_tokens": 0,
    });

    let response = client.post("/chat", &request).await;
    assert_eq!(400, response.status().as_u16());

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!("max_tokens must be between 1 and 4096, got 0", body["detail"]);

    assert_eq!(0, backend.calls());
}

#[tokio::test]
async fn oversized_context_budget_is_rejected() {
    let backend = reply_backend();
    let addr = backend.spawn().await;
    let client = spawn_gateway(backend_config(addr)).await;

    // Three words estimate to four prompt tokens, which no longer fit next
    // to a full-context completion budget.
    let request = json!({
        "messages": [{ "role": "user", "content": "one two three" }],
        "max_tokens": 4096,
    });

    let response = client.post("/chat", &request).await;
    assert_eq!(400, response.status().as_u16());

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!("validation_error", body["type"]);
    assert_eq!(
        "estimated 4 prompt tokens plus 4096 completion tokens exceed the context length of 4096",
        body["detail"]
    );

    assert_eq!(0, backend.calls());
}

#[tokio::test]
async fn invalid_role_is_rejected_at_deserialization() {
    let backend = reply_backend();
    let addr = backend.spawn().await;
    let client = spawn_gateway(backend_config(addr)).await;

    let request = json!({
        "messages": [{ "role": "operator", "content": "hi" }],
    });

    let response = client.post("/chat", &request).await;
    assert_eq!(422, response.status().as_u16());

    assert_eq!(0, backend.calls());
}
