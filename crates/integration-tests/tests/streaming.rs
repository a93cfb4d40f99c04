use integration_tests::{BackendBehavior, TestBackend, backend_config, spawn_gateway, sse_frames};
use serde_json::json;

#[tokio::test]
async fn stream_framing_matches_the_chunk_count() {
    let backend = TestBackend::new(BackendBehavior::Reply {
        chunks: vec!["Why ".to_string(), "did ".to_string(), "the".to_string()],
        usage: json!({ "total": 42 }),
    });
    let addr = backend.spawn().await;
    let client = spawn_gateway(backend_config(addr)).await;

    let request = json!({
        "messages": [{ "role": "user", "content": "tell me a joke" }],
        "stream": true,
    });

    let response = client.post("/chat/stream", &request).await;
    assert_eq!(200, response.status().as_u16());

    // Three content events, one terminal event, one sentinel.
    let frames = sse_frames(&response.text().await.unwrap());
    assert_eq!(5, frames.len());
    assert_eq!("[DONE]", frames[4]);

    let events: Vec<serde_json::Value> = frames[..4]
        .iter()
        .map(|frame| serde_json::from_str(frame).unwrap())
        .collect();

    let deltas: Vec<&str> = events
        .iter()
        .map(|event| event["delta"]["content"].as_str().unwrap())
        .collect();
    assert_eq!(vec!["Why ", "did ", "the", ""], deltas);

    for event in &events[..3] {
        assert!(!event["terminal"].as_bool().unwrap());
        assert!(event["usage"].is_null());
        assert_eq!("assistant", event["delta"]["role"]);
    }

    let terminal = &events[3];
    assert!(terminal["terminal"].as_bool().unwrap());
    assert_eq!(42, terminal["usage"]["total"]);
    assert_eq!("llama3.1:8b", terminal["model"]);

    // All events of one stream share the same id and creation time.
    let id = events[0]["id"].as_str().unwrap();
    assert!(events.iter().all(|event| event["id"] == id));
    assert!(events.iter().all(|event| event["created"] == events[0]["created"]));
}

#[tokio::test]
async fn aborted_backend_stream_still_ends_with_the_sentinel() {
    let backend = TestBackend::new(BackendBehavior::AbortMidStream {
        chunks: vec!["He".to_string(), "llo".to_string()],
    });
    let addr = backend.spawn().await;
    let client = spawn_gateway(backend_config(addr)).await;

    let request = json!({
        "messages": [{ "role": "user", "content": "hi" }],
        "stream": true,
    });

    let response = client.post("/chat/stream", &request).await;
    assert_eq!(200, response.status().as_u16());

    let frames = sse_frames(&response.text().await.unwrap());
    assert_eq!(4, frames.len());
    assert_eq!("[DONE]", frames.last().unwrap());

    let first: serde_json::Value = serde_json::from_str(&frames[0]).unwrap();
    assert_eq!("He", first["delta"]["content"]);

    let error: serde_json::Value = serde_json::from_str(&frames[2]).unwrap();
    assert_eq!("internal_error", error["error"]["type"]);
}

#[tokio::test]
async fn empty_deltas_are_not_emitted() {
    let backend = TestBackend::new(BackendBehavior::Reply {
        chunks: vec!["".to_string(), "hi".to_string(), "".to_string()],
        usage: json!({}),
    });
    let addr = backend.spawn().await;
    let client = spawn_gateway(backend_config(addr)).await;

    let request = json!({
        "messages": [{ "role": "user", "content": "hi" }],
        "stream": true,
    });

    let response = client.post("/chat/stream", &request).await;
    let frames = sse_frames(&response.text().await.unwrap());

    // One content event, the terminal event, the sentinel.
    assert_eq!(3, frames.len());

    let first: serde_json::Value = serde_json::from_str(&frames[0]).unwrap();
    assert_eq!("hi", first["delta"]["content"]);
}

#[tokio::test]
async fn garbled_backend_lines_are_skipped() {
    let backend = TestBackend::new(BackendBehavior::ReplyRaw {
        lines: vec![
            r#"{"message":{"role":"assistant","content":"A"},"done":false}"#.to_string(),
            r#"{"message":{"content":"#.to_string(),
            "plainly not json".to_string(),
            r#"{"message":{"role":"assistant","content":"B"},"done":false}"#.to_string(),
            r#"{"done":true,"usage":{"total":2}}"#.to_string(),
        ],
    });
    let addr = backend.spawn().await;
    let client = spawn_gateway(backend_config(addr)).await;

    let request = json!({
        "messages": [{ "role": "user", "content": "hi" }],
        "stream": true,
    });

    let response = client.post("/chat/stream", &request).await;
    let frames = sse_frames(&response.text().await.unwrap());

    assert_eq!(4, frames.len());

    let deltas: Vec<serde_json::Value> = frames[..3]
        .iter()
        .map(|frame| serde_json::from_str(frame).unwrap())
        .collect();

    assert_eq!("A", deltas[0]["delta"]["content"]);
    assert_eq!("B", deltas[1]["delta"]["content"]);
    assert!(deltas[2]["terminal"].as_bool().unwrap());
    assert_eq!("[DONE]", frames[3]);
}

#[tokio::test]
async fn backend_error_status_arrives_in_band() {
    let backend = TestBackend::new(BackendBehavior::Error {
        status: 500,
        message: "overloaded".to_string(),
    });
    let addr = backend.spawn().await;
    let client = spawn_gateway(backend_config(addr)).await;

    let request = json!({
        "messages": [{ "role": "user", "content": "hi" }],
        "stream": true,
    });

    // The SSE response is committed regardless; the failure is a frame, not
    // a status code.
    let response = client.post("/chat/stream", &request).await;
    assert_eq!(200, response.status().as_u16());

    let frames = sse_frames(&response.text().await.unwrap());
    assert_eq!(2, frames.len());

    let error: serde_json::Value = serde_json::from_str(&frames[0]).unwrap();
    assert_eq!("backend_error", error["error"]["type"]);
    assert_eq!("backend error (500): overloaded", error["error"]["detail"]);
    assert_eq!("[DONE]", frames[1]);
}

#[tokio::test]
async fn backend_closing_without_a_done_chunk_still_ends_with_the_sentinel() {
    let backend = TestBackend::new(BackendBehavior::ReplyRaw {
        lines: vec![r#"{"message":{"role":"assistant","content":"cut"},"done":false}"#.to_string()],
    });
    let addr = backend.spawn().await;
    let client = spawn_gateway(backend_config(addr)).await;

    let request = json!({
        "messages": [{ "role": "user", "content": "hi" }],
        "stream": true,
    });

    let response = client.post("/chat/stream", &request).await;
    let frames = sse_frames(&response.text().await.unwrap());

    assert_eq!(2, frames.len());
    assert_eq!("[DONE]", frames[1]);
}
