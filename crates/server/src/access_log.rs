use std::time::Instant;

use axum::{extract::Request, middleware::Next, response::Response};

/// Logs one line per handled request: method, path, status and duration.
pub(super) async fn access_log(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    log::info!(
        "{method} {path} {status} {duration}ms",
        status = response.status().as_u16(),
        duration = started.elapsed().as_millis(),
    );

    response
}
