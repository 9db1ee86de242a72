//! Gateway integration tests
//!
//! End-to-end traffic through the public listener to wiremock backends.

mod admin;
mod proxy;
mod rate_limit;

/// GET `url` and return status, headers and JSON body (null when not JSON)
pub async fn get_json(
    url: &str,
) -> (reqwest::StatusCode, reqwest::header::HeaderMap, serde_json::Value) {
    let response = reqwest::get(url).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.json().await.unwrap_or(serde_json::Value::Null);
    (status, headers, body)
}
