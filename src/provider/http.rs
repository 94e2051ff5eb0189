//! Shared HTTP plumbing for provider and scorer clients.

use crate::error::ProviderError;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_ERROR_BODY: usize = 512;

pub fn build_http_client(timeout: Duration) -> Result<Client, ProviderError> {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(timeout)
        .build()
        .map_err(|e| ProviderError::Other(format!("Failed to create HTTP client: {}", e)))
}

/// Map a non-success status and its body to a typed error.
pub fn status_error(status: u16, body: &str) -> ProviderError {
    let message = truncate(body.trim(), MAX_ERROR_BODY);
    match status {
        401 | 403 => ProviderError::MissingCredentials(format!("Authentication failed: {}", message)),
        408 | 504 => ProviderError::Timeout(message),
        429 => ProviderError::RateLimited(message),
        503 => ProviderError::Unavailable(message),
        _ => ProviderError::Status { status, message },
    }
}

/// Send a request and decode a JSON body, mapping failures to `ProviderError`.
pub async fn send_json(request: RequestBuilder) -> Result<Value, ProviderError> {
    let response = request.send().await?;
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(status_error(status.as_u16(), &body));
    }
    serde_json::from_str(&body).map_err(|e| {
        ProviderError::MalformedResponse(format!(
            "Response is not JSON ({}): {}",
            e,
            truncate(&body, 120)
        ))
    })
}

/// Error carried inside a 200 response: `error.message`, an `error` string, or a non-success
/// `code` (reported through `message` when present).
pub fn upstream_error_message(body: &Value) -> Option<String> {
    let object = body.as_object()?;
    match object.get("error") {
        Some(Value::String(message)) if !message.trim().is_empty() => {
            return Some(message.trim().to_string())
        }
        Some(Value::Object(error)) => {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("upstream error");
            return Some(match error.get("code").and_then(Value::as_str) {
                Some(code) => format!("{} ({})", message, code),
                None => message.to_string(),
            });
        }
        _ => {}
    }
    let failed_code = match object.get("code") {
        Some(Value::Number(code)) => !matches!(code.as_i64(), Some(0) | Some(200)),
        Some(Value::String(code)) => {
            let code = code.trim().to_lowercase();
            !code.is_empty() && !matches!(code.as_str(), "0" | "200" | "success" | "ok")
        }
        _ => false,
    };
    if failed_code {
        let code = object.get("code").map(|code| match code {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        });
        return object
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or(code);
    }
    None
}

/// Classify an in-band upstream error by its wording.
pub fn upstream_error(message: String) -> ProviderError {
    if crate::error::message_signals_retry(&message) {
        ProviderError::Unavailable(message)
    } else {
        ProviderError::Other(message)
    }
}

pub fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => format!("{}...", &text[..index]),
        None => text.to_string(),
    }
}
