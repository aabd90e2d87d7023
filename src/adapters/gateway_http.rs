//! Response handling shared by the HTTP gateway adapters.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::ports::{GatewayError, GatewayErrorCode};

/// Maps a transport failure to a gateway error.
pub(crate) fn transport_error(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::timeout()
    } else {
        GatewayError::network(err.to_string())
    }
}

/// Decodes a successful response body, or turns a failed one into a
/// categorized [`GatewayError`].
pub(crate) async fn read_json<T: DeserializeOwned>(
    provider: &'static str,
    operation: &'static str,
    response: reqwest::Response,
) -> Result<T, GatewayError> {
    let status = response.status();
    if status.is_success() {
        return response.json::<T>().await.map_err(|e| {
            GatewayError::provider(format!(
                "{} {}: unreadable response: {}",
                provider, operation, e
            ))
        });
    }

    let body = response.text().await.unwrap_or_default();
    let err = status_error(provider, operation, status.as_u16(), &body);
    tracing::error!(
        provider,
        operation,
        status = status.as_u16(),
        code = %err.code,
        provider_code = err.provider_code.as_deref().unwrap_or(""),
        "Gateway call failed"
    );
    Err(err)
}

/// Categorizes a non-2xx response.
///
/// Both providers answer errors as `{"error": {"code", "message" | "description"}}`.
pub(crate) fn status_error(
    provider: &str,
    operation: &str,
    status: u16,
    body: &str,
) -> GatewayError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let error = parsed.as_ref().and_then(|v| v.get("error"));
    let provider_code = error
        .and_then(|e| e.get("code"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let description = error
        .and_then(|e| e.get("message").or_else(|| e.get("description")))
        .and_then(Value::as_str)
        .unwrap_or("no error description");

    let code = match status {
        401 | 403 => GatewayErrorCode::AuthenticationError,
        404 => GatewayErrorCode::NotFound,
        429 => GatewayErrorCode::RateLimited,
        400..=499 => GatewayErrorCode::ProviderError,
        _ => GatewayErrorCode::Unknown,
    };

    let mut err = GatewayError::new(
        code,
        format!("{} {} returned {}: {}", provider, operation, status, description),
    );
    // Provider-side outages clear up on their own.
    if status >= 500 {
        err.retryable = true;
    }
    match provider_code {
        Some(pc) => err.with_provider_code(pc),
        None => err,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_stripe_error_shape() {
        let body = r#"{"error":{"code":"resource_missing","message":"No such payment_intent"}}"#;
        let err = status_error("stripe", "fetch_payment", 404, body);

        assert_eq!(err.code, GatewayErrorCode::NotFound);
        assert_eq!(err.provider_code.as_deref(), Some("resource_missing"));
        assert!(err.message.contains("No such payment_intent"));
    }

    #[test]
    fn extracts_razorpay_error_shape() {
        let body = r#"{"error":{"code":"BAD_REQUEST_ERROR","description":"amount exceeds"}}"#;
        let err = status_error("razorpay", "refund", 400, body);

        assert_eq!(err.code, GatewayErrorCode::ProviderError);
        assert!(!err.retryable);
        assert!(err.message.contains("amount exceeds"));
    }

    #[test]
    fn server_errors_are_retryable() {
        let err = status_error("stripe", "create_order", 503, "upstream unavailable");
        assert!(err.retryable);
        assert!(err.provider_code.is_none());
    }

    #[test]
    fn auth_and_rate_limits_are_categorized() {
        assert_eq!(
            status_error("razorpay", "create_order", 401, "").code,
            GatewayErrorCode::AuthenticationError
        );
        let limited = status_error("razorpay", "create_order", 429, "");
        assert_eq!(limited.code, GatewayErrorCode::RateLimited);
        assert!(limited.retryable);
    }
}
