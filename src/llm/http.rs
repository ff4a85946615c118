//! HTTP response handling shared by the analyzer clients

use crate::llm::retry::parse_retry_after;
use crate::types::{AppError, Result, TransientKind};
use reqwest::{header::RETRY_AFTER, Response, StatusCode};
use std::time::Duration;

/// Map a transport-level failure to a typed error
pub fn map_send_error(provider: &str, error: reqwest::Error) -> AppError {
    if error.is_timeout() {
        AppError::transient(
            TransientKind::Timeout,
            format!("{} request timed out: {}", provider, error),
        )
    } else if error.is_connect() {
        AppError::transient(
            TransientKind::Server,
            format!("{} connection failed: {}", provider, error),
        )
    } else {
        AppError::LLM(format!("{} request failed: {}", provider, error))
    }
}

/// Pass a successful response through, otherwise map the status to an error.
///
/// | Status | Error |
/// |--------|-------|
/// | 401, 403 | `Auth` |
/// | 429 | `Transient(RateLimit)` or `Transient(Quota)` when the body mentions quota |
/// | 408, 504 | `Transient(Timeout)` |
/// | 500-599, 529 | `Transient(Server)` |
/// | anything else | `LLM` |
pub async fn check_status(provider: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let header_hint = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64);
    let body = response.text().await.unwrap_or_default();

    Err(status_error(provider, status, &body, header_hint))
}

/// Build the typed error for a non-success status
pub fn status_error(
    provider: &str,
    status: StatusCode,
    body: &str,
    header_hint: Option<Duration>,
) -> AppError {
    let message = format!("{} request failed ({}): {}", provider, status, body.trim());
    let retry_after = header_hint.or_else(|| parse_retry_after(body));

    match status.as_u16() {
        401 | 403 => AppError::Auth(message),
        429 => {
            let kind = if body.to_lowercase().contains("quota") {
                TransientKind::Quota
            } else {
                TransientKind::RateLimit
            };
            AppError::Transient {
                kind,
                message,
                retry_after,
            }
        }
        408 | 504 => AppError::Transient {
            kind: TransientKind::Timeout,
            message,
            retry_after,
        },
        500..=599 => AppError::Transient {
            kind: TransientKind::Server,
            message,
            retry_after,
        },
        _ => AppError::LLM(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_statuses() {
        for code in [401u16, 403] {
            let status = StatusCode::from_u16(code).unwrap();
            assert!(matches!(
                status_error("test", status, "denied", None),
                AppError::Auth(_)
            ));
        }
    }

    #[test]
    fn test_rate_limit_with_header_hint() {
        let err = status_error(
            "test",
            StatusCode::TOO_MANY_REQUESTS,
            "slow down",
            Some(Duration::from_secs(9)),
        );
        match err {
            AppError::Transient {
                kind, retry_after, ..
            } => {
                assert_eq!(kind, TransientKind::RateLimit);
                assert_eq!(retry_after, Some(Duration::from_secs(9)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_quota_with_body_hint() {
        let err = status_error(
            "test",
            StatusCode::TOO_MANY_REQUESTS,
            r#"{"error":"Quota exceeded","retryDelay":"20s"}"#,
            None,
        );
        match err {
            AppError::Transient {
                kind, retry_after, ..
            } => {
                assert_eq!(kind, TransientKind::Quota);
                assert_eq!(retry_after, Some(Duration::from_secs(20)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_server_and_overloaded() {
        let overloaded = StatusCode::from_u16(529).unwrap();
        assert!(matches!(
            status_error("test", overloaded, "overloaded", None),
            AppError::Transient {
                kind: TransientKind::Server,
                ..
            }
        ));
        assert!(matches!(
            status_error("test", StatusCode::GATEWAY_TIMEOUT, "", None),
            AppError::Transient {
                kind: TransientKind::Timeout,
                ..
            }
        ));
    }

    #[test]
    fn test_other_client_errors_are_untyped() {
        let err = status_error("test", StatusCode::BAD_REQUEST, "bad model", None);
        assert!(matches!(err, AppError::LLM(ref m) if m.contains("bad model")));
    }
}
