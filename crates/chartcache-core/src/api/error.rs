use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    /// The backend refused the request parameters (bad dates, validation).
    #[error("Chart request rejected with HTTP {status}: {detail}")]
    Rejected { status: u16, detail: String },

    #[error("Not authorized to read chart data (HTTP {status})")]
    Unauthorized { status: u16 },

    #[error("Chart endpoint not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Chart backend failed with HTTP {status}: {detail}")]
    ServerError { status: u16, detail: String },

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut cut = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..cut], body.len())
    }

    /// The backend reports errors as `{"detail": "..."}`, or for parameter
    /// validation as `{"detail": [{"msg": "..."}, ...]}`. Anything else is
    /// passed through as text.
    fn error_detail(body: &str) -> String {
        let detail = match serde_json::from_str::<Value>(body) {
            Ok(Value::Object(mut obj)) => match obj.remove("detail") {
                Some(Value::String(s)) => Some(s),
                Some(Value::Array(items)) => {
                    let msgs: Vec<&str> = items
                        .iter()
                        .filter_map(|item| item.get("msg").and_then(Value::as_str))
                        .collect();
                    (!msgs.is_empty()).then(|| msgs.join("; "))
                }
                _ => None,
            },
            _ => None,
        };
        Self::truncate_body(detail.as_deref().unwrap_or(body))
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let code = status.as_u16();
        match code {
            401 | 403 => ApiError::Unauthorized { status: code },
            404 => ApiError::NotFound(Self::error_detail(body)),
            429 => ApiError::RateLimited,
            400..=499 => ApiError::Rejected {
                status: code,
                detail: Self::error_detail(body),
            },
            500..=599 => ApiError::ServerError {
                status: code,
                detail: Self::error_detail(body),
            },
            _ => ApiError::InvalidResponse(format!("Unexpected HTTP {}", status)),
        }
    }

    /// HTTP status the backend answered with, when there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Rejected { status, .. }
            | ApiError::Unauthorized { status }
            | ApiError::ServerError { status, .. } => Some(*status),
            ApiError::NotFound(_) => Some(404),
            ApiError::RateLimited => Some(429),
            ApiError::NetworkError(e) => e.status().map(|s| s.as_u16()),
            ApiError::InvalidResponse(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_from_status_mapping() {
        assert!(matches!(
            ApiError::from_status(StatusCode::UNAUTHORIZED, ""),
            ApiError::Unauthorized { status: 401 }
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::FORBIDDEN, "role"),
            ApiError::Unauthorized { status: 403 }
        ));
        assert!(matches!(ApiError::from_status(StatusCode::NOT_FOUND, ""), ApiError::NotFound(_)));
        assert!(matches!(ApiError::from_status(StatusCode::TOO_MANY_REQUESTS, ""), ApiError::RateLimited));
        assert!(matches!(
            ApiError::from_status(StatusCode::BAD_GATEWAY, ""),
            ApiError::ServerError { status: 502, .. }
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::BAD_REQUEST, "bad"),
            ApiError::Rejected { status: 400, ref detail } if detail == "bad"
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::NOT_MODIFIED, ""),
            ApiError::InvalidResponse(_)
        ));
    }

    #[test]
    fn test_detail_message_is_extracted() {
        let err = ApiError::from_status(
            StatusCode::INTERNAL_SERVER_ERROR,
            r#"{"detail": "database unavailable"}"#,
        );
        assert_eq!(err.to_string(), "Chart backend failed with HTTP 500: database unavailable");
        assert_eq!(err.status(), Some(500));
    }

    #[test]
    fn test_validation_details_are_joined() {
        let body = r#"{"detail": [
            {"loc": ["body", "fecha_inicio"], "msg": "invalid date format"},
            {"loc": ["body", "fecha_fin"], "msg": "field required"}
        ]}"#;
        let err = ApiError::from_status(StatusCode::UNPROCESSABLE_ENTITY, body);
        assert!(matches!(
            err,
            ApiError::Rejected { status: 422, ref detail }
                if detail == "invalid date format; field required"
        ));
    }

    #[test]
    fn test_unstructured_body_passes_through() {
        assert_eq!(ApiError::error_detail("plain text"), "plain text");
        assert_eq!(ApiError::error_detail(r#"{"error": "x"}"#), r#"{"error": "x"}"#);
        assert_eq!(ApiError::error_detail(r#"{"detail": []}"#), r#"{"detail": []}"#);
    }

    #[test]
    fn test_truncate_body() {
        let short = "short body";
        assert_eq!(ApiError::truncate_body(short), short);

        let long = "x".repeat(MAX_ERROR_BODY_LENGTH + 10);
        let truncated = ApiError::truncate_body(&long);
        assert!(truncated.starts_with(&"x".repeat(MAX_ERROR_BODY_LENGTH)));
        assert!(truncated.contains("510 total bytes"));
    }

    #[test]
    fn test_truncate_body_respects_char_boundaries() {
        // 'í' is two bytes; put one across the cut point
        let body = format!("{}í{}", "a".repeat(MAX_ERROR_BODY_LENGTH - 1), "b".repeat(20));
        let truncated = ApiError::truncate_body(&body);
        assert!(truncated.starts_with(&"a".repeat(MAX_ERROR_BODY_LENGTH - 1)));
        assert!(!truncated.contains('í'));
    }
}
