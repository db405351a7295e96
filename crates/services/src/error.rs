use orch_core::compute::ServiceKind;

/// Failure of a single downstream call, classified for the retry loop.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ServiceCallError {
    /// Worth retrying: connection failure, timeout, 5xx, 408, or 429.
    #[error("{service} service unavailable: {message}")]
    Transient {
        service: ServiceKind,
        message: String,
    },

    /// Retrying will not help: 4xx, malformed reply, or unusable request.
    #[error("{service} service rejected request: {message}")]
    Permanent {
        service: ServiceKind,
        message: String,
    },
}

impl ServiceCallError {
    pub fn transient(service: ServiceKind, message: impl Into<String>) -> Self {
        ServiceCallError::Transient {
            service,
            message: message.into(),
        }
    }

    pub fn permanent(service: ServiceKind, message: impl Into<String>) -> Self {
        ServiceCallError::Permanent {
            service,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, ServiceCallError::Transient { .. })
    }

    pub fn service(&self) -> ServiceKind {
        match self {
            ServiceCallError::Transient { service, .. }
            | ServiceCallError::Permanent { service, .. } => *service,
        }
    }

    /// Classify an HTTP status code. Only meaningful for non-2xx codes.
    pub fn from_status(service: ServiceKind, status: u16, body: &str) -> Self {
        let message = format!("HTTP {status}: {}", truncate(body, 512));
        if status >= 500 || status == 408 || status == 429 {
            Self::transient(service, message)
        } else {
            Self::permanent(service, message)
        }
    }

    /// Classify a transport-level reqwest error.
    pub fn from_reqwest(service: ServiceKind, err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::transient(service, "request timed out")
        } else if err.is_connect() || err.is_request() {
            Self::transient(service, format!("connection failed: {err}"))
        } else if err.is_decode() {
            Self::permanent(service, format!("malformed response: {err}"))
        } else if err.is_builder() {
            Self::permanent(service, format!("invalid request: {err}"))
        } else {
            Self::transient(service, err.to_string())
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
