/// Shared error type used across all gateway crates.
///
/// Maps to an HTTP status and a stable `{error, reason}` JSON body at the
/// edge; callers inside the core only ever match on variant, never on the
/// message text.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("upstream {provider}: {message}")]
    Upstream { provider: String, message: String },

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("config: {0}")]
    Config(String),

    #[error("auth: {0}")]
    Auth(String),

    #[error("internal: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Stable machine-readable reason code, independent of the human message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    NotFound,
    Validation,
    Conflict,
    Upstream,
    Timeout,
    Auth,
    Internal,
}

impl Error {
    /// HTTP status code this error maps to at the edge.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::NotFound(_) => 404,
            Error::Validation(_) => 400,
            Error::Conflict(_) => 409,
            Error::Upstream { .. } => 502,
            Error::Timeout(_) => 504,
            Error::Auth(_) => 401,
            Error::Io(_) | Error::Json(_) | Error::Config(_) | Error::Internal(_) | Error::Other(_) => 500,
        }
    }

    /// Stable reason tag for the `{error, reason}` JSON error body.
    pub fn reason(&self) -> Reason {
        match self {
            Error::NotFound(_) => Reason::NotFound,
            Error::Validation(_) => Reason::Validation,
            Error::Conflict(_) => Reason::Conflict,
            Error::Upstream { .. } => Reason::Upstream,
            Error::Timeout(_) => Reason::Timeout,
            Error::Auth(_) => Reason::Auth,
            Error::Io(_) | Error::Json(_) | Error::Config(_) | Error::Internal(_) | Error::Other(_) => {
                Reason::Internal
            }
        }
    }
}

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::NotFound => "not_found",
            Reason::Validation => "validation",
            Reason::Conflict => "conflict",
            Reason::Upstream => "upstream",
            Reason::Timeout => "timeout",
            Reason::Auth => "auth",
            Reason::Internal => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_maps_to_409() {
        let e = Error::Conflict("job already running".into());
        assert_eq!(e.status_code(), 409);
        assert_eq!(e.reason().as_str(), "conflict");
    }

    #[test]
    fn upstream_maps_to_502() {
        let e = Error::Upstream {
            provider: "openai".into(),
            message: "stream closed".into(),
        };
        assert_eq!(e.status_code(), 502);
        assert_eq!(e.reason().as_str(), "upstream");
    }

    #[test]
    fn not_found_maps_to_404() {
        assert_eq!(Error::NotFound("job".into()).status_code(), 404);
    }
}
