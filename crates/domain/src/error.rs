/// Shared error type used across all Maestro crates.
///
/// `code()` maps each variant to the taxonomy in the spec's error-handling
/// design; the HTTP layer uses it to pick a status code and build the
/// canonical `{error, code, message}` envelope.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("validation: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("internal: {0}")]
    Internal(String),

    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// The taxonomy code from §7 of the spec.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation",
            Error::NotFound(_) => "not_found",
            Error::Forbidden(_) => "forbidden",
            Error::Conflict(_) => "conflict",
            Error::RateLimited(_) => "rate_limited",
            Error::Timeout(_) => "timeout",
            Error::Internal(_) | Error::Io(_) | Error::Json(_) => "internal",
        }
    }

    /// The HTTP status code this error maps to.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Validation(_) => 400,
            Error::NotFound(_) => 404,
            Error::Forbidden(_) => 403,
            Error::Conflict(_) => 409,
            Error::RateLimited(_) => 429,
            Error::Timeout(_) => 504,
            Error::Internal(_) | Error::Io(_) | Error::Json(_) => 500,
        }
    }
}

/// Logs and swallows a best-effort operation's failure (telemetry, timeline
/// appends) so it never fails the primary operation it's attached to.
/// Increments the process-wide swallowed-error counter.
pub fn emit_best_effort<T>(result: Result<T>, what: &str) {
    if let Err(e) = result {
        BEST_EFFORT_FAILURES.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        tracing::warn!(what, error = %e, "best-effort operation failed");
    }
}

pub static BEST_EFFORT_FAILURES: std::sync::atomic::AtomicU64 =
    std::sync::atomic::AtomicU64::new(0);

pub fn best_effort_failure_count() -> u64 {
    BEST_EFFORT_FAILURES.load(std::sync::atomic::Ordering::Relaxed)
}
