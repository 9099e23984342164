//! Closed error taxonomy shared by every provider adapter and the fallback engine.
//!
//! [`classify`] is pure: no I/O, no allocation beyond the returned enum. It is the
//! single place that turns "an HTTP status code and/or a response body" into one
//! of eight kinds, used identically by the retry policy and the fallback walk.

use std::fmt;

/// Closed set of error kinds a provider call can fail with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// 429 / "rate limit" / "quota exceeded" / "resource_exhausted".
    RateLimit,
    /// 500/502/503 / "service unavailable" / "overloaded".
    ServerError,
    /// "timed out" / "timeout".
    Timeout,
    /// 401/403 / "unauthorized" / "invalid api key".
    AuthError,
    /// 402 / "payment required" / "billing" / "insufficient credit".
    QuotaExhausted,
    /// "connection refused" / "dns" / "ssl" / "reset by peer".
    Network,
    /// Provider returned 200 with no usable content.
    EmptyResponse,
    /// No pattern matched.
    Unknown,
}

impl ErrorKind {
    /// Transient kinds are worth one same-provider retry before falling back.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            Self::RateLimit
                | Self::ServerError
                | Self::Timeout
                | Self::Network
                | Self::EmptyResponse
        )
    }

    /// Permanent kinds skip the retry and go straight to the fallback walk.
    pub fn is_permanent(self) -> bool {
        matches!(self, Self::AuthError | Self::QuotaExhausted)
    }

    /// Cooldown duration applied to a provider's health record after this kind
    /// of failure (§4.3 defaults, overridable per deployment).
    pub fn default_cooldown_secs(self) -> u64 {
        match self {
            Self::RateLimit => 60,
            Self::ServerError => 30,
            Self::Timeout => 10,
            Self::AuthError => 86_400,
            Self::QuotaExhausted => 3_600,
            Self::Network => 15,
            Self::EmptyResponse => 5,
            Self::Unknown => 10,
        }
    }

    /// Config key used to look up an overridden cooldown, e.g. `rate_limit`.
    pub fn config_key(self) -> &'static str {
        match self {
            Self::RateLimit => "rate_limit",
            Self::ServerError => "server_error",
            Self::Timeout => "timeout",
            Self::AuthError => "auth_error",
            Self::QuotaExhausted => "quota_exhausted",
            Self::Network => "network",
            Self::EmptyResponse => "empty_response",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::RateLimit => "RATE_LIMIT",
            Self::ServerError => "SERVER_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::AuthError => "AUTH_ERROR",
            Self::QuotaExhausted => "QUOTA_EXHAUSTED",
            Self::Network => "NETWORK",
            Self::EmptyResponse => "EMPTY_RESPONSE",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// Classify an error from an optional HTTP status and the lowercased-view of
/// its body/message text. Rules are ordered most-specific-first (§4.1); the
/// first match wins.
pub fn classify(status: Option<u16>, message: &str) -> ErrorKind {
    let text = message.to_lowercase();

    if status == Some(429)
        || text.contains("rate limit")
        || text.contains("quota exceeded")
        || text.contains("resource_exhausted")
        || text.contains("too many requests")
    {
        return ErrorKind::RateLimit;
    }

    if matches!(status, Some(500) | Some(502) | Some(503))
        || text.contains("service unavailable")
        || text.contains("overloaded")
        || text.contains("bad gateway")
    {
        return ErrorKind::ServerError;
    }

    if text.contains("timed out") || text.contains("timeout") {
        return ErrorKind::Timeout;
    }

    if matches!(status, Some(401) | Some(403))
        || text.contains("unauthorized")
        || text.contains("forbidden")
        || text.contains("invalid api key")
    {
        return ErrorKind::AuthError;
    }

    if status == Some(402)
        || text.contains("payment required")
        || text.contains("billing")
        || text.contains("insufficient credit")
    {
        return ErrorKind::QuotaExhausted;
    }

    if text.contains("connection refused")
        || text.contains("dns")
        || text.contains("ssl")
        || text.contains("reset by peer")
    {
        return ErrorKind::Network;
    }

    if text.contains("empty response") || text.contains("no content") || text.contains("no candidates")
    {
        return ErrorKind::EmptyResponse;
    }

    ErrorKind::Unknown
}
