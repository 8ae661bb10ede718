//! Closed error taxonomy shared by every component.
//!
//! Errors are classified near the source from typed information (reqwest error kind,
//! HTTP status, detected protection) rather than reconstructed from a formatted message.

use thiserror::Error;

/// The closed set of error categories a fetch attempt can end in.
///
/// Table mirrors the retry/breaker-counting contract exactly: `is_retryable()` and
/// `counts_vs_breaker()` are derived, not duplicated, so the two can never drift apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Dns,
    Timeout,
    Connection,
    SslError,
    NoResponse,
    EmptyContent,
    NotFound,
    Cloudflare,
    Waf,
    Captcha,
    Bot,
    RateLimit,
    CircuitOpen,
    ConcurrencyTimeout,
    Other,
}

impl ErrorKind {
    /// Whether a fetch attempt ending in this category may be retried at all.
    pub fn is_retryable(self) -> bool {
        match self {
            ErrorKind::Dns
            | ErrorKind::Timeout
            | ErrorKind::Connection
            | ErrorKind::SslError
            | ErrorKind::NoResponse
            | ErrorKind::RateLimit
            | ErrorKind::Other => true,
            ErrorKind::EmptyContent
            | ErrorKind::NotFound
            | ErrorKind::CircuitOpen
            | ErrorKind::ConcurrencyTimeout => false,
            // Protection categories are escalated to a different strategy, not blindly retried.
            ErrorKind::Cloudflare | ErrorKind::Waf | ErrorKind::Captcha | ErrorKind::Bot => false,
        }
    }

    /// Whether failures of this category count toward the circuit breaker's threshold.
    ///
    /// Protection detections are a property of the site, not a signal of infrastructure
    /// fault, so they never count (§4.3).
    pub fn counts_vs_breaker(self) -> bool {
        match self {
            ErrorKind::Dns
            | ErrorKind::Timeout
            | ErrorKind::Connection
            | ErrorKind::SslError
            | ErrorKind::NoResponse
            | ErrorKind::Other => true,
            ErrorKind::EmptyContent
            | ErrorKind::NotFound
            | ErrorKind::Cloudflare
            | ErrorKind::Waf
            | ErrorKind::Captcha
            | ErrorKind::Bot
            | ErrorKind::RateLimit
            | ErrorKind::CircuitOpen
            | ErrorKind::ConcurrencyTimeout => false,
        }
    }

    /// Whether this category represents site-side protection rather than infrastructure.
    pub fn is_protection(self) -> bool {
        matches!(
            self,
            ErrorKind::Cloudflare | ErrorKind::Waf | ErrorKind::Captcha | ErrorKind::Bot
        )
    }

    /// Maximum retry attempts within one strategy for this category. `0` means "never retry".
    pub fn max_retries(self, strategy_retry_count: u32) -> u32 {
        match self {
            ErrorKind::SslError => strategy_retry_count.saturating_sub(1).max(1),
            ErrorKind::RateLimit => strategy_retry_count,
            _ if self.is_retryable() => strategy_retry_count,
            _ => 0,
        }
    }

    /// Maps to the closed vocabulary used for `ScrapeResult::main_page_fail_reason` (§4.7.5).
    pub fn as_fail_reason(self) -> &'static str {
        match self {
            ErrorKind::Dns | ErrorKind::Connection | ErrorKind::NoResponse => "NO_RESPONSE",
            ErrorKind::Cloudflare => "CLOUDFLARE",
            ErrorKind::Waf | ErrorKind::Bot | ErrorKind::Captcha => "BLOCKED",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::EmptyContent => "EMPTY_CONTENT",
            ErrorKind::SslError => "SSL_ERROR",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::RateLimit | ErrorKind::CircuitOpen | ErrorKind::ConcurrencyTimeout => {
                "OTHER"
            }
            ErrorKind::Other => "OTHER",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Classify a [`reqwest::Error`] into an [`ErrorKind`], table-driven rather than
/// string-matched. HTTP-status classification (404, 429, protection bodies) happens
/// one layer up, after the response is available; this only covers transport failure.
pub fn classify_transport_error(err: &reqwest::Error) -> ErrorKind {
    use std::error::Error as _;

    if err.is_timeout() {
        return ErrorKind::Timeout;
    }
    if err.is_connect() {
        let mut cur: Option<&(dyn std::error::Error + 'static)> = err.source();
        while let Some(e) = cur {
            let s = e.to_string().to_lowercase();
            if s.contains("dns") || s.contains("resolve") || s.contains("lookup") {
                return ErrorKind::Dns;
            }
            if s.contains("ssl") || s.contains("tls") || s.contains("certificate") {
                return ErrorKind::SslError;
            }
            cur = e.source();
        }
        return ErrorKind::Connection;
    }
    if err.is_request() || err.is_body() || err.is_decode() {
        return ErrorKind::NoResponse;
    }
    ErrorKind::Other
}

/// Component-facing error type for operations outside the fetch path (config loading,
/// persistence, API handlers).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("a batch is already running ({batch_id})")]
    BatchAlreadyRunning { batch_id: String },
    #[error("no active batch")]
    NoActiveBatch,
    #[error("concurrency governor timed out acquiring a ticket for {domain}")]
    ConcurrencyTimeout { domain: String },
    #[error("circuit open for domain {domain}")]
    CircuitOpen { domain: String },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protection_categories_never_count_against_breaker() {
        for k in [ErrorKind::Cloudflare, ErrorKind::Waf, ErrorKind::Captcha, ErrorKind::Bot] {
            assert!(!k.counts_vs_breaker());
            assert!(k.is_protection());
        }
    }

    #[test]
    fn infrastructure_categories_count_and_retry() {
        for k in [
            ErrorKind::Dns,
            ErrorKind::Timeout,
            ErrorKind::Connection,
            ErrorKind::SslError,
            ErrorKind::NoResponse,
        ] {
            assert!(k.counts_vs_breaker());
            assert!(k.is_retryable());
            assert!(!k.is_protection());
        }
    }

    #[test]
    fn rate_limit_retries_but_does_not_count() {
        assert!(ErrorKind::RateLimit.is_retryable());
        assert!(!ErrorKind::RateLimit.counts_vs_breaker());
    }

    #[test]
    fn terminal_categories_never_retry() {
        for k in [
            ErrorKind::EmptyContent,
            ErrorKind::NotFound,
            ErrorKind::CircuitOpen,
            ErrorKind::ConcurrencyTimeout,
        ] {
            assert!(!k.is_retryable());
            assert_eq!(k.max_retries(5), 0);
        }
    }

    #[test]
    fn fail_reason_vocabulary_is_closed() {
        let allowed = [
            "NO_RESPONSE",
            "CLOUDFLARE",
            "BLOCKED",
            "TIMEOUT",
            "EMPTY_CONTENT",
            "SSL_ERROR",
            "NOT_FOUND",
            "OTHER",
        ];
        for k in [
            ErrorKind::Dns,
            ErrorKind::Timeout,
            ErrorKind::Connection,
            ErrorKind::SslError,
            ErrorKind::NoResponse,
            ErrorKind::EmptyContent,
            ErrorKind::NotFound,
            ErrorKind::Cloudflare,
            ErrorKind::Waf,
            ErrorKind::Captcha,
            ErrorKind::Bot,
            ErrorKind::RateLimit,
            ErrorKind::CircuitOpen,
            ErrorKind::ConcurrencyTimeout,
            ErrorKind::Other,
        ] {
            assert!(allowed.contains(&k.as_fail_reason()));
        }
    }
}
