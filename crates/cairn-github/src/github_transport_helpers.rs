use std::time::Duration;

const MAX_TRANSPORT_RETRY_DELAY_MS: u64 = 30_000;

/// Whether repeating a request after an ambiguous failure can change state
/// twice on GitHub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CommentRequest {
    /// Listing pages or replacing a body with the same document.
    Idempotent,
    /// Posting a new comment. A 5xx or timeout may arrive after GitHub stored
    /// it, so only failures that prove nothing was stored are retried.
    Create,
}

impl CommentRequest {
    pub(crate) fn retries_status(self, status: u16) -> bool {
        match self {
            Self::Idempotent => status == 429 || status >= 500,
            Self::Create => status == 429,
        }
    }

    pub(crate) fn retries_transport_error(self, error: &reqwest::Error) -> bool {
        match self {
            Self::Idempotent => error.is_timeout() || error.is_connect(),
            Self::Create => error.is_connect(),
        }
    }
}

pub(crate) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    let raw = headers.get(reqwest::header::RETRY_AFTER)?.to_str().ok()?;
    let seconds = raw.trim().parse::<u64>().ok()?;
    Some(Duration::from_secs(seconds))
}

/// Exponential delay for collaborator transport retries, floored by any
/// server-provided `Retry-After`.
pub(crate) fn transport_retry_delay(
    base_delay_ms: u64,
    attempt: usize,
    retry_after: Option<Duration>,
) -> Duration {
    if let Some(delay) = retry_after {
        return delay.max(Duration::from_millis(base_delay_ms));
    }
    let exponent = attempt.saturating_sub(1).min(10) as u32;
    let scaled = base_delay_ms.saturating_mul(2_u64.saturating_pow(exponent));
    Duration::from_millis(scaled.min(MAX_TRANSPORT_RETRY_DELAY_MS))
}

pub(crate) fn truncate_for_error(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut truncated = text.chars().take(max_chars).collect::<String>();
    truncated.push_str("...");
    truncated
}
