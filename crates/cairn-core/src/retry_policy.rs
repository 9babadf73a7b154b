use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::DigestError;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1_000;

/// Bounds the transactional retry loop. `max_retries` is the total number of
/// attempts; the wait after attempt `n` is `retry_delay_ms * n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RetryPolicyOptions")]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

/// Wire shape of [`RetryPolicy`]; deserialization goes through
/// [`RetryPolicy::new`].
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RetryPolicyOptions {
    #[serde(default = "default_max_retries")]
    max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    retry_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY_MS
}

impl TryFrom<RetryPolicyOptions> for RetryPolicy {
    type Error = DigestError;

    fn try_from(options: RetryPolicyOptions) -> Result<Self, Self::Error> {
        Self::new(options.max_retries, options.retry_delay_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, retry_delay_ms: u64) -> Result<Self, DigestError> {
        if max_retries == 0 {
            return Err(DigestError::InvalidRequest(
                "maxRetries must allow at least one attempt".to_string(),
            ));
        }
        Ok(Self {
            max_retries,
            retry_delay_ms,
        })
    }

    /// Linear backoff applied after the failed `attempt` (1-based).
    pub fn delay_after_attempt(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_delay_ms.saturating_mul(u64::from(attempt)))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::RetryPolicy;

    #[test]
    fn unit_default_policy_matches_documented_constants() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.retry_delay_ms, 1_000);
    }

    #[test]
    fn unit_delay_grows_linearly_with_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after_attempt(1), Duration::from_millis(1_000));
        assert_eq!(policy.delay_after_attempt(2), Duration::from_millis(2_000));
        assert_eq!(policy.delay_after_attempt(3), Duration::from_millis(3_000));
    }

    #[test]
    fn unit_policy_rejects_zero_attempts() {
        assert!(RetryPolicy::new(0, 10).is_err());
        assert!(RetryPolicy::new(1, 0).is_ok());
    }

    #[test]
    fn unit_policy_deserializes_camel_case_options() {
        let policy: RetryPolicy =
            serde_json::from_str(r#"{"maxRetries":5,"retryDelayMs":250}"#).expect("parse policy");
        assert_eq!(policy, RetryPolicy::new(5, 250).expect("valid policy"));
    }

    #[test]
    fn regression_deserialize_rejects_zero_attempts() {
        let error = serde_json::from_str::<RetryPolicy>(r#"{"maxRetries":0,"retryDelayMs":250}"#)
            .expect_err("zero attempts must not deserialize");
        assert!(error.to_string().contains("maxRetries must allow at least one attempt"));
    }

    #[test]
    fn unit_policy_deserialize_fills_omitted_options() {
        let policy: RetryPolicy =
            serde_json::from_str(r#"{"retryDelayMs":50}"#).expect("parse policy");
        assert_eq!(policy, RetryPolicy::new(3, 50).expect("valid policy"));
    }
}
