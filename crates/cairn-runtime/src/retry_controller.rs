use std::future::Future;
use std::time::Duration;

use cairn_core::{DigestError, RetryPolicy};
use cairn_store::{ConflictCode, StoreError};

/// Failure of one attempt, already classified for the retry loop.
#[derive(Debug, Clone)]
pub enum AttemptError {
    Transient { code: ConflictCode, message: String },
    Fatal(DigestError),
}

impl From<StoreError> for AttemptError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::TransientConflict { code, message } => Self::Transient { code, message },
            StoreError::Fatal(failure) => Self::Fatal(DigestError::FatalStore(failure)),
        }
    }
}

impl From<DigestError> for AttemptError {
    fn from(error: DigestError) -> Self {
        Self::Fatal(error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Attempting(u32),
    Retrying(u32),
    Success,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { next_attempt: u32, delay: Duration },
    Exhausted,
    Abort,
}

/// Value produced by a successful run and the attempt it succeeded on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retried<T> {
    pub value: T,
    pub attempts: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryController {
    policy: RetryPolicy,
}

impl RetryController {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Transition taken after `attempt` (1-based) failed with `error`.
    pub fn decide(&self, attempt: u32, error: &AttemptError) -> RetryDecision {
        match error {
            AttemptError::Fatal(_) => RetryDecision::Abort,
            AttemptError::Transient { .. } if attempt >= self.policy.max_retries => {
                RetryDecision::Exhausted
            }
            AttemptError::Transient { .. } => RetryDecision::Retry {
                next_attempt: attempt + 1,
                delay: self.policy.delay_after_attempt(attempt),
            },
        }
    }

    /// Runs `operation` until it succeeds, fails fatally, or exhausts the
    /// policy. `operation` receives the 1-based attempt number and must start
    /// from fresh state each time.
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<Retried<T>, DigestError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, AttemptError>>,
    {
        let mut attempt = 1_u32;
        loop {
            tracing::debug!(
                state = ?RetryState::Attempting(attempt),
                max_attempts = self.policy.max_retries,
                "running attempt"
            );

            let error = match operation(attempt).await {
                Ok(value) => {
                    tracing::debug!(
                        state = ?RetryState::Success,
                        attempts = attempt,
                        "attempt succeeded"
                    );
                    return Ok(Retried {
                        value,
                        attempts: attempt,
                    });
                }
                Err(error) => error,
            };

            match (self.decide(attempt, &error), error) {
                (
                    RetryDecision::Retry {
                        next_attempt,
                        delay,
                    },
                    AttemptError::Transient { code, message },
                ) => {
                    tracing::warn!(
                        attempt,
                        max_attempts = self.policy.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        sqlstate = code.sqlstate(),
                        error = %message,
                        "transient store conflict; retrying"
                    );
                    tracing::debug!(state = ?RetryState::Retrying(next_attempt), "backing off");
                    tokio::time::sleep(delay).await;
                    attempt = next_attempt;
                }
                (_, AttemptError::Transient { code, message }) => {
                    let error = DigestError::RetriesExhausted {
                        attempts: attempt,
                        last_conflict: format!("{code}: {message}"),
                    };
                    tracing::error!(
                        state = ?RetryState::Failed,
                        attempts = attempt,
                        %error,
                        "retries exhausted"
                    );
                    return Err(error);
                }
                (_, AttemptError::Fatal(error)) => {
                    tracing::error!(
                        state = ?RetryState::Failed,
                        attempts = attempt,
                        %error,
                        "attempt failed fatally"
                    );
                    return Err(error);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use cairn_core::{DigestError, RetryPolicy, StoreFailure};
    use cairn_store::{ConflictCode, StoreError};

    use super::{AttemptError, RetryController, RetryDecision};

    fn fast_controller(max_retries: u32) -> RetryController {
        RetryController::new(RetryPolicy::new(max_retries, 1).expect("policy"))
    }

    fn lock_conflict() -> AttemptError {
        AttemptError::from(StoreError::TransientConflict {
            code: ConflictCode::LockNotAvailable,
            message: "could not obtain lock".to_string(),
        })
    }

    #[test]
    fn unit_decide_follows_linear_backoff_then_exhausts() {
        let controller = RetryController::new(RetryPolicy::default());
        assert_eq!(
            controller.decide(1, &lock_conflict()),
            RetryDecision::Retry {
                next_attempt: 2,
                delay: Duration::from_millis(1_000)
            }
        );
        assert_eq!(
            controller.decide(2, &lock_conflict()),
            RetryDecision::Retry {
                next_attempt: 3,
                delay: Duration::from_millis(2_000)
            }
        );
        assert_eq!(controller.decide(3, &lock_conflict()), RetryDecision::Exhausted);
    }

    #[test]
    fn unit_decide_aborts_on_fatal_at_any_attempt() {
        let controller = RetryController::new(RetryPolicy::default());
        let fatal = AttemptError::from(StoreError::Fatal(StoreFailure::new("syntax error")));
        assert_eq!(controller.decide(1, &fatal), RetryDecision::Abort);
        assert_eq!(controller.decide(3, &fatal), RetryDecision::Abort);
    }

    #[tokio::test]
    async fn functional_persistent_conflict_makes_exactly_max_attempts() {
        let calls = AtomicU32::new(0);
        let result = fast_controller(3)
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(lock_conflict()) }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(
            result,
            Err(DigestError::RetriesExhausted { attempts: 3, ref last_conflict })
                if last_conflict.starts_with("55P03 lock_not_available")
        ));
    }

    #[tokio::test]
    async fn functional_fatal_error_on_first_attempt_stops_immediately() {
        let calls = AtomicU32::new(0);
        let result = fast_controller(3)
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err::<(), _>(AttemptError::from(StoreError::Fatal(
                        StoreFailure::new("duplicate key").with_code("23505"),
                    )))
                }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(DigestError::FatalStore(_))));
    }

    #[tokio::test]
    async fn functional_transient_then_success_reports_attempt_count() {
        let calls = AtomicU32::new(0);
        let result = fast_controller(3)
            .run(|attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt == 1 {
                        Err(lock_conflict())
                    } else {
                        Ok("resolved")
                    }
                }
            })
            .await
            .expect("second attempt succeeds");
        assert_eq!(result.value, "resolved");
        assert_eq!(result.attempts, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn regression_collaborator_error_is_never_retried() {
        let calls = AtomicU32::new(0);
        let result = fast_controller(3)
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err::<(), _>(AttemptError::from(DigestError::Collaborator {
                        operation: "update",
                        message: "status 502".to_string(),
                    }))
                }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(DigestError::Collaborator { .. })));
    }

    #[tokio::test]
    async fn unit_single_attempt_policy_exhausts_without_sleeping() {
        let result = fast_controller(1)
            .run(|_| async { Err::<(), _>(lock_conflict()) })
            .await;
        assert!(matches!(
            result,
            Err(DigestError::RetriesExhausted { attempts: 1, .. })
        ));
    }
}
