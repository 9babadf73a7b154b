use std::fmt;

use thiserror::Error;

/// Diagnostic detail captured from a non-retryable store failure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreFailure {
    /// SQLSTATE reported by the server, absent for connection or protocol failures.
    pub code: Option<String>,
    pub message: String,
    pub detail: Option<String>,
    pub hint: Option<String>,
    pub position: Option<String>,
}

impl StoreFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

impl fmt::Display for StoreFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code.as_deref() {
            Some(code) => write!(f, "[{code}] {}", self.message)?,
            None => write!(f, "{}", self.message)?,
        }
        if let Some(detail) = self.detail.as_deref() {
            write!(f, " | detail: {detail}")?;
        }
        if let Some(hint) = self.hint.as_deref() {
            write!(f, " | hint: {hint}")?;
        }
        if let Some(position) = self.position.as_deref() {
            write!(f, " | position: {position}")?;
        }
        Ok(())
    }
}

/// Terminal failures surfaced to the caller of the publish pipeline.
#[derive(Debug, Clone, Error)]
pub enum DigestError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("message store failure: {0}")]
    FatalStore(StoreFailure),
    #[error("comment {operation} failed: {message}")]
    Collaborator {
        operation: &'static str,
        message: String,
    },
    #[error("gave up after {attempts} attempts; last transient conflict: {last_conflict}")]
    RetriesExhausted { attempts: u32, last_conflict: String },
}

#[cfg(test)]
mod tests {
    use super::{DigestError, StoreFailure};

    #[test]
    fn unit_store_failure_display_includes_operability_fields() {
        let failure = StoreFailure {
            code: Some("42601".to_string()),
            message: "syntax error at or near \"SELEC\"".to_string(),
            detail: None,
            hint: Some("check the query".to_string()),
            position: Some("original:1".to_string()),
        };
        assert_eq!(
            failure.to_string(),
            "[42601] syntax error at or near \"SELEC\" | hint: check the query | position: original:1"
        );
    }

    #[test]
    fn unit_store_failure_without_code_renders_message_only() {
        let failure = StoreFailure::new("connection refused");
        assert_eq!(failure.to_string(), "connection refused");
    }

    #[test]
    fn unit_retries_exhausted_message_names_attempts() {
        let error = DigestError::RetriesExhausted {
            attempts: 3,
            last_conflict: "55P03 lock_not_available".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "gave up after 3 attempts; last transient conflict: 55P03 lock_not_available"
        );
    }
}
