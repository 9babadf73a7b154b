//! Publish pipeline: append-resolve inside the bounded retry loop, then
//! render and sync the canonical comment.

mod pipeline;
mod retry_controller;

pub use pipeline::{DigestPipeline, PublishReport};
pub use retry_controller::{AttemptError, Retried, RetryController, RetryDecision, RetryState};
