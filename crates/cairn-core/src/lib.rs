//! Domain model for cairn: message records, producer identity, digest
//! rendering, retry configuration, and the terminal error taxonomy.
//! Nothing in this crate performs I/O.

pub mod error;
pub mod record;
pub mod render;
pub mod request;
pub mod retry_policy;
pub mod source_key;

pub use error::{DigestError, StoreFailure};
pub use record::{resolve_latest_per_source, MessageRecord, RunIdentity};
pub use render::{
    digest_marker, render_digest, render_digest_with_limit, GITHUB_COMMENT_MAX_CHARS,
};
pub use request::DigestRequest;
pub use retry_policy::{RetryPolicy, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY_MS};
pub use source_key::{derive_source_key, source_key_from_entries, MatrixParseWarning, SourceKey};
