//! GitHub side of cairn: the comment collaborator contract, a REST client
//! implementing it, and the find-or-create sync of the canonical digest
//! comment.

pub mod comment_sink;
pub mod comment_sync;
pub mod github_api_client;
mod github_transport_helpers;

pub use comment_sink::{AutomationIdentity, CommentSink, ExternalComment};
pub use comment_sync::{find_canonical_comment, sync_digest_comment, SyncOutcome};
pub use github_api_client::{GithubClientConfig, GithubCommentClient, RepoRef};
