use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A comment on the parent thread, reduced to what the sync step needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalComment {
    pub id: u64,
    pub author_login: String,
    pub author_is_bot: bool,
    pub body: String,
}

/// Which authors count as "us" when looking for the canonical comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutomationIdentity {
    /// Any author GitHub reports with user type `Bot`.
    AnyBot,
    /// Exactly this login, for tokens that act as a regular user.
    Login(String),
}

impl AutomationIdentity {
    pub fn from_bot_login(bot_login: Option<&str>) -> Self {
        match bot_login.map(str::trim).filter(|login| !login.is_empty()) {
            Some(login) => Self::Login(login.to_string()),
            None => Self::AnyBot,
        }
    }

    pub fn authored(&self, comment: &ExternalComment) -> bool {
        match self {
            Self::AnyBot => comment.author_is_bot,
            Self::Login(login) => comment.author_login.eq_ignore_ascii_case(login),
        }
    }
}

/// Comment-hosting collaborator keyed by pull request number.
#[async_trait]
pub trait CommentSink: Send + Sync {
    async fn list_comments(&self, pr_number: u64) -> Result<Vec<ExternalComment>>;
    async fn create_comment(&self, pr_number: u64, body: &str) -> Result<ExternalComment>;
    async fn update_comment(&self, comment_id: u64, body: &str) -> Result<ExternalComment>;
}
