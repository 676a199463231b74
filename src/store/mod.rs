//! Storage ports for accounts, media records and engagement.
//!
//! Two adapters implement them: `postgres::PgStore` for deployments and
//! `memory::MemoryStore` for local runs without a database and for tests.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    Account, CommentEntry, CreatorVideo, NewAccount, Role, Video, VideoPatch, VoteKind, VoteTally,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Fails with `Conflict` when the username or email is taken.
    async fn create(&self, account: NewAccount) -> Result<Account>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>>;
    /// Unknown ids are skipped; order is unspecified.
    async fn find_many(&self, ids: &[Uuid]) -> Result<Vec<Account>>;
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>>;
    async fn list_by_role(&self, role: Role) -> Result<Vec<Account>>;
    async fn count_by_role(&self, role: Role) -> Result<i64>;
    /// Case-insensitive substring match on the username.
    async fn search_by_username(&self, term: &str) -> Result<Vec<Account>>;
    /// Returns false when nothing was deleted. Refused with `Conflict` while the account owns videos.
    async fn delete(&self, id: Uuid) -> Result<bool>;
}

#[async_trait]
pub trait VideoStore: Send + Sync {
    async fn insert(&self, video: Video) -> Result<Video>;
    /// With an owner, only that creator's videos are visible.
    async fn find(&self, id: Uuid, owner: Option<Uuid>) -> Result<Option<Video>>;
    async fn update(&self, id: Uuid, patch: VideoPatch) -> Result<Option<Video>>;
    async fn delete(&self, id: Uuid) -> Result<bool>;
    async fn count(&self, owner: Option<Uuid>) -> Result<i64>;
    /// Count, then a uniformly random offset. O(n) in the offset; fine at small collection sizes.
    async fn random(&self, owner: Option<Uuid>) -> Result<Option<Video>>;
    /// Newest first.
    async fn list_page(&self, offset: i64, limit: i64) -> Result<Vec<Video>>;
    /// Case-insensitive substring over title, tags and hashtags, newest first.
    async fn search(&self, term: &str, offset: i64, limit: i64) -> Result<Vec<Video>>;
    /// Ids of the previous and next video in creation order, within the owner's scope.
    async fn neighbours(&self, video: &Video, owner: Option<Uuid>) -> Result<(Option<Uuid>, Option<Uuid>)>;
}

#[async_trait]
pub trait EngagementStore: Send + Sync {
    /// Insert-or-replace keyed by (video, user), then recount.
    async fn cast_vote(&self, video: Uuid, user: Uuid, kind: VoteKind) -> Result<VoteTally>;
    async fn vote_of(&self, video: Uuid, user: Uuid) -> Result<Option<VoteKind>>;
    /// (likes, dislikes)
    async fn tally(&self, video: Uuid) -> Result<(i64, i64)>;
    async fn append_comment(&self, video: Uuid, user: Uuid, text: &str) -> Result<CommentEntry>;
    async fn comments(&self, video: Uuid) -> Result<Vec<CommentEntry>>;
    async fn creator_like_counts(&self, creator: Uuid) -> Result<Vec<CreatorVideo>>;
}

/// Escapes LIKE wildcards so the term matches literally.
pub(crate) fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}
