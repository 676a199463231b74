use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Creator,
    Consumer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Creator => "creator",
            Role::Consumer => "consumer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "creator" => Ok(Role::Creator),
            "consumer" => Ok(Role::Consumer),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// Input to the account store. Username and email are normalised on construction.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

impl NewAccount {
    pub fn new(username: &str, email: &str, password_hash: String, role: Role) -> Self {
        Self {
            username: username.trim().to_string(),
            email: normalize_email(email),
            password_hash,
            role,
        }
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreatorLoginRequest {
    pub email: String,
    pub password: String,
    pub token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResendInvitationRequest {
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserSearchQuery {
    pub search: Option<String>,
}

/// Public projection used by search results and profile pages.
#[derive(Debug, Clone, Serialize)]
pub struct AccountSummary {
    pub id: Uuid,
    pub username: String,
    pub email: String,
}

impl From<&Account> for AccountSummary {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            username: account.username.clone(),
            email: account.email.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub hashtags: Vec<String>,
    pub url: String,
    pub public_id: String,
    pub creator_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Partial update. `None` keeps the stored value.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct VideoPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub hashtags: Option<Vec<String>>,
}

impl VideoPatch {
    pub fn apply(self, video: &mut Video) {
        if let Some(title) = self.title.filter(|t| !t.trim().is_empty()) {
            video.title = title;
        }
        if let Some(description) = self.description.filter(|d| !d.is_empty()) {
            video.description = Some(description);
        }
        if let Some(tags) = self.tags {
            video.tags = tags;
        }
        if let Some(hashtags) = self.hashtags {
            video.hashtags = hashtags;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteKind {
    Like,
    Dislike,
}

impl VoteKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteKind::Like => "like",
            VoteKind::Dislike => "dislike",
        }
    }
}

impl FromStr for VoteKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "like" => Ok(VoteKind::Like),
            "dislike" => Ok(VoteKind::Dislike),
            other => Err(format!("unknown vote kind '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteTally {
    pub likes: i64,
    pub dislikes: i64,
    pub is_like: bool,
    pub is_dislike: bool,
}

impl VoteTally {
    pub fn new(likes: i64, dislikes: i64, current: Option<VoteKind>) -> Self {
        Self {
            likes,
            dislikes,
            is_like: current == Some(VoteKind::Like),
            is_dislike: current == Some(VoteKind::Dislike),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentEntry {
    pub user_id: Uuid,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

/// A comment with its author resolved. `user` is null once the author is gone.
#[derive(Debug, Clone, Serialize)]
pub struct CommentView {
    #[serde(flatten)]
    pub entry: CommentEntry,
    pub user: Option<AccountSummary>,
}

/// A video listed together with its creator.
#[derive(Debug, Clone, Serialize)]
pub struct VideoListing {
    #[serde(flatten)]
    pub video: Video,
    pub creator: Option<AccountSummary>,
}

/// A creator's video with its like count, as shown on the profile page.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatorVideo {
    pub id: Uuid,
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub public_id: String,
    pub created_at: DateTime<Utc>,
    pub like_count: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    pub video_id: Uuid,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentRequest {
    pub video_id: Uuid,
    pub comment: String,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub query: Option<String>,
    pub page: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct OwnerQuery {
    pub owner: Option<Uuid>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: i64,
    pub total_pages: i64,
    pub total_videos: i64,
    pub per_page: i64,
}

impl Pagination {
    pub fn new(current_page: i64, per_page: i64, total_videos: i64) -> Self {
        Self {
            current_page,
            total_pages: (total_videos + per_page - 1) / per_page,
            total_videos,
            per_page,
        }
    }
}

/// Renders a count the way the player shows it: 999, 1.5K, 2M, 3B.
pub fn format_count(count: i64) -> String {
    const UNITS: [(i64, &str); 3] = [(1_000_000_000, "B"), (1_000_000, "M"), (1_000, "K")];
    for (size, suffix) in UNITS {
        if count >= size {
            let scaled = count as f64 / size as f64;
            let rounded = (scaled * 10.0).floor() / 10.0;
            return if rounded.fract() == 0.0 {
                format!("{}{}", rounded as i64, suffix)
            } else {
                format!("{:.1}{}", rounded, suffix)
            };
        }
    }
    count.to_string()
}

/// Splits a comma separated form field, dropping blanks.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|item| item.trim())
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect()
}
