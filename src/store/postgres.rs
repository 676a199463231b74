use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::{like_pattern, AccountStore, EngagementStore, VideoStore};
use crate::error::{AppError, Result};
use crate::models::{
    normalize_email, Account, CommentEntry, CreatorVideo, NewAccount, Role, Video, VideoPatch,
    VoteKind, VoteTally,
};

const VIDEO_COLUMNS: &str =
    "id, title, description, tags, hashtags, url, public_id, creator_id, created_at";

#[derive(FromRow)]
struct AccountRow {
    id: Uuid,
    username: String,
    email: String,
    password_hash: String,
    role: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<AccountRow> for Account {
    type Error = AppError;

    fn try_from(row: AccountRow) -> Result<Self> {
        let role = row.role.parse::<Role>().map_err(AppError::DatabaseError)?;
        Ok(Account {
            id: row.id,
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            role,
            created_at: row.created_at,
        })
    }
}

fn accounts(rows: Vec<AccountRow>) -> Result<Vec<Account>> {
    rows.into_iter().map(Account::try_from).collect()
}

#[derive(FromRow)]
struct VideoRow {
    id: Uuid,
    title: String,
    description: Option<String>,
    tags: Vec<String>,
    hashtags: Vec<String>,
    url: String,
    public_id: String,
    creator_id: Uuid,
    created_at: DateTime<Utc>,
}

impl From<VideoRow> for Video {
    fn from(row: VideoRow) -> Self {
        Video {
            id: row.id,
            title: row.title,
            description: row.description,
            tags: row.tags,
            hashtags: row.hashtags,
            url: row.url,
            public_id: row.public_id,
            creator_id: row.creator_id,
            created_at: row.created_at,
        }
    }
}

fn videos(rows: Vec<VideoRow>) -> Vec<Video> {
    rows.into_iter().map(Video::from).collect()
}

#[derive(FromRow)]
struct CreatorVideoRow {
    id: Uuid,
    title: String,
    url: String,
    description: Option<String>,
    public_id: String,
    created_at: DateTime<Utc>,
    like_count: i64,
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl AccountStore for PgStore {
    async fn create(&self, account: NewAccount) -> Result<Account> {
        let row = sqlx::query_as::<_, AccountRow>(
            "INSERT INTO accounts (id, username, email, password_hash, role, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING id, username, email, password_hash, role, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(&account.username)
        .bind(&account.email)
        .bind(&account.password_hash)
        .bind(account.role.as_str())
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>> {
        sqlx::query_as::<_, AccountRow>("SELECT * FROM accounts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Account::try_from)
            .transpose()
    }

    async fn find_many(&self, ids: &[Uuid]) -> Result<Vec<Account>> {
        let rows = sqlx::query_as::<_, AccountRow>("SELECT * FROM accounts WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        accounts(rows)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>> {
        sqlx::query_as::<_, AccountRow>("SELECT * FROM accounts WHERE email = $1")
            .bind(normalize_email(email))
            .fetch_optional(&self.pool)
            .await?
            .map(Account::try_from)
            .transpose()
    }

    async fn list_by_role(&self, role: Role) -> Result<Vec<Account>> {
        let rows = sqlx::query_as::<_, AccountRow>(
            "SELECT * FROM accounts WHERE role = $1 ORDER BY created_at ASC",
        )
        .bind(role.as_str())
        .fetch_all(&self.pool)
        .await?;
        accounts(rows)
    }

    async fn count_by_role(&self, role: Role) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM accounts WHERE role = $1")
            .bind(role.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn search_by_username(&self, term: &str) -> Result<Vec<Account>> {
        let rows = sqlx::query_as::<_, AccountRow>(
            "SELECT * FROM accounts WHERE username ILIKE $1 ORDER BY username ASC",
        )
        .bind(like_pattern(term))
        .fetch_all(&self.pool)
        .await?;
        accounts(rows)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM accounts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl VideoStore for PgStore {
    async fn insert(&self, video: Video) -> Result<Video> {
        // Only inserts when the owner is a stored creator.
        let row = sqlx::query_as::<_, VideoRow>(&format!(
            "INSERT INTO videos ({VIDEO_COLUMNS}) \
             SELECT $1, $2, $3, $4, $5, $6, $7, $8, $9 \
             WHERE EXISTS (SELECT 1 FROM accounts WHERE id = $8 AND role = 'creator') \
             RETURNING {VIDEO_COLUMNS}"
        ))
        .bind(video.id)
        .bind(&video.title)
        .bind(&video.description)
        .bind(&video.tags)
        .bind(&video.hashtags)
        .bind(&video.url)
        .bind(&video.public_id)
        .bind(video.creator_id)
        .bind(video.created_at)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(row.into()),
            None => match self.find_by_id(video.creator_id).await? {
                Some(_) => Err(AppError::Forbidden(
                    "Access denied. Only creators can upload videos.".to_string(),
                )),
                None => Err(AppError::NotFound("Creator not found".to_string())),
            },
        }
    }

    async fn find(&self, id: Uuid, owner: Option<Uuid>) -> Result<Option<Video>> {
        let row = sqlx::query_as::<_, VideoRow>(&format!(
            "SELECT {VIDEO_COLUMNS} FROM videos \
             WHERE id = $1 AND ($2::uuid IS NULL OR creator_id = $2)"
        ))
        .bind(id)
        .bind(owner)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Video::from))
    }

    async fn update(&self, id: Uuid, patch: VideoPatch) -> Result<Option<Video>> {
        let mut tx = self.pool.begin().await?;
        let current = sqlx::query_as::<_, VideoRow>(&format!(
            "SELECT {VIDEO_COLUMNS} FROM videos WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut tx)
        .await?;

        let mut video = match current {
            Some(row) => Video::from(row),
            None => return Ok(None),
        };
        patch.apply(&mut video);

        sqlx::query(
            "UPDATE videos SET title = $2, description = $3, tags = $4, hashtags = $5 WHERE id = $1",
        )
        .bind(video.id)
        .bind(&video.title)
        .bind(&video.description)
        .bind(&video.tags)
        .bind(&video.hashtags)
        .execute(&mut tx)
        .await?;
        tx.commit().await?;
        Ok(Some(video))
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM videos WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count(&self, owner: Option<Uuid>) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM videos WHERE ($1::uuid IS NULL OR creator_id = $1)",
        )
        .bind(owner)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn random(&self, owner: Option<Uuid>) -> Result<Option<Video>> {
        let count = self.count(owner).await?;
        if count == 0 {
            return Ok(None);
        }
        let offset = rand::thread_rng().gen_range(0..count);
        let row = sqlx::query_as::<_, VideoRow>(&format!(
            "SELECT {VIDEO_COLUMNS} FROM videos WHERE ($1::uuid IS NULL OR creator_id = $1) \
             ORDER BY created_at DESC, id DESC OFFSET $2 LIMIT 1"
        ))
        .bind(owner)
        .bind(offset)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Video::from))
    }

    async fn list_page(&self, offset: i64, limit: i64) -> Result<Vec<Video>> {
        let rows = sqlx::query_as::<_, VideoRow>(&format!(
            "SELECT {VIDEO_COLUMNS} FROM videos ORDER BY created_at DESC, id DESC OFFSET $1 LIMIT $2"
        ))
        .bind(offset)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(videos(rows))
    }

    async fn search(&self, term: &str, offset: i64, limit: i64) -> Result<Vec<Video>> {
        let rows = sqlx::query_as::<_, VideoRow>(&format!(
            "SELECT {VIDEO_COLUMNS} FROM videos \
             WHERE title ILIKE $1 \
                OR EXISTS (SELECT 1 FROM unnest(tags) AS t WHERE t ILIKE $1) \
                OR EXISTS (SELECT 1 FROM unnest(hashtags) AS h WHERE h ILIKE $1) \
             ORDER BY created_at DESC, id DESC OFFSET $2 LIMIT $3"
        ))
        .bind(like_pattern(term))
        .bind(offset)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(videos(rows))
    }

    async fn neighbours(&self, video: &Video, owner: Option<Uuid>) -> Result<(Option<Uuid>, Option<Uuid>)> {
        let prev: Option<Uuid> = sqlx::query_scalar(
            "SELECT id FROM videos \
             WHERE (created_at, id) < ($1, $2) AND ($3::uuid IS NULL OR creator_id = $3) \
             ORDER BY created_at DESC, id DESC LIMIT 1",
        )
        .bind(video.created_at)
        .bind(video.id)
        .bind(owner)
        .fetch_optional(&self.pool)
        .await?;

        let next: Option<Uuid> = sqlx::query_scalar(
            "SELECT id FROM videos \
             WHERE (created_at, id) > ($1, $2) AND ($3::uuid IS NULL OR creator_id = $3) \
             ORDER BY created_at ASC, id ASC LIMIT 1",
        )
        .bind(video.created_at)
        .bind(video.id)
        .bind(owner)
        .fetch_optional(&self.pool)
        .await?;

        Ok((prev, next))
    }
}

#[async_trait]
impl EngagementStore for PgStore {
    async fn cast_vote(&self, video: Uuid, user: Uuid, kind: VoteKind) -> Result<VoteTally> {
        sqlx::query(
            "INSERT INTO votes (video_id, user_id, kind, created_at) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (video_id, user_id) \
             DO UPDATE SET kind = EXCLUDED.kind, created_at = EXCLUDED.created_at",
        )
        .bind(video)
        .bind(user)
        .bind(kind.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        let (likes, dislikes) = self.tally(video).await?;
        Ok(VoteTally::new(likes, dislikes, Some(kind)))
    }

    async fn vote_of(&self, video: Uuid, user: Uuid) -> Result<Option<VoteKind>> {
        let kind: Option<String> =
            sqlx::query_scalar("SELECT kind FROM votes WHERE video_id = $1 AND user_id = $2")
                .bind(video)
                .bind(user)
                .fetch_optional(&self.pool)
                .await?;
        kind.map(|k| k.parse::<VoteKind>().map_err(AppError::DatabaseError))
            .transpose()
    }

    async fn tally(&self, video: Uuid) -> Result<(i64, i64)> {
        let counts: (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*) FILTER (WHERE kind = 'like'), COUNT(*) FILTER (WHERE kind = 'dislike') \
             FROM votes WHERE video_id = $1",
        )
        .bind(video)
        .fetch_one(&self.pool)
        .await?;
        Ok(counts)
    }

    async fn append_comment(&self, video: Uuid, user: Uuid, text: &str) -> Result<CommentEntry> {
        let entry = CommentEntry {
            user_id: user,
            comment: text.to_string(),
            created_at: Utc::now(),
        };
        // Single statement: creates the thread or appends to it.
        sqlx::query(
            "INSERT INTO comment_threads (video_id, entries) VALUES ($1, jsonb_build_array($2::jsonb)) \
             ON CONFLICT (video_id) \
             DO UPDATE SET entries = comment_threads.entries || EXCLUDED.entries",
        )
        .bind(video)
        .bind(Json(&entry))
        .execute(&self.pool)
        .await?;
        Ok(entry)
    }

    async fn comments(&self, video: Uuid) -> Result<Vec<CommentEntry>> {
        let entries: Option<Json<Vec<CommentEntry>>> =
            sqlx::query_scalar("SELECT entries FROM comment_threads WHERE video_id = $1")
                .bind(video)
                .fetch_optional(&self.pool)
                .await?;
        Ok(entries.map(|Json(entries)| entries).unwrap_or_default())
    }

    async fn creator_like_counts(&self, creator: Uuid) -> Result<Vec<CreatorVideo>> {
        let rows = sqlx::query_as::<_, CreatorVideoRow>(
            "SELECT v.id, v.title, v.url, v.description, v.public_id, v.created_at, \
                    COUNT(l.user_id) FILTER (WHERE l.kind = 'like') AS like_count \
             FROM videos v \
             LEFT JOIN votes l ON l.video_id = v.id \
             WHERE v.creator_id = $1 \
             GROUP BY v.id \
             ORDER BY v.created_at DESC, v.id DESC",
        )
        .bind(creator)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| CreatorVideo {
                id: row.id,
                title: row.title,
                url: row.url,
                description: row.description,
                public_id: row.public_id,
                created_at: row.created_at,
                like_count: row.like_count,
            })
            .collect())
    }
}
