use std::cmp::Reverse;
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::Rng;
use uuid::Uuid;

use super::{AccountStore, EngagementStore, VideoStore};
use crate::error::{AppError, Result};
use crate::models::{
    normalize_email, Account, CommentEntry, CreatorVideo, NewAccount, Role, Video, VideoPatch,
    VoteKind, VoteTally,
};

#[derive(Default)]
struct Inner {
    accounts: HashMap<Uuid, Account>,
    videos: HashMap<Uuid, Video>,
    votes: HashMap<(Uuid, Uuid), (VoteKind, DateTime<Utc>)>,
    threads: HashMap<Uuid, Vec<CommentEntry>>,
}

impl Inner {
    /// Videos in scope, newest first.
    fn videos_newest_first(&self, owner: Option<Uuid>) -> Vec<&Video> {
        let mut videos: Vec<&Video> = self
            .videos
            .values()
            .filter(|v| owner.map_or(true, |o| v.creator_id == o))
            .collect();
        videos.sort_by_key(|v| Reverse((v.created_at, v.id)));
        videos
    }

    fn tally(&self, video: Uuid) -> (i64, i64) {
        self.votes
            .iter()
            .filter(|((v, _), _)| *v == video)
            .fold((0, 0), |(likes, dislikes), (_, (kind, _))| match kind {
                VoteKind::Like => (likes + 1, dislikes),
                VoteKind::Dislike => (likes, dislikes + 1),
            })
    }
}

/// Process-local store. Every operation runs under one lock, so upserts and appends are atomic.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored vote records for a video.
    pub fn vote_records(&self, video: Uuid) -> usize {
        self.inner.lock().votes.keys().filter(|(v, _)| *v == video).count()
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn create(&self, account: NewAccount) -> Result<Account> {
        let mut inner = self.inner.lock();
        let taken = inner
            .accounts
            .values()
            .any(|a| a.email == account.email || a.username == account.username);
        if taken {
            return Err(AppError::Conflict("User already exists".to_string()));
        }

        let created = Account {
            id: Uuid::new_v4(),
            username: account.username,
            email: account.email,
            password_hash: account.password_hash,
            role: account.role,
            created_at: Utc::now(),
        };
        inner.accounts.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>> {
        Ok(self.inner.lock().accounts.get(&id).cloned())
    }

    async fn find_many(&self, ids: &[Uuid]) -> Result<Vec<Account>> {
        let inner = self.inner.lock();
        Ok(ids.iter().filter_map(|id| inner.accounts.get(id).cloned()).collect())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>> {
        let email = normalize_email(email);
        Ok(self.inner.lock().accounts.values().find(|a| a.email == email).cloned())
    }

    async fn list_by_role(&self, role: Role) -> Result<Vec<Account>> {
        let mut accounts: Vec<Account> = self
            .inner
            .lock()
            .accounts
            .values()
            .filter(|a| a.role == role)
            .cloned()
            .collect();
        accounts.sort_by_key(|a| a.created_at);
        Ok(accounts)
    }

    async fn count_by_role(&self, role: Role) -> Result<i64> {
        Ok(self.inner.lock().accounts.values().filter(|a| a.role == role).count() as i64)
    }

    async fn search_by_username(&self, term: &str) -> Result<Vec<Account>> {
        let needle = term.to_lowercase();
        let mut accounts: Vec<Account> = self
            .inner
            .lock()
            .accounts
            .values()
            .filter(|a| a.username.to_lowercase().contains(&needle))
            .cloned()
            .collect();
        accounts.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(accounts)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let mut inner = self.inner.lock();
        if inner.videos.values().any(|v| v.creator_id == id) {
            return Err(AppError::Conflict(
                "Operation conflicts with related records".to_string(),
            ));
        }
        Ok(inner.accounts.remove(&id).is_some())
    }
}

#[async_trait]
impl VideoStore for MemoryStore {
    async fn insert(&self, video: Video) -> Result<Video> {
        let mut inner = self.inner.lock();
        match inner.accounts.get(&video.creator_id).map(|a| a.role) {
            Some(Role::Creator) => {}
            Some(Role::Admin) | Some(Role::Consumer) => {
                return Err(AppError::Forbidden(
                    "Access denied. Only creators can upload videos.".to_string(),
                ))
            }
            None => return Err(AppError::NotFound("Creator not found".to_string())),
        }
        inner.videos.insert(video.id, video.clone());
        Ok(video)
    }

    async fn find(&self, id: Uuid, owner: Option<Uuid>) -> Result<Option<Video>> {
        Ok(self
            .inner
            .lock()
            .videos
            .get(&id)
            .filter(|v| owner.map_or(true, |o| v.creator_id == o))
            .cloned())
    }

    async fn update(&self, id: Uuid, patch: VideoPatch) -> Result<Option<Video>> {
        let mut inner = self.inner.lock();
        Ok(inner.videos.get_mut(&id).map(|video| {
            patch.apply(video);
            video.clone()
        }))
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self.inner.lock().videos.remove(&id).is_some())
    }

    async fn count(&self, owner: Option<Uuid>) -> Result<i64> {
        Ok(self.inner.lock().videos_newest_first(owner).len() as i64)
    }

    async fn random(&self, owner: Option<Uuid>) -> Result<Option<Video>> {
        let inner = self.inner.lock();
        let videos = inner.videos_newest_first(owner);
        if videos.is_empty() {
            return Ok(None);
        }
        let offset = rand::thread_rng().gen_range(0..videos.len());
        Ok(videos.get(offset).map(|v| (*v).clone()))
    }

    async fn list_page(&self, offset: i64, limit: i64) -> Result<Vec<Video>> {
        Ok(self
            .inner
            .lock()
            .videos_newest_first(None)
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn search(&self, term: &str, offset: i64, limit: i64) -> Result<Vec<Video>> {
        let needle = term.to_lowercase();
        let hit = |field: &str| field.to_lowercase().contains(&needle);
        Ok(self
            .inner
            .lock()
            .videos_newest_first(None)
            .into_iter()
            .filter(|v| {
                hit(&v.title) || v.tags.iter().any(|t| hit(t)) || v.hashtags.iter().any(|h| hit(h))
            })
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn neighbours(&self, video: &Video, owner: Option<Uuid>) -> Result<(Option<Uuid>, Option<Uuid>)> {
        let inner = self.inner.lock();
        let key = (video.created_at, video.id);
        let scoped = inner.videos_newest_first(owner);
        let prev = scoped
            .iter()
            .filter(|v| (v.created_at, v.id) < key)
            .max_by_key(|v| (v.created_at, v.id))
            .map(|v| v.id);
        let next = scoped
            .iter()
            .filter(|v| (v.created_at, v.id) > key)
            .min_by_key(|v| (v.created_at, v.id))
            .map(|v| v.id);
        Ok((prev, next))
    }
}

#[async_trait]
impl EngagementStore for MemoryStore {
    async fn cast_vote(&self, video: Uuid, user: Uuid, kind: VoteKind) -> Result<VoteTally> {
        let mut inner = self.inner.lock();
        inner.votes.insert((video, user), (kind, Utc::now()));
        let (likes, dislikes) = inner.tally(video);
        Ok(VoteTally::new(likes, dislikes, Some(kind)))
    }

    async fn vote_of(&self, video: Uuid, user: Uuid) -> Result<Option<VoteKind>> {
        Ok(self.inner.lock().votes.get(&(video, user)).map(|(kind, _)| *kind))
    }

    async fn tally(&self, video: Uuid) -> Result<(i64, i64)> {
        Ok(self.inner.lock().tally(video))
    }

    async fn append_comment(&self, video: Uuid, user: Uuid, text: &str) -> Result<CommentEntry> {
        let entry = CommentEntry {
            user_id: user,
            comment: text.to_string(),
            created_at: Utc::now(),
        };
        self.inner
            .lock()
            .threads
            .entry(video)
            .or_default()
            .push(entry.clone());
        Ok(entry)
    }

    async fn comments(&self, video: Uuid) -> Result<Vec<CommentEntry>> {
        Ok(self.inner.lock().threads.get(&video).cloned().unwrap_or_default())
    }

    async fn creator_like_counts(&self, creator: Uuid) -> Result<Vec<CreatorVideo>> {
        let inner = self.inner.lock();
        Ok(inner
            .videos_newest_first(Some(creator))
            .into_iter()
            .map(|v| CreatorVideo {
                id: v.id,
                title: v.title.clone(),
                url: v.url.clone(),
                description: v.description.clone(),
                public_id: v.public_id.clone(),
                created_at: v.created_at,
                like_count: inner.tally(v.id).0,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn creator(store: &MemoryStore, name: &str) -> Account {
        AccountStore::create(
            store,
            NewAccount::new(name, &format!("{}@example.com", name), "hash".into(), Role::Creator),
        )
        .await
        .unwrap()
    }

    fn video(creator: Uuid, title: &str, age_secs: i64) -> Video {
        Video {
            id: Uuid::new_v4(),
            title: title.to_string(),
            description: None,
            tags: vec!["rust".into()],
            hashtags: vec!["#async".into()],
            url: format!("https://media.example.com/{}", title),
            public_id: format!("videos/{}", title),
            creator_id: creator,
            created_at: Utc::now() - chrono::Duration::seconds(age_secs),
        }
    }

    #[tokio::test]
    async fn duplicate_email_or_username_conflicts() {
        let store = MemoryStore::new();
        creator(&store, "bob").await;
        let same_email = NewAccount::new("robert", "BOB@example.com", "h".into(), Role::Consumer);
        let same_name = NewAccount::new("bob", "other@example.com", "h".into(), Role::Consumer);
        assert!(matches!(AccountStore::create(&store, same_email).await, Err(AppError::Conflict(_))));
        assert!(matches!(AccountStore::create(&store, same_name).await, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn second_vote_replaces_the_first() {
        let store = MemoryStore::new();
        let (video, user) = (Uuid::new_v4(), Uuid::new_v4());

        let first = store.cast_vote(video, user, VoteKind::Like).await.unwrap();
        assert_eq!(first, VoteTally::new(1, 0, Some(VoteKind::Like)));

        let second = store.cast_vote(video, user, VoteKind::Dislike).await.unwrap();
        assert_eq!(second.likes, 0);
        assert_eq!(second.dislikes, 1);
        assert!(second.is_dislike && !second.is_like);
        assert_eq!(store.vote_records(video), 1);
    }

    #[tokio::test]
    async fn comments_keep_insertion_order() {
        let store = MemoryStore::new();
        let video = Uuid::new_v4();
        let user = Uuid::new_v4();
        for i in 0..5 {
            store.append_comment(video, user, &format!("comment {}", i)).await.unwrap();
        }
        let texts: Vec<String> = store.comments(video).await.unwrap().into_iter().map(|c| c.comment).collect();
        assert_eq!(texts, (0..5).map(|i| format!("comment {}", i)).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn random_on_an_empty_scope_is_none() {
        let store = MemoryStore::new();
        let bob = creator(&store, "bob").await;
        let alice = creator(&store, "alice").await;
        store.insert(video(alice.id, "a", 0)).await.unwrap();

        assert!(store.random(Some(bob.id)).await.unwrap().is_none());
        assert_eq!(store.random(Some(alice.id)).await.unwrap().unwrap().creator_id, alice.id);
    }

    #[tokio::test]
    async fn only_creators_own_videos() {
        let store = MemoryStore::new();
        let consumer = AccountStore::create(
            &store,
            NewAccount::new("carol", "carol@example.com", "h".into(), Role::Consumer),
        )
        .await
        .unwrap();
        assert!(matches!(store.insert(video(consumer.id, "x", 0)).await, Err(AppError::Forbidden(_))));
        assert!(matches!(store.insert(video(Uuid::new_v4(), "y", 0)).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn listing_search_and_neighbours_follow_creation_order() {
        let store = MemoryStore::new();
        let bob = creator(&store, "bob").await;
        let oldest = store.insert(video(bob.id, "Cats at home", 30)).await.unwrap();
        let middle = store.insert(video(bob.id, "Dogs outside", 20)).await.unwrap();
        let newest = store.insert(video(bob.id, "More CATS", 10)).await.unwrap();

        let page: Vec<Uuid> = store.list_page(0, 2).await.unwrap().iter().map(|v| v.id).collect();
        assert_eq!(page, vec![newest.id, middle.id]);

        let found: Vec<Uuid> = store.search("cats", 0, 10).await.unwrap().iter().map(|v| v.id).collect();
        assert_eq!(found, vec![newest.id, oldest.id]);

        assert_eq!(store.neighbours(&middle, None).await.unwrap(), (Some(oldest.id), Some(newest.id)));
        assert_eq!(store.neighbours(&oldest, None).await.unwrap(), (None, Some(middle.id)));
    }

    #[tokio::test]
    async fn creator_like_counts_only_count_likes() {
        let store = MemoryStore::new();
        let bob = creator(&store, "bob").await;
        let first = store.insert(video(bob.id, "first", 10)).await.unwrap();
        let second = store.insert(video(bob.id, "second", 0)).await.unwrap();
        store.cast_vote(first.id, Uuid::new_v4(), VoteKind::Like).await.unwrap();
        store.cast_vote(first.id, Uuid::new_v4(), VoteKind::Like).await.unwrap();
        store.cast_vote(first.id, Uuid::new_v4(), VoteKind::Dislike).await.unwrap();

        let counts = store.creator_like_counts(bob.id).await.unwrap();
        assert_eq!(counts.len(), 2);
        assert_eq!((counts[0].id, counts[0].like_count), (second.id, 0));
        assert_eq!((counts[1].id, counts[1].like_count), (first.id, 2));
    }

    #[tokio::test]
    async fn accounts_owning_videos_cannot_be_deleted() {
        let store = MemoryStore::new();
        let bob = creator(&store, "bob").await;
        let clip = store.insert(video(bob.id, "clip", 0)).await.unwrap();
        assert!(matches!(AccountStore::delete(&store, bob.id).await, Err(AppError::Conflict(_))));

        VideoStore::delete(&store, clip.id).await.unwrap();
        assert!(AccountStore::delete(&store, bob.id).await.unwrap());
        assert!(!AccountStore::delete(&store, bob.id).await.unwrap());
    }
}
