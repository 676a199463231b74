use std::collections::HashMap;
use std::path::PathBuf;

use actix_multipart::{Field, Multipart};
use actix_web::{delete, get, post, put, web, HttpRequest, HttpResponse};
use chrono::Utc;
use futures::TryStreamExt;
use log::{info, warn};
use serde::Serialize;
use serde_json::json;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::error::AppError;
use crate::gate::{optional_identity, Gate, Identity};
use crate::models::{
    format_count, split_list, AccountSummary, CommentRequest, CommentView, OwnerQuery, PageQuery,
    Pagination, Role, SearchQuery, Video, VideoListing, VideoPatch, VoteKind, VoteRequest,
};
use crate::AppState;

type HandlerResult = Result<HttpResponse, AppError>;

const DEFAULT_PAGE_SIZE: i64 = 10;
const MAX_PAGE_SIZE: i64 = 100;
const SEARCH_PAGE_SIZE: i64 = 10;
const MAX_TEXT_FIELD: usize = 64 * 1024;

/// Uploaded bytes spooled to disk. The file is removed when this is dropped.
struct TempUpload {
    path: PathBuf,
    content_type: String,
}

impl Drop for TempUpload {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove temporary upload {}: {}", self.path.display(), e);
            }
        }
    }
}

#[derive(Default)]
struct UploadForm {
    video: Option<TempUpload>,
    title: Option<String>,
    description: Option<String>,
    tags: Option<String>,
    hashtags: Option<String>,
}

async fn spool_to_disk(field: &mut Field) -> Result<TempUpload, AppError> {
    let upload = TempUpload {
        path: std::env::temp_dir().join(format!("upload-{}", Uuid::new_v4())),
        content_type: field
            .content_type()
            .map(|mime| mime.to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string()),
    };

    let mut file = tokio::fs::File::create(&upload.path).await?;
    while let Some(chunk) = field.try_next().await? {
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    Ok(upload)
}

async fn read_text(field: &mut Field) -> Result<String, AppError> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field.try_next().await? {
        if bytes.len() + chunk.len() > MAX_TEXT_FIELD {
            return Err(AppError::ValidationError("Form field too large".to_string()));
        }
        bytes.extend_from_slice(&chunk);
    }
    String::from_utf8(bytes).map_err(|_| AppError::ValidationError("Form fields must be UTF-8".to_string()))
}

async fn read_upload_form(mut payload: Multipart) -> Result<UploadForm, AppError> {
    let mut form = UploadForm::default();
    while let Some(mut field) = payload.try_next().await? {
        let name = field.content_disposition().get_name().unwrap_or_default().to_string();
        match name.as_str() {
            "video" => form.video = Some(spool_to_disk(&mut field).await?),
            "title" => form.title = Some(read_text(&mut field).await?),
            "description" => form.description = Some(read_text(&mut field).await?),
            "tags" => form.tags = Some(read_text(&mut field).await?),
            "hashtags" => form.hashtags = Some(read_text(&mut field).await?),
            _ => while field.try_next().await?.is_some() {},
        }
    }
    Ok(form)
}

#[post("/videos/upload", wrap = "Gate::role(Role::Creator)")]
async fn upload_video(payload: Multipart, identity: Identity, state: web::Data<AppState>) -> HandlerResult {
    let creator_id = identity.account_id()?;
    let form = read_upload_form(payload).await?;

    let upload = form
        .video
        .ok_or_else(|| AppError::ValidationError("No video file uploaded".to_string()))?;
    let title = form
        .title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::ValidationError("Title is required".to_string()))?;

    let asset = state.media.upload(&upload.path, &upload.content_type).await?;
    drop(upload);
    let public_id = asset.public_id.clone();

    let video = Video {
        id: Uuid::new_v4(),
        title,
        description: form.description.filter(|d| !d.trim().is_empty()),
        tags: form.tags.as_deref().map(split_list).unwrap_or_default(),
        hashtags: form.hashtags.as_deref().map(split_list).unwrap_or_default(),
        url: asset.url,
        public_id: asset.public_id,
        creator_id,
        created_at: Utc::now(),
    };

    let video = match state.videos.insert(video).await {
        Ok(video) => video,
        Err(e) => {
            // The record was never written; do not leave the asset behind.
            if let Err(cleanup) = state.media.delete(&public_id).await {
                warn!("Failed to remove orphaned asset {}: {}", public_id, cleanup);
            }
            return Err(e);
        }
    };
    info!("Creator {} uploaded video {}", creator_id, video.id);

    Ok(HttpResponse::Created().json(json!({
        "message": "Video uploaded successfully",
        "video": video
    })))
}

/// Row offset of a 1-based page. Pages past `i64` range are rejected.
fn page_offset(page: i64, per_page: i64) -> Result<i64, AppError> {
    (page - 1)
        .checked_mul(per_page)
        .ok_or_else(|| AppError::ValidationError("page is too large".to_string()))
}

/// Looks up account summaries for a set of ids in one store call.
async fn summaries(state: &AppState, mut ids: Vec<Uuid>) -> Result<HashMap<Uuid, AccountSummary>, AppError> {
    ids.sort_unstable();
    ids.dedup();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    Ok(state
        .accounts
        .find_many(&ids)
        .await?
        .iter()
        .map(|account| (account.id, AccountSummary::from(account)))
        .collect())
}

async fn with_creators(state: &AppState, videos: Vec<Video>) -> Result<Vec<VideoListing>, AppError> {
    let creators = summaries(state, videos.iter().map(|v| v.creator_id).collect()).await?;
    Ok(videos
        .into_iter()
        .map(|video| VideoListing {
            creator: creators.get(&video.creator_id).cloned(),
            video,
        })
        .collect())
}

#[get("/videos")]
async fn list_videos(query: web::Query<PageQuery>, state: web::Data<AppState>) -> HandlerResult {
    let page = query.page.unwrap_or(1);
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE);
    if page < 1 {
        return Err(AppError::ValidationError("page must be at least 1".to_string()));
    }
    if !(1..=MAX_PAGE_SIZE).contains(&limit) {
        return Err(AppError::ValidationError(format!("limit must be between 1 and {}", MAX_PAGE_SIZE)));
    }

    let offset = page_offset(page, limit)?;
    let total = state.videos.count(None).await?;
    let videos = with_creators(&state, state.videos.list_page(offset, limit).await?).await?;
    Ok(HttpResponse::Ok().json(json!({
        "videos": videos,
        "pagination": Pagination::new(page, limit, total)
    })))
}

#[get("/videos/search")]
async fn search_videos(query: web::Query<SearchQuery>, state: web::Data<AppState>) -> HandlerResult {
    let term = query
        .query
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::ValidationError("Search query is required".to_string()))?;
    let page = query.page.unwrap_or(1).max(1);
    let offset = page_offset(page, SEARCH_PAGE_SIZE)?;

    let videos = state.videos.search(term, offset, SEARCH_PAGE_SIZE).await?;
    let videos = with_creators(&state, videos).await?;
    Ok(HttpResponse::Ok().json(json!({ "videos": videos })))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VideoDetail {
    #[serde(flatten)]
    video: Video,
    creator: Option<AccountSummary>,
    next_id: Option<Uuid>,
    prev_id: Option<Uuid>,
    likes: String,
    dislikes: String,
    is_like: bool,
    is_dislike: bool,
}

#[derive(Serialize)]
struct VideoDetailResponse {
    video: VideoDetail,
    comments: Vec<CommentView>,
}

async fn video_detail(
    state: &AppState,
    video: Video,
    owner: Option<Uuid>,
    viewer: Option<Uuid>,
) -> Result<VideoDetailResponse, AppError> {
    let (prev_id, next_id) = state.videos.neighbours(&video, owner).await?;
    let (likes, dislikes) = state.engagement.tally(video.id).await?;
    let vote = match viewer {
        Some(user) => state.engagement.vote_of(video.id, user).await?,
        None => None,
    };
    let entries = state.engagement.comments(video.id).await?;

    let mut ids: Vec<Uuid> = entries.iter().map(|c| c.user_id).collect();
    ids.push(video.creator_id);
    let people = summaries(state, ids).await?;
    let creator = people.get(&video.creator_id).cloned();
    let comments = entries
        .into_iter()
        .map(|entry| CommentView {
            user: people.get(&entry.user_id).cloned(),
            entry,
        })
        .collect();

    Ok(VideoDetailResponse {
        video: VideoDetail {
            video,
            creator,
            next_id,
            prev_id,
            likes: format_count(likes),
            dislikes: format_count(dislikes),
            is_like: vote == Some(VoteKind::Like),
            is_dislike: vote == Some(VoteKind::Dislike),
        },
        comments,
    })
}

fn viewer_of(state: &AppState, req: &HttpRequest) -> Option<Uuid> {
    optional_identity(state, req).and_then(|identity| identity.account_id().ok())
}

#[get("/videos/random")]
async fn random_video(
    http_req: HttpRequest,
    query: web::Query<OwnerQuery>,
    state: web::Data<AppState>,
) -> HandlerResult {
    let video = state
        .videos
        .random(query.owner)
        .await?
        .ok_or_else(|| AppError::NotFound("No videos available".to_string()))?;
    let detail = video_detail(&state, video, query.owner, viewer_of(&state, &http_req)).await?;
    Ok(HttpResponse::Ok().json(detail))
}

#[get("/videos/{video_id}")]
async fn get_video(
    http_req: HttpRequest,
    path: web::Path<Uuid>,
    query: web::Query<OwnerQuery>,
    state: web::Data<AppState>,
) -> HandlerResult {
    let video = state
        .videos
        .find(path.into_inner(), query.owner)
        .await?
        .ok_or_else(|| AppError::NotFound("Video not found".to_string()))?;
    let detail = video_detail(&state, video, query.owner, viewer_of(&state, &http_req)).await?;
    Ok(HttpResponse::Ok().json(detail))
}

#[post("/videos/like-dislike", wrap = "Gate::any_authenticated()")]
async fn like_or_dislike(req: web::Json<VoteRequest>, identity: Identity, state: web::Data<AppState>) -> HandlerResult {
    let kind: VoteKind = req
        .kind
        .parse()
        .map_err(|_| AppError::ValidationError("Invalid action type".to_string()))?;
    let user_id = identity.account_id()?;
    if state.videos.find(req.video_id, None).await?.is_none() {
        return Err(AppError::NotFound("Video not found".to_string()));
    }

    let stats = state.engagement.cast_vote(req.video_id, user_id, kind).await?;
    info!("User {} {}d video {}", user_id, kind.as_str(), req.video_id);
    Ok(HttpResponse::Created().json(json!({
        "success": format!("Video {}d successfully", kind.as_str()),
        "stats": stats
    })))
}

#[post("/videos/comment", wrap = "Gate::any_authenticated()")]
async fn add_comment(req: web::Json<CommentRequest>, identity: Identity, state: web::Data<AppState>) -> HandlerResult {
    let text = req.comment.trim();
    if text.is_empty() {
        return Err(AppError::ValidationError("Comment text is required".to_string()));
    }
    let user_id = identity.account_id()?;
    if state.videos.find(req.video_id, None).await?.is_none() {
        return Err(AppError::NotFound("Video not found".to_string()));
    }

    let comment = state.engagement.append_comment(req.video_id, user_id, text).await?;
    Ok(HttpResponse::Created().json(json!({
        "success": "Comment added successfully",
        "comment": comment
    })))
}

/// Loads a video and checks the caller owns it.
async fn owned_video(state: &AppState, video_id: Uuid, identity: &Identity, action: &str) -> Result<Video, AppError> {
    let video = state
        .videos
        .find(video_id, None)
        .await?
        .ok_or_else(|| AppError::NotFound("Video not found".to_string()))?;
    if video.creator_id != identity.account_id()? {
        return Err(AppError::Forbidden(format!("Unauthorized to {} this video", action)));
    }
    Ok(video)
}

#[put("/videos/{video_id}", wrap = "Gate::role(Role::Creator)")]
async fn update_video(
    path: web::Path<Uuid>,
    req: web::Json<VideoPatch>,
    identity: Identity,
    state: web::Data<AppState>,
) -> HandlerResult {
    let video = owned_video(&state, path.into_inner(), &identity, "update").await?;
    let video = state
        .videos
        .update(video.id, req.into_inner())
        .await?
        .ok_or_else(|| AppError::NotFound("Video not found".to_string()))?;

    Ok(HttpResponse::Ok().json(json!({
        "message": "Video updated successfully",
        "video": video
    })))
}

#[delete("/videos/{video_id}", wrap = "Gate::role(Role::Creator)")]
async fn delete_video(path: web::Path<Uuid>, identity: Identity, state: web::Data<AppState>) -> HandlerResult {
    let video = owned_video(&state, path.into_inner(), &identity, "delete").await?;
    if !state.videos.delete(video.id).await? {
        return Err(AppError::NotFound("Video not found".to_string()));
    }
    // Votes and the comment thread are left in place.
    if let Err(e) = state.media.delete(&video.public_id).await {
        warn!("Video {} deleted but its asset {} was not: {}", video.id, video.public_id, e);
    }
    info!("Creator {} deleted video {}", identity.subject, video.id);

    Ok(HttpResponse::Ok().json(json!({
        "message": "Video deleted successfully"
    })))
}

/// `/videos/search` and `/videos/random` must precede `/videos/{video_id}`.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(upload_video)
        .service(list_videos)
        .service(search_videos)
        .service(random_video)
        .service(like_or_dislike)
        .service(add_comment)
        .service(get_video)
        .service(update_video)
        .service(delete_video);
}
