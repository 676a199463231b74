#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use actix_web::{test, web, App};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use uuid::Uuid;

use video_sharing_backend::config::{AdminConfig, Config, SmtpConfig, StorageConfig};
use video_sharing_backend::error::Result;
use video_sharing_backend::handlers;
use video_sharing_backend::mail::Mailer;
use video_sharing_backend::media::{HostedAsset, MediaHost};
use video_sharing_backend::store::MemoryStore;
use video_sharing_backend::AppState;

mod shared_config;
pub use shared_config::{test_config, ADMIN_EMAIL, ADMIN_PASSWORD};

#[derive(Debug, Clone)]
pub struct SentMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Keeps every message so tests can follow invitation links.
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<SentMail>>,
}

impl RecordingMailer {
    /// Token carried by the most recent invitation link sent to `to`.
    pub fn invitation_token(&self, to: &str) -> Option<String> {
        let sent = self.sent.lock();
        let mail = sent.iter().rev().find(|m| m.to == to)?;
        let start = mail.body.find("token=")? + "token=".len();
        let rest = &mail.body[start..];
        let end = rest.find(|c: char| c == '"' || c == '<' || c.is_whitespace()).unwrap_or(rest.len());
        urlencoding::decode(&rest[..end]).ok().map(|t| t.into_owned())
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<()> {
        self.sent.lock().push(SentMail {
            to: to.to_string(),
            subject: subject.to_string(),
            body: html_body.to_string(),
        });
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ReceivedUpload {
    pub path: PathBuf,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Reads the spooled file at upload time and remembers what it saw.
#[derive(Default)]
pub struct RecordingMediaHost {
    pub uploads: Mutex<Vec<ReceivedUpload>>,
    pub deleted: Mutex<Vec<String>>,
}

#[async_trait]
impl MediaHost for RecordingMediaHost {
    async fn upload(&self, path: &Path, content_type: &str) -> Result<HostedAsset> {
        let bytes = tokio::fs::read(path).await?;
        self.uploads.lock().push(ReceivedUpload {
            path: path.to_path_buf(),
            content_type: content_type.to_string(),
            bytes,
        });
        let public_id = format!("videos/{}", Uuid::new_v4());
        Ok(HostedAsset {
            url: format!("http://localhost:9000/{}", public_id),
            public_id,
        })
    }

    async fn delete(&self, public_id: &str) -> Result<()> {
        self.deleted.lock().push(public_id.to_string());
        Ok(())
    }
}

pub struct TestContext {
    pub state: web::Data<AppState>,
    pub store: Arc<MemoryStore>,
    pub mailer: Arc<RecordingMailer>,
    pub media: Arc<RecordingMediaHost>,
}

pub fn test_context() -> TestContext {
    let store = Arc::new(MemoryStore::new());
    let mailer = Arc::new(RecordingMailer::default());
    let media = Arc::new(RecordingMediaHost::default());
    let state = AppState::new(test_config(), store.clone(), media.clone(), mailer.clone());
    TestContext {
        state: web::Data::new(state),
        store,
        mailer,
        media,
    }
}

pub async fn setup_test_app(
    ctx: &TestContext,
) -> impl actix_web::dev::Service<
    actix_http::Request,
    Response = actix_web::dev::ServiceResponse,
    Error = actix_web::Error,
> {
    test::init_service(
        App::new()
            .app_data(ctx.state.clone())
            .configure(handlers::configure_routes),
    )
    .await
}

pub fn unique(prefix: &str) -> String {
    format!("{}_{}", prefix, &Uuid::new_v4().simple().to_string()[..8])
}

pub async fn read_json(resp: actix_web::dev::ServiceResponse) -> Value {
    let body = test::read_body(resp).await;
    serde_json::from_slice(&body).unwrap_or(Value::Null)
}

pub fn bearer(token: &str) -> (&'static str, String) {
    ("Authorization", format!("Bearer {}", token))
}

pub async fn register_consumer<S>(app: &S, username: &str, email: &str, password: &str) -> Value
where
    S: actix_web::dev::Service<actix_http::Request, Response = actix_web::dev::ServiceResponse, Error = actix_web::Error>,
{
    let req = test::TestRequest::post()
        .uri("/users/consumer/register")
        .set_json(json!({ "username": username, "email": email, "password": password }))
        .to_request();
    let resp = test::call_service(app, req).await;
    assert_eq!(resp.status(), 201);
    read_json(resp).await
}

/// Registers a consumer and returns `(user id, session token)`.
pub async fn consumer_session<S>(app: &S) -> (String, String)
where
    S: actix_web::dev::Service<actix_http::Request, Response = actix_web::dev::ServiceResponse, Error = actix_web::Error>,
{
    let name = unique("viewer");
    let email = format!("{}@example.com", name);
    let body = register_consumer(app, &name, &email, "password123").await;
    let id = body["user"]["id"].as_str().unwrap_or_default().to_string();

    let req = test::TestRequest::post()
        .uri("/users/consumer/login")
        .set_json(json!({ "email": email, "password": "password123" }))
        .to_request();
    let resp = test::call_service(app, req).await;
    assert_eq!(resp.status(), 200);
    let token = read_json(resp).await["token"].as_str().unwrap_or_default().to_string();
    (id, token)
}

pub async fn admin_token<S>(app: &S) -> String
where
    S: actix_web::dev::Service<actix_http::Request, Response = actix_web::dev::ServiceResponse, Error = actix_web::Error>,
{
    let req = test::TestRequest::post()
        .uri("/users/admin/login")
        .set_json(json!({ "email": ADMIN_EMAIL, "password": ADMIN_PASSWORD }))
        .to_request();
    let resp = test::call_service(app, req).await;
    assert_eq!(resp.status(), 200);
    read_json(resp).await["token"].as_str().unwrap_or_default().to_string()
}

/// Runs the full invitation flow and returns `(creator id, session token)`.
pub async fn creator_session<S>(app: &S, ctx: &TestContext) -> (String, String)
where
    S: actix_web::dev::Service<actix_http::Request, Response = actix_web::dev::ServiceResponse, Error = actix_web::Error>,
{
    let admin = admin_token(app).await;
    let name = unique("creator");
    let email = format!("{}@example.com", name);

    let req = test::TestRequest::post()
        .uri("/users/admin/register-creator")
        .insert_header(bearer(&admin))
        .set_json(json!({ "username": name, "email": email, "password": "creator-pass" }))
        .to_request();
    let resp = test::call_service(app, req).await;
    assert_eq!(resp.status(), 201);
    let id = read_json(resp).await["user"]["id"].as_str().unwrap_or_default().to_string();

    let invitation = ctx.mailer.invitation_token(&email).expect("invitation mail was sent");
    let req = test::TestRequest::post()
        .uri("/users/creator/login")
        .set_json(json!({ "email": email, "password": "creator-pass", "token": invitation }))
        .to_request();
    let resp = test::call_service(app, req).await;
    assert_eq!(resp.status(), 200);
    let token = read_json(resp).await["token"].as_str().unwrap_or_default().to_string();
    (id, token)
}

pub const BOUNDARY: &str = "----videosharingtestboundary";

/// Builds a multipart body with text fields and an optional video part.
pub fn multipart_body(fields: &[(&str, &str)], video: Option<&[u8]>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    if let Some(bytes) = video {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"video\"; filename=\"clip.mp4\"\r\nContent-Type: video/mp4\r\n\r\n",
                BOUNDARY
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn multipart_content_type() -> (&'static str, String) {
    ("Content-Type", format!("multipart/form-data; boundary={}", BOUNDARY))
}

/// Uploads a video as the given creator and returns the stored record.
pub async fn upload_video<S>(app: &S, token: &str, title: &str, tags: &str) -> Value
where
    S: actix_web::dev::Service<actix_http::Request, Response = actix_web::dev::ServiceResponse, Error = actix_web::Error>,
{
    let req = test::TestRequest::post()
        .uri("/videos/upload")
        .insert_header(bearer(token))
        .insert_header(multipart_content_type())
        .set_payload(multipart_body(
            &[("title", title), ("description", "a test clip"), ("tags", tags), ("hashtags", "#test")],
            Some(b"fake mp4 bytes"),
        ))
        .to_request();
    let resp = test::call_service(app, req).await;
    assert_eq!(resp.status(), 201);
    read_json(resp).await["video"].clone()
}
