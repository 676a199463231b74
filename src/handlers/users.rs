use actix_web::http::header::AUTHORIZATION;
use actix_web::{delete, get, post, web, HttpRequest, HttpResponse};
use log::{error, info, warn};
use serde_json::json;
use uuid::Uuid;

use crate::error::AppError;
use crate::gate::{Gate, Identity};
use crate::mail::{creator_invitation, creator_reinvitation, invitation_link};
use crate::models::{
    normalize_email, AccountSummary, CreatorLoginRequest, LoginRequest, NewAccount,
    RegisterRequest, ResendInvitationRequest, Role, UserSearchQuery,
};
use crate::token::{bearer, TokenError, TokenKind};
use crate::{password, AppState};

type HandlerResult = Result<HttpResponse, AppError>;

fn validate_registration(req: &RegisterRequest) -> Result<(), AppError> {
    if req.username.trim().is_empty() {
        return Err(AppError::ValidationError("Username is required".to_string()));
    }
    let email = req.email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::ValidationError("A valid email is required".to_string()));
    }
    password::validate(&req.password)
}

async fn create_account(state: &AppState, req: &RegisterRequest, role: Role) -> Result<crate::models::Account, AppError> {
    validate_registration(req)?;
    if state.accounts.find_by_email(&req.email).await?.is_some() {
        return Err(AppError::Conflict("User already exists".to_string()));
    }
    let password_hash = password::hash(&req.password, state.config.bcrypt_cost)?;
    state
        .accounts
        .create(NewAccount::new(&req.username, &req.email, password_hash, role))
        .await
}

#[post("/users/consumer/register")]
async fn register(req: web::Json<RegisterRequest>, state: web::Data<AppState>) -> HandlerResult {
    let account = create_account(&state, &req, Role::Consumer).await?;
    info!("Registered consumer {} ({})", account.username, account.id);

    Ok(HttpResponse::Created().json(json!({
        "message": "User registered successfully",
        "user": account
    })))
}

#[post("/users/consumer/login")]
async fn login(req: web::Json<LoginRequest>, state: web::Data<AppState>) -> HandlerResult {
    let invalid = || AppError::Unauthorized("Invalid email or password".to_string());

    let account = state.accounts.find_by_email(&req.email).await?.ok_or_else(invalid)?;
    if !password::verify(&req.password, &account.password_hash) {
        return Err(invalid());
    }
    // Creators sign in through their invitation link.
    match account.role {
        Role::Consumer => {}
        Role::Creator | Role::Admin => return Err(invalid()),
    }

    let token = state.tokens.issue_session(&account.id.to_string(), account.role)?;
    Ok(HttpResponse::Ok().json(json!({
        "message": "Login successful",
        "token": token
    })))
}

#[post("/users/admin/login")]
async fn admin_login(req: web::Json<LoginRequest>, state: web::Data<AppState>) -> HandlerResult {
    let admin = &state.config.admin;
    if normalize_email(&req.email) != normalize_email(&admin.email) || req.password != admin.password {
        warn!("Failed admin login for {}", req.email);
        return Err(AppError::Unauthorized("Invalid email or password".to_string()));
    }

    let token = state.tokens.issue_session(&admin.id, Role::Admin)?;
    Ok(HttpResponse::Ok().json(json!({
        "message": "Login successful",
        "token": token
    })))
}

#[post("/users/admin/register-creator", wrap = "Gate::admin()")]
async fn register_creator(req: web::Json<RegisterRequest>, state: web::Data<AppState>) -> HandlerResult {
    let account = create_account(&state, &req, Role::Creator).await?;
    info!("Admin registered creator {} ({})", account.username, account.id);

    let token = state.tokens.issue_invitation(&account.id.to_string())?;
    let login_url = invitation_link(&state.config.client_url, &token);
    let body = creator_invitation(&account.email, &req.password, &login_url);

    let email_sent = match state
        .mailer
        .send(&account.email, "Creator Account Created - Login Information", &body)
        .await
    {
        Ok(()) => true,
        Err(e) => {
            error!("Failed to send invitation to {}: {}", account.email, e);
            false
        }
    };

    let message = if email_sent {
        "Creator user registered successfully, email sent"
    } else {
        "Creator user registered successfully, email could not be sent"
    };
    Ok(HttpResponse::Created().json(json!({
        "message": message,
        "user": account,
        "emailSent": email_sent
    })))
}

#[post("/users/admin/refresh-token", wrap = "Gate::admin()")]
async fn resend_invitation(req: web::Json<ResendInvitationRequest>, state: web::Data<AppState>) -> HandlerResult {
    let account = state
        .accounts
        .find_by_email(&req.email)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
    if account.role != Role::Creator {
        return Err(AppError::Forbidden("Access denied. Creator account required.".to_string()));
    }

    let token = state.tokens.issue_invitation(&account.id.to_string())?;
    let login_url = invitation_link(&state.config.client_url, &token);
    state
        .mailer
        .send(
            &account.email,
            "Creator Account Refresh - Login Information",
            &creator_reinvitation(&account.email, &login_url),
        )
        .await?;
    info!("Re-sent invitation to creator {}", account.id);

    Ok(HttpResponse::Ok().json(json!({
        "message": "Refresh Token Email Sent"
    })))
}

#[get("/users/admin/creators/all", wrap = "Gate::admin()")]
async fn list_creators(state: web::Data<AppState>) -> HandlerResult {
    let creators = state.accounts.list_by_role(Role::Creator).await?;
    Ok(HttpResponse::Ok().json(creators))
}

#[get("/users/admin/dashboard", wrap = "Gate::admin()")]
async fn dashboard(state: web::Data<AppState>) -> HandlerResult {
    let creators = state.accounts.count_by_role(Role::Creator).await?;
    let users = state.accounts.count_by_role(Role::Consumer).await?;
    Ok(HttpResponse::Ok().json(json!({
        "creators": creators,
        "users": users
    })))
}

#[post("/users/creator/login")]
async fn creator_login(req: web::Json<CreatorLoginRequest>, state: web::Data<AppState>) -> HandlerResult {
    let token = req
        .token
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| AppError::Unauthorized("Unauthorized access".to_string()))?;

    let claims = match state.tokens.verify(token, TokenKind::Invitation) {
        Ok(claims) => claims,
        Err(TokenError::Expired) => {
            return Ok(HttpResponse::Unauthorized().json(json!({
                "err": "Login link expired"
            })));
        }
        Err(TokenError::Invalid) => {
            return Err(AppError::Unauthorized("Invalid token".to_string()));
        }
    };

    let creator_required = || AppError::Forbidden("Access denied. Creator account required.".to_string());
    let id = Uuid::parse_str(&claims.sub).map_err(|_| creator_required())?;
    let account = state
        .accounts
        .find_by_id(id)
        .await?
        .filter(|a| a.role == Role::Creator)
        .ok_or_else(creator_required)?;

    if account.email != normalize_email(&req.email)
        || !password::verify(&req.password, &account.password_hash)
    {
        return Err(AppError::Unauthorized("Invalid Account".to_string()));
    }

    let session = state.tokens.issue_session(&account.id.to_string(), account.role)?;
    info!("Creator {} signed in with an invitation link", account.id);
    Ok(HttpResponse::Ok().json(json!({
        "message": "Login successful",
        "token": session
    })))
}

#[get("/users/me")]
async fn me(http_req: HttpRequest, state: web::Data<AppState>) -> HandlerResult {
    let unauthorized = || AppError::Unauthorized("Unauthorized".to_string());
    let token = http_req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(bearer)
        .ok_or_else(unauthorized)?;
    let claims = state.tokens.verify(token, TokenKind::Session)?;

    let admin = &state.config.admin;
    match claims.role {
        Role::Admin if claims.sub == admin.id => Ok(HttpResponse::Ok().json(json!({
            "id": admin.id,
            "email": admin.email,
            "username": "Admin",
            "role": Role::Admin
        }))),
        Role::Admin => Err(unauthorized()),
        Role::Creator | Role::Consumer => {
            let id = Uuid::parse_str(&claims.sub).map_err(|_| unauthorized())?;
            let account = state
                .accounts
                .find_by_id(id)
                .await?
                .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
            Ok(HttpResponse::Ok().json(account))
        }
    }
}

#[get("/users/search")]
async fn search_users(query: web::Query<UserSearchQuery>, state: web::Data<AppState>) -> HandlerResult {
    let term = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::ValidationError("Search query is required".to_string()))?;

    let users: Vec<AccountSummary> = state
        .accounts
        .search_by_username(term)
        .await?
        .iter()
        .map(AccountSummary::from)
        .collect();
    Ok(HttpResponse::Ok().json(users))
}

#[get("/users/{user_id}")]
async fn get_user(path: web::Path<Uuid>, state: web::Data<AppState>) -> HandlerResult {
    let account = state
        .accounts
        .find_by_id(path.into_inner())
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
    Ok(HttpResponse::Ok().json(account))
}

#[get("/users/{user_id}/details")]
async fn user_details(path: web::Path<Uuid>, state: web::Data<AppState>) -> HandlerResult {
    let account = state
        .accounts
        .find_by_id(path.into_inner())
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
    let videos = state.engagement.creator_like_counts(account.id).await?;

    Ok(HttpResponse::Ok().json(json!({
        "user": AccountSummary::from(&account),
        "videos": videos
    })))
}

#[delete("/users/{user_id}", wrap = "Gate::admin()")]
async fn delete_user(path: web::Path<Uuid>, identity: Identity, state: web::Data<AppState>) -> HandlerResult {
    let user_id = path.into_inner();
    if !state.accounts.delete(user_id).await? {
        return Err(AppError::NotFound("User not found".to_string()));
    }
    info!("Admin {} deleted account {}", identity.subject, user_id);
    Ok(HttpResponse::Ok().json(json!({
        "message": "User deleted successfully"
    })))
}

/// Fixed paths are registered ahead of `/users/{user_id}`.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(register)
        .service(login)
        .service(admin_login)
        .service(register_creator)
        .service(resend_invitation)
        .service(list_creators)
        .service(dashboard)
        .service(creator_login)
        .service(me)
        .service(search_users)
        .service(user_details)
        .service(get_user)
        .service(delete_user);
}
