//! Request-level access control.
//!
//! `Gate` wraps a route and runs [`authorize`] before the handler. On success the
//! caller's [`Identity`] is attached to the request and can be extracted by handlers.

use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::header::AUTHORIZATION;
use actix_web::{web, Error, FromRequest, HttpMessage, HttpRequest};
use futures::future::{ready, Ready};
use log::warn;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::Role;
use crate::token::{bearer, TokenKind};
use crate::AppState;

/// The authenticated caller, as decoded from the session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub subject: String,
    pub role: Role,
}

impl Identity {
    /// Account id of a stored (non-admin) caller.
    pub fn account_id(&self) -> Result<Uuid, AppError> {
        Uuid::parse_str(&self.subject)
            .map_err(|_| AppError::Unauthorized("Invalid token".to_string()))
    }
}

/// What a route requires of its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    pub required: Option<Role>,
    pub allow_any: bool,
}

pub async fn authorize(
    state: &AppState,
    authorization: Option<&str>,
    policy: Policy,
) -> Result<Identity, AppError> {
    let token = authorization
        .and_then(bearer)
        .ok_or_else(|| AppError::Unauthorized("Authentication token required".to_string()))?;

    let claims = state.tokens.verify(token, TokenKind::Session)?;
    let identity = Identity {
        subject: claims.sub,
        role: claims.role,
    };

    match policy.required {
        Some(Role::Admin) => match identity.role {
            Role::Admin => Ok(identity),
            Role::Creator | Role::Consumer => Err(AppError::Forbidden("Access denied".to_string())),
        },
        Some(Role::Creator) | Some(Role::Consumer) | None => {
            let id = identity.account_id()?;
            let account = state
                .accounts
                .find_by_id(id)
                .await?
                .ok_or_else(|| AppError::Unauthorized("User not found".to_string()))?;

            if !policy.allow_any && policy.required.map_or(false, |role| role != account.role) {
                return Err(AppError::Forbidden("Access denied".to_string()));
            }
            // The stored role wins over a stale claim.
            Ok(Identity {
                subject: account.id.to_string(),
                role: account.role,
            })
        }
    }
}

/// Resolves the caller if a valid session token is present; anonymous otherwise.
pub fn optional_identity(state: &AppState, req: &HttpRequest) -> Option<Identity> {
    let header = req.headers().get(AUTHORIZATION)?.to_str().ok()?;
    let claims = state.tokens.verify(bearer(header)?, TokenKind::Session).ok()?;
    Some(Identity {
        subject: claims.sub,
        role: claims.role,
    })
}

/// Middleware factory: `Gate::new(required_role, allow_any_authenticated)`.
#[derive(Debug, Clone, Copy)]
pub struct Gate {
    policy: Policy,
}

impl Gate {
    pub fn new(required: Option<Role>, allow_any: bool) -> Self {
        Self {
            policy: Policy { required, allow_any },
        }
    }

    pub fn admin() -> Self {
        Self::new(Some(Role::Admin), false)
    }

    pub fn role(role: Role) -> Self {
        Self::new(Some(role), false)
    }

    pub fn any_authenticated() -> Self {
        Self::new(None, true)
    }
}

impl<S, B> Transform<S, ServiceRequest> for Gate
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = GateMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(GateMiddleware {
            service: Rc::new(service),
            policy: self.policy,
        }))
    }
}

pub struct GateMiddleware<S> {
    service: Rc<S>,
    policy: Policy,
}

impl<S, B> Service<ServiceRequest> for GateMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let policy = self.policy;

        Box::pin(async move {
            let state = req
                .app_data::<web::Data<AppState>>()
                .cloned()
                .ok_or_else(|| AppError::InternalError("application state missing".to_string()))?;

            let authorization = req
                .headers()
                .get(AUTHORIZATION)
                .and_then(|h| h.to_str().ok())
                .map(str::to_owned);

            let identity = authorize(&state, authorization.as_deref(), policy)
                .await
                .map_err(|e| {
                    warn!("Rejected {} {}: {}", req.method(), req.path(), e);
                    e
                })?;

            req.extensions_mut().insert(identity);
            service.call(req).await
        })
    }
}

impl FromRequest for Identity {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<Identity>()
                .cloned()
                .ok_or_else(|| AppError::Unauthorized("Authentication token required".to_string())),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewAccount;
    use crate::test_support::test_state;

    async fn account(state: &AppState, name: &str, role: Role) -> String {
        let account = state
            .accounts
            .create(NewAccount::new(name, &format!("{}@example.com", name), "hash".into(), role))
            .await
            .unwrap();
        let token = state.tokens.issue_session(&account.id.to_string(), role).unwrap();
        format!("Bearer {}", token)
    }

    #[tokio::test]
    async fn missing_or_garbled_credentials_are_unauthorized() {
        let state = test_state();
        let policy = Gate::any_authenticated().policy;
        assert!(matches!(authorize(&state, None, policy).await, Err(AppError::Unauthorized(_))));
        assert!(matches!(
            authorize(&state, Some("Bearer nope"), policy).await,
            Err(AppError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn consumer_tokens_only_pass_open_gates() {
        let state = test_state();
        let header = account(&state, "alice", Role::Consumer).await;

        let creator_gate = Gate::role(Role::Creator).policy;
        let admin_gate = Gate::admin().policy;
        let open_gate = Gate::any_authenticated().policy;

        assert!(matches!(
            authorize(&state, Some(header.as_str()), creator_gate).await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            authorize(&state, Some(header.as_str()), admin_gate).await,
            Err(AppError::Forbidden(_))
        ));
        let identity = authorize(&state, Some(header.as_str()), open_gate).await.unwrap();
        assert_eq!(identity.role, Role::Consumer);
    }

    #[tokio::test]
    async fn admin_gate_checks_the_claim_without_a_lookup() {
        let state = test_state();
        let token = state.tokens.issue_session(&state.config.admin.id, Role::Admin).unwrap();
        let header = format!("Bearer {}", token);

        let identity = authorize(&state, Some(header.as_str()), Gate::admin().policy).await.unwrap();
        assert_eq!(identity.subject, state.config.admin.id);
        // Admin is not a stored account.
        assert!(matches!(
            authorize(&state, Some(header.as_str()), Gate::any_authenticated().policy).await,
            Err(AppError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn deleted_accounts_lose_access() {
        let state = test_state();
        let header = account(&state, "carol", Role::Consumer).await;
        let id = authorize(&state, Some(header.as_str()), Gate::any_authenticated().policy)
            .await
            .unwrap()
            .account_id()
            .unwrap();
        assert!(state.accounts.delete(id).await.unwrap());

        assert!(matches!(
            authorize(&state, Some(header.as_str()), Gate::any_authenticated().policy).await,
            Err(AppError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn expired_sessions_report_expiry() {
        let state = test_state();
        let token = state
            .tokens
            .issue("someone", Role::Consumer, TokenKind::Session, chrono::Duration::hours(-2))
            .unwrap();
        let header = format!("Bearer {}", token);
        assert!(matches!(
            authorize(&state, Some(header.as_str()), Gate::any_authenticated().policy).await,
            Err(AppError::TokenExpired)
        ));
    }
}
