use actix_web::{get, web, HttpResponse, Responder};
use serde_json::json;

use crate::error::AppError;

pub mod users;
pub mod videos;

#[get("/status")]
async fn status() -> impl Responder {
    HttpResponse::Ok().json(json!({
        "status": "running"
    }))
}

/// Extractor rejections use the same `{error, code}` body as handler errors.
fn extractor_errors(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _req| {
        AppError::ValidationError(err.to_string()).into()
    }))
    .app_data(web::QueryConfig::default().error_handler(|err, _req| {
        AppError::ValidationError(err.to_string()).into()
    }))
    .app_data(web::PathConfig::default().error_handler(|err, _req| {
        AppError::NotFound(err.to_string()).into()
    }));
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    extractor_errors(cfg);
    cfg.service(status);
    users::configure_routes(cfg);
    videos::configure_routes(cfg);
}
