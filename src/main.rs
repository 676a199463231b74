use actix_cors::Cors;
use actix_web::middleware::Logger;
use actix_web::{http, web, App, HttpServer};
use dotenv::dotenv;
use log::{error, info};

use video_sharing_backend::config::Config;
use video_sharing_backend::{handlers, services};

fn startup_error(context: &str, err: impl std::fmt::Display) -> std::io::Error {
    error!("{}: {}", context, err);
    std::io::Error::new(std::io::ErrorKind::Other, format!("{}: {}", context, err))
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = Config::from_env().map_err(|e| startup_error("Invalid configuration", e))?;
    let bind_addr = config.bind_addr.clone();
    let allowed_origins = config.cors_allowed_origins.clone();

    let state = services::build_state(config)
        .await
        .map_err(|e| startup_error("Failed to initialise services", e))?;
    let state = web::Data::new(state);

    info!("Starting HTTP server on {}", bind_addr);
    HttpServer::new(move || {
        let mut cors = Cors::default()
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allowed_headers(vec![http::header::CONTENT_TYPE, http::header::AUTHORIZATION])
            .supports_credentials();
        for origin in &allowed_origins {
            cors = cors.allowed_origin(origin);
        }

        App::new()
            .wrap(cors)
            .wrap(Logger::default())
            .app_data(state.clone())
            .configure(handlers::configure_routes)
    })
    .bind(bind_addr.as_str())?
    .run()
    .await
}
