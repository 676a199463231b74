use std::sync::Arc;

pub mod config;
pub mod error;
pub mod gate;
pub mod handlers;
pub mod mail;
pub mod media;
pub mod models;
pub mod password;
pub mod services;
pub mod store;
pub mod token;

use crate::config::Config;
use crate::mail::Mailer;
use crate::media::MediaHost;
use crate::store::{AccountStore, EngagementStore, VideoStore};
use crate::token::TokenService;

/// Shared, read-only application state. Mutable data lives behind the stores.
pub struct AppState {
    pub config: Arc<Config>,
    pub tokens: TokenService,
    pub accounts: Arc<dyn AccountStore>,
    pub videos: Arc<dyn VideoStore>,
    pub engagement: Arc<dyn EngagementStore>,
    pub media: Arc<dyn MediaHost>,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    /// Builds the state around one backend that serves all three stores.
    pub fn new<S>(config: Config, store: Arc<S>, media: Arc<dyn MediaHost>, mailer: Arc<dyn Mailer>) -> Self
    where
        S: AccountStore + VideoStore + EngagementStore + 'static,
    {
        Self {
            tokens: TokenService::from_config(&config),
            config: Arc::new(config),
            accounts: store.clone(),
            videos: store.clone(),
            engagement: store,
            media,
            mailer,
        }
    }
}

#[cfg(test)]
use crate::config::{AdminConfig, SmtpConfig, StorageConfig};

#[cfg(test)]
#[allow(dead_code)]
#[path = "../tests/common/shared_config.rs"]
mod shared_config;
