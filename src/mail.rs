use async_trait::async_trait;
use html_escape::{encode_double_quoted_attribute, encode_safe};
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use log::{info, warn};

use crate::config::SmtpConfig;
use crate::error::{AppError, Result};

/// Outbound mail. Single attempt, no delivery tracking.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<()>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let from = config
            .from
            .parse::<Mailbox>()
            .map_err(|e| AppError::MailError(format!("invalid SMTP_FROM address: {}", e)))?;

        let builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
            .map_err(|e| AppError::MailError(format!("failed to configure SMTP transport: {}", e)))?
            .port(config.port);

        let builder = match (&config.username, &config.password) {
            (Some(username), Some(password)) => {
                builder.credentials(Credentials::new(username.clone(), password.clone()))
            }
            _ => builder,
        };

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<()> {
        let to = to
            .parse::<Mailbox>()
            .map_err(|e| AppError::ValidationError(format!("Invalid email address: {}", e)))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to.clone())
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html_body.to_string())
            .map_err(|e| AppError::MailError(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| AppError::MailError(e.to_string()))?;
        info!("Sent '{}' to {}", subject, to);
        Ok(())
    }
}

/// Used when no SMTP host is configured.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, _html_body: &str) -> Result<()> {
        warn!("SMTP not configured; dropping '{}' to {}", subject, to);
        Ok(())
    }
}

pub fn invitation_link(client_url: &str, token: &str) -> String {
    format!(
        "{}/creator/login?token={}",
        client_url.trim_end_matches('/'),
        urlencoding::encode(token)
    )
}

pub fn creator_invitation(email: &str, password: &str, login_url: &str) -> String {
    format!(
        "<p>Your creator account has been created. Login with the following details:</p>\
         <p>Email: {}<br>Password: {}</p>\
         <p><a href=\"{}\" target=\"_blank\">Click here to login</a></p>",
        encode_safe(email),
        encode_safe(password),
        encode_double_quoted_attribute(login_url),
    )
}

pub fn creator_reinvitation(email: &str, login_url: &str) -> String {
    format!(
        "<p>Your creator account has been refreshed. Login with the following details:</p>\
         <p>Email: {}</p>\
         <p><a href=\"{}\" target=\"_blank\">Click here to login</a></p>",
        encode_safe(email),
        encode_double_quoted_attribute(login_url),
    )
}
