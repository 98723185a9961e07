//! # Mail Channel
//!
//! Outbound mail used for operator alerts.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::errors::{AlertError, AlertResult};
use crate::observability::Logger;

/// SMTP configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    /// SMTP server host
    pub smtp_host: String,

    /// SMTP server port (default: 587, STARTTLS)
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    /// SMTP username. Empty means an unauthenticated, unencrypted local relay.
    #[serde(default)]
    pub smtp_user: String,

    /// SMTP password (usually supplied via FILEKEEP_SMTP_PASSWORD)
    #[serde(default, skip_serializing)]
    pub smtp_password: String,

    /// From address
    pub from_email: String,

    /// From display name
    #[serde(default = "default_from_name")]
    pub from_name: String,

    /// Operator address receiving alerts
    pub to_email: String,
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from_name() -> String {
    "filekeep".to_string()
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: "localhost".to_string(),
            smtp_port: 1025,
            smtp_user: String::new(),
            smtp_password: String::new(),
            from_email: "filekeep@localhost".to_string(),
            from_name: default_from_name(),
            to_email: "admin@localhost".to_string(),
        }
    }
}

/// A rendered outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

/// Outbound mail channel.
#[async_trait]
pub trait MailSender: Send + Sync {
    /// Deliver one message.
    async fn send(&self, message: &MailMessage) -> AlertResult<()>;
}

/// SMTP sender backed by lettre.
pub struct SmtpMailSender {
    config: EmailConfig,
}

impl SmtpMailSender {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl MailSender for SmtpMailSender {
    async fn send(&self, message: &MailMessage) -> AlertResult<()> {
        use lettre::{
            message::header::ContentType, transport::smtp::authentication::Credentials,
            AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
        };

        let email = Message::builder()
            .from(
                format!("{} <{}>", self.config.from_name, self.config.from_email)
                    .parse()
                    .map_err(|e| AlertError::InvalidAddress(format!("from: {}", e)))?,
            )
            .to(message
                .recipient
                .parse()
                .map_err(|e| AlertError::InvalidAddress(format!("to: {}", e)))?)
            .subject(message.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())
            .map_err(|e| AlertError::Build(e.to_string()))?;

        let mailer = if self.config.smtp_user.is_empty() {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&self.config.smtp_host)
                .port(self.config.smtp_port)
                .build()
        } else {
            let creds = Credentials::new(
                self.config.smtp_user.clone(),
                self.config.smtp_password.clone(),
            );

            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.smtp_host)
                .map_err(|e| AlertError::Transport(format!("SMTP relay error: {}", e)))?
                .credentials(creds)
                .port(self.config.smtp_port)
                .build()
        };

        mailer
            .send(email)
            .await
            .map_err(|e| AlertError::Transport(e.to_string()))?;

        Ok(())
    }
}

/// Sender used when no SMTP relay is configured: alerts go to the console.
#[derive(Debug, Default)]
pub struct ConsoleMailSender;

#[async_trait]
impl MailSender for ConsoleMailSender {
    async fn send(&self, message: &MailMessage) -> AlertResult<()> {
        Logger::warn(
            "ALERT",
            &[
                ("body", &message.body),
                ("recipient", &message.recipient),
                ("subject", &message.subject),
            ],
        );
        Ok(())
    }
}

/// Sender that records every message, optionally failing each delivery.
#[derive(Debug, Default, Clone)]
pub struct RecordingMailSender {
    sent: Arc<Mutex<Vec<MailMessage>>>,
    fail_with: Option<String>,
}

impl RecordingMailSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sender whose every delivery fails with a transport error.
    /// Attempts are still recorded.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            sent: Arc::default(),
            fail_with: Some(reason.into()),
        }
    }

    /// Messages attempted so far
    pub fn sent(&self) -> Vec<MailMessage> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[async_trait]
impl MailSender for RecordingMailSender {
    async fn send(&self, message: &MailMessage) -> AlertResult<()> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.clone());
        match &self.fail_with {
            Some(reason) => Err(AlertError::Transport(reason.clone())),
            None => Ok(()),
        }
    }
}

/// Pick the sender for a deployment: SMTP when configured, console otherwise.
pub fn create_mail_sender(config: Option<EmailConfig>) -> Arc<dyn MailSender> {
    match config {
        Some(cfg) => Arc::new(SmtpMailSender::new(cfg)),
        None => Arc::new(ConsoleMailSender),
    }
}
