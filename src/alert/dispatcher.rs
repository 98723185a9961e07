//! # Alert Dispatcher
//!
//! Notifies the operator when an unrecognized caller shows up.
//! Delivery is best-effort: failures are recorded as ERROR audit events and
//! never reach the request that triggered the alert.

use std::sync::Arc;

use super::email::{MailMessage, MailSender};
use crate::observability::AuditLog;

const ALERT_SUBJECT: &str = "New device detected";

pub struct AlertDispatcher {
    sender: Arc<dyn MailSender>,
    recipient: String,
    audit: Arc<AuditLog>,
}

impl AlertDispatcher {
    pub fn new(sender: Arc<dyn MailSender>, recipient: impl Into<String>, audit: Arc<AuditLog>) -> Self {
        Self {
            sender,
            recipient: recipient.into(),
            audit,
        }
    }

    /// Render the alert for a caller identity.
    pub fn render(&self, identity: &str) -> MailMessage {
        MailMessage {
            recipient: self.recipient.clone(),
            subject: ALERT_SUBJECT.to_string(),
            body: format!("Someone tried to access your files from {}", identity),
        }
    }

    /// Send one alert. Never fails; a transport error becomes an ERROR event.
    ///
    /// No lock is held while the sender runs.
    pub async fn notify(&self, identity: &str) {
        let message = self.render(identity);
        if let Err(e) = self.sender.send(&message).await {
            self.audit
                .error(format!("Alert delivery failed for {}: {}", identity, e));
        }
    }
}
