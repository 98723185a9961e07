//! # Operator Alerts
//!
//! Out-of-band notification on unrecognized callers.

pub mod dispatcher;
pub mod email;
pub mod errors;

pub use dispatcher::AlertDispatcher;
pub use email::{
    create_mail_sender, ConsoleMailSender, EmailConfig, MailMessage, MailSender,
    RecordingMailSender, SmtpMailSender,
};
pub use errors::{AlertError, AlertResult};
