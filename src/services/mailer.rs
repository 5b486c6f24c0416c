//! Outgoing e-mail transports.
//!
//! `send` is blocking; callers on the async runtime go through
//! `tokio::task::spawn_blocking`.

use std::sync::Mutex;

use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use thiserror::Error;

use crate::config::{MailConfig, SmtpSettings};

#[derive(Error, Debug)]
pub enum MailError {
    #[error("invalid address: {0}")]
    Address(String),

    #[error("failed to build message: {0}")]
    Build(String),

    #[error("transport error: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

pub trait Mailer: Send + Sync {
    fn send(&self, mail: &OutgoingMail) -> Result<(), MailError>;
}

/// Pick the transport described by the configuration.
pub fn from_config(config: &MailConfig) -> Result<Box<dyn Mailer>, MailError> {
    match &config.smtp {
        Some(smtp) => Ok(Box::new(SmtpMailer::new(smtp, &config.from)?)),
        None => {
            tracing::info!("No SMTP host configured, e-mails will only be logged");
            Ok(Box::new(LogMailer))
        }
    }
}

pub struct SmtpMailer {
    transport: SmtpTransport,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(settings: &SmtpSettings, from: &str) -> Result<Self, MailError> {
        let from: Mailbox = from
            .parse()
            .map_err(|_| MailError::Address(from.to_string()))?;

        let mut builder = SmtpTransport::starttls_relay(&settings.host)
            .map_err(|e| MailError::Transport(e.to_string()))?
            .port(settings.port);

        if let (Some(user), Some(password)) = (&settings.user, &settings.password) {
            builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

impl Mailer for SmtpMailer {
    fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        let to: Mailbox = mail
            .to
            .parse()
            .map_err(|_| MailError::Address(mail.to.clone()))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(mail.subject.clone())
            .multipart(MultiPart::alternative_plain_html(
                mail.text.clone(),
                mail.html.clone(),
            ))
            .map_err(|e| MailError::Build(e.to_string()))?;

        self.transport
            .send(&message)
            .map_err(|e| MailError::Transport(e.to_string()))?;

        tracing::info!(to = %mail.to, subject = %mail.subject, "Sent e-mail");
        Ok(())
    }
}

/// Writes messages to the log instead of delivering them.
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        tracing::info!(
            to = %mail.to,
            subject = %mail.subject,
            body = %mail.text,
            "E-mail (not delivered, SMTP disabled)"
        );
        Ok(())
    }
}

/// Keeps sent messages in memory. Can be told to fail the next N sends.
#[derive(Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<OutgoingMail>>,
    failures_left: Mutex<usize>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, count: usize) {
        *self.failures_left.lock().unwrap_or_else(|e| e.into_inner()) = count;
    }

    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Mailer for MemoryMailer {
    fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        {
            let mut failures = self.failures_left.lock().unwrap_or_else(|e| e.into_inner());
            if *failures > 0 {
                *failures -= 1;
                return Err(MailError::Transport("simulated failure".into()));
            }
        }
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(mail.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mail() -> OutgoingMail {
        OutgoingMail {
            to: "ana@example.com".into(),
            subject: "Oi".into(),
            html: "<p>Oi</p>".into(),
            text: "Oi".into(),
        }
    }

    #[test]
    fn test_memory_mailer_records_and_fails_on_demand() {
        let mailer = MemoryMailer::new();
        mailer.fail_next(1);
        assert!(mailer.send(&mail()).is_err());
        assert!(mailer.send(&mail()).is_ok());
        assert_eq!(mailer.sent().len(), 1);
    }

    #[test]
    fn test_log_mailer_never_fails() {
        assert!(LogMailer.send(&mail()).is_ok());
    }
}
