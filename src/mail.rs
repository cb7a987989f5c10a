use std::sync::{Arc, Mutex};

use askama::Template;
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use tracing::{info, warn};

use crate::config::MailConfig;
use crate::error::{AppError, AppResult};

#[derive(Template)]
#[template(path = "email/confirm.txt")]
pub struct ConfirmEmail<'a> {
    pub username: &'a str,
    pub link: &'a str,
}

#[derive(Template)]
#[template(path = "email/reset_password.txt")]
pub struct ResetPasswordEmail<'a> {
    pub username: &'a str,
    pub link: &'a str,
}

#[derive(Template)]
#[template(path = "email/change_email.txt")]
pub struct ChangeEmailEmail<'a> {
    pub username: &'a str,
    pub link: &'a str,
}

/// A message as handed to the transport.
#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Clone)]
enum Transport {
    Smtp(Arc<AsyncSmtpTransport<Tokio1Executor>>),
    /// No server configured: messages are only logged.
    Log,
    /// Messages are kept in memory; used by tests.
    Memory(Arc<Mutex<Vec<OutgoingEmail>>>),
}

/// Sends plain-text mail over SMTP, or logs it when no server is set.
#[derive(Clone)]
pub struct Mailer {
    transport: Transport,
    from: Mailbox,
    subject_prefix: String,
}

impl Mailer {
    pub fn from_config(config: &MailConfig) -> AppResult<Self> {
        let from = config
            .sender
            .parse::<Mailbox>()
            .map_err(|e| AppError::Internal(format!("Invalid mail sender address: {}", e)))?;

        let transport = match config.server.as_deref().map(str::trim) {
            None | Some("") => {
                warn!("MAIL_SERVER not configured; outgoing mail will only be logged");
                Transport::Log
            }
            Some(host) => {
                let builder = if config.use_tls {
                    AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                } else {
                    Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host))
                }
                .map_err(|e| {
                    AppError::Internal(format!("Failed to configure SMTP transport: {}", e))
                })?
                .port(config.port);

                let builder = if let (Some(username), Some(password)) =
                    (&config.username, &config.password)
                {
                    builder.credentials(Credentials::new(username.clone(), password.clone()))
                } else {
                    builder
                };
                Transport::Smtp(Arc::new(builder.build()))
            }
        };

        Ok(Self {
            transport,
            from,
            subject_prefix: config.subject_prefix.clone(),
        })
    }

    /// A mailer that records every message instead of sending it.
    pub fn in_memory(config: &MailConfig) -> AppResult<Self> {
        let mut mailer = Self::from_config(&MailConfig {
            server: None,
            ..config.clone()
        })?;
        mailer.transport = Transport::Memory(Arc::new(Mutex::new(Vec::new())));
        Ok(mailer)
    }

    /// Messages captured by an in-memory mailer; empty for other transports.
    pub fn sent(&self) -> Vec<OutgoingEmail> {
        match &self.transport {
            Transport::Memory(outbox) => outbox.lock().map(|o| o.clone()).unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    /// Queue a message. SMTP delivery happens on a detached task; failures
    /// are logged and never reach the caller.
    pub fn send(&self, to: &str, subject: &str, body: String) {
        let email = OutgoingEmail {
            to: to.to_string(),
            subject: format!("{} {}", self.subject_prefix, subject),
            body,
        };

        match &self.transport {
            Transport::Log => {
                info!(
                    to = %email.to,
                    subject = %email.subject,
                    body = %email.body,
                    "Mail running in log-only mode; skipping send"
                );
            }
            Transport::Memory(outbox) => {
                if let Ok(mut outbox) = outbox.lock() {
                    outbox.push(email);
                }
            }
            Transport::Smtp(transport) => {
                let transport = transport.clone();
                let from = self.from.clone();
                tokio::spawn(async move {
                    if let Err(e) = deliver(&transport, from, &email).await {
                        tracing::error!(to = %email.to, "Failed to send mail: {}", e);
                    }
                });
            }
        }
    }

    /// Render `template` and queue it.
    pub fn send_template<T: Template>(&self, to: &str, subject: &str, template: &T) -> AppResult<()> {
        let body = template
            .render()
            .map_err(|e| AppError::Internal(format!("Failed to render email: {}", e)))?;
        self.send(to, subject, body);
        Ok(())
    }
}

async fn deliver(
    transport: &AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    email: &OutgoingEmail,
) -> AppResult<()> {
    let to = email
        .to
        .parse::<Mailbox>()
        .map_err(|e| AppError::Internal(format!("Invalid recipient address: {}", e)))?;

    let message = Message::builder()
        .from(from)
        .to(to)
        .subject(email.subject.clone())
        .header(header::ContentType::TEXT_PLAIN)
        .body(email.body.clone())
        .map_err(|e| AppError::Internal(format!("Failed to build message: {}", e)))?;

    transport
        .send(message)
        .await
        .map_err(|e| AppError::Internal(format!("SMTP error: {}", e)))?;
    info!(subject = %email.subject, "Mail sent");
    Ok(())
}
