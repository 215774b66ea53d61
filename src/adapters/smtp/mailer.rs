use async_trait::async_trait;
use lettre::message::{header::ContentType, Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;

use crate::application::ports::{AlertMessage, MailTransportPort};
use crate::domain::errors::{DomainError, DomainResult};

#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub timeout: Duration,
}

/// Transporte SMTP con STARTTLS y autenticación por usuario/contraseña.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(settings: &SmtpSettings) -> anyhow::Result<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)?
            .port(settings.port)
            .credentials(Credentials::new(settings.username.clone(), settings.password.clone()))
            .timeout(Some(settings.timeout))
            .build();
        Ok(Self { transport })
    }
}

pub fn build_message(alert: &AlertMessage) -> DomainResult<Message> {
    let from: Mailbox = alert
        .from
        .parse()
        .map_err(|e| DomainError::Notification(format!("remitente inválido {}: {e}", alert.from)))?;
    let to: Mailbox = alert
        .to
        .parse()
        .map_err(|e| DomainError::Notification(format!("destinatario inválido {}: {e}", alert.to)))?;

    let mut parts = MultiPart::mixed().singlepart(SinglePart::plain(alert.body.clone()));
    if let Some(att) = &alert.attachment {
        let content_type = ContentType::parse(&att.content_type)
            .map_err(|e| DomainError::Notification(format!("content-type inválido: {e}")))?;
        parts = parts.singlepart(Attachment::new(att.filename.clone()).body(att.bytes.clone(), content_type));
    }

    Message::builder()
        .from(from)
        .to(to)
        .subject(alert.subject.clone())
        .multipart(parts)
        .map_err(|e| DomainError::Notification(e.to_string()))
}

#[async_trait]
impl MailTransportPort for SmtpMailer {
    async fn send(&self, message: AlertMessage) -> DomainResult<()> {
        let email = build_message(&message)?;
        self.transport
            .send(email)
            .await
            .map(|_| ())
            .map_err(|e| DomainError::Notification(e.to_string()))
    }
}
