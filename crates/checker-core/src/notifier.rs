//! Mail delivery backends.
//!
//! Both backends send the same [`Message`], rendered once per comic, so the
//! recipient cannot tell which one was used.

use anyhow::Context;
use async_trait::async_trait;
use base64::Engine as _;
use lettre::message::header::{ContentTransferEncoding, ContentType};
use lettre::message::{Attachment as MailAttachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use reqwest::Client;
use serde::Serialize;
use std::path::Path;
use tracing::info;

use crate::config::{Config, MailMethod, SmtpSettings};
use crate::error::{Error, Result};
use crate::message::{Attachment, Message};
use crate::models::Comic;

pub const SENDGRID_API_URL: &str = "https://api.sendgrid.com/v3/mail/send";

/// Delivers one comic to one recipient.
#[async_trait]
pub trait Notify {
    async fn send(&self, comic: &Comic, recipient: &str, attachment: Option<&Path>) -> Result<()>;
}

/// Backend chosen once from configuration
pub enum Notifier {
    Smtp(SmtpNotifier),
    SendGrid(SendGridNotifier),
}

impl Notifier {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        match config.mail_method {
            MailMethod::Smtp => Ok(Notifier::Smtp(SmtpNotifier::new(
                config.mail_from.clone(),
                config.smtp.clone(),
            ))),
            MailMethod::SendGrid => {
                let api_key = config
                    .sendgrid_api_key
                    .clone()
                    .context("XKCD_SENDGRID_API_KEY must be set to use sendgrid")?;
                let mut sendgrid = SendGridNotifier::new(config.mail_from.clone(), api_key)?;
                if let Some(url) = &config.sendgrid_api_url {
                    sendgrid = sendgrid.with_api_url(url.as_str());
                }
                Ok(Notifier::SendGrid(sendgrid))
            }
        }
    }

    pub fn method(&self) -> MailMethod {
        match self {
            Notifier::Smtp(_) => MailMethod::Smtp,
            Notifier::SendGrid(_) => MailMethod::SendGrid,
        }
    }
}

#[async_trait]
impl Notify for Notifier {
    async fn send(&self, comic: &Comic, recipient: &str, attachment: Option<&Path>) -> Result<()> {
        let mut message = Message::render(comic);
        if let Some(path) = attachment {
            message = message.with_attachment(Attachment::from_path(path)?);
        }

        info!(
            num = comic.num,
            title = %comic.title,
            method = %self.method(),
            attachment = message.attachment.is_some(),
            "Emailing comic"
        );

        match self {
            Notifier::Smtp(smtp) => smtp.deliver(&message, recipient).await,
            Notifier::SendGrid(sendgrid) => sendgrid.deliver(&message, recipient).await,
        }
    }
}

pub struct SmtpNotifier {
    from: String,
    settings: SmtpSettings,
}

impl SmtpNotifier {
    pub fn new(from: String, settings: SmtpSettings) -> Self {
        Self { from, settings }
    }

    pub fn build_email(&self, message: &Message, recipient: &str) -> Result<lettre::Message> {
        let from: Mailbox = self
            .from
            .parse()
            .map_err(|e| Error::Delivery(format!("Invalid sender address {:?}: {}", self.from, e)))?;
        let to: Mailbox = recipient
            .parse()
            .map_err(|e| Error::Delivery(format!("Invalid recipient address {:?}: {}", recipient, e)))?;

        // HTML lines run long, so that part is always base64
        let html = SinglePart::builder()
            .header(ContentType::TEXT_HTML)
            .header(ContentTransferEncoding::Base64)
            .body(message.html.clone());
        let body = MultiPart::alternative()
            .singlepart(SinglePart::plain(message.text.clone()))
            .singlepart(html);
        let builder = lettre::Message::builder()
            .from(from)
            .to(to)
            .subject(message.subject.clone());

        let email = match &message.attachment {
            Some(attachment) => {
                let content_type = ContentType::parse(&attachment.content_type).map_err(|e| {
                    Error::Delivery(format!(
                        "Invalid attachment type {}: {}",
                        attachment.content_type, e
                    ))
                })?;
                let part = MailAttachment::new(attachment.filename.clone())
                    .body(attachment.data.clone(), content_type);
                builder.multipart(MultiPart::mixed().multipart(body).singlepart(part))
            }
            None => builder.multipart(body),
        };

        email.map_err(|e| Error::Delivery(format!("Failed to build email: {}", e)))
    }

    async fn deliver(&self, message: &Message, recipient: &str) -> Result<()> {
        let email = self.build_email(message, recipient)?;

        let builder = if self.settings.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.settings.server).map_err(
                |e| Error::Delivery(format!("Invalid SMTP relay {}: {}", self.settings.server, e)),
            )?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&self.settings.server)
        };
        let mut builder = builder.port(self.settings.port);

        if self.settings.username.is_some() || self.settings.password.is_some() {
            builder = builder.credentials(Credentials::new(
                self.settings.username.clone().unwrap_or_default(),
                self.settings.password.clone().unwrap_or_default(),
            ));
        }

        // The session lives only for this call and is closed when the
        // transport drops, including on the error path.
        let transport = builder.build();
        transport.send(email).await.map_err(|e| {
            Error::Delivery(format!(
                "SMTP send via {}:{} failed: {}",
                self.settings.server, self.settings.port, e
            ))
        })?;

        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct SendGridRequest {
    personalizations: Vec<Personalization>,
    from: EmailAddress,
    subject: String,
    content: Vec<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<SendGridAttachment>,
}

#[derive(Debug, Serialize)]
struct Personalization {
    to: Vec<EmailAddress>,
}

#[derive(Debug, Serialize)]
struct EmailAddress {
    email: String,
}

#[derive(Debug, Serialize)]
struct Content {
    #[serde(rename = "type")]
    content_type: String,
    value: String,
}

#[derive(Debug, Serialize)]
struct SendGridAttachment {
    content: String,
    filename: String,
    #[serde(rename = "type")]
    content_type: String,
    disposition: String,
}

pub struct SendGridNotifier {
    client: Client,
    from: String,
    api_key: String,
    api_url: String,
}

impl SendGridNotifier {
    pub fn new(from: String, api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Delivery(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            from,
            api_key,
            api_url: SENDGRID_API_URL.to_string(),
        })
    }

    /// Point at a different mail-send endpoint (EU region, a local relay).
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    fn payload(&self, message: &Message, recipient: &str) -> SendGridRequest {
        let attachments = message
            .attachment
            .iter()
            .map(|a| SendGridAttachment {
                content: base64::engine::general_purpose::STANDARD.encode(&a.data),
                filename: a.filename.clone(),
                content_type: a.content_type.clone(),
                disposition: "attachment".to_string(),
            })
            .collect();

        SendGridRequest {
            personalizations: vec![Personalization {
                to: vec![EmailAddress {
                    email: recipient.to_string(),
                }],
            }],
            from: EmailAddress {
                email: self.from.clone(),
            },
            subject: message.subject.clone(),
            content: vec![
                Content {
                    content_type: "text/plain".to_string(),
                    value: message.text.clone(),
                },
                Content {
                    content_type: "text/html".to_string(),
                    value: message.html.clone(),
                },
            ],
            attachments,
        }
    }

    async fn deliver(&self, message: &Message, recipient: &str) -> Result<()> {
        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&self.payload(message, recipient))
            .send()
            .await
            .map_err(|e| Error::Delivery(format!("Failed to reach SendGrid: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("unknown error"));
            return Err(Error::Delivery(format!(
                "SendGrid API returned error: {} - {}",
                status, error_text
            )));
        }

        Ok(())
    }
}
