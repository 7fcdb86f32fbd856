use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use thiserror::Error;

use crate::config::MailConfig;

/// One outbound attachment, already read into memory.
#[derive(Debug, Clone)]
pub struct MailAttachment {
    pub filename: String,
    pub content: Vec<u8>,
}

/// One outbound message. The sender address belongs to the transport, not
/// the message.
#[derive(Debug, Clone)]
pub struct MailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachments: Vec<MailAttachment>,
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail transport is not configured (MAIL_API_ENDPOINT / MAIL_API_KEY)")]
    MissingCredentials,
    #[error("mail transport failed: {0}")]
    Transport(String),
    #[error("mail transport rejected the message (HTTP {status})")]
    Rejected { status: u16 },
}

/// Outbound mail capability injected into the submission pipeline so the
/// core stays testable without a live transport. The shipped backend posts
/// to a transactional-email HTTP API; an SMTP bridge would implement the
/// same trait.
#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, message: MailMessage) -> Result<(), MailError>;
}

/// Thin client for a transactional-email HTTP API taking multipart form
/// submissions (from/to/subject/text plus attachment parts).
pub struct HttpApiMailer {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    sender: String,
}

impl HttpApiMailer {
    pub fn from_config(config: &MailConfig) -> Result<Self, MailError> {
        let (Some(endpoint), Some(api_key)) = (config.endpoint.clone(), config.api_key.clone())
        else {
            return Err(MailError::MissingCredentials);
        };

        Ok(Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key,
            sender: config.sender.clone(),
        })
    }
}

impl std::fmt::Debug for HttpApiMailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpApiMailer")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl MailSender for HttpApiMailer {
    async fn send(&self, message: MailMessage) -> Result<(), MailError> {
        let mut form = Form::new()
            .text("from", self.sender.clone())
            .text("to", message.to)
            .text("subject", message.subject)
            .text("text", message.body);

        for attachment in message.attachments {
            let mime = mime_guess::from_path(&attachment.filename).first_or_octet_stream();
            let part = Part::bytes(attachment.content)
                .file_name(attachment.filename)
                .mime_str(mime.essence_str())
                .map_err(|err| MailError::Transport(err.to_string()))?;
            form = form.part("attachment", part);
        }

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|err| MailError::Transport(err.to_string()))?;

        if !response.status().is_success() {
            return Err(MailError::Rejected {
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }
}

/// Discards every message. Lets the offline fill command and tests drive
/// the document pipeline without a transport.
#[derive(Debug, Default, Clone)]
pub struct NullMailer;

#[async_trait]
impl MailSender for NullMailer {
    async fn send(&self, _message: MailMessage) -> Result<(), MailError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mailer_requires_endpoint_and_key() {
        let partial = MailConfig {
            endpoint: Some("https://mail.example/send".to_string()),
            api_key: None,
            sender: "forms@example".to_string(),
        };
        assert!(matches!(
            HttpApiMailer::from_config(&partial),
            Err(MailError::MissingCredentials)
        ));

        let complete = MailConfig {
            endpoint: Some("https://mail.example/send".to_string()),
            api_key: Some("secret".to_string()),
            sender: "forms@example".to_string(),
        };
        assert!(HttpApiMailer::from_config(&complete).is_ok());
    }
}
