//! Client for the outbound mail service.

use serde::Serialize;

use crate::error::ServiceError;

const SERVICE: &str = "mail-service";

/// Sends customer-facing emails through the mail service.
pub struct MailServiceClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct MailRequest<'a> {
    mail_id: &'a str,
    subject: &'a str,
    mail_content: &'a str,
}

impl MailServiceClient {
    pub fn new(base_url: &str) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| ServiceError::RequestFailed {
                service: SERVICE.into(),
                reason: format!("Failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Send an email to the given recipient.
    pub async fn send_mail(
        &self,
        mail_id: &str,
        subject: &str,
        mail_content: &str,
    ) -> Result<(), ServiceError> {
        let url = format!("{}/send-mail", self.base_url);
        let body = MailRequest {
            mail_id,
            subject,
            mail_content,
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::RequestFailed {
                service: SERVICE.into(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(to = mail_id, subject, "Mail service accepted email");
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(ServiceError::BadStatus {
                service: SERVICE.into(),
                status: status.as_u16(),
                body,
            })
        }
    }

    pub async fn health(&self) -> Result<(), ServiceError> {
        let response = self
            .client
            .get(format!("{}/", self.base_url))
            .send()
            .await
            .map_err(|e| ServiceError::RequestFailed {
                service: SERVICE.into(),
                reason: e.to_string(),
            })?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(ServiceError::BadStatus {
                service: SERVICE.into(),
                status: response.status().as_u16(),
                body: String::new(),
            })
        }
    }
}
