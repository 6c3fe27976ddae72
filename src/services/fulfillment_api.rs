//! Client for the fulfillment service (claim record creation).

use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

const SERVICE: &str = "fulfillment-api";

/// Payload for `POST /add-fulfillment`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddFulfillmentRequest {
    pub user_mail: String,
    pub claim_id: String,
    pub mail_content: String,
    #[serde(default)]
    pub attachment_count: u32,
    #[serde(default)]
    pub local_attachment_paths: Vec<String>,
    /// "pending" or "completed".
    pub fulfillment_status: String,
    #[serde(default)]
    pub missing_items: Option<String>,
    #[serde(default)]
    pub mail_content_file_id: Option<String>,
    #[serde(default)]
    pub attachment_file_ids: Vec<String>,
}

#[derive(Deserialize)]
struct AddFulfillmentResponse {
    #[serde(default)]
    success: bool,
    fulfillment_id: Option<String>,
}

/// Records claim fulfillment state.
pub struct FulfillmentClient {
    client: reqwest::Client,
    base_url: String,
}

impl FulfillmentClient {
    pub fn new(base_url: &str) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
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

    /// Record a claim. Returns the fulfillment record ID.
    pub async fn add_fulfillment(
        &self,
        request: &AddFulfillmentRequest,
    ) -> Result<String, ServiceError> {
        let url = format!("{}/add-fulfillment", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| ServiceError::RequestFailed {
                service: SERVICE.into(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::BadStatus {
                service: SERVICE.into(),
                status: status.as_u16(),
                body,
            });
        }

        let parsed: AddFulfillmentResponse =
            response
                .json()
                .await
                .map_err(|e| ServiceError::InvalidResponse {
                    service: SERVICE.into(),
                    reason: e.to_string(),
                })?;

        match (parsed.success, parsed.fulfillment_id) {
            (true, Some(id)) => Ok(id),
            _ => Err(ServiceError::InvalidResponse {
                service: SERVICE.into(),
                reason: "missing fulfillment_id in response".into(),
            }),
        }
    }

    pub async fn health(&self) -> Result<(), ServiceError> {
        let url = format!("{}/health", self.base_url);
        let response = self
            .client
            .get(&url)
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
