//! Client for the user-validator service (sender registration lookups).

use serde::Deserialize;

use crate::error::ServiceError;
use crate::store::UserRecord;

const SERVICE: &str = "user-validator";

/// Looks up policy holders by email.
pub struct UserValidatorClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct UserResponse {
    #[serde(default)]
    status: String,
    user: Option<UserRecord>,
}

impl UserValidatorClient {
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

    /// Check whether the sender is a registered user.
    ///
    /// `Ok(None)` means the service answered 404 (unregistered sender);
    /// network failures and other statuses are errors.
    pub async fn validate_user(&self, email: &str) -> Result<Option<UserRecord>, ServiceError> {
        let url = format!("{}/user/{}", self.base_url, email);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ServiceError::RequestFailed {
                service: SERVICE.into(),
                reason: e.to_string(),
            })?;

        match response.status() {
            reqwest::StatusCode::OK => {
                let parsed: UserResponse =
                    response
                        .json()
                        .await
                        .map_err(|e| ServiceError::InvalidResponse {
                            service: SERVICE.into(),
                            reason: e.to_string(),
                        })?;
                if parsed.status == "success"
                    && let Some(user) = parsed.user
                {
                    Ok(Some(user))
                } else {
                    Err(ServiceError::InvalidResponse {
                        service: SERVICE.into(),
                        reason: "200 response without a user object".into(),
                    })
                }
            }
            reqwest::StatusCode::NOT_FOUND => Ok(None),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(ServiceError::BadStatus {
                    service: SERVICE.into(),
                    status: status.as_u16(),
                    body,
                })
            }
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_response_parses_success() {
        let json = r#"{
            "status": "success",
            "user": {"mail_id": "a@b.com", "policy_type": "auto", "policy_issued_date": "2024-03-01"}
        }"#;
        let parsed: UserResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.status, "success");
        assert_eq!(parsed.user.unwrap().policy_type, "auto");
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = UserValidatorClient::new("http://localhost:8000/").unwrap();
        assert_eq!(client.base_url, "http://localhost:8000");
    }
}
