//! HTTP clients for the three sibling REST services.
//!
//! The monitor talks to the user-validator, mail, and fulfillment
//! services over HTTP even when they run in-process, so each piece can
//! also be deployed standalone.

pub mod fulfillment_api;
pub mod mail_service;
pub mod user_validator;

pub use fulfillment_api::{AddFulfillmentRequest, FulfillmentClient};
pub use mail_service::MailServiceClient;
pub use user_validator::UserValidatorClient;

use std::time::Duration;

use tracing::{info, warn};

use crate::error::ServiceError;

/// Poll all three services until each answers its health endpoint.
///
/// Retries up to `attempts` rounds with `delay` between them and
/// returns the last error when a service never comes up. The monitor
/// must not start polling mail before its downstream services answer.
pub async fn await_healthy(
    users: &UserValidatorClient,
    mail: &MailServiceClient,
    fulfillment: &FulfillmentClient,
    attempts: u32,
    delay: Duration,
) -> Result<(), ServiceError> {
    for attempt in 1..=attempts {
        match check_all(users, mail, fulfillment).await {
            Ok(()) => {
                info!("All services answered health checks");
                return Ok(());
            }
            Err(e) if attempt == attempts => return Err(e),
            Err(e) => {
                warn!(attempt, error = %e, "Service not ready yet, retrying");
                tokio::time::sleep(delay).await;
            }
        }
    }
    Ok(())
}

async fn check_all(
    users: &UserValidatorClient,
    mail: &MailServiceClient,
    fulfillment: &FulfillmentClient,
) -> Result<(), ServiceError> {
    users.health().await?;
    mail.health().await?;
    fulfillment.health().await?;
    Ok(())
}
