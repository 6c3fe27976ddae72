//! Outbound mail service: accepts send requests over HTTP and relays
//! them via SMTP with lettre.

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ApiConfig;
use crate::error::MailError;

#[derive(Debug, Deserialize)]
pub struct SendMailRequest {
    /// Recipient email address.
    pub mail_id: String,
    pub subject: String,
    pub mail_content: String,
}

pub fn mail_service_routes(config: Arc<ApiConfig>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/send-mail", post(send_mail))
        .layer(TraceLayer::new_for_http())
        .with_state(config)
}

async fn root() -> Json<Value> {
    Json(json!({"status": "running", "service": "mail_service"}))
}

async fn send_mail(
    State(config): State<Arc<ApiConfig>>,
    Json(request): Json<SendMailRequest>,
) -> (StatusCode, Json<Value>) {
    let result = tokio::task::spawn_blocking(move || smtp_send(&config, &request))
        .await
        .unwrap_or_else(|e| {
            Err(MailError::SmtpSend {
                to: String::new(),
                reason: format!("Send task panicked: {e}"),
            })
        });

    match result {
        Ok(to) => {
            info!(to = %to, "Email sent");
            (
                StatusCode::OK,
                Json(json!({"success": true, "message": "Email sent"})),
            )
        }
        Err(e) => {
            error!(error = %e, "Email send failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"success": false, "message": e.to_string()})),
            )
        }
    }
}

/// Blocking SMTP send over STARTTLS. Returns the recipient on success.
fn smtp_send(config: &ApiConfig, request: &SendMailRequest) -> Result<String, MailError> {
    let send_err = |reason: String| MailError::SmtpSend {
        to: request.mail_id.clone(),
        reason,
    };

    let creds = Credentials::new(config.smtp_username.clone(), config.smtp_password.clone());

    let transport = SmtpTransport::starttls_relay(&config.smtp_host)
        .map_err(|e| send_err(format!("SMTP relay error: {e}")))?
        .port(config.smtp_port)
        .credentials(creds)
        .build();

    let email = Message::builder()
        .from(
            config
                .smtp_username
                .parse()
                .map_err(|e| send_err(format!("Invalid from address: {e}")))?,
        )
        .to(request
            .mail_id
            .parse()
            .map_err(|e| send_err(format!("Invalid to address: {e}")))?)
        .subject(&request.subject)
        .body(request.mail_content.clone())
        .map_err(|e| send_err(format!("Failed to build email: {e}")))?;

    transport
        .send(&email)
        .map_err(|e| send_err(format!("SMTP send failed: {e}")))?;

    Ok(request.mail_id.clone())
}
