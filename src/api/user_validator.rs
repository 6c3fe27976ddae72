//! User-validator service: registration lookups by email address.

use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::Json;
use chrono::Utc;
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::store::Database;

pub fn user_validator_routes(db: Arc<dyn Database>) -> Router {
    Router::new()
        .route("/user/{email}", get(get_user))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(db)
}

async fn get_user(
    State(db): State<Arc<dyn Database>>,
    Path(email): Path<String>,
) -> (StatusCode, Json<Value>) {
    match db.get_user_by_email(&email).await {
        Ok(Some(user)) => {
            info!(email = %email, "User lookup succeeded");
            (
                StatusCode::OK,
                Json(json!({
                    "status": "success",
                    "user": user,
                })),
            )
        }
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "status": "error",
                "message": format!("User with email {email} not found"),
            })),
        ),
        Err(e) => {
            warn!(email = %email, error = %e, "User lookup failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "status": "error",
                    "message": e.to_string(),
                })),
            )
        }
    }
}

async fn health(State(db): State<Arc<dyn Database>>) -> (StatusCode, Json<Value>) {
    let database = match db.get_mail_tracking().await {
        Ok(_) => "connected",
        Err(_) => "unavailable",
    };
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "user_validator",
            "database": database,
            "timestamp": Utc::now().to_rfc3339(),
        })),
    )
}
