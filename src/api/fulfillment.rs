//! Fulfillment record API: create, look up, and update claim records.

use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::services::AddFulfillmentRequest;
use crate::store::{ClaimRecord, ClaimStatus, Database};

const VALID_STATUSES: [&str; 3] = ["pending", "completed", "failed"];

pub fn fulfillment_routes(db: Arc<dyn Database>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/add-fulfillment", post(add_fulfillment))
        .route("/fulfillment/{claim_id}", get(get_fulfillment))
        .route("/fulfillment/{claim_id}/status", put(update_status))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(db)
}

async fn root(State(db): State<Arc<dyn Database>>) -> (StatusCode, Json<Value>) {
    match db.get_mail_tracking().await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "status": "running",
                "service": "fulfillment_api",
                "database": "connected",
            })),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "status": "error",
                "service": "fulfillment_api",
                "database": "unavailable",
                "message": e.to_string(),
            })),
        ),
    }
}

async fn add_fulfillment(
    State(db): State<Arc<dyn Database>>,
    Json(request): Json<AddFulfillmentRequest>,
) -> (StatusCode, Json<Value>) {
    let now = Utc::now();
    let record = ClaimRecord {
        claim_id: request.claim_id.clone(),
        user_mail: request.user_mail.clone(),
        mail_content: request.mail_content.clone(),
        attachment_count: request.attachment_count,
        local_attachment_paths: request.local_attachment_paths.clone(),
        status: ClaimStatus::parse(&request.fulfillment_status),
        missing_items: request.missing_items.clone(),
        mail_content_file_id: request.mail_content_file_id.clone(),
        attachment_file_ids: request.attachment_file_ids.clone(),
        created_at: now,
        updated_at: now,
    };

    match db.insert_claim(&record).await {
        Ok(fulfillment_id) => {
            info!(
                claim_id = %record.claim_id,
                fulfillment_id = %fulfillment_id,
                status = record.status.as_str(),
                "Fulfillment record created"
            );
            (
                StatusCode::OK,
                Json(json!({
                    "success": true,
                    "fulfillment_id": fulfillment_id,
                    "message": "Fulfillment record created successfully",
                })),
            )
        }
        Err(e) => {
            warn!(claim_id = %record.claim_id, error = %e, "Fulfillment insert failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"success": false, "message": e.to_string()})),
            )
        }
    }
}

async fn get_fulfillment(
    State(db): State<Arc<dyn Database>>,
    Path(claim_id): Path<String>,
) -> (StatusCode, Json<Value>) {
    match db.get_claim(&claim_id).await {
        Ok(Some(claim)) => (
            StatusCode::OK,
            Json(json!({"success": true, "data": claim_to_json(&claim)})),
        ),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "success": false,
                "message": format!("No fulfillment record found for claim_id: {claim_id}"),
            })),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"success": false, "message": e.to_string()})),
        ),
    }
}

#[derive(Debug, Deserialize)]
struct StatusQuery {
    status: String,
}

async fn update_status(
    State(db): State<Arc<dyn Database>>,
    Path(claim_id): Path<String>,
    Query(query): Query<StatusQuery>,
) -> (StatusCode, Json<Value>) {
    if !VALID_STATUSES.contains(&query.status.as_str()) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "success": false,
                "message": format!(
                    "Invalid status. Must be one of: {}",
                    VALID_STATUSES.join(", ")
                ),
            })),
        );
    }

    match db
        .update_claim_status(&claim_id, ClaimStatus::parse(&query.status))
        .await
    {
        Ok(true) => {
            info!(claim_id = %claim_id, status = %query.status, "Fulfillment status updated");
            (
                StatusCode::OK,
                Json(json!({
                    "success": true,
                    "message": format!("Status updated to {}", query.status),
                })),
            )
        }
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "success": false,
                "message": format!("No fulfillment record found for claim_id: {claim_id}"),
            })),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"success": false, "message": e.to_string()})),
        ),
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
            "service": "fulfillment_api",
            "database": database,
            "timestamp": Utc::now().to_rfc3339(),
        })),
    )
}

fn claim_to_json(claim: &ClaimRecord) -> Value {
    json!({
        "claim_id": claim.claim_id,
        "user_mail": claim.user_mail,
        "mail_content": claim.mail_content,
        "attachment_count": claim.attachment_count,
        "local_attachment_paths": claim.local_attachment_paths,
        "fulfillment_status": claim.status.as_str(),
        "missing_items": claim.missing_items,
        "mail_content_file_id": claim.mail_content_file_id,
        "attachment_file_ids": claim.attachment_file_ids,
        "created_at": claim.created_at.to_rfc3339(),
        "updated_at": claim.updated_at.to_rfc3339(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LibSqlBackend;

    async fn memory_db() -> Arc<dyn Database> {
        Arc::new(LibSqlBackend::new_memory().await.unwrap())
    }

    fn pending_request(claim_id: &str) -> AddFulfillmentRequest {
        AddFulfillmentRequest {
            user_mail: "alice@example.com".into(),
            claim_id: claim_id.into(),
            mail_content: "Subject: accident\nContent: my car was hit".into(),
            attachment_count: 1,
            local_attachment_paths: vec!["photo.jpg".into()],
            fulfillment_status: "pending".into(),
            missing_items: Some("- Specific claim amount".into()),
            mail_content_file_id: None,
            attachment_file_ids: Vec::new(),
        }
    }

    #[tokio::test]
    async fn add_then_lookup_round_trips() {
        let db = memory_db().await;

        let (status, Json(body)) =
            add_fulfillment(State(Arc::clone(&db)), Json(pending_request("CLAIM_AB12CD34")))
                .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert!(body["fulfillment_id"].is_string());

        let (status, Json(body)) =
            get_fulfillment(State(db), Path("CLAIM_AB12CD34".into())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["fulfillment_status"], "pending");
        assert_eq!(body["data"]["missing_items"], "- Specific claim amount");
    }

    #[tokio::test]
    async fn lookup_of_unknown_claim_is_404() {
        let db = memory_db().await;
        let (status, Json(body)) =
            get_fulfillment(State(db), Path("CLAIM_FFFFFFFF".into())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn status_update_validates_the_value() {
        let db = memory_db().await;
        add_fulfillment(State(Arc::clone(&db)), Json(pending_request("CLAIM_11112222")))
            .await;

        let (status, Json(body)) = update_status(
            State(Arc::clone(&db)),
            Path("CLAIM_11112222".into()),
            Query(StatusQuery {
                status: "archived".into(),
            }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().contains("Invalid status"));

        let (status, _) = update_status(
            State(Arc::clone(&db)),
            Path("CLAIM_11112222".into()),
            Query(StatusQuery {
                status: "completed".into(),
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, Json(body)) =
            get_fulfillment(State(db), Path("CLAIM_11112222".into())).await;
        assert_eq!(body["data"]["fulfillment_status"], "completed");
    }

    #[tokio::test]
    async fn status_update_for_unknown_claim_is_404() {
        let db = memory_db().await;
        let (status, _) = update_status(
            State(db),
            Path("CLAIM_00000000".into()),
            Query(StatusQuery {
                status: "failed".into(),
            }),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
