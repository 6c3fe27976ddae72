//! In-process REST services: user validation, outbound mail, and the
//! fulfillment record API. Each exposes the same routes and response
//! shapes whether it runs embedded here or as a standalone deployment.

pub mod fulfillment;
pub mod mail_service;
pub mod user_validator;

pub use fulfillment::fulfillment_routes;
pub use mail_service::mail_service_routes;
pub use user_validator::user_validator_routes;

use axum::Router;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Serve a router on `0.0.0.0:{port}` in a background task.
pub fn spawn_service(name: &'static str, port: u16, app: Router) -> JoinHandle<()> {
    tokio::spawn(async move {
        let listener = match tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await {
            Ok(listener) => listener,
            Err(e) => {
                error!(service = name, port, error = %e, "Failed to bind service port");
                return;
            }
        };
        info!(service = name, port, "REST service started");
        axum::serve(listener, app).await.ok();
    })
}
