use std::sync::Arc;
use std::sync::atomic::Ordering;

use claims_intake::api;
use claims_intake::config::{ApiConfig, LlmConfig, MailConfig, ServiceEndpoints, StorageConfig};
use claims_intake::llm::create_provider;
use claims_intake::mail::spawn_mail_monitor;
use claims_intake::pipeline::{ClaimProcessor, FulfillmentEngine, RelevanceFilter};
use claims_intake::services::{
    FulfillmentClient, MailServiceClient, UserValidatorClient, await_healthy,
};
use claims_intake::store::{Database, LibSqlBackend};
use claims_intake::templates::TemplateStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let mail_config = MailConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  export EMAIL_USERNAME=claims@example.com");
        eprintln!("  export EMAIL_APP_PASSWORD=...");
        std::process::exit(1);
    });
    let llm_config = LlmConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  export LLM_API_KEY=sk-...");
        std::process::exit(1);
    });
    let storage = StorageConfig::from_env();
    let endpoints = ServiceEndpoints::from_env();
    let api_config = Arc::new(ApiConfig::from_env());

    eprintln!("📬 Claims Intake v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Inbox: {} ({})", mail_config.username, mail_config.imap_host);
    eprintln!("   Model: {}", llm_config.model);
    eprintln!("   Database: {}", storage.db_path.display());
    eprintln!("   User validator: http://0.0.0.0:{}", api_config.user_validator_port);
    eprintln!("   Mail service:   http://0.0.0.0:{}", api_config.mail_service_port);
    eprintln!("   Fulfillment:    http://0.0.0.0:{}", api_config.fulfillment_port);

    // ── Database ─────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&storage.db_path)
            .await
            .unwrap_or_else(|e| {
                eprintln!(
                    "Error: Failed to open database at {}: {}",
                    storage.db_path.display(),
                    e
                );
                std::process::exit(1);
            }),
    );

    // ── REST services ────────────────────────────────────────────────────
    let _validator_handle = api::spawn_service(
        "user_validator",
        api_config.user_validator_port,
        api::user_validator_routes(Arc::clone(&db)),
    );
    let _mail_handle = api::spawn_service(
        "mail_service",
        api_config.mail_service_port,
        api::mail_service_routes(Arc::clone(&api_config)),
    );
    let _fulfillment_handle = api::spawn_service(
        "fulfillment_api",
        api_config.fulfillment_port,
        api::fulfillment_routes(Arc::clone(&db)),
    );

    // ── Pipeline ─────────────────────────────────────────────────────────
    let llm = create_provider(&llm_config)?;
    let templates = TemplateStore::new(&storage.prompts_dir);

    let users = UserValidatorClient::new(&endpoints.user_validator_url)?;
    let mail = MailServiceClient::new(&endpoints.mail_service_url)?;
    let fulfillment = FulfillmentClient::new(&endpoints.fulfillment_api_url)?;

    // Don't start polling mail until every service answers.
    await_healthy(
        &users,
        &mail,
        &fulfillment,
        10,
        std::time::Duration::from_secs(1),
    )
    .await?;
    eprintln!("   Services: healthy");

    let filter = RelevanceFilter::new(llm.clone());
    let engine = FulfillmentEngine::new(llm.clone(), templates.clone());
    let processor = Arc::new(ClaimProcessor::new(
        Arc::clone(&db),
        users,
        mail,
        fulfillment,
        engine,
        templates,
    ));

    let (monitor_handle, shutdown) = spawn_mail_monitor(
        mail_config,
        storage,
        Arc::clone(&db),
        filter,
        processor,
    );

    tokio::signal::ctrl_c().await?;
    eprintln!("\nShutting down...");
    shutdown.store(true, Ordering::Relaxed);
    monitor_handle.abort();
    let _ = monitor_handle.await;

    Ok(())
}
