//! Integration tests for the claim pipeline.
//!
//! Each test wires a real `ClaimProcessor` to the user-validator and
//! fulfillment REST services running on ephemeral ports, a stub mail
//! service that captures outbound emails, and a scripted LLM provider.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::extract::State;
use axum::routing::{get, post};
use axum::Json;
use serde_json::{Value, json};
use tokio::net::TcpListener;

use claims_intake::api::{fulfillment_routes, user_validator_routes};
use claims_intake::error::LlmError;
use claims_intake::llm::{CompletionRequest, CompletionResponse, LlmProvider};
use claims_intake::pipeline::{
    ClaimProcessor, FulfillmentEngine, IncomingClaim, RelevanceFilter, RelevanceVerdict,
};
use claims_intake::services::{
    FulfillmentClient, MailServiceClient, UserValidatorClient, await_healthy,
};
use claims_intake::store::{ClaimStatus, Database, LibSqlBackend, UserRecord};
use claims_intake::templates::TemplateStore;

/// Scripted LLM provider (no real API calls).
struct StubLlm {
    response: String,
}

#[async_trait]
impl LlmProvider for StubLlm {
    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        Ok(CompletionResponse {
            content: self.response.clone(),
            input_tokens: 0,
            output_tokens: 0,
        })
    }

    fn model_name(&self) -> &str {
        "stub"
    }
}

/// LLM provider that always fails, for fallback-path tests.
struct FailingLlm;

#[async_trait]
impl LlmProvider for FailingLlm {
    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        Err(LlmError::RequestFailed {
            provider: "stub".into(),
            reason: "connection refused".into(),
        })
    }

    fn model_name(&self) -> &str {
        "stub"
    }
}

type SentMails = Arc<Mutex<Vec<Value>>>;

async fn capture_mail(State(sent): State<SentMails>, Json(body): Json<Value>) -> Json<Value> {
    sent.lock().unwrap().push(body);
    Json(json!({"success": true, "message": "Email sent"}))
}

/// Stub mail service that records every send request.
fn stub_mail_routes(sent: SentMails) -> Router {
    Router::new()
        .route("/", get(|| async { Json(json!({"status": "running"})) }))
        .route("/send-mail", post(capture_mail))
        .with_state(sent)
}

/// Serve a router on an ephemeral port; returns its base URL.
async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    format!("http://{addr}")
}

/// Write the prompt templates the fulfillment engine needs.
fn write_templates(dir: &std::path::Path) {
    std::fs::write(
        dir.join("fulfillment_system_prompt.txt"),
        "You assess insurance claim emails.\n\
         Respond with FULFILLMENT_STATUS: COMPLETED or PENDING plus MISSING_ITEMS.",
    )
    .unwrap();
    std::fs::write(
        dir.join("fulfillment_pending_email.txt"),
        "Subject: Insurance Claim - Additional Information Required\n\n\
         Dear Customer,\n\n\
         SATISFIED:\n{satisfied_items}\n\n\
         MISSING:\n{missing_items}\n\n\
         Insurance Claims Team",
    )
    .unwrap();
    std::fs::write(
        dir.join("user_not_found_email.txt"),
        "Subject: Insurance Claim - Registration Required\n\n\
         Dear Customer,\n\n\
         Your email {user_email} is not registered.\n\
         Claim Reference: {claim_id}\n\n\
         Insurance Claims Team",
    )
    .unwrap();
}

struct Harness {
    db: Arc<dyn Database>,
    processor: ClaimProcessor,
    sent: SentMails,
    _prompts: tempfile::TempDir,
}

async fn harness(llm: Arc<dyn LlmProvider>) -> Harness {
    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());

    let validator_url = serve(user_validator_routes(Arc::clone(&db))).await;
    let fulfillment_url = serve(fulfillment_routes(Arc::clone(&db))).await;

    let sent: SentMails = Arc::new(Mutex::new(Vec::new()));
    let mail_url = serve(stub_mail_routes(Arc::clone(&sent))).await;

    let prompts = tempfile::tempdir().unwrap();
    write_templates(prompts.path());
    let templates = TemplateStore::new(prompts.path());

    let processor = ClaimProcessor::new(
        Arc::clone(&db),
        UserValidatorClient::new(&validator_url).unwrap(),
        MailServiceClient::new(&mail_url).unwrap(),
        FulfillmentClient::new(&fulfillment_url).unwrap(),
        FulfillmentEngine::new(llm, templates.clone()),
        templates,
    );

    Harness {
        db,
        processor,
        sent,
        _prompts: prompts,
    }
}

async fn register_alice(db: &Arc<dyn Database>) {
    db.insert_user(&UserRecord {
        mail_id: "alice@example.com".into(),
        policy_type: "auto".into(),
        policy_issued_date: "2024-03-01".into(),
    })
    .await
    .unwrap();
}

fn claim(claim_id: &str, sender: &str, body: &str) -> IncomingClaim {
    IncomingClaim {
        claim_id: claim_id.into(),
        sender_email: sender.into(),
        subject: "Car accident claim".into(),
        body: body.into(),
        attachment_count: 0,
        attachment_paths: Vec::new(),
        verdict: RelevanceVerdict::default_include("test"),
    }
}

#[tokio::test]
async fn pending_claim_is_recorded_and_customer_notified() {
    let h = harness(Arc::new(StubLlm {
        response: "FULFILLMENT_STATUS: PENDING\nMISSING_ITEMS:\n- Specific claim amount\n- Supporting proof documents".into(),
    }))
    .await;
    register_alice(&h.db).await;

    h.processor
        .process_batch(vec![claim(
            "CLAIM_AAAA1111",
            "alice@example.com",
            "My car was hit yesterday, please advise.",
        )])
        .await;

    let record = h.db.get_claim("CLAIM_AAAA1111").await.unwrap().unwrap();
    assert_eq!(record.status, ClaimStatus::Pending);
    assert!(
        record
            .missing_items
            .as_deref()
            .unwrap()
            .contains("Specific claim amount")
    );

    let sent = h.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["mail_id"], "alice@example.com");
    assert_eq!(
        sent[0]["subject"],
        "Insurance Claim - Additional Information Required"
    );
    assert!(
        sent[0]["mail_content"]
            .as_str()
            .unwrap()
            .contains("Specific claim amount")
    );
}

#[tokio::test]
async fn completed_claim_archives_documents_and_cleans_up() {
    let h = harness(Arc::new(StubLlm {
        response: "FULFILLMENT_STATUS: COMPLETED".into(),
    }))
    .await;
    register_alice(&h.db).await;

    let attachments = tempfile::tempdir().unwrap();
    let bill = attachments.path().join("1700000000000_bill.pdf");
    std::fs::write(&bill, b"%PDF-1.4 test").unwrap();

    let mut incoming = claim(
        "CLAIM_BBBB2222",
        "alice@example.com",
        "Accident on May 2nd, repair cost was $2,500. Bill attached.",
    );
    incoming.attachment_count = 1;
    incoming.attachment_paths = vec![bill.clone()];

    h.processor.process_batch(vec![incoming]).await;

    let record = h.db.get_claim("CLAIM_BBBB2222").await.unwrap().unwrap();
    assert_eq!(record.status, ClaimStatus::Completed);
    assert!(record.mail_content_file_id.is_some());
    assert_eq!(record.attachment_file_ids.len(), 1);

    let doc_ids = h.db.document_ids_for_claim("CLAIM_BBBB2222").await.unwrap();
    assert_eq!(doc_ids.len(), 2);

    // Local files are removed once the archive succeeds.
    assert!(!bill.exists());
    // Completed claims produce no customer email.
    assert!(h.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unregistered_sender_gets_rejection_and_no_record() {
    let h = harness(Arc::new(StubLlm {
        response: "FULFILLMENT_STATUS: COMPLETED".into(),
    }))
    .await;

    h.processor
        .process_batch(vec![claim(
            "CLAIM_CCCC3333",
            "stranger@example.com",
            "I want to claim for my car.",
        )])
        .await;

    assert!(h.db.get_claim("CLAIM_CCCC3333").await.unwrap().is_none());

    let sent = h.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["mail_id"], "stranger@example.com");
    assert_eq!(sent[0]["subject"], "Insurance Claim - Registration Required");
    let body = sent[0]["mail_content"].as_str().unwrap();
    assert!(body.contains("CLAIM_CCCC3333"));
    assert!(body.contains("stranger@example.com"));
}

#[tokio::test]
async fn relevance_filter_falls_back_to_keywords_when_llm_is_down() {
    let filter = RelevanceFilter::new(Arc::new(FailingLlm));

    let insurance = claim(
        "CLAIM_DDDD4444",
        "alice@example.com",
        "My insurance policy should cover the damage from the accident.",
    );
    let verdict = filter.classify(&insurance).await;
    assert!(verdict.is_insurance);
    assert_eq!(verdict.category, "fallback_analysis");

    let mut newsletter = claim(
        "CLAIM_EEEE5555",
        "news@example.com",
        "Check out this week's top recipes and travel deals.",
    );
    newsletter.subject = "Weekly newsletter".into();
    let verdict = filter.classify(&newsletter).await;
    assert!(!verdict.is_insurance);
}

#[tokio::test]
async fn filter_keyword_checks_email_when_llm_json_is_malformed() {
    // The broken JSON contains "insurance" and "true", so resolving it
    // with text heuristics would wrongly queue this newsletter. The
    // verdict must come from the keyword check over the email itself.
    let filter = RelevanceFilter::new(Arc::new(StubLlm {
        response: r#"{"is_insurance": true, "confidence": high, "category": insurance}"#.into(),
    }));

    let mut newsletter = claim(
        "CLAIM_GGGG7777",
        "news@example.com",
        "Check out this week's top recipes and travel deals.",
    );
    newsletter.subject = "Weekly newsletter".into();
    let verdict = filter.classify(&newsletter).await;
    assert!(!verdict.is_insurance);
    assert_eq!(verdict.category, "fallback_analysis");
}

#[tokio::test]
async fn startup_health_checks_pass_once_services_answer() {
    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let validator_url = serve(user_validator_routes(Arc::clone(&db))).await;
    let fulfillment_url = serve(fulfillment_routes(Arc::clone(&db))).await;
    let sent: SentMails = Arc::new(Mutex::new(Vec::new()));
    let mail_url = serve(stub_mail_routes(Arc::clone(&sent))).await;

    let users = UserValidatorClient::new(&validator_url).unwrap();
    let mail = MailServiceClient::new(&mail_url).unwrap();
    let fulfillment = FulfillmentClient::new(&fulfillment_url).unwrap();

    await_healthy(
        &users,
        &mail,
        &fulfillment,
        3,
        std::time::Duration::from_millis(50),
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn startup_health_checks_fail_when_a_service_is_down() {
    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let validator_url = serve(user_validator_routes(Arc::clone(&db))).await;
    let sent: SentMails = Arc::new(Mutex::new(Vec::new()));
    let mail_url = serve(stub_mail_routes(Arc::clone(&sent))).await;

    let users = UserValidatorClient::new(&validator_url).unwrap();
    let mail = MailServiceClient::new(&mail_url).unwrap();
    // Nothing listens here.
    let fulfillment = FulfillmentClient::new("http://127.0.0.1:9").unwrap();

    let result = await_healthy(
        &users,
        &mail,
        &fulfillment,
        2,
        std::time::Duration::from_millis(10),
    )
    .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn filter_parses_json_verdict_from_llm() {
    let filter = RelevanceFilter::new(Arc::new(StubLlm {
        response: r#"{"is_insurance": true, "confidence": 92, "reasoning": "mentions a claim", "category": "auto_claim"}"#.into(),
    }));

    let verdict = filter
        .classify(&claim("CLAIM_FFFF6666", "a@b.com", "hit and run"))
        .await;
    assert!(verdict.is_insurance);
    assert_eq!(verdict.confidence, 92);
    assert_eq!(verdict.category, "auto_claim");
}
