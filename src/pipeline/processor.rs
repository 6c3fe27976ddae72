//! Claim processor — validates senders, assesses fulfillment, archives
//! completed claims, and notifies customers about missing information.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::attachments::cleanup_claim_files;
use crate::error::PipelineError;
use crate::pipeline::fulfillment::FulfillmentEngine;
use crate::pipeline::types::{FulfillmentStatus, IncomingClaim};
use crate::services::{
    AddFulfillmentRequest, FulfillmentClient, MailServiceClient, UserValidatorClient,
};
use crate::store::{Database, DocumentKind, NewDocument};
use crate::templates::{TemplateStore, render, split_subject};

const REJECTION_TEMPLATE: &str = "user_not_found_email.txt";
const REJECTION_FALLBACK: &str = "user_not_found_fallback.txt";
const REJECTION_SUBJECT: &str = "Insurance Claim - Registration Required";
const PENDING_SUBJECT: &str = "Insurance Claim - Additional Information Required";

/// Archived document IDs for a completed claim.
struct ArchiveResult {
    mail_content_file_id: Option<String>,
    attachment_file_ids: Vec<String>,
}

/// Runs filtered claims through validation, assessment, and persistence.
pub struct ClaimProcessor {
    db: Arc<dyn Database>,
    users: UserValidatorClient,
    mail: MailServiceClient,
    fulfillment: FulfillmentClient,
    engine: FulfillmentEngine,
    templates: TemplateStore,
}

impl ClaimProcessor {
    pub fn new(
        db: Arc<dyn Database>,
        users: UserValidatorClient,
        mail: MailServiceClient,
        fulfillment: FulfillmentClient,
        engine: FulfillmentEngine,
        templates: TemplateStore,
    ) -> Self {
        Self {
            db,
            users,
            mail,
            fulfillment,
            engine,
            templates,
        }
    }

    /// Process a batch of claims. One claim's failure never stops the
    /// rest of the batch.
    pub async fn process_batch(&self, claims: Vec<IncomingClaim>) {
        let total = claims.len();
        let mut processed = 0;

        for claim in &claims {
            info!(
                claim_id = %claim.claim_id,
                sender = %claim.sender_email,
                subject = %claim.subject,
                attachments = claim.attachment_count,
                category = %claim.verdict.category,
                confidence = claim.verdict.confidence,
                "Processing claim"
            );

            match self.process_one(claim).await {
                Ok(()) => processed += 1,
                Err(e) => error!(claim_id = %claim.claim_id, error = %e, "Claim processing failed"),
            }
        }

        info!(processed, total, "Claim batch finished");
    }

    async fn process_one(&self, claim: &IncomingClaim) -> Result<(), PipelineError> {
        let user = self.users.validate_user(&claim.sender_email).await?;

        let Some(user) = user else {
            info!(sender = %claim.sender_email, "Sender not registered, sending rejection email");
            return self.send_rejection(claim).await;
        };

        info!(
            sender = %claim.sender_email,
            policy_type = %user.policy_type,
            policy_issued = %user.policy_issued_date,
            "Sender registered, assessing fulfillment"
        );

        let assessment = self.engine.assess(claim).await?;
        match assessment.status {
            FulfillmentStatus::Completed => self.complete_claim(claim).await,
            FulfillmentStatus::Pending => {
                self.record_pending(claim, &assessment.missing_items, &assessment.email_content)
                    .await
            }
        }
    }

    /// Unregistered sender: render the rejection template chain and
    /// send it through the mail service. No claim record is created.
    async fn send_rejection(&self, claim: &IncomingClaim) -> Result<(), PipelineError> {
        let (subject, content) = match self
            .templates
            .load_with_fallback(REJECTION_TEMPLATE, REJECTION_FALLBACK)
        {
            Ok(template) => {
                let (subject, body) = split_subject(&template, REJECTION_SUBJECT);
                let rendered = render(
                    body,
                    &[
                        ("claim_id", claim.claim_id.as_str()),
                        ("user_email", claim.sender_email.as_str()),
                    ],
                );
                (subject, rendered)
            }
            Err(e) => {
                warn!(error = %e, "Rejection templates unavailable, using built-in text");
                (
                    REJECTION_SUBJECT.to_string(),
                    format!(
                        "Dear Customer,\n\n\
                         Your email {} is not registered in our system.\n\n\
                         Claim Reference: {}\n\n\
                         Please contact customer service.\n\n\
                         Best regards,\n\
                         Insurance Claims Team",
                        claim.sender_email, claim.claim_id
                    ),
                )
            }
        };

        self.mail
            .send_mail(&claim.sender_email, &subject, &content)
            .await
            .map_err(|e| PipelineError::Notify(e.to_string()))?;
        info!(claim_id = %claim.claim_id, to = %claim.sender_email, "Rejection email sent");
        Ok(())
    }

    /// Completed claim: archive documents to the database, record the
    /// claim with its file IDs, then delete the local files.
    async fn complete_claim(&self, claim: &IncomingClaim) -> Result<(), PipelineError> {
        info!(claim_id = %claim.claim_id, "All requirements fulfilled, archiving documents");

        let archive = match self.archive_documents(claim).await {
            Ok(archive) => Some(archive),
            Err(e) => {
                // Record the completed claim even when archiving fails;
                // local files stay on disk for the maintenance sweep.
                warn!(claim_id = %claim.claim_id, error = %e, "Document archive failed, recording claim without file IDs");
                None
            }
        };

        let request = match &archive {
            Some(archive) => AddFulfillmentRequest {
                user_mail: claim.sender_email.clone(),
                claim_id: claim.claim_id.clone(),
                mail_content: claim.record_excerpt(800),
                attachment_count: archive.attachment_file_ids.len() as u32,
                local_attachment_paths: claim.attachment_names(),
                fulfillment_status: "completed".into(),
                missing_items: None,
                mail_content_file_id: archive.mail_content_file_id.clone(),
                attachment_file_ids: archive.attachment_file_ids.clone(),
            },
            None => AddFulfillmentRequest {
                user_mail: claim.sender_email.clone(),
                claim_id: claim.claim_id.clone(),
                mail_content: claim.record_excerpt(800),
                attachment_count: claim.attachment_count,
                local_attachment_paths: claim.attachment_names(),
                fulfillment_status: "completed".into(),
                missing_items: None,
                mail_content_file_id: None,
                attachment_file_ids: Vec::new(),
            },
        };

        let fulfillment_id = self.fulfillment.add_fulfillment(&request).await?;
        info!(claim_id = %claim.claim_id, fulfillment_id = %fulfillment_id, "Completed claim recorded");

        if archive.is_some() {
            cleanup_claim_files(&claim.attachment_paths);
        }
        Ok(())
    }

    /// Pending claim: record it with the missing items and ask the
    /// customer for the rest.
    async fn record_pending(
        &self,
        claim: &IncomingClaim,
        missing_items: &str,
        email_content: &str,
    ) -> Result<(), PipelineError> {
        let request = AddFulfillmentRequest {
            user_mail: claim.sender_email.clone(),
            claim_id: claim.claim_id.clone(),
            mail_content: claim.record_excerpt(usize::MAX),
            attachment_count: claim.attachment_count,
            local_attachment_paths: claim.attachment_names(),
            fulfillment_status: "pending".into(),
            missing_items: if missing_items.is_empty() {
                None
            } else {
                Some(missing_items.to_string())
            },
            mail_content_file_id: None,
            attachment_file_ids: Vec::new(),
        };

        let fulfillment_id = self.fulfillment.add_fulfillment(&request).await?;
        info!(
            claim_id = %claim.claim_id,
            fulfillment_id = %fulfillment_id,
            missing = missing_items,
            "Pending claim recorded"
        );

        self.mail
            .send_mail(&claim.sender_email, PENDING_SUBJECT, email_content)
            .await
            .map_err(|e| PipelineError::Notify(e.to_string()))?;
        info!(claim_id = %claim.claim_id, to = %claim.sender_email, "Missing-information email sent");
        Ok(())
    }

    /// Archive the mail content (as JSON) and every attachment blob.
    async fn archive_documents(&self, claim: &IncomingClaim) -> Result<ArchiveResult, PipelineError> {
        let mail_json = serde_json::json!({
            "claim_id": claim.claim_id,
            "sender_email": claim.sender_email,
            "subject": claim.subject,
            "content": claim.body,
            "attachment_count": claim.attachment_count,
            "archived_at": Utc::now().to_rfc3339(),
        });
        let mail_doc = NewDocument {
            claim_id: claim.claim_id.clone(),
            user_email: claim.sender_email.clone(),
            kind: DocumentKind::MailContent,
            filename: format!("{}_mail_content.json", claim.claim_id),
            content: mail_json.to_string().into_bytes(),
        };
        let mail_content_file_id = Some(self.db.store_document(&mail_doc).await?);

        let mut attachment_file_ids = Vec::with_capacity(claim.attachment_paths.len());
        for path in &claim.attachment_paths {
            let bytes = tokio::fs::read(path).await.map_err(|e| {
                PipelineError::Assessment(format!(
                    "Failed to read attachment {}: {e}",
                    path.display()
                ))
            })?;
            let filename = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("attachment")
                .to_string();
            let doc = NewDocument {
                claim_id: claim.claim_id.clone(),
                user_email: claim.sender_email.clone(),
                kind: DocumentKind::Attachment,
                filename,
                content: bytes,
            };
            attachment_file_ids.push(self.db.store_document(&doc).await?);
        }

        info!(
            claim_id = %claim.claim_id,
            attachments = attachment_file_ids.len(),
            "Documents archived to database"
        );
        Ok(ArchiveResult {
            mail_content_file_id,
            attachment_file_ids,
        })
    }
}
