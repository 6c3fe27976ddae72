//! Mail monitor — polls the inbox on an interval and feeds new emails
//! through the relevance filter into the claim processor.
//!
//! State lives in the `mail_tracking` table. On the first run the
//! current inbox count is stored without processing anything, so a
//! fresh deployment never replays the whole mailbox.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::attachments::{cleanup_claim_files, save_attachments, sweep_stale_claims};
use crate::config::{MailConfig, StorageConfig};
use crate::mail::imap;
use crate::pipeline::types::IncomingClaim;
use crate::pipeline::{ClaimProcessor, RelevanceFilter};
use crate::store::Database;

/// Spawn the background mail monitor.
///
/// Returns a `JoinHandle` and a shutdown flag. Set the flag to stop
/// polling after the current cycle.
pub fn spawn_mail_monitor(
    config: MailConfig,
    storage: StorageConfig,
    db: Arc<dyn Database>,
    filter: RelevanceFilter,
    processor: Arc<ClaimProcessor>,
) -> (JoinHandle<()>, Arc<AtomicBool>) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);

    let handle = tokio::spawn(async move {
        info!(
            "Mail monitor started — polling every {}s on {}",
            config.poll_interval_secs, config.imap_host
        );

        let mut tick = tokio::time::interval(Duration::from_secs(config.poll_interval_secs));

        loop {
            tick.tick().await;

            if shutdown.load(Ordering::Relaxed) {
                info!("Mail monitor shutting down");
                return;
            }

            if let Err(e) = poll_once(&config, &storage, &db, &filter, &processor).await {
                error!("Mail poll cycle failed: {e}");
            }
        }
    });

    (handle, shutdown_flag)
}

/// Run one poll cycle: compare counts, fetch, filter, process.
async fn poll_once(
    config: &MailConfig,
    storage: &StorageConfig,
    db: &Arc<dyn Database>,
    filter: &RelevanceFilter,
    processor: &Arc<ClaimProcessor>,
) -> crate::error::Result<()> {
    let tracking = db.get_mail_tracking().await.map_err(crate::error::Error::from)?;

    let Some(tracking) = tracking else {
        // First run: store the current count, start monitoring from here.
        let cfg = config.clone();
        let count = tokio::task::spawn_blocking(move || imap::check_inbox(&cfg))
            .await
            .map_err(|e| crate::error::MailError::Connect(e.to_string()))??;
        db.update_mail_tracking(count, Utc::now()).await?;
        info!(count, "First run detected, initialized mail count without processing existing emails");
        return Ok(());
    };

    let stored = tracking.mail_count;
    let cfg = config.clone();
    let (current, messages) = tokio::task::spawn_blocking(move || imap::fetch_since(&cfg, stored))
        .await
        .map_err(|e| crate::error::MailError::Connect(e.to_string()))??;

    debug!(stored, current, "Mail count comparison");

    if current < stored {
        // Mailbox shrank (deletions); resync the stored count.
        warn!(stored, current, "Mailbox count decreased, resyncing");
        db.update_mail_tracking(current, Utc::now()).await?;
        return Ok(());
    }

    if messages.is_empty() {
        // Tracking rows are append-only; an idle tick must not add one.
        if count_moved(stored, current) {
            db.update_mail_tracking(current, Utc::now()).await?;
        }
        return Ok(());
    }

    info!(count = messages.len(), "Found new mails");

    let mut batch = Vec::new();
    let mut filtered_out = 0;

    for mail in messages {
        let claim_id = new_claim_id();

        let attachment_paths =
            match save_attachments(&storage.attachments_dir, &claim_id, &mail.attachments) {
                Ok(paths) => paths,
                Err(e) => {
                    warn!(claim_id = %claim_id, error = %e, "Failed to save attachments, continuing without");
                    Vec::new()
                }
            };

        let mut claim = IncomingClaim {
            claim_id,
            sender_email: mail.sender.clone(),
            subject: mail.subject.clone(),
            body: mail.body.clone(),
            attachment_count: attachment_paths.len() as u32,
            attachment_paths,
            verdict: crate::pipeline::types::RelevanceVerdict::default_include("unclassified"),
        };

        claim.verdict = filter.classify(&claim).await;

        if claim.verdict.is_insurance {
            info!(
                claim_id = %claim.claim_id,
                sender = %claim.sender_email,
                category = %claim.verdict.category,
                confidence = claim.verdict.confidence,
                "Email queued for processing"
            );
            batch.push(claim);
        } else {
            filtered_out += 1;
            info!(
                sender = %claim.sender_email,
                reason = %claim.verdict.reasoning,
                confidence = claim.verdict.confidence,
                "Email filtered out"
            );
            cleanup_claim_files(&claim.attachment_paths);
        }
    }

    info!(
        queued = batch.len(),
        filtered_out,
        "Email filtering summary"
    );

    db.update_mail_tracking(current, Utc::now()).await?;

    if !batch.is_empty() {
        processor.process_batch(batch).await;
    }

    // Orphaned folders remain when an archive fails or the process dies
    // mid-claim; clear them out once they are a day old.
    let (folders, files) = sweep_stale_claims(&storage.attachments_dir, 24);
    if folders > 0 {
        info!(folders, files, "Swept stale attachment folders");
    }
    Ok(())
}

/// Whether a cycle that produced no messages still needs a tracking
/// write (the server count moved without yielding parseable mail).
fn count_moved(stored: u32, current: u32) -> bool {
    current != stored
}

/// Generate a claim ID: `CLAIM_` plus 8 uppercase hex characters.
fn new_claim_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("CLAIM_{}", hex[..8].to_uppercase())
}
