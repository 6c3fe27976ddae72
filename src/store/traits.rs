//! Unified `Database` trait — single async interface for all persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DatabaseError;

/// Lifecycle status of a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimStatus {
    /// Required information is missing; waiting on the customer.
    Pending,
    /// All requirements satisfied; documents archived.
    Completed,
    /// Processing failed.
    Failed,
}

impl ClaimStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parse a status string; unknown values map to `Pending`.
    pub fn parse(s: &str) -> Self {
        match s {
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

/// A persisted claim record.
#[derive(Debug, Clone)]
pub struct ClaimRecord {
    pub claim_id: String,
    pub user_mail: String,
    /// Truncated excerpt of the originating email (subject + content).
    pub mail_content: String,
    pub attachment_count: u32,
    pub local_attachment_paths: Vec<String>,
    pub status: ClaimStatus,
    pub missing_items: Option<String>,
    pub mail_content_file_id: Option<String>,
    pub attachment_file_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A registered policy holder (owned by the user-validator service).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct UserRecord {
    pub mail_id: String,
    pub policy_type: String,
    /// ISO date string, e.g. "2024-03-01".
    pub policy_issued_date: String,
}

/// What kind of document a stored blob is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    MailContent,
    Attachment,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MailContent => "mail_content",
            Self::Attachment => "attachment",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "mail_content" => Self::MailContent,
            _ => Self::Attachment,
        }
    }
}

/// A document to archive (mail content JSON or an attachment).
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub claim_id: String,
    pub user_email: String,
    pub kind: DocumentKind,
    pub filename: String,
    pub content: Vec<u8>,
}

/// An archived document, as read back from the store.
#[derive(Debug, Clone)]
pub struct StoredDocument {
    pub file_id: String,
    pub claim_id: String,
    pub user_email: String,
    pub kind: DocumentKind,
    pub filename: String,
    pub content: Vec<u8>,
    pub size: u64,
    pub uploaded_at: DateTime<Utc>,
}

/// Mail-count tracking state (append-only; latest row wins).
#[derive(Debug, Clone)]
pub struct MailTracking {
    pub mail_count: u32,
    pub last_connection_time: DateTime<Utc>,
}

/// Backend-agnostic database trait covering claims, users, documents,
/// and mail tracking.
#[async_trait]
pub trait Database: Send + Sync {
    // ── Mail tracking ───────────────────────────────────────────────

    /// Latest mail tracking record, or `None` on first run.
    async fn get_mail_tracking(&self) -> Result<Option<MailTracking>, DatabaseError>;

    /// Append a new tracking record.
    async fn update_mail_tracking(
        &self,
        mail_count: u32,
        at: DateTime<Utc>,
    ) -> Result<(), DatabaseError>;

    // ── Claims ──────────────────────────────────────────────────────

    /// Insert a claim record. Returns the generated fulfillment ID.
    async fn insert_claim(&self, claim: &ClaimRecord) -> Result<String, DatabaseError>;

    /// Fetch a claim by claim ID.
    async fn get_claim(&self, claim_id: &str) -> Result<Option<ClaimRecord>, DatabaseError>;

    /// Update a claim's status. Returns false if the claim doesn't exist.
    async fn update_claim_status(
        &self,
        claim_id: &str,
        status: ClaimStatus,
    ) -> Result<bool, DatabaseError>;

    /// Claims with the given status, oldest first.
    async fn claims_by_status(
        &self,
        status: ClaimStatus,
        limit: usize,
    ) -> Result<Vec<ClaimRecord>, DatabaseError>;

    // ── Users ───────────────────────────────────────────────────────

    /// Look up a registered user by email.
    async fn get_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, DatabaseError>;

    /// Register a user (used by the validator service and test seeding).
    async fn insert_user(&self, user: &UserRecord) -> Result<(), DatabaseError>;

    // ── Documents ───────────────────────────────────────────────────

    /// Archive a document blob. Returns the generated file ID.
    async fn store_document(&self, doc: &NewDocument) -> Result<String, DatabaseError>;

    /// Fetch an archived document by file ID.
    async fn get_document(&self, file_id: &str) -> Result<Option<StoredDocument>, DatabaseError>;

    /// File IDs of all documents archived for a claim.
    async fn document_ids_for_claim(&self, claim_id: &str) -> Result<Vec<String>, DatabaseError>;
}
