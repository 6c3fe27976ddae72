//! libSQL backend — async `Database` trait implementation.
//!
//! Supports local file and in-memory databases. Documents are stored
//! as blobs in the `documents` table so completed claims need no local
//! filesystem state.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::{
    ClaimRecord, ClaimStatus, Database, DocumentKind, MailTracking, NewDocument, StoredDocument,
    UserRecord,
};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Connection(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Connection(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;

        migrations::run_migrations(&conn).await?;
        info!(path = %path.display(), "Database opened");
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Connection(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;

        migrations::run_migrations(&conn).await?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Decode a JSON array column into strings; malformed data yields empty.
fn parse_string_list(s: &str) -> Vec<String> {
    serde_json::from_str(s).unwrap_or_default()
}

fn encode_string_list(items: &[String]) -> Result<String, DatabaseError> {
    serde_json::to_string(items).map_err(|e| DatabaseError::Serialization(e.to_string()))
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

const CLAIM_COLUMNS: &str = "claim_id, user_mail, mail_content, attachment_count, \
     local_attachment_paths, fulfillment_status, missing_items, mail_content_file_id, \
     attachment_file_ids, created_at, updated_at";

/// Map a libsql Row to a ClaimRecord. Column order matches CLAIM_COLUMNS.
fn row_to_claim(row: &libsql::Row) -> Result<ClaimRecord, libsql::Error> {
    let status_str: String = row.get(5)?;
    let paths_str: String = row.get(4)?;
    let file_ids_str: String = row.get(8)?;
    let created_str: String = row.get(9)?;
    let updated_str: String = row.get(10)?;

    Ok(ClaimRecord {
        claim_id: row.get(0)?,
        user_mail: row.get(1)?,
        mail_content: row.get(2)?,
        attachment_count: row.get::<i64>(3)? as u32,
        local_attachment_paths: parse_string_list(&paths_str),
        status: ClaimStatus::parse(&status_str),
        missing_items: row.get(6).ok(),
        mail_content_file_id: row.get(7).ok(),
        attachment_file_ids: parse_string_list(&file_ids_str),
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn get_mail_tracking(&self) -> Result<Option<MailTracking>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT mail_count, last_connection_time FROM mail_tracking
                 ORDER BY created_at DESC, rowid DESC LIMIT 1",
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_mail_tracking: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("get_mail_tracking row: {e}")))?;
                let time_str: String = row
                    .get(1)
                    .map_err(|e| DatabaseError::Query(format!("get_mail_tracking row: {e}")))?;
                Ok(Some(MailTracking {
                    mail_count: count.max(0) as u32,
                    last_connection_time: parse_datetime(&time_str),
                }))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_mail_tracking: {e}"))),
        }
    }

    async fn update_mail_tracking(
        &self,
        mail_count: u32,
        at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO mail_tracking (id, mail_count, last_connection_time, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    Uuid::new_v4().to_string(),
                    mail_count as i64,
                    at.to_rfc3339(),
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_mail_tracking: {e}")))?;

        debug!(mail_count, "Mail tracking updated");
        Ok(())
    }

    async fn insert_claim(&self, claim: &ClaimRecord) -> Result<String, DatabaseError> {
        let id = Uuid::new_v4().to_string();
        let paths = encode_string_list(&claim.local_attachment_paths)?;
        let file_ids = encode_string_list(&claim.attachment_file_ids)?;

        self.conn()
            .execute(
                "INSERT INTO claims (id, claim_id, user_mail, mail_content, attachment_count,
                    local_attachment_paths, fulfillment_status, missing_items,
                    mail_content_file_id, attachment_file_ids, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    id.clone(),
                    claim.claim_id.clone(),
                    claim.user_mail.clone(),
                    claim.mail_content.clone(),
                    claim.attachment_count as i64,
                    paths,
                    claim.status.as_str(),
                    opt_text(claim.missing_items.as_deref()),
                    opt_text(claim.mail_content_file_id.as_deref()),
                    file_ids,
                    claim.created_at.to_rfc3339(),
                    claim.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_claim: {e}")))?;

        debug!(claim_id = %claim.claim_id, status = claim.status.as_str(), "Claim inserted");
        Ok(id)
    }

    async fn get_claim(&self, claim_id: &str) -> Result<Option<ClaimRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {CLAIM_COLUMNS} FROM claims WHERE claim_id = ?1"),
                params![claim_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_claim: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let claim = row_to_claim(&row)
                    .map_err(|e| DatabaseError::Query(format!("get_claim row parse: {e}")))?;
                Ok(Some(claim))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_claim: {e}"))),
        }
    }

    async fn update_claim_status(
        &self,
        claim_id: &str,
        status: ClaimStatus,
    ) -> Result<bool, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let count = self
            .conn()
            .execute(
                "UPDATE claims SET fulfillment_status = ?1, updated_at = ?2 WHERE claim_id = ?3",
                params![status.as_str(), now, claim_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_claim_status: {e}")))?;

        debug!(claim_id, status = status.as_str(), updated = count > 0, "Claim status update");
        Ok(count > 0)
    }

    async fn claims_by_status(
        &self,
        status: ClaimStatus,
        limit: usize,
    ) -> Result<Vec<ClaimRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {CLAIM_COLUMNS} FROM claims WHERE fulfillment_status = ?1
                     ORDER BY created_at ASC LIMIT ?2"
                ),
                params![status.as_str(), limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("claims_by_status: {e}")))?;

        let mut claims = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_claim(&row) {
                Ok(claim) => claims.push(claim),
                Err(e) => tracing::warn!("Skipping claim row: {e}"),
            }
        }
        Ok(claims)
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT mail_id, policy_type, policy_issued_date FROM users WHERE mail_id = ?1",
                params![email],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_user_by_email: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let user = UserRecord {
                    mail_id: row
                        .get(0)
                        .map_err(|e| DatabaseError::Query(format!("user row: {e}")))?,
                    policy_type: row
                        .get(1)
                        .map_err(|e| DatabaseError::Query(format!("user row: {e}")))?,
                    policy_issued_date: row
                        .get(2)
                        .map_err(|e| DatabaseError::Query(format!("user row: {e}")))?,
                };
                Ok(Some(user))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_user_by_email: {e}"))),
        }
    }

    async fn insert_user(&self, user: &UserRecord) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO users (mail_id, policy_type, policy_issued_date)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT (mail_id) DO UPDATE SET
                    policy_type = excluded.policy_type,
                    policy_issued_date = excluded.policy_issued_date",
                params![
                    user.mail_id.clone(),
                    user.policy_type.clone(),
                    user.policy_issued_date.clone(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_user: {e}")))?;

        debug!(mail_id = %user.mail_id, "User upserted");
        Ok(())
    }

    async fn store_document(&self, doc: &NewDocument) -> Result<String, DatabaseError> {
        let file_id = Uuid::new_v4().to_string();
        self.conn()
            .execute(
                "INSERT INTO documents (file_id, claim_id, user_email, kind, filename,
                    content, size, uploaded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    file_id.clone(),
                    doc.claim_id.clone(),
                    doc.user_email.clone(),
                    doc.kind.as_str(),
                    doc.filename.clone(),
                    doc.content.clone(),
                    doc.content.len() as i64,
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("store_document: {e}")))?;

        debug!(
            file_id = %file_id,
            claim_id = %doc.claim_id,
            kind = doc.kind.as_str(),
            size = doc.content.len(),
            "Document archived"
        );
        Ok(file_id)
    }

    async fn get_document(&self, file_id: &str) -> Result<Option<StoredDocument>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT file_id, claim_id, user_email, kind, filename, content, size, uploaded_at
                 FROM documents WHERE file_id = ?1",
                params![file_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_document: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let kind_str: String = row
                    .get(3)
                    .map_err(|e| DatabaseError::Query(format!("document row: {e}")))?;
                let uploaded_str: String = row
                    .get(7)
                    .map_err(|e| DatabaseError::Query(format!("document row: {e}")))?;
                let size: i64 = row
                    .get(6)
                    .map_err(|e| DatabaseError::Query(format!("document row: {e}")))?;
                let doc = StoredDocument {
                    file_id: row
                        .get(0)
                        .map_err(|e| DatabaseError::Query(format!("document row: {e}")))?,
                    claim_id: row
                        .get(1)
                        .map_err(|e| DatabaseError::Query(format!("document row: {e}")))?,
                    user_email: row
                        .get(2)
                        .map_err(|e| DatabaseError::Query(format!("document row: {e}")))?,
                    kind: DocumentKind::parse(&kind_str),
                    filename: row
                        .get(4)
                        .map_err(|e| DatabaseError::Query(format!("document row: {e}")))?,
                    content: row
                        .get::<Vec<u8>>(5)
                        .map_err(|e| DatabaseError::Query(format!("document row: {e}")))?,
                    size: size.max(0) as u64,
                    uploaded_at: parse_datetime(&uploaded_str),
                };
                Ok(Some(doc))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_document: {e}"))),
        }
    }

    async fn document_ids_for_claim(&self, claim_id: &str) -> Result<Vec<String>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT file_id FROM documents WHERE claim_id = ?1 ORDER BY uploaded_at ASC",
                params![claim_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("document_ids_for_claim: {e}")))?;

        let mut ids = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            if let Ok(id) = row.get::<String>(0) {
                ids.push(id);
            }
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_claim(claim_id: &str, status: ClaimStatus) -> ClaimRecord {
        let now = Utc::now();
        ClaimRecord {
            claim_id: claim_id.to_string(),
            user_mail: "customer@example.com".to_string(),
            mail_content: "Subject: Car accident claim\n\nMy car was damaged.".to_string(),
            attachment_count: 2,
            local_attachment_paths: vec![
                "attachments/CLAIM_AB12CD34/1_receipt.pdf".to_string(),
                "attachments/CLAIM_AB12CD34/2_photo.jpg".to_string(),
            ],
            status,
            missing_items: None,
            mail_content_file_id: None,
            attachment_file_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn mail_tracking_starts_empty_then_latest_wins() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        assert!(db.get_mail_tracking().await.unwrap().is_none());

        db.update_mail_tracking(5, Utc::now()).await.unwrap();
        db.update_mail_tracking(8, Utc::now()).await.unwrap();

        let tracking = db.get_mail_tracking().await.unwrap().unwrap();
        assert_eq!(tracking.mail_count, 8);
    }

    #[tokio::test]
    async fn claim_insert_and_get_roundtrip() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let claim = sample_claim("CLAIM_AB12CD34", ClaimStatus::Pending);
        db.insert_claim(&claim).await.unwrap();

        let loaded = db.get_claim("CLAIM_AB12CD34").await.unwrap().unwrap();
        assert_eq!(loaded.user_mail, "customer@example.com");
        assert_eq!(loaded.attachment_count, 2);
        assert_eq!(loaded.local_attachment_paths.len(), 2);
        assert_eq!(loaded.status, ClaimStatus::Pending);
        assert!(loaded.missing_items.is_none());
    }

    #[tokio::test]
    async fn duplicate_claim_id_rejected() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let claim = sample_claim("CLAIM_11111111", ClaimStatus::Pending);
        db.insert_claim(&claim).await.unwrap();
        assert!(db.insert_claim(&claim).await.is_err());
    }

    #[tokio::test]
    async fn status_update_reports_missing_claims() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let claim = sample_claim("CLAIM_22222222", ClaimStatus::Pending);
        db.insert_claim(&claim).await.unwrap();

        assert!(
            db.update_claim_status("CLAIM_22222222", ClaimStatus::Completed)
                .await
                .unwrap()
        );
        assert!(
            !db.update_claim_status("CLAIM_99999999", ClaimStatus::Completed)
                .await
                .unwrap()
        );

        let loaded = db.get_claim("CLAIM_22222222").await.unwrap().unwrap();
        assert_eq!(loaded.status, ClaimStatus::Completed);
    }

    #[tokio::test]
    async fn claims_by_status_filters() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        db.insert_claim(&sample_claim("CLAIM_00000001", ClaimStatus::Pending))
            .await
            .unwrap();
        db.insert_claim(&sample_claim("CLAIM_00000002", ClaimStatus::Completed))
            .await
            .unwrap();
        db.insert_claim(&sample_claim("CLAIM_00000003", ClaimStatus::Pending))
            .await
            .unwrap();

        let pending = db.claims_by_status(ClaimStatus::Pending, 10).await.unwrap();
        assert_eq!(pending.len(), 2);
        let completed = db
            .claims_by_status(ClaimStatus::Completed, 10)
            .await
            .unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].claim_id, "CLAIM_00000002");
    }

    #[tokio::test]
    async fn user_lookup_and_upsert() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        assert!(
            db.get_user_by_email("nobody@example.com")
                .await
                .unwrap()
                .is_none()
        );

        let user = UserRecord {
            mail_id: "alice@example.com".to_string(),
            policy_type: "auto".to_string(),
            policy_issued_date: "2024-03-01".to_string(),
        };
        db.insert_user(&user).await.unwrap();

        let loaded = db
            .get_user_by_email("alice@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.policy_type, "auto");

        // Upsert replaces the policy
        let updated = UserRecord {
            policy_type: "home".to_string(),
            ..user
        };
        db.insert_user(&updated).await.unwrap();
        let loaded = db
            .get_user_by_email("alice@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.policy_type, "home");
    }

    #[tokio::test]
    async fn document_archive_roundtrip() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let doc = NewDocument {
            claim_id: "CLAIM_33333333".to_string(),
            user_email: "bob@example.com".to_string(),
            kind: DocumentKind::Attachment,
            filename: "receipt.pdf".to_string(),
            content: b"pdf-bytes".to_vec(),
        };
        let file_id = db.store_document(&doc).await.unwrap();

        let loaded = db.get_document(&file_id).await.unwrap().unwrap();
        assert_eq!(loaded.claim_id, "CLAIM_33333333");
        assert_eq!(loaded.kind, DocumentKind::Attachment);
        assert_eq!(loaded.content, b"pdf-bytes");
        assert_eq!(loaded.size, 9);

        let ids = db.document_ids_for_claim("CLAIM_33333333").await.unwrap();
        assert_eq!(ids, vec![file_id]);
    }

    #[test]
    fn parse_datetime_handles_both_formats() {
        let rfc = parse_datetime("2026-08-30T12:00:00+00:00");
        assert_eq!(rfc.to_rfc3339(), "2026-08-30T12:00:00+00:00");

        let sqlite = parse_datetime("2026-08-30 12:00:00");
        assert_eq!(sqlite, rfc);
    }
}
