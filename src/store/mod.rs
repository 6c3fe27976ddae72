//! Persistence layer — libSQL-backed storage for claims, users,
//! documents, and mail tracking.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{
    ClaimRecord, ClaimStatus, Database, DocumentKind, MailTracking, NewDocument, StoredDocument,
    UserRecord,
};
