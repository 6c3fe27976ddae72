//! Pipeline data types.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// An email that passed the relevance filter, queued for processing.
#[derive(Debug, Clone)]
pub struct IncomingClaim {
    pub claim_id: String,
    pub sender_email: String,
    pub subject: String,
    pub body: String,
    pub attachment_count: u32,
    pub attachment_paths: Vec<PathBuf>,
    pub verdict: RelevanceVerdict,
}

impl IncomingClaim {
    /// Excerpt stored with the claim record: subject plus a bounded
    /// slice of the body.
    pub fn record_excerpt(&self, body_limit: usize) -> String {
        let body: String = self.body.chars().take(body_limit).collect();
        let excerpt = format!("Subject: {}\nContent: {}", self.subject, body);
        excerpt.chars().take(1000).collect()
    }

    /// Attachment file names without directory components.
    pub fn attachment_names(&self) -> Vec<String> {
        self.attachment_paths
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(String::from))
            .collect()
    }
}

/// Relevance filter verdict for one email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelevanceVerdict {
    #[serde(default)]
    pub is_insurance: bool,
    /// Confidence level 0-100.
    #[serde(default)]
    pub confidence: u8,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub category: String,
}

impl RelevanceVerdict {
    /// Conservative verdict used when every parsing strategy fails:
    /// include the email so no claim is silently dropped.
    pub fn default_include(reasoning: impl Into<String>) -> Self {
        Self {
            is_insurance: true,
            confidence: 0,
            reasoning: reasoning.into(),
            category: "unknown".into(),
        }
    }
}

/// Outcome of the fulfillment assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FulfillmentStatus {
    Completed,
    Pending,
}

/// Parsed fulfillment assessment for one claim.
#[derive(Debug, Clone)]
pub struct Assessment {
    pub status: FulfillmentStatus,
    /// Bullet list of missing requirements (empty when completed).
    pub missing_items: String,
    /// Requirements the customer already satisfied.
    pub satisfied_items: Vec<String>,
    /// Rendered follow-up email body (pending claims only).
    pub email_content: String,
}
