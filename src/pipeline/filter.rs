//! LLM relevance filter — decides whether an email is insurance-related.
//!
//! Parsing degrades in stages so a flaky model response never drops a
//! potential claim: JSON verdict, free-text heuristics for brace-free
//! replies, keyword check over the email, conservative default-include.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};
use crate::pipeline::types::{IncomingClaim, RelevanceVerdict};

const FILTER_SYSTEM_PROMPT: &str = "\
You are an expert insurance email classifier. Your job is to determine if an email is related to insurance matters.

Insurance-related emails include:
- Insurance claims (auto, home, health, life, etc.)
- Policy inquiries and renewals
- Coverage questions and changes
- Premium payments and billing
- Claims status updates
- Insurance company communications
- Agent/broker communications

Non-insurance emails include:
- Marketing emails
- Personal communications
- Business communications unrelated to insurance
- Spam or promotional content

Analyze the email content carefully and respond with a JSON object containing:
- \"is_insurance\": true/false
- \"confidence\": 0-100 (confidence level)
- \"reasoning\": brief explanation of your decision
- \"category\": specific insurance category if applicable

Be conservative - when in doubt, classify as insurance-related to avoid missing important claims.";

const INSURANCE_KEYWORDS: &[&str] = &[
    "claim",
    "insurance",
    "policy",
    "coverage",
    "damage",
    "accident",
];

/// Classifies incoming emails with an LLM.
pub struct RelevanceFilter {
    llm: Arc<dyn LlmProvider>,
}

impl RelevanceFilter {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Classify one email. Never fails: all errors resolve through the
    /// fallback chain.
    pub async fn classify(&self, claim: &IncomingClaim) -> RelevanceVerdict {
        let user_prompt = format!(
            "Please classify this email as insurance-related or not:\n\n\
             From: {}\n\
             Subject: {}\n\
             Content: {}\n\
             Attachments: {} files\n\n\
             Respond with JSON only:\n\
             {{\n\
                 \"is_insurance\": true/false,\n\
                 \"confidence\": 0-100,\n\
                 \"reasoning\": \"explanation\",\n\
                 \"category\": \"category_name\"\n\
             }}",
            claim.sender_email, claim.subject, claim.body, claim.attachment_count
        );

        let request = CompletionRequest::new(vec![
            ChatMessage::system(FILTER_SYSTEM_PROMPT),
            ChatMessage::user(user_prompt),
        ]);

        let response = match self.llm.complete(request).await {
            Ok(r) => r,
            Err(e) => {
                warn!(sender = %claim.sender_email, error = %e, "LLM filter call failed, using keyword fallback");
                return keyword_fallback(&claim.subject, &claim.body);
            }
        };

        let verdict = parse_verdict(&response.content)
            .unwrap_or_else(|| keyword_fallback(&claim.subject, &claim.body));

        debug!(
            sender = %claim.sender_email,
            is_insurance = verdict.is_insurance,
            confidence = verdict.confidence,
            category = %verdict.category,
            "Relevance verdict"
        );
        verdict
    }
}

/// Extract and parse the verdict from an LLM response.
///
/// The JSON object between the first `{` and last `}` is authoritative:
/// when it fails to decode, `None` is returned so the caller re-checks
/// the email itself with the keyword fallback. Free-text heuristics
/// only apply to responses that carry no JSON object at all.
fn parse_verdict(response: &str) -> Option<RelevanceVerdict> {
    if let Some(json) = extract_json_object(response) {
        return serde_json::from_str(json).ok();
    }
    if response.trim().is_empty() {
        return None;
    }
    Some(parse_text_heuristics(response))
}

/// Slice out the outermost JSON object, if any.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end > start { Some(&text[start..=end]) } else { None }
}

/// Best-effort verdict from a free-text response.
fn parse_text_heuristics(response: &str) -> RelevanceVerdict {
    let lower = response.to_lowercase();
    let is_insurance = ["true", "yes", "insurance", "claim"]
        .iter()
        .any(|kw| lower.contains(kw));

    let category = if lower.contains("auto") || lower.contains("car") {
        "auto_claim"
    } else if lower.contains("health") || lower.contains("medical") {
        "health_inquiry"
    } else if lower.contains("home") || lower.contains("property") {
        "property_claim"
    } else {
        "unknown"
    };

    RelevanceVerdict {
        is_insurance,
        confidence: 50,
        reasoning: "LLM response parsing failed, using fallback analysis".into(),
        category: category.into(),
    }
}

/// Keyword-based check for when the LLM is unreachable or unparseable.
/// Two or more insurance keywords in subject or body count as relevant.
pub fn keyword_fallback(subject: &str, body: &str) -> RelevanceVerdict {
    let subject = subject.to_lowercase();
    let body = body.to_lowercase();
    let keyword_count = INSURANCE_KEYWORDS
        .iter()
        .filter(|kw| subject.contains(*kw) || body.contains(*kw))
        .count();

    if keyword_count == 0 && subject.is_empty() && body.is_empty() {
        return RelevanceVerdict::default_include("Fallback check failed, defaulting to include");
    }

    RelevanceVerdict {
        is_insurance: keyword_count >= 2,
        confidence: 30,
        reasoning: format!("Fallback keyword check found {keyword_count} insurance keywords"),
        category: "fallback_analysis".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_verdict_parses() {
        let response = r#"Here is my analysis:
        {"is_insurance": true, "confidence": 92, "reasoning": "mentions a car claim", "category": "auto_claim"}
        "#;
        let verdict = parse_verdict(response).unwrap();
        assert!(verdict.is_insurance);
        assert_eq!(verdict.confidence, 92);
        assert_eq!(verdict.category, "auto_claim");
    }

    #[test]
    fn json_verdict_negative() {
        let response = r#"{"is_insurance": false, "confidence": 88, "reasoning": "newsletter", "category": "none"}"#;
        let verdict = parse_verdict(response).unwrap();
        assert!(!verdict.is_insurance);
    }

    #[test]
    fn text_heuristics_detect_insurance_and_category() {
        let verdict = parse_verdict("Yes, this is an auto insurance claim about a car.").unwrap();
        assert!(verdict.is_insurance);
        assert_eq!(verdict.confidence, 50);
        assert_eq!(verdict.category, "auto_claim");
    }

    #[test]
    fn text_heuristics_health_category() {
        let verdict = parse_verdict("This concerns a medical insurance inquiry").unwrap();
        assert_eq!(verdict.category, "health_inquiry");
    }

    #[test]
    fn empty_response_yields_none() {
        assert!(parse_verdict("   ").is_none());
    }

    #[test]
    fn malformed_json_yields_none_instead_of_text_heuristics() {
        // Would read as insurance under the text heuristics ("true",
        // "insurance"); a broken JSON object must defer to the keyword
        // check over the email instead.
        let response = r#"{"is_insurance": true, "confidence": high, "category": insurance}"#;
        assert!(parse_verdict(response).is_none());
    }

    #[test]
    fn keyword_fallback_two_keywords_is_insurance() {
        let verdict = keyword_fallback("Insurance claim", "my policy was damaged");
        assert!(verdict.is_insurance);
        assert_eq!(verdict.confidence, 30);
    }

    #[test]
    fn keyword_fallback_one_keyword_is_not() {
        let verdict = keyword_fallback("Meeting invite", "please claim your seat");
        assert!(!verdict.is_insurance);
    }

    #[test]
    fn keyword_fallback_empty_defaults_to_include() {
        let verdict = keyword_fallback("", "");
        assert!(verdict.is_insurance);
        assert_eq!(verdict.confidence, 0);
    }

    #[test]
    fn extract_json_ignores_surrounding_prose() {
        assert_eq!(extract_json_object("pre {\"a\": 1} post"), Some("{\"a\": 1}"));
        assert_eq!(extract_json_object("no braces"), None);
        assert_eq!(extract_json_object("} reversed {"), None);
    }
}
