//! Prompt and email templates — plain text files with `{name}` placeholders.
//!
//! Templates live in the prompts directory. Email templates may carry a
//! `Subject: ...` first line; the body follows after a blank line.
//! Loading follows a primary → fallback → built-in chain: if the primary
//! file is missing or unreadable the fallback file is tried, and callers
//! keep a hardcoded last resort for when both are absent.

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::TemplateError;

/// Loads templates from a directory and renders them.
#[derive(Debug, Clone)]
pub struct TemplateStore {
    dir: PathBuf,
}

impl TemplateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load a template file by name, trimmed.
    pub fn load(&self, name: &str) -> Result<String, TemplateError> {
        let path = self.dir.join(name);
        if !path.exists() {
            return Err(TemplateError::NotFound(name.to_string()));
        }
        let content = std::fs::read_to_string(&path).map_err(|e| TemplateError::Read {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        let trimmed = content.trim().to_string();
        if trimmed.is_empty() {
            return Err(TemplateError::Empty(name.to_string()));
        }
        Ok(trimmed)
    }

    /// Load the primary template, falling back to the secondary on failure.
    pub fn load_with_fallback(
        &self,
        primary: &str,
        fallback: &str,
    ) -> Result<String, TemplateError> {
        match self.load(primary) {
            Ok(t) => Ok(t),
            Err(e) => {
                warn!(template = primary, error = %e, "Primary template unavailable, trying fallback");
                self.load(fallback)
            }
        }
    }
}

/// Substitute `{name}` placeholders with the given values.
///
/// Unknown placeholders are left in place — templates carry no schema,
/// so a typo surfaces in the rendered output rather than erroring.
pub fn render(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (key, value) in values {
        out = out.replace(&format!("{{{key}}}"), value);
    }
    out
}

/// Split an email template into subject and body.
///
/// If the first line starts with `Subject: `, that line becomes the
/// subject and the remainder (after an optional blank line) the body.
/// Otherwise the provided default subject is used and the whole text is
/// the body.
pub fn split_subject<'a>(template: &'a str, default_subject: &str) -> (String, &'a str) {
    if let Some(rest) = template.strip_prefix("Subject: ") {
        if let Some(pos) = rest.find('\n') {
            let subject = rest[..pos].trim().to_string();
            let body = rest[pos + 1..].trim_start_matches('\n');
            return (subject, body);
        }
    }
    (default_subject.to_string(), template)
}
