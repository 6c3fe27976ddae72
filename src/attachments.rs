//! Attachment storage — claim-scoped folders under the attachments dir.
//!
//! Layout: `<attachments_dir>/CLAIM_XXXXXXXX/<millis>_<original_name>`.
//! Files are kept locally until the claim completes and the documents
//! are archived to the database, then deleted.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

/// Save raw attachment bytes into the claim's folder.
///
/// Filenames are prefixed with a millisecond timestamp so repeated
/// names from one email cannot collide. Returns the paths written.
pub fn save_attachments(
    attachments_dir: &Path,
    claim_id: &str,
    attachments: &[(String, Vec<u8>)],
) -> std::io::Result<Vec<PathBuf>> {
    if attachments.is_empty() {
        return Ok(Vec::new());
    }

    let claim_folder = attachments_dir.join(claim_id);
    std::fs::create_dir_all(&claim_folder)?;
    debug!(folder = %claim_folder.display(), "Claim attachment folder ready");

    let mut paths = Vec::with_capacity(attachments.len());
    for (filename, data) in attachments {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let safe_name = sanitize_filename(filename);
        let path = claim_folder.join(format!("{millis}_{safe_name}"));
        std::fs::write(&path, data)?;
        debug!(file = %path.display(), size = data.len(), "Saved attachment");
        paths.push(path);
    }
    Ok(paths)
}

/// Delete the given attachment files, then the claim folder if empty.
///
/// Used after a completed claim's documents are archived to the
/// database, and to discard attachments of filtered-out emails.
pub fn cleanup_claim_files(paths: &[PathBuf]) {
    let mut claim_folder: Option<PathBuf> = None;

    for path in paths {
        if claim_folder.is_none() {
            claim_folder = path.parent().map(Path::to_path_buf);
        }
        match std::fs::remove_file(path) {
            Ok(()) => debug!(file = %path.display(), "Deleted local attachment"),
            Err(e) => warn!(file = %path.display(), error = %e, "Failed to delete attachment"),
        }
    }

    if let Some(folder) = claim_folder {
        remove_if_empty(&folder);
    }
}

/// Maintenance sweep: remove `CLAIM_*` folders older than the cutoff.
///
/// Returns (folders removed, files removed).
pub fn sweep_stale_claims(attachments_dir: &Path, older_than_hours: u64) -> (usize, usize) {
    let entries = match std::fs::read_dir(attachments_dir) {
        Ok(e) => e,
        Err(_) => return (0, 0),
    };

    let cutoff = SystemTime::now()
        .checked_sub(std::time::Duration::from_secs(older_than_hours * 3600));
    let Some(cutoff) = cutoff else {
        return (0, 0);
    };

    let mut folders = 0;
    let mut files = 0;

    for entry in entries.flatten() {
        let path = entry.path();
        let is_claim_dir = path.is_dir()
            && path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("CLAIM_"));
        if !is_claim_dir {
            continue;
        }

        let modified = entry.metadata().and_then(|m| m.modified()).ok();
        if modified.is_none_or(|m| m >= cutoff) {
            continue;
        }

        if let Ok(dir) = std::fs::read_dir(&path) {
            for file in dir.flatten() {
                if std::fs::remove_file(file.path()).is_ok() {
                    files += 1;
                }
            }
        }
        if std::fs::remove_dir(&path).is_ok() {
            folders += 1;
            debug!(folder = %path.display(), "Removed stale claim folder");
        }
    }

    (folders, files)
}

fn remove_if_empty(folder: &Path) {
    let is_empty = std::fs::read_dir(folder)
        .map(|mut d| d.next().is_none())
        .unwrap_or(false);
    if is_empty {
        match std::fs::remove_dir(folder) {
            Ok(()) => debug!(folder = %folder.display(), "Removed empty claim folder"),
            Err(e) => warn!(folder = %folder.display(), error = %e, "Failed to remove claim folder"),
        }
    }
}

/// Strip path separators from attachment filenames.
fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | '\0') { '_' } else { c })
        .collect();
    if cleaned.is_empty() {
        "attachment".to_string()
    } else {
        cleaned
    }
}
