//! Filing of attachments into the receipt archive directory.
//!
//! Layout: `<base>/<YYYY>/<MM>/<YYYY-MM-DD>_<name>.<ext>`, dated by the
//! message. Existing files are never overwritten; a `_01`, `_02`, ... suffix
//! is appended instead.

use std::path::{Path, PathBuf};

use belegscanner_core::{Attachment, Error, MessageContent, Result};
use tracing::info;

fn sanitize(stem: &str) -> String {
    let cleaned: String = stem
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_matches(|c| c == '_' || c == '.');
    if trimmed.is_empty() {
        "beleg".to_string()
    } else {
        trimmed.to_string()
    }
}

fn split_name(filename: &str) -> (&str, Option<&str>) {
    match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => (stem, Some(ext)),
        _ => (filename, None),
    }
}

async fn exists(path: &Path) -> Result<bool> {
    tokio::fs::try_exists(path)
        .await
        .map_err(|e| Error::Artifact(format!("{}: {e}", path.display())))
}

async fn free_path(dir: &Path, base: &str, ext: Option<&str>) -> Result<PathBuf> {
    let name = |suffix: &str| match ext {
        Some(ext) => format!("{base}{suffix}.{ext}"),
        None => format!("{base}{suffix}"),
    };
    let mut candidate = dir.join(name(""));
    let mut counter = 1u32;
    while exists(&candidate).await? {
        candidate = dir.join(name(&format!("_{counter:02}")));
        counter += 1;
    }
    Ok(candidate)
}

async fn file_one(dir: &Path, date: &str, attachment: &Attachment) -> Result<PathBuf> {
    let (stem, ext) = split_name(&attachment.filename);
    let base = format!("{date}_{}", sanitize(stem));
    let ext = ext.map(sanitize);
    let target = free_path(dir, &base, ext.as_deref()).await?;
    tokio::fs::write(&target, &attachment.data)
        .await
        .map_err(|e| Error::Artifact(format!("{}: {e}", target.display())))?;
    Ok(target)
}

/// Writes every attachment of `content` below `base`.
///
/// Returns the written paths in attachment order. A message without
/// attachments files nothing and succeeds.
///
/// # Errors
///
/// Returns [`Error::Artifact`] if a directory or file cannot be written.
pub async fn file_attachments(base: &Path, content: &MessageContent) -> Result<Vec<PathBuf>> {
    if content.attachments.is_empty() {
        return Ok(Vec::new());
    }

    let dir = base
        .join(content.date.format("%Y").to_string())
        .join(content.date.format("%m").to_string());
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| Error::Artifact(format!("{}: {e}", dir.display())))?;

    let date = content.date.format("%Y-%m-%d").to_string();
    let mut written = Vec::with_capacity(content.attachments.len());
    for attachment in &content.attachments {
        let path = file_one(&dir, &date, attachment).await?;
        info!(identity = %content.identity, path = %path.display(), "Filed attachment");
        written.push(path);
    }
    Ok(written)
}
