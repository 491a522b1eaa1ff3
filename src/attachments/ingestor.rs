//! Attachment tray and turn composition.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use super::inspector::FileInspector;
use super::model::{Attachment, AttachmentContent};
use crate::config::AttachmentLimits;
use crate::conversation::ContentBlock;
use crate::error::{AttachmentError, UsageError};

/// Result of one `add_files` batch. Failures never discard successes.
#[derive(Debug, Default)]
pub struct AddFilesOutcome {
    pub added: Vec<Attachment>,
    pub failed: Vec<AttachmentError>,
}

/// Holds the attachments for the next turn.
pub struct AttachmentIngestor {
    inspector: Arc<dyn FileInspector>,
    limits: AttachmentLimits,
    attachments: Vec<Attachment>,
}

impl AttachmentIngestor {
    pub fn new(inspector: Arc<dyn FileInspector>, limits: AttachmentLimits) -> Self {
        Self {
            inspector,
            limits,
            attachments: Vec::new(),
        }
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    pub fn len(&self) -> usize {
        self.attachments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attachments.is_empty()
    }

    pub fn limits(&self) -> AttachmentLimits {
        self.limits
    }

    /// Inspect and append `paths` in order.
    ///
    /// The whole batch is refused, with the tray untouched, when it would push the count past the
    /// limit. Paths already held (or repeated within the batch) are skipped.
    pub async fn add_files(
        &mut self,
        paths: &[PathBuf],
    ) -> Result<AddFilesOutcome, AttachmentError> {
        let current = self.attachments.len();
        if current + paths.len() > self.limits.max_files {
            warn!(
                current,
                incoming = paths.len(),
                max = self.limits.max_files,
                "Attachment batch rejected"
            );
            return Err(AttachmentError::LimitExceeded {
                max: self.limits.max_files,
                current,
                incoming: paths.len(),
            });
        }

        let mut seen: HashSet<PathBuf> = self.attachments.iter().map(|a| a.path.clone()).collect();
        let mut outcome = AddFilesOutcome::default();

        for path in paths {
            if !seen.insert(path.clone()) {
                continue;
            }
            match self.inspector.inspect(path).await {
                Ok(attachment) => outcome.added.push(attachment),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Attachment failed");
                    outcome.failed.push(e);
                }
            }
        }

        self.attachments.extend(outcome.added.iter().cloned());
        info!(
            added = outcome.added.len(),
            failed = outcome.failed.len(),
            total = self.attachments.len(),
            "Attachments updated"
        );
        Ok(outcome)
    }

    pub fn remove(&mut self, index: usize) -> Result<Attachment, UsageError> {
        if index >= self.attachments.len() {
            return Err(UsageError::NoSuchAttachment(index));
        }
        Ok(self.attachments.remove(index))
    }

    pub fn clear(&mut self) {
        self.attachments.clear();
    }

    /// Paths currently held, in tray order.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.attachments.iter().map(|a| a.path.clone()).collect()
    }

    /// Drop the attachments whose path is in `paths`; anything added since stays. Returns how
    /// many were removed.
    pub fn remove_paths(&mut self, paths: &[PathBuf]) -> usize {
        let sent: HashSet<&PathBuf> = paths.iter().collect();
        let before = self.attachments.len();
        self.attachments.retain(|a| !sent.contains(&a.path));
        before - self.attachments.len()
    }

    /// Content blocks for the held attachments followed by `text`.
    pub fn compose(&self, text: &str) -> Vec<ContentBlock> {
        build_content_blocks(&self.attachments, text, &self.limits)
    }
}

/// Truncate to `budget` characters, appending a marker when anything was cut.
fn truncate_chars(text: &str, budget: usize) -> String {
    match text.char_indices().nth(budget) {
        None => text.to_string(),
        Some((cut, _)) => {
            let omitted = text[cut..].chars().count();
            format!(
                "{}\n[... truncated, {omitted} more characters omitted]",
                &text[..cut]
            )
        }
    }
}

fn describe(attachment: &Attachment, budget: usize) -> String {
    let body = attachment.content.render_text().unwrap_or_default();
    format!(
        "Attached file: {}\nPath: {}\n\n{}",
        attachment.name,
        display_path(&attachment.path),
        truncate_chars(&body, budget)
    )
}

fn display_path(path: &Path) -> String {
    path.display().to_string()
}

/// Compose a turn from attachments and the user's text. Same inputs, same blocks.
///
/// Each image yields an image block and a caption naming its path; every other attachment yields
/// one text block truncated to the per-file budget. The trimmed user text comes last.
pub fn build_content_blocks(
    attachments: &[Attachment],
    text: &str,
    limits: &AttachmentLimits,
) -> Vec<ContentBlock> {
    let budget = limits.per_file_budget(attachments.len());
    let mut blocks = Vec::with_capacity(attachments.len() * 2 + 1);

    for attachment in attachments {
        match &attachment.content {
            AttachmentContent::Image(data) => {
                blocks.push(ContentBlock::image(attachment.mime_type.clone(), data.clone()));
                blocks.push(ContentBlock::text(format!(
                    "Image: {}",
                    display_path(&attachment.path)
                )));
            }
            AttachmentContent::Text(_)
            | AttachmentContent::Spreadsheet(_)
            | AttachmentContent::StructuredData(_) => {
                blocks.push(ContentBlock::text(describe(attachment, budget)));
            }
        }
    }

    blocks.push(ContentBlock::text(text.trim()));
    blocks
}
