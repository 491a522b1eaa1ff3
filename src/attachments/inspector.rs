//! File inspection capability and the filesystem-backed default.

use std::path::Path;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};

use super::model::{Attachment, AttachmentContent};
use crate::error::AttachmentError;

/// Files above this size are refused (20 MiB).
const DEFAULT_MAX_BYTES: u64 = 20 * 1024 * 1024;

/// Rows kept from a delimited file.
const SPREADSHEET_ROW_LIMIT: usize = 50;

/// Turns a path into a normalized attachment.
#[async_trait]
pub trait FileInspector: Send + Sync {
    async fn inspect(&self, path: &Path) -> Result<Attachment, AttachmentError>;
}

/// MIME type for an extension (lowercase, no dot).
fn mime_for(extension: Option<&str>) -> &'static str {
    match extension {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("json") => "application/json",
        Some("csv") => "text/csv",
        Some("tsv") => "text/tab-separated-values",
        Some("md" | "markdown") => "text/markdown",
        Some("html" | "htm") => "text/html",
        Some("xml") => "application/xml",
        Some("yaml" | "yml") => "application/yaml",
        Some("toml") => "application/toml",
        Some("js" | "mjs") => "text/javascript",
        Some("ts") => "text/x-typescript",
        Some("rs") => "text/x-rust",
        Some("py") => "text/x-python",
        Some("sh") => "application/x-sh",
        Some("txt" | "log") => "text/plain",
        Some("pdf") => "application/pdf",
        Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        Some("xlsx") => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        Some("zip") => "application/zip",
        Some("exe" | "dll" | "so" | "dylib" | "bin") => "application/octet-stream",
        _ => "text/plain",
    }
}

/// Formats the default inspector refuses outright.
fn is_unsupported_mime(mime: &str) -> bool {
    matches!(
        mime,
        "application/pdf"
            | "application/zip"
            | "application/octet-stream"
            | "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            | "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
    )
}

/// Split one delimited line, honouring double-quoted fields.
fn split_delimited(line: &str, delimiter: char) -> Vec<String> {
    let mut cells = Vec::new();
    let mut cell = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                cell.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            c if c == delimiter && !quoted => cells.push(std::mem::take(&mut cell)),
            c => cell.push(c),
        }
    }
    cells.push(cell);
    cells
}

fn parse_rows(text: &str, delimiter: char) -> Vec<Vec<String>> {
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .take(SPREADSHEET_ROW_LIMIT)
        .map(|l| split_delimited(l, delimiter))
        .collect()
}

/// Reads files from the local filesystem.
#[derive(Debug, Clone)]
pub struct FsInspector {
    max_bytes: u64,
}

impl FsInspector {
    pub fn new() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }
}

impl Default for FsInspector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileInspector for FsInspector {
    async fn inspect(&self, path: &Path) -> Result<Attachment, AttachmentError> {
        let unsupported = |reason: String| AttachmentError::Unsupported {
            path: path.to_path_buf(),
            reason,
        };

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| unsupported(e.to_string()))?;
        if !metadata.is_file() {
            return Err(unsupported("not a regular file".into()));
        }
        if metadata.len() > self.max_bytes {
            return Err(unsupported(format!(
                "file is {} bytes, limit is {}",
                metadata.len(),
                self.max_bytes
            )));
        }

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| unsupported("file name is not valid UTF-8".into()))?
            .to_string();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);
        let mime_type = mime_for(extension.as_deref());
        if is_unsupported_mime(mime_type) {
            return Err(unsupported(format!("{mime_type} is not supported")));
        }

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| unsupported(e.to_string()))?;

        let content = if mime_type.starts_with("image/") {
            AttachmentContent::Image(BASE64.encode(&bytes))
        } else {
            let text = String::from_utf8(bytes)
                .map_err(|_| unsupported("file is not UTF-8 text".into()))?;
            if text.contains('\0') {
                return Err(unsupported("file looks binary".into()));
            }
            match extension.as_deref() {
                Some("json") => {
                    let value: serde_json::Value = serde_json::from_str(&text)
                        .map_err(|e| unsupported(format!("invalid JSON: {e}")))?;
                    AttachmentContent::StructuredData(value.to_string())
                }
                Some("csv") => AttachmentContent::Spreadsheet(parse_rows(&text, ',')),
                Some("tsv") => AttachmentContent::Spreadsheet(parse_rows(&text, '\t')),
                _ => AttachmentContent::Text(text),
            }
        };

        Ok(Attachment {
            path: path.to_path_buf(),
            name,
            extension,
            size: metadata.len(),
            mime_type: mime_type.to_string(),
            content,
        })
    }
}
