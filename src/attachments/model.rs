//! Attachment types.

use std::path::PathBuf;

use serde::Serialize;

/// Normalized file content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum AttachmentContent {
    /// Base64-encoded image bytes.
    Image(String),
    Text(String),
    Spreadsheet(Vec<Vec<String>>),
    /// Compact JSON.
    StructuredData(String),
}

impl AttachmentContent {
    pub fn is_image(&self) -> bool {
        matches!(self, Self::Image(_))
    }

    /// Textual rendering used in content blocks. `None` for images.
    pub fn render_text(&self) -> Option<String> {
        match self {
            Self::Image(_) => None,
            Self::Text(text) | Self::StructuredData(text) => Some(text.clone()),
            Self::Spreadsheet(rows) => Some(
                rows.iter()
                    .map(|row| row.join("\t"))
                    .collect::<Vec<_>>()
                    .join("\n"),
            ),
        }
    }
}

/// A user-selected file, inspected and ready for inclusion in a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attachment {
    pub path: PathBuf,
    pub name: String,
    pub extension: Option<String>,
    pub size: u64,
    pub mime_type: String,
    pub content: AttachmentContent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spreadsheet_renders_tab_separated() {
        let content = AttachmentContent::Spreadsheet(vec![
            vec!["name".into(), "qty".into()],
            vec!["apple".into(), "3".into()],
        ]);
        assert_eq!(content.render_text().unwrap(), "name\tqty\napple\t3");
        assert!(AttachmentContent::Image("AAAA".into()).render_text().is_none());
    }
}
