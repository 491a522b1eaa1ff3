//! Attachment ingestion: file inspection, the per-turn tray and content-block composition.

pub mod ingestor;
pub mod inspector;
pub mod model;

pub use ingestor::{AddFilesOutcome, AttachmentIngestor, build_content_blocks};
pub use inspector::{FileInspector, FsInspector};
pub use model::{Attachment, AttachmentContent};
