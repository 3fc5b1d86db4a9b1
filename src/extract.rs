//! Text-extraction collaborator seam.
//!
//! Office/PDF text pull is an external concern: the engine only needs
//! "bytes in, plain text out, or failure". A failed extraction must not
//! abort the scan — the caller falls back to scanning the raw bytes.

use anyhow::Result;
use std::path::Path;

/// Document families routed through text extraction before scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Word,
    Excel,
    PowerPoint,
    OpenDocument,
    Rtf,
}

impl DocumentKind {
    /// Map a lowercased extension to a document family.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "pdf" => Some(Self::Pdf),
            "doc" | "docx" => Some(Self::Word),
            "xls" | "xlsx" => Some(Self::Excel),
            "ppt" | "pptx" => Some(Self::PowerPoint),
            "odt" | "ods" | "odp" => Some(Self::OpenDocument),
            "rtf" => Some(Self::Rtf),
            _ => None,
        }
    }
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DocumentKind::Pdf => "pdf",
            DocumentKind::Word => "word",
            DocumentKind::Excel => "excel",
            DocumentKind::PowerPoint => "powerpoint",
            DocumentKind::OpenDocument => "opendocument",
            DocumentKind::Rtf => "rtf",
        };
        f.write_str(label)
    }
}

/// Pluggable text extraction. Implementations live outside the engine;
/// `Ok(None)` means "nothing extractable", which is not an error.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, path: &Path, kind: DocumentKind) -> Result<Option<String>>;
}

/// Default collaborator: extracts nothing, so document writes fall back
/// to raw-byte scanning.
#[derive(Debug, Default)]
pub struct NoopExtractor;

impl TextExtractor for NoopExtractor {
    fn extract(&self, _path: &Path, _kind: DocumentKind) -> Result<Option<String>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_extensions_map_to_kinds() {
        assert_eq!(DocumentKind::from_extension("pdf"), Some(DocumentKind::Pdf));
        assert_eq!(DocumentKind::from_extension("docx"), Some(DocumentKind::Word));
        assert_eq!(DocumentKind::from_extension("txt"), None);
    }

    #[test]
    fn noop_extractor_extracts_nothing() {
        let extractor = NoopExtractor;
        let out = extractor
            .extract(Path::new("report.pdf"), DocumentKind::Pdf)
            .unwrap();
        assert!(out.is_none());
    }
}
