//! Content-type sniffing, independent of the claimed file name.
//!
//! The claimed extension decides exemption; the sniffed bytes decide
//! whether that claim is honest. A file named like exempt binary/media
//! whose bytes are text or a structured container is treated as
//! spoofed and scanned in full.

use crate::archive::ArchiveFormat;
use crate::config::ContentScanningConfig;
use crate::extract::DocumentKind;
use crate::scan::types::DetectedType;
use content_inspector::{ContentType, inspect};

/// Sniff what the bytes actually are, by signature first, then by a
/// binary-vs-text heuristic over the leading bytes.
pub fn sniff_bytes(bytes: &[u8]) -> DetectedType {
    if bytes.is_empty() {
        return DetectedType::Empty;
    }
    if let Some(format) = ArchiveFormat::detect(bytes) {
        return DetectedType::Archive(format);
    }
    if bytes.starts_with(b"%PDF") {
        return DetectedType::Document(DocumentKind::Pdf);
    }
    if bytes.starts_with(b"{\\rtf") {
        return DetectedType::Document(DocumentKind::Rtf);
    }
    if inspect(&bytes[..bytes.len().min(8192)]) == ContentType::BINARY {
        DetectedType::Binary
    } else {
        DetectedType::Text
    }
}

/// Lowercased extension of a logical file name.
pub fn claimed_extension(name: &str) -> Option<String> {
    std::path::Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

/// Outcome of the exemption / type-spoofing check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeCheck {
    /// Claimed type is exempt and the bytes agree; skip scanning.
    Exempt,
    /// Claimed type is exempt but the bytes disagree; force a full scan.
    Spoofed { claimed: String },
    /// Not exempt; scan normally.
    Scan,
}

/// Compare the claimed extension against the sniffed content.
pub fn spoof_check(config: &ContentScanningConfig, name: &str, bytes: &[u8]) -> TypeCheck {
    let Some(ext) = claimed_extension(name) else {
        return TypeCheck::Scan;
    };
    if !config.is_exempt_extension(&ext) {
        return TypeCheck::Scan;
    }
    match sniff_bytes(bytes) {
        // Text or a structured container hiding behind a media/binary
        // extension is the classic smuggling move.
        DetectedType::Text | DetectedType::Archive(_) | DetectedType::Document(_) => {
            TypeCheck::Spoofed { claimed: ext }
        }
        DetectedType::Binary | DetectedType::Empty => TypeCheck::Exempt,
    }
}
