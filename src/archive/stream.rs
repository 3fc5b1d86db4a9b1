//! Single-stream compressed files (gz, bz2, xz).
//!
//! These are not containers: the payload is one logical member. It is
//! decompressed up to the extraction cap and either re-sniffed as an
//! inner container (the `.tar.gz` family, scanned at the same nesting
//! depth — compression is a wrapper, not a level) or submitted once to
//! the content scanner.

use super::{ArchiveFormat, ArchiveScanner, read_capped};
use crate::scan::ScanResult;
use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use std::io::Read;
use std::time::Instant;
use xz2::read::XzDecoder;

pub(super) fn scan_compressed(
    scanner: &ArchiveScanner,
    name: &str,
    bytes: &[u8],
    format: ArchiveFormat,
    depth: u32,
    deadline: Instant,
) -> ScanResult {
    let config = scanner.config();
    let mut reader: Box<dyn Read + '_> = match format {
        ArchiveFormat::Gzip => Box::new(GzDecoder::new(bytes)),
        ArchiveFormat::Bzip2 => Box::new(BzDecoder::new(bytes)),
        ArchiveFormat::Xz => Box::new(XzDecoder::new(bytes)),
        _ => return ScanResult::block(format!("'{format}' is not a single-stream format")),
    };

    let (inner, truncated) = match read_capped(reader.as_mut(), config.max_member_bytes) {
        Ok(out) => out,
        Err(e) => return ScanResult::block(format!("decompression failure: {e}")),
    };
    if truncated {
        tracing::warn!(
            file = name,
            cap = config.max_member_bytes,
            "compressed stream inflated past extraction cap"
        );
    }
    if ArchiveScanner::deadline_exceeded(deadline) {
        return ScanResult::block("archive scan timed out".to_string());
    }

    let inner_name = inner_stream_name(name);

    // A compressed tar (or any nested container) re-enters the archive
    // walk; a truncated inner container will fail enumeration and block,
    // which is the fail-closed outcome we want for over-cap streams.
    let mut result = if ArchiveFormat::detect(&inner).is_some() {
        scanner.scan_bytes_inner(&inner_name, &inner, depth, deadline)
    } else {
        scanner.content_scanner().scan_content(&inner, &inner_name)
    };
    if truncated {
        result.sampled = true;
    }
    result.location = if result.location.is_empty() {
        format!("{name}:{inner_name}")
    } else {
        format!("{name}:{}", result.location)
    };
    result
}

/// `report.txt.gz` -> `report.txt`; a name without an inner extension
/// keeps a `<stream>` placeholder.
fn inner_stream_name(name: &str) -> String {
    let stem = std::path::Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    if stem.is_empty() {
        format!("{name}<stream>")
    } else {
        stem
    }
}

#[cfg(test)]
mod tests {
    use crate::archive::ArchiveScanner;
    use crate::config::ContentScanningConfig;
    use crate::scan::ContentScanner;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;
    use std::sync::Arc;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn scanner_with(config: ContentScanningConfig) -> ArchiveScanner {
        let archive_config = config.archive.clone();
        let content = Arc::new(ContentScanner::new(config).unwrap());
        ArchiveScanner::new(archive_config, content)
    }

    #[test]
    fn clean_gzip_stream_is_allowed() {
        let bytes = gzip(b"plain meeting notes, nothing else");
        let scanner = scanner_with(ContentScanningConfig::default());
        let result = scanner.scan_bytes("notes.txt.gz", &bytes, 0);
        assert!(!result.blocked, "unexpected block: {}", result.reason);
        assert_eq!(result.location, "notes.txt.gz:notes.txt");
    }

    #[test]
    fn sensitive_gzip_stream_blocks() {
        let bytes = gzip(b"SSN: 123-45-6789");
        let scanner = scanner_with(ContentScanningConfig::default());
        let result = scanner.scan_bytes("ids.txt.gz", &bytes, 0);
        assert!(result.blocked);
        assert!(result.reason.contains("ssn"));
    }

    #[test]
    fn gzipped_tar_walks_members() {
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        let payload = b"Card: 4111-1111-1111-1111";
        header.set_size(payload.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, "card.txt", &payload[..]).unwrap();
        let tar_bytes = builder.into_inner().unwrap();

        let bytes = gzip(&tar_bytes);
        let scanner = scanner_with(ContentScanningConfig::default());
        let result = scanner.scan_bytes("bundle.tar.gz", &bytes, 0);
        assert!(result.blocked);
        assert_eq!(result.location, "bundle.tar.gz:bundle.tar:card.txt");
    }

    #[test]
    fn stream_past_cap_is_marked_sampled() {
        let mut config = ContentScanningConfig::default();
        config.archive.max_member_bytes = 32;
        let scanner = scanner_with(config);
        let bytes = gzip(&vec![b'a'; 4096]);
        let result = scanner.scan_bytes("big.txt.gz", &bytes, 0);
        assert!(!result.blocked);
        assert!(result.sampled);
    }
}
