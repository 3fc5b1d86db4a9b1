//! ZIP member enumeration.

use super::{ArchiveScanner, read_capped};
use crate::scan::ScanResult;
use std::io::Cursor;
use std::time::Instant;
use ::zip::ZipArchive;
use ::zip::result::ZipError;

pub(super) fn scan_zip(
    scanner: &ArchiveScanner,
    name: &str,
    bytes: &[u8],
    depth: u32,
    deadline: Instant,
) -> ScanResult {
    let config = scanner.config();
    let mut archive = match ZipArchive::new(Cursor::new(bytes)) {
        Ok(archive) => archive,
        Err(e) => return ScanResult::block(format!("malformed zip archive: {e}")),
    };

    if archive.len() > config.max_members {
        return ScanResult::block(format!(
            "member count {} exceeds limit {}",
            archive.len(),
            config.max_members
        ));
    }

    let mut scanned = 0usize;
    let mut skipped = 0usize;
    for index in 0..archive.len() {
        if ArchiveScanner::deadline_exceeded(deadline) {
            return ScanResult::block("archive scan timed out".to_string());
        }

        let (member_name, data) = match archive.by_index(index) {
            Err(ZipError::UnsupportedArchive(msg))
                if msg.to_ascii_lowercase().contains("password")
                    || msg.to_ascii_lowercase().contains("encrypt") =>
            {
                if config.block_encrypted {
                    return ScanResult::block("encrypted archive blocked by policy".to_string());
                }
                tracing::warn!(archive = name, index, "encrypted member passed by policy");
                skipped += 1;
                continue;
            }
            Err(e) => return ScanResult::block(format!("malformed zip member: {e}")),
            Ok(mut member) => {
                if member.is_dir() {
                    continue;
                }
                let member_name = member.name().to_string();
                // The declared size can lie; the capped read is the
                // enforcement, the declared size is just the fast path.
                if member.size() > config.max_member_bytes {
                    tracing::debug!(
                        archive = name,
                        member = %member_name,
                        size = member.size(),
                        "member exceeds extraction cap, skipped"
                    );
                    skipped += 1;
                    continue;
                }
                match read_capped(&mut member, config.max_member_bytes) {
                    Err(e) => return ScanResult::block(format!("zip member read failure: {e}")),
                    Ok((_, true)) => {
                        tracing::debug!(
                            archive = name,
                            member = %member_name,
                            "member inflated past extraction cap, skipped"
                        );
                        skipped += 1;
                        continue;
                    }
                    Ok((data, false)) => (member_name, data),
                }
            }
        };

        let verdict = scanner.scan_member(name, &member_name, &data, depth, deadline);
        if verdict.blocked {
            return verdict;
        }
        scanned += 1;
    }

    clean_verdict(scanned, skipped)
}

pub(super) fn clean_verdict(scanned: usize, skipped: usize) -> ScanResult {
    if skipped > 0 {
        ScanResult::allow(format!(
            "archive clean ({scanned} members scanned, {skipped} skipped)"
        ))
    } else {
        ScanResult::allow(format!("archive clean ({scanned} members scanned)"))
    }
}
