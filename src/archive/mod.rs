//! Recursive archive inspection under hard resource bounds.
//!
//! Responsibilities:
//! - Identify container formats by signature, never by name alone
//! - Enumerate members under depth, count, size, and wall-clock bounds
//! - Hand member bytes back to the content scanner, and re-enter this
//!   scanner for archive members (true bounded recursion)
//!
//! Zip-bomb posture: every limit violation resolves to a Block verdict
//! with a specific reason, and an oversized member is skipped rather
//! than aborting the whole archive. Nothing is extracted to disk; member
//! bytes are capped in memory before any recursion happens.

mod stream;
mod tar;
mod zip;

use crate::config::ArchiveScanConfig;
use crate::scan::{ContentScanner, ScanResult};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Container formats the sniffer recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    Tar,
    Gzip,
    Bzip2,
    Xz,
    SevenZip,
    Rar,
}

impl ArchiveFormat {
    /// Identify a container by its magic bytes. Tar has no leading magic;
    /// it is recognized by the `ustar` marker at offset 257.
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"PK\x03\x04") || bytes.starts_with(b"PK\x05\x06") {
            return Some(Self::Zip);
        }
        if bytes.starts_with(b"7z\xBC\xAF\x27\x1C") {
            return Some(Self::SevenZip);
        }
        if bytes.starts_with(b"Rar!\x1A\x07") {
            return Some(Self::Rar);
        }
        if bytes.starts_with(&[0x1F, 0x8B]) {
            return Some(Self::Gzip);
        }
        if bytes.starts_with(b"BZh") {
            return Some(Self::Bzip2);
        }
        if bytes.starts_with(&[0xFD, b'7', b'z', b'X', b'Z', 0x00]) {
            return Some(Self::Xz);
        }
        if bytes.len() > 262 && &bytes[257..262] == b"ustar" {
            return Some(Self::Tar);
        }
        None
    }

    /// Map a lowercased extension to a format, for filename routing.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "zip" | "jar" => Some(Self::Zip),
            "tar" => Some(Self::Tar),
            "gz" | "tgz" => Some(Self::Gzip),
            "bz2" | "tbz2" => Some(Self::Bzip2),
            "xz" | "txz" => Some(Self::Xz),
            "7z" => Some(Self::SevenZip),
            "rar" => Some(Self::Rar),
            _ => None,
        }
    }

    /// Identifier matched against `ArchiveScanConfig::supported_formats`.
    pub fn id(&self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::Tar => "tar",
            Self::Gzip => "gz",
            Self::Bzip2 => "bz2",
            Self::Xz => "xz",
            Self::SevenZip => "7z",
            Self::Rar => "rar",
        }
    }
}

impl std::fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

pub struct ArchiveScanner {
    config: ArchiveScanConfig,
    scanner: Arc<ContentScanner>,
}

impl ArchiveScanner {
    pub fn new(config: ArchiveScanConfig, scanner: Arc<ContentScanner>) -> Self {
        Self { config, scanner }
    }

    pub fn config(&self) -> &ArchiveScanConfig {
        &self.config
    }

    pub(crate) fn content_scanner(&self) -> &ContentScanner {
        &self.scanner
    }

    /// Scan an archive file on disk. `depth` is 0 for a top-level
    /// archive; nested members re-enter with depth + 1.
    pub fn scan_archive(&self, path: &Path, depth: u32) -> ScanResult {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match std::fs::read(path) {
            Ok(bytes) => self.scan_bytes(&name, &bytes, depth),
            Err(e) => ScanResult::block(format!("archive read failure: {e}")),
        }
    }

    /// Scan in-memory archive bytes. The wall-clock deadline covers the
    /// whole recursion from here down.
    pub fn scan_bytes(&self, name: &str, bytes: &[u8], depth: u32) -> ScanResult {
        let deadline = Instant::now() + self.config.timeout();
        self.scan_bytes_inner(name, bytes, depth, deadline)
    }

    fn scan_bytes_inner(
        &self,
        name: &str,
        bytes: &[u8],
        depth: u32,
        deadline: Instant,
    ) -> ScanResult {
        let start = Instant::now();

        if depth > self.config.max_depth {
            tracing::warn!(
                archive = name,
                depth,
                limit = self.config.max_depth,
                "archive nesting exceeds limit"
            );
            return self.finalize(
                ScanResult::block(format!(
                    "archive nesting depth {depth} exceeds limit {}",
                    self.config.max_depth
                )),
                bytes,
                None,
                start,
            );
        }

        let Some(format) = ArchiveFormat::detect(bytes) else {
            return self.finalize(
                ScanResult::block("unrecognized container format".to_string()),
                bytes,
                None,
                start,
            );
        };

        if !self.config.supports(format.id()) {
            // 7z and RAR land here under the default config: containers
            // the engine cannot see into fall under the same policy
            // switch as encrypted archives.
            let result = if self.config.block_encrypted {
                ScanResult::block(format!(
                    "container format '{format}' cannot be inspected"
                ))
            } else {
                tracing::warn!(archive = name, %format, "uninspectable container passed by policy");
                ScanResult::allow(format!(
                    "container format '{format}' passed without inspection"
                ))
            };
            return self.finalize(result, bytes, Some(format), start);
        }

        let result = match format {
            ArchiveFormat::Zip => zip::scan_zip(self, name, bytes, depth, deadline),
            ArchiveFormat::Tar => tar::scan_tar(self, name, bytes, depth, deadline),
            ArchiveFormat::Gzip | ArchiveFormat::Bzip2 | ArchiveFormat::Xz => {
                stream::scan_compressed(self, name, bytes, format, depth, deadline)
            }
            // Unreachable under the default supported set, but a custom
            // config naming "7z"/"rar" as supported still cannot be
            // enumerated here.
            ArchiveFormat::SevenZip | ArchiveFormat::Rar => ScanResult::block(format!(
                "container format '{format}' cannot be inspected"
            )),
        };
        self.finalize(result, bytes, Some(format), start)
    }

    /// Scan one extracted member: archives recurse with depth + 1,
    /// everything else goes to the content scanner. The returned verdict
    /// carries its position as `archive:member`, composed through
    /// recursion levels.
    fn scan_member(
        &self,
        archive_name: &str,
        member_name: &str,
        data: &[u8],
        depth: u32,
        deadline: Instant,
    ) -> ScanResult {
        let mut result = if ArchiveFormat::detect(data).is_some() {
            self.scan_bytes_inner(member_name, data, depth + 1, deadline)
        } else {
            self.scanner.scan_content(data, member_name)
        };
        result.location = if result.location.is_empty() {
            format!("{archive_name}:{member_name}")
        } else {
            format!("{archive_name}:{}", result.location)
        };
        result
    }

    /// Fill archive-level fields on verdicts produced at this level;
    /// member verdicts already carry their own digest and size.
    fn finalize(
        &self,
        mut result: ScanResult,
        bytes: &[u8],
        format: Option<ArchiveFormat>,
        start: Instant,
    ) -> ScanResult {
        if result.digest.is_empty() {
            let mut hasher = Sha256::new();
            hasher.update(bytes);
            result.digest = format!("{:x}", hasher.finalize());
            result.size_bytes = bytes.len() as u64;
            if let Some(format) = format {
                result.detected_type = crate::scan::DetectedType::Archive(format);
            }
            result.duration = start.elapsed();
        }
        result
    }

    pub(crate) fn deadline_exceeded(deadline: Instant) -> bool {
        Instant::now() >= deadline
    }
}

/// Read at most `cap` bytes from `reader`. Returns the bytes and whether
/// the stream had more to give (i.e. the cap was hit).
pub(crate) fn read_capped(reader: &mut dyn Read, cap: u64) -> std::io::Result<(Vec<u8>, bool)> {
    let mut data = Vec::new();
    let read = reader.take(cap + 1).read_to_end(&mut data)? as u64;
    if read > cap {
        data.truncate(cap as usize);
        Ok((data, true))
    } else {
        Ok((data, false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signatures_are_detected() {
        assert_eq!(ArchiveFormat::detect(b"PK\x03\x04..."), Some(ArchiveFormat::Zip));
        assert_eq!(ArchiveFormat::detect(&[0x1F, 0x8B, 0x08]), Some(ArchiveFormat::Gzip));
        assert_eq!(ArchiveFormat::detect(b"BZh91AY"), Some(ArchiveFormat::Bzip2));
        assert_eq!(
            ArchiveFormat::detect(&[0xFD, b'7', b'z', b'X', b'Z', 0x00]),
            Some(ArchiveFormat::Xz)
        );
        assert_eq!(
            ArchiveFormat::detect(b"7z\xBC\xAF\x27\x1C"),
            Some(ArchiveFormat::SevenZip)
        );
        assert_eq!(ArchiveFormat::detect(b"Rar!\x1A\x07\x00"), Some(ArchiveFormat::Rar));
        assert_eq!(ArchiveFormat::detect(b"hello world"), None);
    }

    #[test]
    fn tar_is_detected_by_ustar_marker() {
        let mut bytes = vec![0u8; 512];
        bytes[257..262].copy_from_slice(b"ustar");
        assert_eq!(ArchiveFormat::detect(&bytes), Some(ArchiveFormat::Tar));
    }

    #[test]
    fn extension_routing_covers_the_family() {
        assert_eq!(ArchiveFormat::from_extension("zip"), Some(ArchiveFormat::Zip));
        assert_eq!(ArchiveFormat::from_extension("tgz"), Some(ArchiveFormat::Gzip));
        assert_eq!(ArchiveFormat::from_extension("rar"), Some(ArchiveFormat::Rar));
        assert_eq!(ArchiveFormat::from_extension("txt"), None);
    }

    #[test]
    fn read_capped_reports_truncation() {
        let data = vec![1u8; 100];
        let (out, truncated) = read_capped(&mut &data[..], 40).unwrap();
        assert_eq!(out.len(), 40);
        assert!(truncated);

        let (out, truncated) = read_capped(&mut &data[..], 200).unwrap();
        assert_eq!(out.len(), 100);
        assert!(!truncated);
    }
}
