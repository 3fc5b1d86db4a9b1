//! Scanning configuration consumed by the engine.
//!
//! The daemon that owns device lifecycle hands the engine a
//! [`ContentScanningConfig`] tree, typically deserialized from TOML. All
//! numeric invariants are checked once by [`ContentScanningConfig::validate`]
//! before any device traffic is processed; custom pattern regexes are
//! compiled (and rejected) when the pattern library is built.

use crate::patterns::{PatternCategory, Severity};
use crate::scan::types::ScanAction;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const MIB: u64 = 1024 * 1024;

/// Top-level configuration for the content-scanning engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentScanningConfig {
    /// Master switch; when false every scan returns Allow without inspection.
    pub enabled: bool,
    /// Action applied when any pattern matches.
    pub action_on_detection: ScanAction,
    /// When false, blocked verdicts on encrypted volumes are recorded but not enforced.
    pub enforce_on_encrypted: bool,
    /// Pattern categories to enable; empty means all categories.
    pub enabled_categories: Vec<PatternCategory>,
    /// Builtin pattern names to disable.
    pub disabled_patterns: Vec<String>,
    /// User-supplied patterns, appended after the builtin catalog.
    pub custom_patterns: Vec<CustomPatternConfig>,

    /// Maximum file size in bytes; `None` disables the size gate.
    pub max_file_size: Option<u64>,
    /// What to do with files over `max_file_size`.
    pub oversize_action: OversizeAction,
    /// Wall-clock budget for a single scan, in seconds.
    pub scan_timeout_secs: u64,
    /// Fail-open instead of fail-closed on timeout or internal error.
    pub fail_open: bool,
    /// Extensions exempt from scanning unless content sniffing disagrees.
    pub exempt_extensions: Vec<String>,

    /// Upper bound of the single-pass tier, in bytes.
    pub small_threshold: u64,
    /// Lower bound of the sampled tier, in bytes.
    pub large_threshold: u64,
    /// Chunk size for the medium tier, in bytes.
    pub chunk_size: u64,
    /// Overlap carried between consecutive chunks, in bytes.
    pub chunk_overlap: u64,
    /// Head/tail window inspected per end in sampled mode, in bytes.
    pub sample_bytes: u64,
    /// Scan large files in full (medium-tier behavior) instead of sampling.
    pub full_scan_large_files: bool,

    pub cache: CacheConfig,
    pub archive: ArchiveScanConfig,
    pub suspicion: SuspicionConfig,
}

/// Verdict cache tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Byte budget; entries are evicted oldest-first once exceeded.
    pub max_bytes: u64,
    /// Entry time-to-live in seconds; `None` disables expiry.
    pub ttl_secs: Option<u64>,
}

/// Bounds for recursive archive inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveScanConfig {
    /// Maximum nesting depth; an archive at depth > max is blocked outright.
    pub max_depth: u32,
    /// Maximum member count per archive.
    pub max_members: usize,
    /// Per-member extracted-size cap in bytes; oversized members are skipped.
    pub max_member_bytes: u64,
    /// Wall-clock budget for one archive scan (all recursion levels), in seconds.
    pub timeout_secs: u64,
    /// Block archives the engine cannot see into (encrypted, 7z, RAR).
    pub block_encrypted: bool,
    /// Container identifiers the scanner will enumerate.
    pub supported_formats: Vec<String>,
}

/// Heuristic scoring thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SuspicionConfig {
    /// Combined score at which a clean-by-pattern file is warned.
    pub warn_threshold: f64,
    /// Combined score at which a clean-by-pattern file is blocked.
    pub block_threshold: f64,
    /// Length of the digit n-grams sampled by the character scorer.
    pub char_ngram_len: usize,
    /// Bits-per-byte at which a block counts as high entropy.
    pub entropy_threshold: f64,
    /// Block size for entropy measurement, in bytes.
    pub entropy_block_size: usize,
}

/// A user-supplied detection rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomPatternConfig {
    pub name: String,
    pub regex: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_custom_severity")]
    pub severity: Severity,
}

/// Disposition for files exceeding `max_file_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OversizeAction {
    /// Reject the write outright.
    Block,
    /// Let the bytes through without inspection.
    AllowUnscanned,
}

fn default_custom_severity() -> Severity {
    Severity::High
}

impl Default for ContentScanningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            action_on_detection: ScanAction::Block,
            enforce_on_encrypted: true,
            enabled_categories: Vec::new(),
            disabled_patterns: Vec::new(),
            custom_patterns: Vec::new(),

            max_file_size: None,
            oversize_action: OversizeAction::Block,
            scan_timeout_secs: 30,
            fail_open: false,
            exempt_extensions: vec![
                // Images
                "png".into(), "jpg".into(), "jpeg".into(), "gif".into(),
                "bmp".into(), "ico".into(), "webp".into(), "tiff".into(),
                // Audio/Video
                "mp3".into(), "wav".into(), "ogg".into(), "flac".into(),
                "mp4".into(), "avi".into(), "mkv".into(), "mov".into(),
                "webm".into(),
                // Fonts
                "ttf".into(), "otf".into(), "woff".into(), "woff2".into(),
                // Executables & object files
                "exe".into(), "dll".into(), "so".into(), "dylib".into(),
                "o".into(), "obj".into(),
            ],

            small_threshold: MIB,
            large_threshold: 100 * MIB,
            chunk_size: MIB,
            chunk_overlap: 1024,
            sample_bytes: 5 * MIB,
            full_scan_large_files: false,

            cache: CacheConfig::default(),
            archive: ArchiveScanConfig::default(),
            suspicion: SuspicionConfig::default(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_bytes: 64 * MIB,
            ttl_secs: Some(300),
        }
    }
}

impl Default for ArchiveScanConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_members: 1_000,
            max_member_bytes: 16 * MIB,
            timeout_secs: 30,
            block_encrypted: true,
            supported_formats: vec![
                "zip".into(), "tar".into(), "gz".into(), "bz2".into(), "xz".into(),
            ],
        }
    }
}

impl Default for SuspicionConfig {
    fn default() -> Self {
        Self {
            warn_threshold: 0.6,
            block_threshold: 0.85,
            char_ngram_len: 3,
            entropy_threshold: 7.5,
            entropy_block_size: 1024,
        }
    }
}

impl ContentScanningConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check numeric invariants. Called once at engine construction; a
    /// config that fails here never sees device traffic.
    pub fn validate(&self) -> Result<()> {
        let s = &self.suspicion;
        for (name, value) in [
            ("suspicion.warn_threshold", s.warn_threshold),
            ("suspicion.block_threshold", s.block_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                bail!("{name} must be within [0.0, 1.0], got {value}");
            }
        }
        if s.warn_threshold > s.block_threshold {
            bail!(
                "suspicion.warn_threshold ({}) must not exceed suspicion.block_threshold ({})",
                s.warn_threshold,
                s.block_threshold
            );
        }
        if !(0.0..=8.0).contains(&s.entropy_threshold) {
            bail!(
                "suspicion.entropy_threshold must be within [0.0, 8.0], got {}",
                s.entropy_threshold
            );
        }
        if s.char_ngram_len < 2 {
            bail!("suspicion.char_ngram_len must be at least 2");
        }
        if s.entropy_block_size == 0 {
            bail!("suspicion.entropy_block_size must be nonzero");
        }

        if self.chunk_size == 0 {
            bail!("chunk_size must be nonzero");
        }
        if self.chunk_overlap >= self.chunk_size {
            bail!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap,
                self.chunk_size
            );
        }
        if self.small_threshold >= self.large_threshold {
            bail!(
                "small_threshold ({}) must be below large_threshold ({})",
                self.small_threshold,
                self.large_threshold
            );
        }

        if self.archive.max_depth == 0 {
            bail!("archive.max_depth must be at least 1");
        }
        if self.archive.max_members == 0 {
            bail!("archive.max_members must be nonzero");
        }
        if self.archive.max_member_bytes == 0 {
            bail!("archive.max_member_bytes must be nonzero");
        }

        Ok(())
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }

    /// True when `ext` (lowercase, no dot) is on the exempt list.
    pub fn is_exempt_extension(&self, ext: &str) -> bool {
        self.exempt_extensions.iter().any(|e| e == ext)
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_secs.map(Duration::from_secs)
    }
}

impl ArchiveScanConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn supports(&self, format: &str) -> bool {
        self.supported_formats.iter().any(|f| f == format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        ContentScanningConfig::default().validate().unwrap();
    }

    #[test]
    fn inverted_thresholds_are_rejected() {
        let mut config = ContentScanningConfig::default();
        config.suspicion.warn_threshold = 0.9;
        config.suspicion.block_threshold = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn overlap_must_fit_inside_chunk() {
        let mut config = ContentScanningConfig::default();
        config.chunk_size = 1024;
        config.chunk_overlap = 1024;
        assert!(config.validate().is_err());
    }

    #[test]
    fn toml_roundtrip_with_overrides() {
        let raw = r#"
            enabled = true
            action_on_detection = "warn"
            fail_open = true

            [suspicion]
            warn_threshold = 0.5
            block_threshold = 0.9

            [[custom_patterns]]
            name = "project_code"
            regex = "PRJ-\\d{6}"
            severity = "medium"
        "#;
        let config: ContentScanningConfig = toml::from_str(raw).unwrap();
        config.validate().unwrap();
        assert_eq!(config.action_on_detection, ScanAction::Warn);
        assert!(config.fail_open);
        assert_eq!(config.custom_patterns.len(), 1);
        assert_eq!(config.custom_patterns[0].severity, Severity::Medium);
    }

    #[test]
    fn zero_archive_depth_is_rejected() {
        let mut config = ContentScanningConfig::default();
        config.archive.max_depth = 0;
        assert!(config.validate().is_err());
    }
}
