//! Content-scan orchestrator.
//!
//! Responsibilities:
//! - Pick a scan strategy by size tier (single pass / chunked / sampled)
//! - Consult the verdict cache by content digest
//! - Run the pattern library and suspicion analyzer over inspected text
//! - Apply size, timeout, and fail-safe policy
//!
//! Every entry point returns a `ScanResult`, never an error: internal
//! failures are mapped to the fail-safe policy (fail-closed unless the
//! operator opted into fail-open), because an unhandled failure on the
//! write path would itself be a data-loss decision.

use crate::config::{ContentScanningConfig, OversizeAction};
use crate::patterns::{PatternLibrary, PatternMatch, Severity};
use crate::scan::cache::ScanCache;
use crate::scan::entropy;
use crate::scan::sniff::{self, TypeCheck};
use crate::scan::stats::{ScanStatistics, StatsSnapshot};
use crate::scan::suspicion::SuspicionAnalyzer;
use crate::scan::types::ScanResult;
use anyhow::Result;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

pub struct ContentScanner {
    config: Arc<ContentScanningConfig>,
    library: PatternLibrary,
    suspicion: SuspicionAnalyzer,
    cache: ScanCache,
    stats: Arc<ScanStatistics>,
}

impl ContentScanner {
    /// Build the scanner. Configuration errors (invalid thresholds,
    /// malformed custom regexes) fail here, before any traffic.
    pub fn new(config: ContentScanningConfig) -> Result<Self> {
        config.validate()?;
        let library = PatternLibrary::from_config(&config)?;
        let suspicion = SuspicionAnalyzer::new(&config.suspicion)?;
        let cache = ScanCache::new(&config.cache);
        Ok(Self {
            config: Arc::new(config),
            library,
            suspicion,
            cache,
            stats: Arc::new(ScanStatistics::default()),
        })
    }

    pub fn config(&self) -> &ContentScanningConfig {
        &self.config
    }

    pub fn library(&self) -> &PatternLibrary {
        &self.library
    }

    pub fn stats(&self) -> &Arc<ScanStatistics> {
        &self.stats
    }

    pub fn statistics(&self) -> StatsSnapshot {
        self.stats.snapshot(&self.cache)
    }

    /// Scan a file on disk. Nonexistent or non-regular input is not
    /// applicable and passes; large files are sampled head+tail unless
    /// configured for full scanning.
    pub fn scan_file(&self, path: &Path) -> ScanResult {
        let start = Instant::now();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let metadata = match std::fs::metadata(path) {
            Err(_) => return ScanResult::allow("not applicable: file does not exist"),
            Ok(m) => m,
        };
        if !metadata.is_file() {
            return ScanResult::allow("not applicable: not a regular file");
        }
        let size = metadata.len();

        // Claimed-exempt files are sniffed from a head window before the
        // size gate, so an honest oversized media file still passes.
        if let Some(ext) = sniff::claimed_extension(&name)
            && self.config.is_exempt_extension(&ext)
            && let Ok(head) = read_head(path, 8192)
            && sniff::spoof_check(&self.config, &name, &head) == TypeCheck::Exempt
        {
            let mut result = ScanResult::allow("exempt content type");
            result.size_bytes = size;
            result.detected_type = sniff::sniff_bytes(&head);
            result.duration = start.elapsed();
            return result;
        }

        if let Some(result) = self.oversize_verdict(size) {
            return result;
        }

        let sampled_tier =
            size >= self.config.large_threshold && !self.config.full_scan_large_files;
        if sampled_tier {
            match self.read_samples(path, size) {
                Ok((head, tail)) => self.scan_sampled(&name, size, head, tail, start),
                Err(e) => self.fail_safe(format!("read failure: {e}")),
            }
        } else {
            match std::fs::read(path) {
                Ok(bytes) => self.scan_content(&bytes, &name),
                Err(e) => self.fail_safe(format!("read failure: {e}")),
            }
        }
    }

    /// Scan in-memory content under its logical name. This is the entry
    /// the overlay and the archive scanner re-enter.
    pub fn scan_content(&self, bytes: &[u8], claimed_name: &str) -> ScanResult {
        let start = Instant::now();

        if !self.config.enabled {
            return ScanResult::allow("content scanning disabled");
        }
        if bytes.is_empty() {
            let mut result = ScanResult::allow("empty content");
            result.digest = hex_digest(&[bytes]);
            result.duration = start.elapsed();
            return result;
        }

        let detected = sniff::sniff_bytes(bytes);
        let spoofed = match sniff::spoof_check(&self.config, claimed_name, bytes) {
            TypeCheck::Exempt => {
                let mut result = ScanResult::allow("exempt content type");
                result.digest = hex_digest(&[bytes]);
                result.size_bytes = bytes.len() as u64;
                result.detected_type = detected;
                result.duration = start.elapsed();
                return result;
            }
            TypeCheck::Spoofed { claimed } => {
                tracing::warn!(
                    file = claimed_name,
                    claimed = %claimed,
                    sniffed = %detected,
                    "claimed type disagrees with content, forcing scan"
                );
                true
            }
            TypeCheck::Scan => false,
        };

        if let Some(result) = self.oversize_verdict(bytes.len() as u64) {
            return result;
        }

        let digest = hex_digest(&[bytes]);
        if let Some(mut cached) = self.cache.get(&digest) {
            tracing::debug!(file = claimed_name, "verdict served from cache");
            cached.duration = start.elapsed();
            self.stats.record_scan(cached.size_bytes, 0);
            return cached;
        }

        if let Some(result) = self.timeout_verdict(start) {
            return result;
        }

        let (matches, sampled, timed_out) = self.run_strategy(bytes, start);
        if timed_out {
            return self.timeout_result(start);
        }

        let suspicion_score = self.suspicion_over(bytes, sampled);
        let high_entropy = entropy::is_high_entropy(
            bytes,
            self.config.suspicion.entropy_block_size,
            self.config.suspicion.entropy_threshold,
        );

        let mut result = self.decide(matches, suspicion_score);
        result.digest = digest;
        result.size_bytes = bytes.len() as u64;
        result.detected_type = detected;
        result.suspicion_score = suspicion_score;
        result.high_entropy = high_entropy;
        result.sampled = sampled;
        result.duration = start.elapsed();

        if spoofed && !result.blocked {
            tracing::warn!(file = claimed_name, "spoofed type scanned clean");
        }
        if result.blocked {
            tracing::warn!(file = claimed_name, reason = %result.reason, "content blocked");
        }

        self.cache.put(&result.digest, &result);
        self.stats
            .record_scan(result.size_bytes, result.matches.len() as u64);
        result
    }

    /// Map an internal failure to the fail-safe policy.
    pub fn fail_safe(&self, reason: String) -> ScanResult {
        if self.config.fail_open {
            tracing::warn!(%reason, "scan failure, fail-open policy allows");
            ScanResult::allow(format!("{reason} (fail-open)"))
        } else {
            tracing::warn!(%reason, "scan failure, failing closed");
            ScanResult::block(reason)
        }
    }

    fn oversize_verdict(&self, size: u64) -> Option<ScanResult> {
        let max = self.config.max_file_size?;
        if size <= max {
            return None;
        }
        let mut result = match self.config.oversize_action {
            OversizeAction::Block => {
                ScanResult::block(format!("size {size} exceeds maximum {max}"))
            }
            OversizeAction::AllowUnscanned => {
                ScanResult::allow(format!("size {size} exceeds maximum {max}, passed unscanned"))
            }
        };
        result.size_bytes = size;
        Some(result)
    }

    fn timeout_verdict(&self, start: Instant) -> Option<ScanResult> {
        if start.elapsed() > self.config.scan_timeout() {
            Some(self.timeout_result(start))
        } else {
            None
        }
    }

    fn timeout_result(&self, start: Instant) -> ScanResult {
        let mut result = self.fail_safe(format!(
            "scan timed out after {:.1}s",
            start.elapsed().as_secs_f64()
        ));
        result.duration = start.elapsed();
        result
    }

    /// Run the tiered pattern pass. Returns (matches, sampled, timed_out).
    fn run_strategy(&self, bytes: &[u8], start: Instant) -> (Vec<PatternMatch>, bool, bool) {
        let len = bytes.len() as u64;
        if len < self.config.small_threshold {
            let text = String::from_utf8_lossy(bytes);
            return (self.library.scan_text(&text), false, false);
        }

        if len < self.config.large_threshold || self.config.full_scan_large_files {
            return self.scan_chunked(bytes, start);
        }

        // Large tier on in-memory content: inspect head and tail windows.
        let sample = self.config.sample_bytes as usize;
        let head = &bytes[..sample.min(bytes.len())];
        let tail_start = bytes.len().saturating_sub(sample);
        let mut matches = Vec::new();
        let mut seen = HashSet::new();
        collect_pass(&self.library, head, 0, &mut matches, &mut seen);
        collect_pass(&self.library, &bytes[tail_start..], tail_start, &mut matches, &mut seen);
        (matches, true, false)
    }

    /// Medium tier: fixed-size chunks with an overlap so boundary-
    /// straddling matches are seen by at least one chunk whole. Stops at
    /// the first Critical match; overlap duplicates are deduplicated by
    /// (rule, absolute offset).
    fn scan_chunked(&self, bytes: &[u8], start: Instant) -> (Vec<PatternMatch>, bool, bool) {
        let chunk_size = self.config.chunk_size as usize;
        let overlap = self.config.chunk_overlap as usize;
        let step = chunk_size - overlap;

        let mut matches = Vec::new();
        let mut seen = HashSet::new();
        let mut pos = 0usize;
        loop {
            if start.elapsed() > self.config.scan_timeout() {
                return (matches, false, true);
            }
            let end = (pos + chunk_size).min(bytes.len());
            collect_pass(&self.library, &bytes[pos..end], pos, &mut matches, &mut seen);
            if matches.iter().any(|m| m.severity == Severity::Critical) {
                tracing::debug!(offset = pos, "critical match, stopping chunk walk early");
                break;
            }
            if end == bytes.len() {
                break;
            }
            pos += step;
        }
        (matches, false, false)
    }

    fn scan_sampled(
        &self,
        name: &str,
        size: u64,
        head: Vec<u8>,
        tail: Vec<u8>,
        start: Instant,
    ) -> ScanResult {
        // Digest covers what was actually inspected.
        let digest = hex_digest(&[&head, &tail]);
        if let Some(mut cached) = self.cache.get(&digest) {
            cached.duration = start.elapsed();
            self.stats.record_scan(cached.size_bytes, 0);
            return cached;
        }

        let tail_offset = (size as usize).saturating_sub(tail.len());
        let mut matches = Vec::new();
        let mut seen = HashSet::new();
        collect_pass(&self.library, &head, 0, &mut matches, &mut seen);
        collect_pass(&self.library, &tail, tail_offset, &mut matches, &mut seen);

        if let Some(result) = self.timeout_verdict(start) {
            return result;
        }

        let suspicion_score = {
            let head_text = String::from_utf8_lossy(&head);
            let tail_text = String::from_utf8_lossy(&tail);
            self.suspicion
                .score(&head_text)
                .max(self.suspicion.score(&tail_text))
        };
        let block = self.config.suspicion.entropy_block_size;
        let threshold = self.config.suspicion.entropy_threshold;
        let high_entropy = entropy::is_high_entropy(&head, block, threshold)
            || entropy::is_high_entropy(&tail, block, threshold);

        let mut result = self.decide(matches, suspicion_score);
        result.digest = digest;
        result.size_bytes = size;
        result.detected_type = sniff::sniff_bytes(&head);
        result.suspicion_score = suspicion_score;
        result.high_entropy = high_entropy;
        result.sampled = true;
        result.duration = start.elapsed();

        if result.blocked {
            tracing::warn!(file = name, reason = %result.reason, "content blocked (sampled)");
        }
        self.cache.put(&result.digest, &result);
        self.stats
            .record_scan(result.size_bytes, result.matches.len() as u64);
        result
    }

    /// Step 6 of the state machine: pattern matches take the configured
    /// action; otherwise the suspicion thresholds decide; otherwise Allow.
    fn decide(&self, matches: Vec<PatternMatch>, suspicion_score: f64) -> ScanResult {
        if !matches.is_empty() {
            let action = self.config.action_on_detection;
            let mut result = ScanResult::new(action, String::new());
            result.matches = matches;
            result.reason = format!(
                "sensitive patterns detected: {}",
                result.matched_rule_summary()
            );
            return result;
        }
        let thresholds = &self.config.suspicion;
        if suspicion_score >= thresholds.block_threshold {
            return ScanResult::block(format!(
                "suspicion score {suspicion_score:.2} at or above block threshold {:.2}",
                thresholds.block_threshold
            ));
        }
        if suspicion_score >= thresholds.warn_threshold {
            return ScanResult::warn(format!(
                "suspicion score {suspicion_score:.2} at or above warn threshold {:.2}",
                thresholds.warn_threshold
            ));
        }
        ScanResult::allow("no sensitive content detected")
    }

    fn suspicion_over(&self, bytes: &[u8], sampled: bool) -> f64 {
        // For sampled in-memory content the strategy already limited what
        // we read; scoring the first window keeps cost flat either way.
        let window = if sampled {
            &bytes[..(self.config.sample_bytes as usize).min(bytes.len())]
        } else {
            bytes
        };
        let text = String::from_utf8_lossy(window);
        self.suspicion.score(&text)
    }

    fn read_samples(&self, path: &Path, size: u64) -> std::io::Result<(Vec<u8>, Vec<u8>)> {
        let sample = self.config.sample_bytes.min(size);
        let mut file = File::open(path)?;
        let mut head = vec![0u8; sample as usize];
        file.read_exact(&mut head)?;
        let mut tail = vec![0u8; sample as usize];
        file.seek(SeekFrom::End(-(sample as i64)))?;
        file.read_exact(&mut tail)?;
        Ok((head, tail))
    }
}

/// One pattern pass over a byte window, translating offsets to absolute
/// positions and deduplicating matches already seen in an overlap.
fn collect_pass(
    library: &PatternLibrary,
    window: &[u8],
    base_offset: usize,
    matches: &mut Vec<PatternMatch>,
    seen: &mut HashSet<(String, usize)>,
) {
    let text = String::from_utf8_lossy(window);
    for mut m in library.scan_text(&text) {
        m.offset += base_offset;
        if seen.insert((m.pattern_name.clone(), m.offset)) {
            matches.push(m);
        }
    }
}

fn read_head(path: &Path, len: usize) -> std::io::Result<Vec<u8>> {
    let mut file = File::open(path)?;
    let mut head = Vec::with_capacity(len);
    file.take(len as u64).read_to_end(&mut head)?;
    Ok(head)
}

fn hex_digest(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::types::ScanAction;

    fn scanner(config: ContentScanningConfig) -> ContentScanner {
        ContentScanner::new(config).unwrap()
    }

    fn default_scanner() -> ContentScanner {
        scanner(ContentScanningConfig::default())
    }

    #[test]
    fn clean_text_is_allowed() {
        let s = default_scanner();
        let result = s.scan_content(b"ordinary meeting notes", "notes.txt");
        assert_eq!(result.action, ScanAction::Allow);
        assert!(!result.blocked);
        assert!(result.matches.is_empty());
    }

    #[test]
    fn ssn_blocks_with_rule_named_in_reason() {
        let s = default_scanner();
        let result = s.scan_content(b"SSN: 123-45-6789", "note.txt");
        assert!(result.blocked);
        assert_eq!(result.action, ScanAction::Block);
        assert!(result.reason.contains("ssn"));
        assert!(!result.reason.contains("123-45-6789"));
    }

    #[test]
    fn configured_warn_action_does_not_block() {
        let mut config = ContentScanningConfig::default();
        config.action_on_detection = ScanAction::Warn;
        let s = scanner(config);
        let result = s.scan_content(b"SSN: 123-45-6789", "note.txt");
        assert!(!result.blocked);
        assert_eq!(result.action, ScanAction::Warn);
        assert_eq!(result.matches.len(), 1);
    }

    #[test]
    fn repeated_scan_hits_cache_with_identical_verdict() {
        let s = default_scanner();
        let first = s.scan_content(b"ordinary meeting notes", "a.txt");
        let hits_before = s.statistics().cache_hits;
        let second = s.scan_content(b"ordinary meeting notes", "a.txt");
        assert_eq!(s.statistics().cache_hits, hits_before + 1);
        assert_eq!(first.action, second.action);
        assert_eq!(first.reason, second.reason);
        assert_eq!(first.digest, second.digest);
        assert_eq!(first.matches.len(), second.matches.len());
    }

    #[test]
    fn blocked_verdicts_are_not_cached() {
        let s = default_scanner();
        let first = s.scan_content(b"SSN: 123-45-6789", "a.txt");
        assert!(first.blocked);
        let hits_before = s.statistics().cache_hits;
        s.scan_content(b"SSN: 123-45-6789", "a.txt");
        assert_eq!(s.statistics().cache_hits, hits_before);
    }

    #[test]
    fn clean_scans_are_idempotent() {
        let s = default_scanner();
        for _ in 0..5 {
            let result = s.scan_content(b"just some harmless text", "b.txt");
            assert_eq!(result.action, ScanAction::Allow);
        }
    }

    #[test]
    fn match_straddling_chunk_boundary_is_found() {
        let mut config = ContentScanningConfig::default();
        config.small_threshold = 64;
        config.large_threshold = 1024 * 1024;
        config.chunk_size = 64;
        config.chunk_overlap = 32;
        let s = scanner(config);

        // Place the SSN across the first chunk boundary at byte 64.
        let mut payload = "x".repeat(58).into_bytes();
        payload.extend_from_slice(b"123-45-6789");
        payload.extend(std::iter::repeat_n(b'y', 200));
        let result = s.scan_content(&payload, "straddle.txt");
        assert!(result.blocked);
        assert_eq!(result.matches.len(), 1);
        assert_eq!(result.matches[0].pattern_name, "ssn");
        assert_eq!(result.matches[0].offset, 58);
    }

    #[test]
    fn overlap_duplicates_collapse_to_one_match() {
        let mut config = ContentScanningConfig::default();
        config.small_threshold = 64;
        config.chunk_size = 128;
        config.chunk_overlap = 64;
        let s = scanner(config);

        // Match sits entirely inside the overlap of chunks 0 and 1.
        let mut payload = "x".repeat(70).into_bytes();
        payload.extend_from_slice(b"123-45-6789");
        payload.extend(std::iter::repeat_n(b'y', 120));
        let result = s.scan_content(&payload, "dup.txt");
        assert_eq!(result.matches.len(), 1);
    }

    #[test]
    fn oversize_blocks_by_default() {
        let mut config = ContentScanningConfig::default();
        config.max_file_size = Some(8);
        let s = scanner(config);
        let result = s.scan_content(b"123-45-6789 and more", "big.txt");
        assert!(result.blocked);
        assert!(result.reason.contains("exceeds maximum"));
        assert!(result.matches.is_empty());
    }

    #[test]
    fn oversize_can_pass_unscanned() {
        let mut config = ContentScanningConfig::default();
        config.max_file_size = Some(8);
        config.oversize_action = OversizeAction::AllowUnscanned;
        let s = scanner(config);
        let result = s.scan_content(b"123-45-6789 and more", "big.txt");
        assert!(!result.blocked);
        assert!(result.reason.contains("unscanned"));
    }

    #[test]
    fn zero_timeout_applies_fail_safe() {
        let mut config = ContentScanningConfig::default();
        config.scan_timeout_secs = 0;
        let s = scanner(config);
        let result = s.scan_content(b"anything at all", "t.txt");
        assert!(result.blocked);
        assert!(result.reason.contains("timed out"));
    }

    #[test]
    fn zero_timeout_fail_open_allows() {
        let mut config = ContentScanningConfig::default();
        config.scan_timeout_secs = 0;
        config.fail_open = true;
        let s = scanner(config);
        let result = s.scan_content(b"anything at all", "t.txt");
        assert!(!result.blocked);
        assert!(result.reason.contains("timed out"));
        assert!(result.reason.contains("fail-open"));
    }

    #[test]
    fn disabled_engine_allows_everything() {
        let mut config = ContentScanningConfig::default();
        config.enabled = false;
        let s = scanner(config);
        let result = s.scan_content(b"SSN: 123-45-6789", "x.txt");
        assert_eq!(result.action, ScanAction::Allow);
    }

    #[test]
    fn exempt_extension_with_real_binary_is_allowed() {
        let s = default_scanner();
        let jpeg_ish = [0xFFu8, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x00, 0x01];
        let result = s.scan_content(&jpeg_ish, "photo.jpg");
        assert_eq!(result.action, ScanAction::Allow);
        assert_eq!(result.reason, "exempt content type");
    }

    #[test]
    fn spoofed_exempt_extension_is_still_scanned() {
        let s = default_scanner();
        let result = s.scan_content(b"SSN: 123-45-6789", "photo.jpg");
        assert!(result.blocked);
        assert!(result.reason.contains("ssn"));
    }

    #[test]
    fn missing_file_is_not_applicable() {
        let s = default_scanner();
        let result = s.scan_file(Path::new("/definitely/not/here.txt"));
        assert_eq!(result.action, ScanAction::Allow);
        assert!(result.reason.contains("not applicable"));
    }

    #[test]
    fn suspicion_warn_threshold_fires_without_pattern_match() {
        let mut config = ContentScanningConfig::default();
        config.suspicion.warn_threshold = 0.3;
        config.suspicion.block_threshold = 0.95;
        let s = scanner(config);
        let result = s.scan_content(b"my social security info follows", "s.txt");
        assert_eq!(result.action, ScanAction::Warn);
        assert!(result.suspicion_score >= 0.3);
    }

    #[test]
    fn suspicion_block_threshold_blocks() {
        let mut config = ContentScanningConfig::default();
        config.suspicion.warn_threshold = 0.2;
        config.suspicion.block_threshold = 0.4;
        let s = scanner(config);
        let result = s.scan_content(b"social security and credit card totals", "s.txt");
        assert!(result.blocked);
        assert!(result.reason.contains("suspicion score"));
    }
}
