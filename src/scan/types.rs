//! Verdict and classification types shared across the engine.

use crate::patterns::PatternMatch;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Disposition of a scan. A closed enum so every call site is forced to
/// handle all four outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanAction {
    Allow,
    Block,
    Warn,
    Quarantine,
}

impl ScanAction {
    /// True when this action prevents the write from committing.
    pub fn prevents_commit(&self) -> bool {
        matches!(self, ScanAction::Block | ScanAction::Quarantine)
    }
}

impl std::fmt::Display for ScanAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ScanAction::Allow => "allow",
            ScanAction::Block => "block",
            ScanAction::Warn => "warn",
            ScanAction::Quarantine => "quarantine",
        };
        f.write_str(label)
    }
}

/// What the content sniffer decided the bytes actually are.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectedType {
    Empty,
    Text,
    Binary,
    Archive(crate::archive::ArchiveFormat),
    Document(crate::extract::DocumentKind),
}

impl std::fmt::Display for DetectedType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DetectedType::Empty => f.write_str("empty"),
            DetectedType::Text => f.write_str("text"),
            DetectedType::Binary => f.write_str("binary"),
            DetectedType::Archive(format) => write!(f, "archive/{format}"),
            DetectedType::Document(kind) => write!(f, "document/{kind}"),
        }
    }
}

/// The verdict for one scan invocation.
#[derive(Debug, Clone)]
pub struct ScanResult {
    /// True when the write must not reach the device.
    pub blocked: bool,
    pub action: ScanAction,
    /// Human-readable reason; never contains matched values.
    pub reason: String,
    pub matches: Vec<PatternMatch>,
    /// SHA-256 of the inspected content, lowercase hex.
    pub digest: String,
    pub size_bytes: u64,
    pub detected_type: DetectedType,
    pub duration: Duration,
    /// Combined heuristic score in [0.0, 1.0].
    pub suspicion_score: f64,
    /// True when any entropy block met the configured threshold.
    pub high_entropy: bool,
    /// True when only part of the content was inspected.
    pub sampled: bool,
    /// Empty for direct scans, `"archive:member"` for nested verdicts.
    pub location: String,
}

impl ScanResult {
    /// A bare verdict carrying only disposition and reason; callers fill
    /// in digest, size, and type as they become known.
    pub fn new(action: ScanAction, reason: impl Into<String>) -> Self {
        Self {
            blocked: action.prevents_commit(),
            action,
            reason: reason.into(),
            matches: Vec::new(),
            digest: String::new(),
            size_bytes: 0,
            detected_type: DetectedType::Empty,
            duration: Duration::ZERO,
            suspicion_score: 0.0,
            high_entropy: false,
            sampled: false,
            location: String::new(),
        }
    }

    pub fn allow(reason: impl Into<String>) -> Self {
        Self::new(ScanAction::Allow, reason)
    }

    pub fn block(reason: impl Into<String>) -> Self {
        Self::new(ScanAction::Block, reason)
    }

    pub fn warn(reason: impl Into<String>) -> Self {
        Self::new(ScanAction::Warn, reason)
    }

    /// Comma-joined `name(category)` list for events and logs. Safe to
    /// emit: carries rule identities, never matched values.
    pub fn matched_rule_summary(&self) -> String {
        let mut names: Vec<String> = self
            .matches
            .iter()
            .map(|m| format!("{}({})", m.pattern_name, m.category))
            .collect();
        names.sort();
        names.dedup();
        names.join(", ")
    }
}
