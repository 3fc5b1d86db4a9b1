//! Events emitted by the overlay for external notification systems.
//!
//! Both variants are redaction-safe by construction: they carry file
//! paths, reasons, and rule identities, never matched values.

use super::session::ProgressStatus;

#[derive(Debug, Clone)]
pub enum OverlayEvent {
    /// Periodic scan progress for one file.
    ScanProgress {
        path: String,
        percent: u8,
        status: ProgressStatus,
        total_bytes: u64,
        scanned_bytes: u64,
    },
    /// A write was rejected (or a detection recorded on an exempt volume).
    ContentBlocked {
        path: String,
        reason: String,
        /// Comma-joined `rule(category)` identities.
        patterns: String,
        match_count: usize,
    },
}

pub type EventSender = crossbeam::channel::Sender<OverlayEvent>;
pub type EventReceiver = crossbeam::channel::Receiver<OverlayEvent>;
