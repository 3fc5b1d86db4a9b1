//! Per-handle write session state.

/// Lifecycle of one open handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Opened, nothing written yet.
    Idle,
    /// Bytes buffered, not yet scanned.
    Buffering,
    /// Close in progress, verdict pending.
    Scanning,
    /// Buffer written to backing storage.
    Committed,
    /// Buffer dropped, backing file removed.
    Discarded,
}

/// Status reported in progress events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStatus {
    Scanning,
    Blocked,
    Allowed,
    Error,
}

impl std::fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ProgressStatus::Scanning => "scanning",
            ProgressStatus::Blocked => "blocked",
            ProgressStatus::Allowed => "allowed",
            ProgressStatus::Error => "error",
        };
        f.write_str(label)
    }
}

/// Scan progress attached to a session.
#[derive(Debug, Clone)]
pub struct Progress {
    pub total_size_estimate: u64,
    pub scanned_size: u64,
    pub status: ProgressStatus,
}

/// Buffered write state for one open file handle.
///
/// The buffer is sparse-friendly: writes may arrive out of order and the
/// buffer grows to `offset + len`, zero-filling any gap. The buffer is
/// owned exclusively by the handle; the overlay guarantees that by
/// keeping each session behind its own mutex.
#[derive(Debug)]
pub struct WriteSession {
    /// Logical path relative to the volume root.
    pub path: String,
    buffer: Vec<u8>,
    pub state: SessionState,
    pub progress: Progress,
}

impl WriteSession {
    pub fn new(path: String) -> Self {
        Self {
            path,
            buffer: Vec::new(),
            state: SessionState::Idle,
            progress: Progress {
                total_size_estimate: 0,
                scanned_size: 0,
                status: ProgressStatus::Scanning,
            },
        }
    }

    /// Merge `data` into the buffer at `offset`, growing as needed.
    pub fn write_at(&mut self, offset: u64, data: &[u8]) {
        let offset = offset as usize;
        let end = offset + data.len();
        if end > self.buffer.len() {
            self.buffer.resize(end, 0);
        }
        self.buffer[offset..end].copy_from_slice(data);
        self.state = SessionState::Buffering;
        self.progress.total_size_estimate = self.progress.total_size_estimate.max(end as u64);
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Drop the buffered bytes; called after the verdict is applied.
    pub fn clear(&mut self) {
        self.buffer = Vec::new();
    }
}
