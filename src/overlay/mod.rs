//! Write-interception layer.
//!
//! Responsibilities:
//! - Buffer written bytes per open handle (sparse, out-of-order safe)
//! - Scan the buffer exactly once, at close, on the closing thread
//! - Commit (truncate-then-write) or discard based on the verdict
//! - Emit progress and blocked events safe for external notification
//!
//! Sessions live in a handle-keyed arena behind a single RwLock: map
//! mutation (insert on open, remove on close) is serialized, while work
//! on different handles proceeds independently through each session's
//! own mutex. Read, metadata, and directory operations pass through to
//! the backing store untouched.

pub mod events;
pub mod session;

pub use events::{EventReceiver, EventSender, OverlayEvent};
pub use session::{Progress, ProgressStatus, SessionState, WriteSession};

use crate::archive::{ArchiveFormat, ArchiveScanner};
use crate::extract::{DocumentKind, TextExtractor};
use crate::scan::{ContentScanner, ScanResult, ScanStatistics};
use crate::scan::sniff;
use std::collections::HashMap;
use std::io::{self, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

/// Filesystem overlay gating writes onto one mounted volume.
pub struct VolumeOverlay {
    backing_root: PathBuf,
    /// Encrypted volumes may be exempt from enforcement by config.
    encrypted: bool,
    scanner: Arc<ContentScanner>,
    archive: Arc<ArchiveScanner>,
    extractor: Arc<dyn TextExtractor>,
    sessions: RwLock<HashMap<u64, Arc<Mutex<WriteSession>>>>,
    next_handle: AtomicU64,
    events: Option<EventSender>,
    stats: Arc<ScanStatistics>,
}

impl VolumeOverlay {
    pub fn new(
        backing_root: PathBuf,
        encrypted: bool,
        scanner: Arc<ContentScanner>,
        archive: Arc<ArchiveScanner>,
        extractor: Arc<dyn TextExtractor>,
        events: Option<EventSender>,
    ) -> io::Result<Self> {
        if !backing_root.is_dir() {
            return Err(io::Error::new(
                ErrorKind::NotFound,
                format!("backing root {} is not a directory", backing_root.display()),
            ));
        }
        let stats = scanner.stats().clone();
        stats.mount_attached();
        tracing::info!(root = %backing_root.display(), encrypted, "overlay attached");
        Ok(Self {
            backing_root,
            encrypted,
            scanner,
            archive,
            extractor,
            sessions: RwLock::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
            events,
            stats,
        })
    }

    /// Open a logical path for writing; returns an opaque handle.
    pub fn open(&self, path: &str) -> io::Result<u64> {
        self.backing_path(path)?;
        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        let session = Arc::new(Mutex::new(WriteSession::new(path.to_string())));
        self.sessions
            .write()
            .expect("session map poisoned")
            .insert(handle, session);
        tracing::debug!(path, handle, "handle opened");
        Ok(handle)
    }

    /// Buffer `data` at `offset` for the given handle. Nothing reaches
    /// the backing store until the close-time verdict.
    pub fn write_at(&self, handle: u64, offset: u64, data: &[u8]) -> io::Result<usize> {
        let session = self.session(handle)?;
        let mut session = session.lock().expect("session poisoned");
        session.write_at(offset, data);
        Ok(data.len())
    }

    /// Close a handle: scan the buffered bytes and commit or discard.
    ///
    /// A blocked verdict on an enforced volume deletes the backing file
    /// and fails with `PermissionDenied`; genuine storage faults surface
    /// as their own I/O errors. The session is destroyed only after the
    /// verdict has been applied.
    pub fn release(&self, handle: u64) -> io::Result<()> {
        let session = self.session(handle)?;
        let result = {
            let mut session = session.lock().expect("session poisoned");
            self.finish_session(&mut session)
        };
        self.sessions
            .write()
            .expect("session map poisoned")
            .remove(&handle);
        tracing::debug!(handle, "handle released");
        result
    }

    /// Passthrough read.
    pub fn read_at(&self, path: &str, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        let mut file = std::fs::File::open(self.backing_path(path)?)?;
        file.seek(SeekFrom::Start(offset))?;
        let mut data = vec![0u8; len];
        let read = file.read(&mut data)?;
        data.truncate(read);
        Ok(data)
    }

    /// Passthrough metadata.
    pub fn metadata(&self, path: &str) -> io::Result<std::fs::Metadata> {
        std::fs::metadata(self.backing_path(path)?)
    }

    /// Passthrough directory listing.
    pub fn list_dir(&self, path: &str) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(self.backing_path(path)?)? {
            names.push(entry?.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    /// Number of handles currently open.
    pub fn open_handles(&self) -> usize {
        self.sessions.read().expect("session map poisoned").len()
    }

    fn session(&self, handle: u64) -> io::Result<Arc<Mutex<WriteSession>>> {
        self.sessions
            .read()
            .expect("session map poisoned")
            .get(&handle)
            .cloned()
            .ok_or_else(|| io::Error::new(ErrorKind::InvalidInput, "unknown handle"))
    }

    fn finish_session(&self, session: &mut WriteSession) -> io::Result<()> {
        if session.is_empty() {
            // Untouched handle; nothing to scan, nothing to commit.
            return Ok(());
        }

        session.state = SessionState::Scanning;
        session.progress.status = ProgressStatus::Scanning;
        let total = session.progress.total_size_estimate;
        self.emit_progress(&session.path, 0, ProgressStatus::Scanning, total, 0);

        let verdict = self.scan_buffer(session);
        session.progress.scanned_size = total;

        let enforce = !self.encrypted || self.scanner.config().enforce_on_encrypted;
        if verdict.blocked {
            self.stats.record_blocked();
            self.emit(OverlayEvent::ContentBlocked {
                path: session.path.clone(),
                reason: verdict.reason.clone(),
                patterns: verdict.matched_rule_summary(),
                match_count: verdict.matches.len(),
            });
            if enforce {
                self.discard(session)?;
                return Err(io::Error::new(ErrorKind::PermissionDenied, verdict.reason));
            }
            tracing::warn!(
                path = %session.path,
                reason = %verdict.reason,
                "detection recorded; enforcement exempt on encrypted volume"
            );
        }

        self.commit(session)
    }

    /// Route the buffered bytes to the right scanner by logical name:
    /// archives walk the archive scanner, known document types go through
    /// the text-extraction collaborator, everything else is scanned raw.
    fn scan_buffer(&self, session: &WriteSession) -> ScanResult {
        let name = file_name(&session.path);
        let ext = sniff::claimed_extension(&name);

        let is_archive = ext
            .as_deref()
            .and_then(ArchiveFormat::from_extension)
            .is_some()
            || ArchiveFormat::detect(session.buffer()).is_some();
        if is_archive {
            return self.archive.scan_bytes(&name, session.buffer(), 0);
        }

        if let Some(kind) = ext.as_deref().and_then(DocumentKind::from_extension) {
            match self.extract_text(session, &name, kind) {
                Some(text) => return self.scanner.scan_content(text.as_bytes(), &name),
                // Extraction failure suppresses text-based detection
                // only; the raw bytes are still scanned below.
                None => {}
            }
        }

        self.scanner.scan_content(session.buffer(), &name)
    }

    /// Materialize the buffer to a bounded temp file and run the
    /// collaborator. Any failure is logged and swallowed.
    fn extract_text(&self, session: &WriteSession, name: &str, kind: DocumentKind) -> Option<String> {
        let suffix = Path::new(name)
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let mut tmp = match tempfile::Builder::new().suffix(&suffix).tempfile() {
            Ok(tmp) => tmp,
            Err(e) => {
                tracing::warn!(path = %session.path, error = %e, "temp materialization failed");
                return None;
            }
        };
        if let Err(e) = tmp.write_all(session.buffer()) {
            tracing::warn!(path = %session.path, error = %e, "temp materialization failed");
            return None;
        }
        match self.extractor.extract(tmp.path(), kind) {
            Ok(Some(text)) => Some(text),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(path = %session.path, error = %e, "text extraction failed");
                None
            }
        }
    }

    fn commit(&self, session: &mut WriteSession) -> io::Result<()> {
        let backing = self.backing_path(&session.path)?;
        if let Some(parent) = backing.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&backing, session.buffer())?;
        self.stats.record_allowed();
        session.state = SessionState::Committed;
        session.progress.status = ProgressStatus::Allowed;
        let total = session.progress.total_size_estimate;
        self.emit_progress(&session.path, 100, ProgressStatus::Allowed, total, total);
        session.clear();
        Ok(())
    }

    fn discard(&self, session: &mut WriteSession) -> io::Result<()> {
        let backing = self.backing_path(&session.path)?;
        match std::fs::remove_file(&backing) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        session.state = SessionState::Discarded;
        session.progress.status = ProgressStatus::Blocked;
        let total = session.progress.total_size_estimate;
        self.emit_progress(&session.path, 100, ProgressStatus::Blocked, total, total);
        session.clear();
        Ok(())
    }

    /// Resolve a logical path under the backing root, rejecting anything
    /// that would escape it.
    fn backing_path(&self, logical: &str) -> io::Result<PathBuf> {
        let rel = Path::new(logical);
        let escapes = rel.is_absolute()
            || rel
                .components()
                .any(|c| matches!(c, Component::ParentDir | Component::RootDir));
        if escapes {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                "path escapes volume root",
            ));
        }
        Ok(self.backing_root.join(rel))
    }

    fn emit_progress(
        &self,
        path: &str,
        percent: u8,
        status: ProgressStatus,
        total_bytes: u64,
        scanned_bytes: u64,
    ) {
        self.emit(OverlayEvent::ScanProgress {
            path: path.to_string(),
            percent,
            status,
            total_bytes,
            scanned_bytes,
        });
    }

    fn emit(&self, event: OverlayEvent) {
        if let Some(sender) = &self.events {
            // A full or disconnected listener must never stall the write
            // path.
            let _ = sender.try_send(event);
        }
    }
}

impl Drop for VolumeOverlay {
    fn drop(&mut self) {
        self.stats.mount_detached();
        tracing::info!(root = %self.backing_root.display(), "overlay detached");
    }
}

fn file_name(logical: &str) -> String {
    Path::new(logical)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| logical.to_string())
}
