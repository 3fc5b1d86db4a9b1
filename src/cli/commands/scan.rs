//! `sentryfs scan` - scan a file or directory and print verdicts.

use crate::archive::{ArchiveFormat, ArchiveScanner};
use crate::config::ContentScanningConfig;
use crate::scan::{ContentScanner, ScanAction, ScanResult};
use anyhow::{Context, Result};
use rayon::prelude::*;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

/// Returns true when anything was blocked, so the caller can set the
/// exit code.
pub fn execute(path: &Path, config: ContentScanningConfig, verbose: bool) -> Result<bool> {
    let archive_config = config.archive.clone();
    let scanner = Arc::new(ContentScanner::new(config).context("failed to build scanner")?);
    let archive = Arc::new(ArchiveScanner::new(archive_config, scanner.clone()));

    let files = discover(path)?;
    let total = files.len();

    let mut results: Vec<(PathBuf, ScanResult)> = files
        .into_par_iter()
        .map(|file| {
            let result = scan_one(&scanner, &archive, &file);
            (file, result)
        })
        .collect();
    results.sort_by(|a, b| a.0.cmp(&b.0));

    let mut blocked = 0usize;
    let mut warned = 0usize;
    for (file, result) in &results {
        match result.action {
            ScanAction::Block | ScanAction::Quarantine => {
                blocked += 1;
                print_verdict("BLOCK", file, result);
            }
            ScanAction::Warn => {
                warned += 1;
                print_verdict("WARN", file, result);
            }
            ScanAction::Allow => {
                if verbose {
                    print_verdict("ALLOW", file, result);
                }
            }
        }
    }

    let stats = scanner.statistics();
    println!(
        "\n{total} file(s) inspected: {blocked} blocked, {warned} warned, {} bytes scanned",
        stats.bytes_scanned
    );
    if verbose {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    }
    Ok(blocked > 0)
}

fn discover(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        anyhow::bail!("{} is neither a file nor a directory", path.display());
    }
    Ok(WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect())
}

/// Route one file: containers walk the archive scanner, everything else
/// goes through the content scanner.
fn scan_one(scanner: &ContentScanner, archive: &ArchiveScanner, path: &Path) -> ScanResult {
    let by_extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
        .and_then(ArchiveFormat::from_extension)
        .is_some();
    if by_extension || head_is_archive(path) {
        archive.scan_archive(path, 0)
    } else {
        scanner.scan_file(path)
    }
}

fn head_is_archive(path: &Path) -> bool {
    let Ok(mut file) = std::fs::File::open(path) else {
        return false;
    };
    let mut head = [0u8; 512];
    let Ok(read) = file.read(&mut head) else {
        return false;
    };
    ArchiveFormat::detect(&head[..read]).is_some()
}

fn print_verdict(label: &str, file: &Path, result: &ScanResult) {
    let location = if result.location.is_empty() {
        String::new()
    } else {
        format!(" [{}]", result.location)
    };
    println!("{label:5} {}{location}: {}", file.display(), result.reason);
}
