//! User cache cleaner
//!
//! Scans and deletes files below a set of cache directories. Directories
//! themselves are left in place so applications do not have to recreate
//! their cache layout, and symlinks are never followed.
//!
//! # Examples
//!
//! ```no_run
//! use resmon::core::cleaner::CacheCleaner;
//!
//! let cleaner = CacheCleaner::new(vec![dirs::cache_dir().unwrap()]);
//! let stats = cleaner.scan();
//! println!("{} files, {} bytes reclaimable", stats.total_files, stats.total_size);
//!
//! let stats = cleaner.clean(true, |processed, total| {
//!     println!("{}/{}", processed, total);
//! });
//! assert_eq!(stats.failed_files, 0);
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct CacheCleaner {
    pub directories: Vec<PathBuf>,
}

/// Statistics from a scan or clean
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupStats {
    pub total_files: usize,
    pub total_size: u64,
    pub deleted_files: usize,
    pub deleted_size: u64,
    pub failed_files: usize,
    pub dry_run: bool,
}

impl CacheCleaner {
    pub fn new(directories: Vec<PathBuf>) -> Self {
        Self { directories }
    }

    /// Count files and bytes without touching anything
    pub fn scan(&self) -> CleanupStats {
        let mut stats = CleanupStats::default();
        for dir in &self.directories {
            count_files(dir, &mut stats);
        }
        stats
    }

    /// Delete cached files, reporting `(processed, total)` after each one.
    ///
    /// With `dry_run` nothing is deleted; the stats report what would be.
    pub fn clean<F>(&self, dry_run: bool, on_progress: F) -> CleanupStats
    where
        F: Fn(usize, usize),
    {
        let scanned = self.scan();

        let mut ctx = DeleteContext {
            processed: 0,
            total_files: scanned.total_files,
            stats: CleanupStats {
                total_files: scanned.total_files,
                total_size: scanned.total_size,
                dry_run,
                ..Default::default()
            },
            on_progress: &on_progress,
        };

        for dir in &self.directories {
            delete_files(dir, &mut ctx);
        }

        log::info!(
            "cache clean{}: {} files ({} bytes) removed, {} failed",
            if dry_run { " (dry run)" } else { "" },
            ctx.stats.deleted_files,
            ctx.stats.deleted_size,
            ctx.stats.failed_files
        );

        ctx.stats
    }
}

fn count_files(dir: &Path, stats: &mut CleanupStats) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        // symlink_metadata: never follow links out of the cache tree
        let Ok(metadata) = entry.path().symlink_metadata() else {
            continue;
        };
        if metadata.is_file() {
            stats.total_files += 1;
            stats.total_size += metadata.len();
        } else if metadata.is_dir() {
            count_files(&entry.path(), stats);
        }
    }
}

struct DeleteContext<'a, F>
where
    F: Fn(usize, usize),
{
    processed: usize,
    total_files: usize,
    stats: CleanupStats,
    on_progress: &'a F,
}

fn delete_files<F>(dir: &Path, ctx: &mut DeleteContext<F>)
where
    F: Fn(usize, usize),
{
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(metadata) = path.symlink_metadata() else {
            continue;
        };

        if metadata.is_dir() {
            delete_files(&path, ctx);
            continue;
        }
        if !metadata.is_file() {
            continue;
        }

        ctx.processed += 1;
        (ctx.on_progress)(ctx.processed, ctx.total_files);

        if ctx.stats.dry_run || fs::remove_file(&path).is_ok() {
            ctx.stats.deleted_files += 1;
            ctx.stats.deleted_size += metadata.len();
        } else {
            log::debug!("could not remove {:?}", path);
            ctx.stats.failed_files += 1;
        }
    }
}
