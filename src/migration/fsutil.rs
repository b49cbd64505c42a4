//! Filesystem helpers shared by the backup, rollback and workspace phases
//!
//! All functions here are blocking; async callers wrap them in
//! `tokio::task::spawn_blocking`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Files and bytes touched by a copy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyStats {
    pub files: usize,
    pub bytes: u64,
}

impl CopyStats {
    fn add(&mut self, other: CopyStats) {
        self.files += other.files;
        self.bytes += other.bytes;
    }
}

/// Copy a file or directory tree to `dest`, failing on the first error.
///
/// Empty directories are recreated. Symlinks are followed neither for files
/// nor for directories; they are skipped.
pub fn copy_tree(src: &Path, dest: &Path) -> io::Result<CopyStats> {
    let meta = fs::symlink_metadata(src)?;
    if meta.is_file() {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        let bytes = fs::copy(src, dest)?;
        return Ok(CopyStats { files: 1, bytes });
    }

    let mut stats = CopyStats::default();
    fs::create_dir_all(dest)?;
    for entry in WalkDir::new(src).min_depth(1).follow_links(false) {
        let entry = entry.map_err(io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(io::Error::other)?;
        let target = dest.join(relative);
        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            stats.add(CopyStats {
                files: 1,
                bytes: fs::copy(entry.path(), &target)?,
            });
        }
    }
    Ok(stats)
}

/// Copy several relative sub-paths of `root` into `dest`, preserving their
/// relative location. Missing sub-paths are ignored.
pub fn copy_subpaths(root: &Path, subpaths: &[PathBuf], dest: &Path) -> io::Result<CopyStats> {
    let mut stats = CopyStats::default();
    fs::create_dir_all(dest)?;
    for relative in subpaths {
        let src = root.join(relative);
        if !src.exists() {
            continue;
        }
        stats.add(copy_tree(&src, &dest.join(relative))?);
    }
    Ok(stats)
}

/// Outcome of a lenient merge
#[derive(Debug, Default)]
pub struct MergeOutcome {
    pub stats: CopyStats,
    pub errors: Vec<String>,
}

/// Merge `src` into `dest`, overwriting existing files. Per-item failures are
/// collected instead of aborting the merge.
pub fn merge_tree(src: &Path, dest: &Path) -> MergeOutcome {
    let mut outcome = MergeOutcome::default();
    if src.is_file() {
        match copy_tree(src, dest) {
            Ok(stats) => outcome.stats = stats,
            Err(e) => outcome.errors.push(format!("{}: {e}", dest.display())),
        }
        return outcome;
    }

    for entry in WalkDir::new(src).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                outcome.errors.push(e.to_string());
                continue;
            }
        };
        let Ok(relative) = entry.path().strip_prefix(src) else {
            continue;
        };
        let target = dest.join(relative);
        let result = if entry.file_type().is_dir() {
            fs::create_dir_all(&target)
        } else if entry.file_type().is_file() {
            prepare_file_target(&target).and_then(|_| fs::copy(entry.path(), &target)).map(|bytes| {
                outcome.stats.add(CopyStats { files: 1, bytes });
            })
        } else {
            Ok(())
        };
        if let Err(e) = result {
            outcome.errors.push(format!("{}: {e}", target.display()));
        }
    }
    outcome
}

/// Make room for a file at `target`: parents exist, and a directory occupying
/// the path is removed.
fn prepare_file_target(target: &Path) -> io::Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    if target.is_dir() {
        fs::remove_dir_all(target)?;
    }
    Ok(())
}

/// Total size of the regular files under `path` (or of `path` itself)
pub fn dir_size(path: &Path) -> u64 {
    if path.is_file() {
        return fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    }
    WalkDir::new(path)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|meta| meta.len())
        .sum()
}

/// Absolute form of `path`, resolving symlinks through its nearest existing
/// ancestor
pub fn resolved(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) if !parent.as_os_str().is_empty() => resolved(parent).join(name),
        _ => std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf()),
    }
}

/// Remove a file or directory; a missing path is not an error.
pub fn remove_path(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Regular files directly inside `dir` whose extension is one of `extensions`,
/// sorted by path for stable processing order.
pub fn files_with_extensions(dir: &Path, extensions: &[&str]) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| extensions.iter().any(|want| ext.eq_ignore_ascii_case(want)))
        })
        .collect();
    files.sort();
    files
}

/// Regular files anywhere under `dir`, sorted
pub fn files_recursive(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect();
    files.sort();
    files
}

/// Sanitize a name for safe filesystem usage
pub fn sanitize_filename(input: &str) -> String {
    input
        .chars()
        .map(|c| match c {
            '/' | '\\' | '<' | '>' | ':' | '"' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}
