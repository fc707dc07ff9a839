//! Discovery Module
//!
//! Recursively scans a source directory for modules the macro passes apply to. Hosts normally
//! hand files over themselves; this backs the directory-level entry point.

#[cfg(feature = "napi")]
use napi_derive::napi;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::parse::should_transform_file;
use crate::pipeline::SourceFile;

/// Directories that never contain application sources.
const SKIPPED_DIRS: &[&str] = &["node_modules", ".nuxt", ".output", ".git", "dist"];

fn is_skipped_dir(entry: &DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| SKIPPED_DIRS.contains(&name))
}

/// Every file under `dir` the passes would transform, in sorted order.
pub fn find_source_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(dir)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_skipped_dir(entry))
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("cannot read directory entry under {:?}: {}", dir, e);
                continue;
            }
        };
        let path = entry.path();
        if path.is_file() && path.to_str().is_some_and(should_transform_file) {
            files.push(path.to_path_buf());
        }
    }

    files
}

/// Reads every source file under `dir`. Unreadable files are logged and left out.
pub fn discover_source_files(dir: &Path) -> Vec<SourceFile> {
    if !dir.exists() {
        debug!("{:?} does not exist", dir);
        return Vec::new();
    }
    find_source_files(dir)
        .into_iter()
        .filter_map(|path| {
            let id = path.to_string_lossy().to_string();
            match fs::read_to_string(&path) {
                Ok(code) => Some(SourceFile { id, code }),
                Err(e) => {
                    warn!("failed to read {}: {}", id, e);
                    None
                }
            }
        })
        .collect()
}

/// Discover all transformable source files in a directory
#[cfg(feature = "napi")]
#[napi]
pub fn discover_source_files_native(base_dir: String) -> serde_json::Value {
    let files = discover_source_files(Path::new(&base_dir));
    serde_json::to_value(files).unwrap_or(serde_json::Value::Null)
}
