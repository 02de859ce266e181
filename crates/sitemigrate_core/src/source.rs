use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use serde::Serialize;
use walkdir::{DirEntry, WalkDir};

/// Legacy HTML tree rooted at the configured source directory.
#[derive(Debug, Clone)]
pub struct SourceTree {
    root: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct SourceScan {
    pub japanese: Vec<String>,
    pub english: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanStats {
    pub total_html: usize,
    pub japanese: usize,
    pub english: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct FileTimestamps {
    pub created_unix: i64,
    pub changed_unix: i64,
}

impl SourceTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walk the tree and partition every `.html` file into the Japanese or
    /// English pass. Hidden entries and `CVS/` directories are skipped.
    /// Symlinks are followed, so a linked directory imports once per path
    /// that reaches it.
    pub fn scan(&self) -> Result<SourceScan> {
        let mut scan = SourceScan::default();
        let walker = WalkDir::new(&self.root)
            .follow_links(true)
            .into_iter()
            .filter_entry(keep_entry);
        for entry in walker {
            let entry =
                entry.with_context(|| format!("failed to walk {}", self.root.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str() else {
                continue;
            };
            if !is_html_source(name) {
                continue;
            }
            let relative = self.relative_from_root(entry.path())?;
            if is_english_source(name) {
                scan.english.push(relative);
            } else {
                scan.japanese.push(relative);
            }
        }
        scan.japanese.sort();
        scan.english.sort();
        Ok(scan)
    }

    pub fn exists(&self, relative_path: &str) -> bool {
        self.absolute(relative_path).is_file()
    }

    pub fn absolute(&self, relative_path: &str) -> PathBuf {
        self.root.join(relative_path)
    }

    pub fn read_bytes(&self, relative_path: &str) -> Result<Vec<u8>> {
        let path = self.absolute(relative_path);
        fs::read(&path).with_context(|| format!("failed to read {}", path.display()))
    }

    pub fn timestamps(&self, relative_path: &str) -> Result<FileTimestamps> {
        let path = self.absolute(relative_path);
        let metadata = fs::metadata(&path)
            .with_context(|| format!("failed to stat {}", path.display()))?;
        let changed = metadata
            .modified()
            .with_context(|| format!("failed to read mtime of {}", path.display()))?;
        let created = metadata.created().unwrap_or(changed);
        let changed_unix = system_time_to_unix(changed);
        let created_unix = system_time_to_unix(created).min(changed_unix);
        Ok(FileTimestamps {
            created_unix,
            changed_unix,
        })
    }

    fn relative_from_root(&self, path: &Path) -> Result<String> {
        let rel = path.strip_prefix(&self.root).with_context(|| {
            format!(
                "failed to derive relative path from root {} for {}",
                self.root.display(),
                path.display()
            )
        })?;
        Ok(normalize_separators(&rel.to_string_lossy()))
    }
}

impl SourceScan {
    pub fn stats(&self) -> ScanStats {
        ScanStats {
            total_html: self.japanese.len() + self.english.len(),
            japanese: self.japanese.len(),
            english: self.english.len(),
        }
    }
}

fn keep_entry(entry: &DirEntry) -> bool {
    if entry.depth() == 0 {
        return true;
    }
    let name = entry.file_name().to_string_lossy();
    if name.starts_with('.') {
        return false;
    }
    !(entry.file_type().is_dir() && name == "CVS")
}

pub fn is_html_source(basename: &str) -> bool {
    basename.ends_with(".html")
}

/// English variants carry an `.en.` marker anywhere in the basename; every
/// other `.html` file belongs to the Japanese pass.
pub fn is_english_source(basename: &str) -> bool {
    basename.ends_with(".html") && basename.contains(".en.")
}

fn system_time_to_unix(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(duration) => duration.as_secs() as i64,
        Err(_) => 0,
    }
}

pub fn normalize_separators(path: &str) -> String {
    path.replace('\\', "/")
}
