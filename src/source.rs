//! Source files submitted for review
//!
//! A `SourceFile` is read once and never mutated. Its `path` is the identity
//! key inside a batch, but duplicates are allowed (see `progress`).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Directories never descended into when a directory is given as input
const IGNORED_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "target",
    "vendor",
    "dist",
    "build",
    "__pycache__",
    ".venv",
    "venv",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub name: String,
    pub path: String,
    pub content: String,
    pub extension: String,
}

impl SourceFile {
    pub fn new(
        name: impl Into<String>,
        path: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let extension = extension_of(&name);
        Self {
            name,
            path: path.into(),
            content: content.into(),
            extension,
        }
    }

    /// Read a single UTF-8 file from disk
    pub fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(name, path.display().to_string(), content))
    }
}

fn extension_of(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ext.to_string(),
        _ => String::new(),
    }
}

fn is_ignored_dir(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && IGNORED_DIRS
            .iter()
            .any(|d| entry.file_name().to_string_lossy() == *d)
}

/// Expand CLI paths into source files.
///
/// Files are read as given; directories are walked recursively in sorted order.
/// Files inside a directory that are not valid UTF-8 are skipped with a warning.
/// A file named explicitly that cannot be read is an error.
pub fn collect_sources(paths: &[PathBuf]) -> Result<Vec<SourceFile>> {
    let mut files = Vec::new();

    for path in paths {
        if path.is_dir() {
            let walker = WalkDir::new(path)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|e| !is_ignored_dir(e));
            for entry in walker {
                let entry =
                    entry.with_context(|| format!("Failed to walk {}", path.display()))?;
                if !entry.file_type().is_file() {
                    continue;
                }
                match SourceFile::read(entry.path()) {
                    Ok(file) => files.push(file),
                    Err(err) => {
                        tracing::warn!(path = %entry.path().display(), "skipping file: {:#}", err)
                    }
                }
            }
        } else {
            files.push(SourceFile::read(path)?);
        }
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_extension_from_name() {
        assert_eq!(SourceFile::new("main.rs", "src/main.rs", "").extension, "rs");
        assert_eq!(SourceFile::new("app.test.ts", "app.test.ts", "").extension, "ts");
        assert_eq!(SourceFile::new("Makefile", "Makefile", "").extension, "");
        assert_eq!(SourceFile::new(".bashrc", ".bashrc", "").extension, "");
    }

    #[test]
    fn test_collect_sources_walks_directories() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.py"), "print('a')").unwrap();
        fs::create_dir(dir.path().join("lib")).unwrap();
        fs::write(dir.path().join("lib").join("b.js"), "let b = 1;").unwrap();
        fs::create_dir(dir.path().join("node_modules")).unwrap();
        fs::write(dir.path().join("node_modules").join("dep.js"), "x").unwrap();
        fs::write(dir.path().join("blob.bin"), [0xffu8, 0xfe, 0x00]).unwrap();

        let files = collect_sources(&[dir.path().to_path_buf()]).unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a.py", "b.js"]);
        assert_eq!(files[0].content, "print('a')");
        assert_eq!(files[1].extension, "js");
    }

    #[test]
    fn test_collect_sources_missing_file_is_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.rs");
        assert!(collect_sources(&[missing]).is_err());
    }
}
