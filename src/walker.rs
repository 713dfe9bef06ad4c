use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use globset::{Glob, GlobSet, GlobSetBuilder};
use rayon::prelude::*;

use crate::{error::Result, session::SourceDocument};

/// A discovered document file.
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    /// Path relative to the walked root directory.
    pub relative_path: PathBuf,
    /// Fully resolved absolute path.
    pub absolute_path: PathBuf,
}

/// Supported file extensions for document discovery.
const SUPPORTED_EXTENSIONS: &[&str] = &["md", "txt"];

/// Compile `--include` patterns. No patterns means no filter.
pub fn build_include(patterns: &[String]) -> Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(Some(builder.build()?))
}

/// Recursively walk a directory and discover eligible document files.
///
/// Skips hidden files/directories (names starting with `.`) and only
/// returns files with supported extensions (.md, .txt). When `include` is
/// given, the path relative to `root` must also match it.
pub fn discover_files(
    root: &Path,
    include: Option<&GlobSet>,
) -> Result<Vec<DiscoveredFile>> {
    let canonical_root = root.canonicalize()?;
    let mut results = Vec::new();
    walk_dir(&canonical_root, &canonical_root, &mut results)?;
    if let Some(include) = include {
        results.retain(|f| include.is_match(&f.relative_path));
    }
    results.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(results)
}

fn walk_dir(
    root: &Path,
    current: &Path,
    results: &mut Vec<DiscoveredFile>,
) -> Result<()> {
    for entry in std::fs::read_dir(current)? {
        let entry = entry?;
        let file_name = entry.file_name();
        if file_name.to_string_lossy().starts_with('.') {
            continue;
        }

        let file_type = entry.file_type()?;
        let path = entry.path();

        if file_type.is_dir() {
            walk_dir(root, &path, results)?;
        } else if file_type.is_symlink() {
            let Ok(resolved) = path.canonicalize() else {
                continue;
            };
            // Directory links could loop back into the tree.
            if resolved.is_dir() {
                continue;
            }
            if resolved.is_file() && is_supported(&resolved) {
                results.push(discovered(root, &path, resolved));
            }
        } else if file_type.is_file() && is_supported(&path) {
            let absolute = path.canonicalize()?;
            results.push(discovered(root, &path, absolute));
        }
    }

    Ok(())
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext))
}

fn discovered(
    root: &Path,
    original_path: &Path,
    absolute_path: PathBuf,
) -> DiscoveredFile {
    DiscoveredFile {
        relative_path: original_path
            .strip_prefix(root)
            .unwrap_or(original_path)
            .to_path_buf(),
        absolute_path,
    }
}

/// Turn command-line paths into documents ready for ingest.
///
/// Directories are walked; files named explicitly are taken as-is,
/// whatever their extension. Files are read in parallel and unreadable
/// or non-UTF-8 files are skipped with a warning. The document id is the
/// canonical path, so the same file is recognized from any working
/// directory.
pub fn collect_sources(
    paths: &[PathBuf],
    include: Option<&GlobSet>,
) -> Result<Vec<SourceDocument>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            files.extend(
                discover_files(path, include)?
                    .into_iter()
                    .map(|f| f.absolute_path),
            );
        } else {
            files.push(path.canonicalize()?);
        }
    }
    let mut seen = HashSet::new();
    files.retain(|path| seen.insert(path.clone()));

    let sources: Vec<SourceDocument> = files
        .par_iter()
        .filter_map(|path| match std::fs::read_to_string(path) {
            Ok(text) => {
                Some(SourceDocument::new(path.to_string_lossy(), text))
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "skipping unreadable file"
                );
                None
            }
        })
        .collect();

    Ok(sources)
}
