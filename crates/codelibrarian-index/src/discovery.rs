//! File discovery: walk the index root, apply exclude globs, detect
//! languages.

use codelibrarian_core::{Config, LibrarianError};
use ignore::WalkBuilder;
use std::path::PathBuf;

/// Enumerate indexable files under the configured root as
/// `(path, language)` pairs.
///
/// Paths matching an exclude glob are pruned during the walk (excluded
/// directories are never descended into). Symlinks are not followed, which
/// also breaks symlink cycles. Unknown extensions are skipped.
pub fn discover_files(config: &Config) -> Result<Vec<(PathBuf, String)>, LibrarianError> {
    let root = config.index_root();
    let matcher = config.exclude_matcher()?;

    let walker = WalkBuilder::new(&root)
        .follow_links(false)
        .hidden(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .filter_entry(move |entry| !matcher.is_excluded(entry.path()))
        .build();

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!("Walk error: {err}");
                continue;
            }
        };
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }
        let path = entry.path();
        if let Some(language) = config.language_for_file(path) {
            files.push((path.to_path_buf(), language.to_string()));
        }
    }

    files.sort();
    Ok(files)
}
