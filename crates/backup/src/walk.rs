//! Symlink tree walker
//!
//! Yields `(link, target)` for every symlink below a directory, where
//! `target` is the link's destination resolved against the directory that
//! contains the link. Dotfiles and excluded names are never visited.

use crate::error::IoContext;
use crate::layout::normalize;
use crate::Result;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Lazy iterator over the symlinks of a tree
pub struct SymlinkWalk {
    entries: Box<dyn Iterator<Item = walkdir::Result<DirEntry>>>,
}

/// Walk `tree` for symlinks
///
/// `max_depth` 0 visits only the direct entries of `tree`; each increment
/// allows one more level of subdirectories. Listing and link errors are
/// yielded as they occur and are not skipped.
pub fn walk(tree: &Path, max_depth: usize, exclude: &[&str]) -> SymlinkWalk {
    let exclude: Vec<OsString> = exclude.iter().map(OsString::from).collect();

    let entries = WalkDir::new(tree)
        .min_depth(1)
        .max_depth(max_depth + 1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(move |entry| entry.depth() == 0 || !is_excluded(entry, &exclude));

    SymlinkWalk {
        entries: Box::new(entries),
    }
}

fn is_excluded(entry: &DirEntry, exclude: &[OsString]) -> bool {
    let name = entry.file_name();

    name.to_string_lossy().starts_with('.') || exclude.iter().any(|e| e == name)
}

impl Iterator for SymlinkWalk {
    type Item = Result<(PathBuf, PathBuf)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.entries.next()? {
                Ok(entry) => entry,
                Err(err) => return Some(Err(err.into())),
            };

            if !entry.file_type().is_symlink() {
                continue;
            }

            return Some(resolve(entry.into_path()));
        }
    }
}

/// Resolve a symlink's target relative to the directory containing it
pub fn resolve(link: PathBuf) -> Result<(PathBuf, PathBuf)> {
    let target = fs::read_link(&link).at(&link)?;
    let base = link.parent().unwrap_or_else(|| Path::new(""));
    let resolved = normalize(&base.join(target));

    Ok((link, resolved))
}
