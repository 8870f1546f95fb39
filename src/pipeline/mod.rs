//! The per-category asset pipelines.
//!
//! Every pipeline is a plain function from the manifest to `anyhow::Result`,
//! registered as a task action. Each one reads its inputs through the glob
//! lists in the manifest, applies its transformation chain and writes into
//! the public tree; subdirectories are disjoint per category so parallel
//! pipelines never contend for the same file.

pub mod clean;
pub mod copy;
pub mod images;
pub mod scripts;
pub mod styles;

use std::collections::HashSet;

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};

/// Enumerate every file matching the given patterns, in pattern order and
/// glob match order within a pattern. Duplicates across patterns are kept
/// once, directories are ignored.
pub(crate) fn matched_files(patterns: &[String]) -> anyhow::Result<Vec<Utf8PathBuf>> {
    let mut seen = HashSet::new();
    let mut files = Vec::new();

    for pattern in patterns {
        for entry in glob::glob(pattern).with_context(|| format!("bad glob '{pattern}'"))? {
            let path = entry.with_context(|| format!("glob '{pattern}'"))?;
            if !path.is_file() {
                continue;
            }

            let path = Utf8PathBuf::try_from(path).context("non UTF-8 path")?;
            if seen.insert(path.clone()) {
                files.push(path);
            }
        }
    }

    Ok(files)
}

/// The static prefix of a glob pattern: every leading component free of
/// wildcard metacharacters. Used to mirror source trees into the output
/// directory and to pick filesystem roots to watch.
pub(crate) fn glob_base(pattern: &str) -> Utf8PathBuf {
    let mut base = Utf8PathBuf::new();

    for component in Utf8Path::new(pattern).components() {
        let text = component.as_str();
        if text.contains(['*', '?', '[', ']']) {
            break;
        }
        base.push(text);
    }

    base
}
