//! Deletes the public directory tree.
//!
//! In the `build` composite this runs to completion before any generator
//! starts; the ordering is carried by the task graph edges.

use std::fs;
use std::time::Instant;

use anyhow::Context;

use crate::Manifest;
use crate::report::as_overhead;

pub fn run(manifest: &Manifest) -> anyhow::Result<()> {
    let start = Instant::now();
    let target = &manifest.public_directory;

    if fs::metadata(target).is_ok() {
        fs::remove_dir_all(target).with_context(|| format!("removing '{target}'"))?;
    }

    fs::create_dir_all(target).with_context(|| format!("recreating '{target}'"))?;

    tracing::info!(dir = %target, "cleaned the public directory");
    eprintln!("Cleaned '{target}' {}", as_overhead(start));

    Ok(())
}

#[cfg(test)]
mod tests {
    use camino::Utf8Path;

    use super::*;
    use crate::config::test_manifest;

    #[test]
    fn removes_previous_outputs_and_recreates_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();

        let public = root.join("public");
        fs::create_dir_all(public.join("js")).unwrap();
        fs::write(public.join("js/stale.js"), "old").unwrap();

        let mut manifest = test_manifest(root);
        manifest.public_directory = public.clone();

        run(&manifest).unwrap();

        assert!(public.is_dir());
        assert!(!public.join("js").exists());
    }

    #[test]
    fn tolerates_a_missing_output_directory() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();

        let mut manifest = test_manifest(root);
        manifest.public_directory = root.join("never-built");

        run(&manifest).unwrap();
        assert!(manifest.public_directory.is_dir());
    }
}
