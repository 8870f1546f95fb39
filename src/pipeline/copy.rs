//! The copy task.
//!
//! Moves everything the other pipelines don't own (template HTML, vendored
//! libraries and the like) into the public tree, preserving the layout
//! below the manifest's `copyBase`.

use std::fs;
use std::time::Instant;

use anyhow::Context;

use crate::Manifest;
use crate::pipeline::matched_files;
use crate::report::as_overhead;

pub fn run(manifest: &Manifest) -> anyhow::Result<()> {
    let start = Instant::now();
    let out_dir = &manifest.public_directory;

    let files = matched_files(&manifest.files.copy)?;

    for file in &files {
        // Inputs outside the base are flattened to their file name rather
        // than escaping the public tree.
        let dest = match file.strip_prefix(&manifest.copy_base) {
            Ok(rel) => out_dir.join(rel),
            Err(_) => match file.file_name() {
                Some(name) => out_dir.join(name),
                None => continue,
            },
        };

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating '{parent}'"))?;
        }

        fs::copy(file, &dest).with_context(|| format!("copying '{file}' to '{dest}'"))?;
    }

    tracing::info!(files = files.len(), "copied static files");
    eprintln!("Copied {} file(s) {}", files.len(), as_overhead(start));

    Ok(())
}

#[cfg(test)]
mod tests {
    use camino::Utf8Path;

    use super::*;
    use crate::config::test_manifest;

    fn write(path: &Utf8Path, text: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }

    #[test]
    fn preserves_structure_below_the_copy_base() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();

        write(&root.join("app/views/index.html"), "<html></html>");
        write(&root.join("app/lib/vendor.js"), "vendor");

        let mut manifest = test_manifest(root);
        manifest.files.copy = vec![
            root.join("app/views/**/*.html").to_string(),
            root.join("app/lib/**/*.js").to_string(),
        ];

        run(&manifest).unwrap();

        let public = &manifest.public_directory;
        assert_eq!(
            fs::read_to_string(public.join("views/index.html")).unwrap(),
            "<html></html>"
        );
        assert_eq!(
            fs::read_to_string(public.join("lib/vendor.js")).unwrap(),
            "vendor"
        );
    }

    #[test]
    fn inputs_outside_the_base_are_flattened() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();

        write(&root.join("extra/readme.txt"), "hello");

        let mut manifest = test_manifest(root);
        manifest.files.copy = vec![root.join("extra/*.txt").to_string()];

        run(&manifest).unwrap();

        assert_eq!(
            fs::read_to_string(manifest.public_directory.join("readme.txt")).unwrap(),
            "hello"
        );
    }
}
