//! The script pipeline.
//!
//! Glob match order is bundle order: every input is linted, the sources are
//! concatenated into `<public>/js/main.js`, and a second minified artifact
//! is written as `main.min.js`. A lint violation fails the run before any
//! output is touched, so artifacts from earlier successful runs survive.

use std::fs;
use std::time::Instant;

use anyhow::Context;

use crate::Manifest;
use crate::lint;
use crate::pipeline::matched_files;
use crate::report::as_overhead;

const BUNDLE: &str = "main.js";
const BUNDLE_MIN: &str = "main.min.js";

pub fn run(manifest: &Manifest) -> anyhow::Result<()> {
    let start = Instant::now();
    let out_dir = manifest.js_dir();

    let inputs = matched_files(&manifest.files.scripts)?;
    let mut bundle = String::new();

    for path in &inputs {
        let source = fs::read_to_string(path).with_context(|| format!("reading '{path}'"))?;
        lint::check(path, &source, &manifest.lint.forbid_scripts)?;
        bundle.push_str(&source);
    }

    fs::create_dir_all(&out_dir).with_context(|| format!("creating '{out_dir}'"))?;
    fs::write(out_dir.join(BUNDLE), &bundle).context("writing the script bundle")?;

    let minified = minifier::js::minify(&bundle).to_string();
    fs::write(out_dir.join(BUNDLE_MIN), minified).context("writing the minified bundle")?;

    tracing::info!(files = inputs.len(), "bundled scripts");
    eprintln!(
        "Bundled {} script file(s) into '{}' {}",
        inputs.len(),
        out_dir.join(BUNDLE),
        as_overhead(start)
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use camino::Utf8Path;

    use super::*;
    use crate::config::test_manifest;

    #[test]
    fn concatenates_in_glob_match_order_and_minifies() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();

        let src = root.join("app/js");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("a.js"), "var a = 1;\n").unwrap();
        fs::write(src.join("b.js"), "var b = 2;\n").unwrap();

        let mut manifest = test_manifest(root);
        manifest.files.scripts = vec![
            src.join("a.js").to_string(),
            src.join("b.js").to_string(),
        ];

        run(&manifest).unwrap();

        let bundle = fs::read_to_string(manifest.js_dir().join("main.js")).unwrap();
        assert_eq!(bundle, "var a = 1;\nvar b = 2;\n");

        let minified = fs::read_to_string(manifest.js_dir().join("main.min.js")).unwrap();
        assert!(minified.contains("var a=1"));
        assert!(minified.len() < bundle.len());
    }

    #[test]
    fn lint_violation_leaves_previous_artifacts_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();

        let src = root.join("app/js");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("a.js"), "var a = 1;\n").unwrap();

        let mut manifest = test_manifest(root);
        manifest.files.scripts = vec![src.join("a.js").to_string()];

        run(&manifest).unwrap();
        let before = fs::read_to_string(manifest.js_dir().join("main.js")).unwrap();

        // Introduce a violation; the re-run must fail naming the file.
        fs::write(src.join("a.js"), "var a = 1;\ndebugger;\n").unwrap();
        let err = run(&manifest).unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("a.js"));
        assert!(message.contains("debugger"));

        let after = fs::read_to_string(manifest.js_dir().join("main.js")).unwrap();
        assert_eq!(before, after);
        assert!(manifest.js_dir().join("main.min.js").exists());
    }

    #[test]
    fn empty_input_produces_empty_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();

        let manifest = test_manifest(root);
        run(&manifest).unwrap();

        assert_eq!(
            fs::read_to_string(manifest.js_dir().join("main.js")).unwrap(),
            ""
        );
    }
}
