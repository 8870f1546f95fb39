//! The style pipeline.
//!
//! Each stylesheet entry point is linted, compiled from SCSS with `grass`
//! (expanded output, manifest include paths, import-once semantics for
//! shared partials), then run through `lightningcss` for vendor prefixing
//! against a fixed browser-support window. Two artifacts are written per
//! entry: `<public>/css/<name>.css` and `<name>.min.css`, plus an optional
//! source map next to the minified one when the manifest asks for it.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;

use anyhow::{Context, anyhow};
use camino::Utf8Path;
use grass::{Fs, StdFs};
use lightningcss::printer::PrinterOptions;
use lightningcss::stylesheet::{ParserOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};
use parcel_sourcemap::SourceMap;

use crate::Manifest;
use crate::lint;
use crate::pipeline::matched_files;
use crate::report::as_overhead;

/// Filesystem shim that feeds every file to the compiler at most once per
/// compilation, so a shared partial pulled in by several `@import`s lands in
/// the output a single time.
#[derive(Debug, Default)]
struct ImportOnceFs {
    seen: Mutex<HashSet<PathBuf>>,
}

impl Fs for ImportOnceFs {
    fn is_dir(&self, path: &Path) -> bool {
        StdFs.is_dir(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        StdFs.is_file(path)
    }

    fn read(&self, path: &Path) -> std::io::Result<Vec<u8>> {
        let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        if !self.seen.lock().unwrap().insert(canonical) {
            return Ok(Vec::new());
        }
        StdFs.read(path)
    }
}

/// The declared browser-support window: the last two major versions of the
/// evergreen browsers, frozen here so builds stay reproducible. Versions are
/// encoded as `major << 16 | minor << 8`.
fn browser_window() -> Targets {
    Targets {
        browsers: Some(Browsers {
            chrome: Some(123 << 16),
            edge: Some(123 << 16),
            firefox: Some(124 << 16),
            safari: Some((16 << 16) | (6 << 8)),
            ios_saf: Some((16 << 16) | (6 << 8)),
            ..Browsers::default()
        }),
        ..Targets::default()
    }
}

pub fn run(manifest: &Manifest) -> anyhow::Result<()> {
    let start = Instant::now();
    let out_dir = manifest.css_dir();

    let entries = matched_files(&manifest.files.styles)?;

    fs::create_dir_all(&out_dir).with_context(|| format!("creating '{out_dir}'"))?;

    for entry in &entries {
        compile_entry(manifest, entry)?;
    }

    tracing::info!(entries = entries.len(), "compiled stylesheets");
    eprintln!(
        "Compiled {} stylesheet(s) into '{out_dir}' {}",
        entries.len(),
        as_overhead(start)
    );

    Ok(())
}

fn compile_entry(manifest: &Manifest, entry: &Utf8Path) -> anyhow::Result<()> {
    let source = fs::read_to_string(entry).with_context(|| format!("reading '{entry}'"))?;
    lint::check(entry, &source, &manifest.lint.forbid_styles)?;

    let stem = entry
        .file_stem()
        .ok_or_else(|| anyhow!("no file stem in '{entry}'"))?;
    let out_dir = manifest.css_dir();

    // Compile SCSS to expanded CSS. A fresh import-once view of the
    // filesystem per entry point keeps entries independent of each other.
    let fs_shim = ImportOnceFs::default();
    let mut options = grass::Options::default()
        .style(grass::OutputStyle::Expanded)
        .fs(&fs_shim);
    for include in &manifest.files.node_modules {
        options = options.load_path(include);
    }

    let css = grass::from_path(entry, &options)
        .map_err(|err| anyhow!("compiling '{entry}':\n{err}"))?;

    let targets = browser_window();
    let stylesheet = StyleSheet::parse(
        &css,
        ParserOptions {
            filename: entry.to_string(),
            ..ParserOptions::default()
        },
    )
    .map_err(|err| anyhow!("parsing compiled css of '{entry}': {err}"))?;

    let expanded = stylesheet
        .to_css(PrinterOptions {
            targets,
            ..PrinterOptions::default()
        })
        .map_err(|err| anyhow!("printing css of '{entry}': {err}"))?;
    fs::write(out_dir.join(format!("{stem}.css")), &expanded.code)
        .with_context(|| format!("writing '{stem}.css'"))?;

    let mut source_map = manifest.source_maps.then(|| SourceMap::new("/"));
    let minified = stylesheet
        .to_css(PrinterOptions {
            minify: true,
            targets,
            source_map: source_map.as_mut(),
            ..PrinterOptions::default()
        })
        .map_err(|err| anyhow!("minifying css of '{entry}': {err}"))?;

    let mut code = minified.code;
    if let Some(mut map) = source_map {
        let json = map
            .to_json(None)
            .map_err(|err| anyhow!("serializing source map of '{entry}': {err}"))?;

        let map_rel = manifest.files.styles_map.join(format!("{stem}.min.css.map"));
        let map_path = out_dir.join(&map_rel);
        if let Some(parent) = map_path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating '{parent}'"))?;
        }
        fs::write(&map_path, json).with_context(|| format!("writing '{map_path}'"))?;

        code.push_str(&format!("\n/*# sourceMappingURL={map_rel} */"));
    }

    fs::write(out_dir.join(format!("{stem}.min.css")), code)
        .with_context(|| format!("writing '{stem}.min.css'"))?;

    Ok(())
}
