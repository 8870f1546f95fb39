//! The image pipeline.
//!
//! Inputs are mirrored into `<public>/images/...` below each glob's static
//! prefix. A file is only written when its modification time is newer than
//! the destination's; this is the pipeline's sole incremental behavior,
//! mtime based rather than content hashed. With `minifyImages` set, PNG and JPEG
//! inputs are re-encoded through the `image` codecs; everything else passes
//! through unchanged.

use std::fs;
use std::time::Instant;

use anyhow::Context;
use camino::Utf8Path;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};

use crate::Manifest;
use crate::pipeline::{glob_base, matched_files};
use crate::report::as_overhead;

const JPEG_QUALITY: u8 = 85;

pub fn run(manifest: &Manifest) -> anyhow::Result<()> {
    let start = Instant::now();
    let out_dir = manifest.images_dir();

    let mut written = 0usize;
    let mut skipped = 0usize;

    for pattern in &manifest.files.images {
        let base = glob_base(pattern);

        for file in matched_files(std::slice::from_ref(pattern))? {
            let rel = file.strip_prefix(&base).unwrap_or(&file);
            let dest = out_dir.join(rel);

            // Skip inputs no newer than what is already in place.
            if !newer(&file, &dest)? {
                skipped += 1;
                continue;
            }

            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).with_context(|| format!("creating '{parent}'"))?;
            }

            let bytes = fs::read(&file).with_context(|| format!("reading '{file}'"))?;
            let bytes = if manifest.minify_images {
                optimize(&file, bytes)?
            } else {
                bytes
            };

            fs::write(&dest, bytes).with_context(|| format!("writing '{dest}'"))?;
            written += 1;
        }
    }

    tracing::info!(written, skipped, "processed images");
    eprintln!(
        "Processed {written} image(s), {skipped} up to date {}",
        as_overhead(start)
    );

    Ok(())
}

/// True when the source is strictly newer than the destination, or the
/// destination does not exist yet.
fn newer(src: &Utf8Path, dest: &Utf8Path) -> anyhow::Result<bool> {
    let dest_meta = match fs::metadata(dest) {
        Ok(meta) => meta,
        Err(_) => return Ok(true),
    };

    let src_time = fs::metadata(src)
        .and_then(|meta| meta.modified())
        .with_context(|| format!("mtime of '{src}'"))?;
    let dest_time = dest_meta
        .modified()
        .with_context(|| format!("mtime of '{dest}'"))?;

    Ok(src_time > dest_time)
}

/// Re-encode the formats we have codecs for; pass anything else through.
fn optimize(path: &Utf8Path, bytes: Vec<u8>) -> anyhow::Result<Vec<u8>> {
    let ext = path.extension().map(str::to_ascii_lowercase);

    match ext.as_deref() {
        Some("png") => {
            let img = image::load_from_memory(&bytes)
                .with_context(|| format!("decoding '{path}'"))?;
            let mut out = Vec::new();
            let encoder =
                PngEncoder::new_with_quality(&mut out, CompressionType::Best, FilterType::Adaptive);
            img.write_with_encoder(encoder)
                .with_context(|| format!("re-encoding '{path}'"))?;
            Ok(out)
        }
        Some("jpg" | "jpeg") => {
            let img = image::load_from_memory(&bytes)
                .with_context(|| format!("decoding '{path}'"))?;
            let mut out = Vec::new();
            let encoder = JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
            img.write_with_encoder(encoder)
                .with_context(|| format!("re-encoding '{path}'"))?;
            Ok(out)
        }
        _ => Ok(bytes),
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use image::RgbaImage;

    use super::*;
    use crate::config::test_manifest;

    fn sample_png(path: &Utf8Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        RgbaImage::from_pixel(4, 4, image::Rgba([255, 0, 0, 255]))
            .save(path.as_std_path())
            .unwrap();
    }

    #[test]
    fn mirrors_the_source_tree_below_the_glob_base() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();

        sample_png(&root.join("app/images/icons/logo.png"));

        let mut manifest = test_manifest(root);
        manifest.files.images = vec![root.join("app/images/**/*.png").to_string()];

        run(&manifest).unwrap();

        assert!(manifest.images_dir().join("icons/logo.png").is_file());
    }

    #[test]
    fn unchanged_inputs_are_not_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();

        let src = root.join("app/images/logo.png");
        sample_png(&src);

        let mut manifest = test_manifest(root);
        manifest.files.images = vec![root.join("app/images/*.png").to_string()];

        run(&manifest).unwrap();
        let dest = manifest.images_dir().join("logo.png");
        assert!(dest.is_file());

        // Plant a sentinel; a second run must not touch the destination.
        fs::write(&dest, b"sentinel").unwrap();
        run(&manifest).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"sentinel");

        // Bump the source mtime past the destination; now it rewrites.
        let file = fs::File::options().append(true).open(&src).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(10))
            .unwrap();
        drop(file);

        run(&manifest).unwrap();
        assert_ne!(fs::read(&dest).unwrap(), b"sentinel");
    }

    #[test]
    fn optimized_png_is_still_decodable() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();

        sample_png(&root.join("app/images/logo.png"));

        let mut manifest = test_manifest(root);
        manifest.files.images = vec![root.join("app/images/*.png").to_string()];
        manifest.minify_images = true;

        run(&manifest).unwrap();

        let bytes = fs::read(manifest.images_dir().join("logo.png")).unwrap();
        let img = image::load_from_memory(&bytes).unwrap();
        assert_eq!((img.width(), img.height()), (4, 4));
    }

    #[test]
    fn unknown_formats_pass_through_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();

        let src = root.join("app/images/logo.svg");
        fs::create_dir_all(src.parent().unwrap()).unwrap();
        fs::write(&src, "<svg></svg>").unwrap();

        let mut manifest = test_manifest(root);
        manifest.files.images = vec![root.join("app/images/*.svg").to_string()];
        manifest.minify_images = true;

        run(&manifest).unwrap();

        assert_eq!(
            fs::read(manifest.images_dir().join("logo.svg")).unwrap(),
            b"<svg></svg>"
        );
    }
}
