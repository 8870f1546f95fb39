//! The watch dispatcher.
//!
//! Each binding associates one glob group with the task to re-run when a
//! matching file changes: `watchStyles → styles`, `scripts → scripts`,
//! `images → images`. Changes arrive through a debounced notify watcher
//! rooted at the collapsed static prefixes of the bound globs, and every
//! triggered task runs on the dispatcher thread itself (debounce plus
//! single-flight), so overlapping invocations of the same task cannot race.
//! Only the owning task re-runs, never the whole `build` composite.

use std::collections::HashSet;
use std::env;
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use glob::Pattern;
use notify::{EventKind, RecursiveMode};
use notify_debouncer_full::new_debouncer;

use crate::Manifest;
use crate::error::WatchError;
use crate::pipeline::glob_base;
use crate::registry::Registry;
use crate::report;

const DEBOUNCE: Duration = Duration::from_millis(250);

/// A standing association between a glob group and the task it re-runs.
pub struct WatchBinding {
    pub task: &'static str,
    sources: Vec<String>,
    patterns: Vec<Pattern>,
}

impl WatchBinding {
    fn new(task: &'static str, sources: &[String]) -> Result<Self, WatchError> {
        Ok(WatchBinding {
            task,
            sources: sources.to_vec(),
            patterns: sources
                .iter()
                .map(|source| Pattern::new(source))
                .collect::<Result<_, _>>()?,
        })
    }

    /// Does any bound pattern match this path? Checked against the path as
    /// reported and, when possible, relative to the working directory, so
    /// relative manifest globs match absolute watcher events.
    fn matches(&self, path: &Utf8Path, cwd: &Utf8Path) -> bool {
        let relative = path.strip_prefix(cwd).unwrap_or(path);
        self.patterns
            .iter()
            .any(|pattern| pattern.matches(path.as_str()) || pattern.matches(relative.as_str()))
    }
}

/// The standard glob-group → task bindings from the manifest. Styles fall
/// back to the compile globs when no dedicated watch globs are declared.
pub fn bindings(manifest: &Manifest) -> Result<Vec<WatchBinding>, WatchError> {
    let styles = if manifest.files.watch_styles.is_empty() {
        &manifest.files.styles
    } else {
        &manifest.files.watch_styles
    };

    Ok(vec![
        WatchBinding::new("styles", styles)?,
        WatchBinding::new("scripts", &manifest.files.scripts)?,
        WatchBinding::new("images", &manifest.files.images)?,
    ])
}

/// Filesystem roots to watch for a set of bindings: the static prefix of
/// every bound glob, minus prefixes already covered by a shorter one.
fn watch_roots(bindings: &[WatchBinding]) -> Vec<Utf8PathBuf> {
    let mut roots = HashSet::new();

    for binding in bindings {
        for source in &binding.sources {
            let base = glob_base(source);
            let base = if base.as_str().is_empty() {
                Utf8PathBuf::from(".")
            } else if base.is_file() {
                base.parent().map(Utf8Path::to_owned).unwrap_or(base)
            } else {
                base
            };
            roots.insert(base);
        }
    }

    collapse_roots(roots)
}

fn collapse_roots(roots: HashSet<Utf8PathBuf>) -> Vec<Utf8PathBuf> {
    let mut sorted: Vec<_> = roots.into_iter().collect();
    sorted.sort();

    let mut kept: Vec<Utf8PathBuf> = Vec::new();
    for path in sorted {
        if !kept.iter().any(|ancestor| path.starts_with(ancestor)) {
            kept.push(path);
        }
    }

    kept
}

/// Run the dispatcher until process termination. `on_rebuilt` fires after
/// every successful watch-triggered task run; the `develop` composite uses
/// it to notify the live-reload channel.
pub fn watch<F>(manifest: &Manifest, registry: &Registry, mut on_rebuilt: F) -> Result<(), WatchError>
where
    F: FnMut(&str),
{
    let cwd = Utf8PathBuf::try_from(env::current_dir()?)
        .map_err(|err| WatchError::Io(err.into_io_error()))?;

    let bindings = bindings(manifest)?;
    let roots = watch_roots(&bindings);

    let (tx, rx) = std::sync::mpsc::channel();
    let mut debouncer = new_debouncer(DEBOUNCE, None, tx)?;
    for root in &roots {
        debouncer.watch(root.as_std_path(), RecursiveMode::Recursive)?;
    }

    eprintln!("Watching {} path(s) for changes...", roots.len());

    while let Ok(result) = rx.recv() {
        let events = match result {
            Ok(events) => events,
            Err(errors) => {
                for error in errors {
                    tracing::warn!(%error, "watch error");
                }
                continue;
            }
        };

        let changed: HashSet<Utf8PathBuf> = events
            .iter()
            .filter(|de| {
                matches!(
                    de.event.kind,
                    EventKind::Create(..) | EventKind::Modify(..) | EventKind::Remove(..)
                )
            })
            .flat_map(|de| &de.event.paths)
            .filter_map(|path| Utf8PathBuf::try_from(path.clone()).ok())
            .collect();

        if changed.is_empty() {
            continue;
        }

        for binding in &bindings {
            if !changed
                .iter()
                .any(|path| binding.matches(path, &cwd))
            {
                continue;
            }

            let start = Instant::now();
            match registry.run(binding.task, manifest) {
                Ok(summary) if summary.success() => {
                    eprintln!(
                        "Refreshed '{}' {}",
                        binding.task,
                        report::as_overhead(start)
                    );
                    on_rebuilt(binding.task);
                }
                // Individual failures already went through the sink.
                Ok(_) => {}
                Err(err) => report::report(binding.task, &anyhow::Error::new(err)),
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_manifest;

    #[test]
    fn standard_bindings_cover_the_three_categories() {
        let mut manifest = test_manifest(Utf8Path::new("."));
        manifest.files.scripts = vec!["app/js/**/*.js".to_string()];
        manifest.files.styles = vec!["app/styles/[!_]*.scss".to_string()];
        manifest.files.watch_styles = vec!["app/styles/**/*.scss".to_string()];
        manifest.files.images = vec!["app/images/**/*".to_string()];

        let bindings = bindings(&manifest).unwrap();
        let tasks: Vec<_> = bindings.iter().map(|b| b.task).collect();
        assert_eq!(tasks, ["styles", "scripts", "images"]);

        let cwd = Utf8Path::new("/work");
        // Partials trigger styles through the watch globs.
        assert!(bindings[0].matches(Utf8Path::new("app/styles/components/_nav.scss"), cwd));
        assert!(bindings[1].matches(Utf8Path::new("/work/app/js/lib/main.js"), cwd));
        assert!(!bindings[2].matches(Utf8Path::new("app/js/lib/main.js"), cwd));
    }

    #[test]
    fn styles_binding_falls_back_to_compile_globs() {
        let mut manifest = test_manifest(Utf8Path::new("."));
        manifest.files.styles = vec!["app/styles/*.scss".to_string()];

        let bindings = bindings(&manifest).unwrap();
        assert!(bindings[0].matches(Utf8Path::new("app/styles/main.scss"), Utf8Path::new("/")));
    }

    #[test]
    fn covered_roots_are_collapsed() {
        let roots: HashSet<Utf8PathBuf> = ["app", "app/js", "app/styles", "vendor"]
            .into_iter()
            .map(Utf8PathBuf::from)
            .collect();

        assert_eq!(
            collapse_roots(roots),
            vec![Utf8PathBuf::from("app"), Utf8PathBuf::from("vendor")]
        );
    }

    #[test]
    fn watch_roots_use_static_glob_prefixes() {
        let mut manifest = test_manifest(Utf8Path::new("."));
        manifest.files.scripts = vec!["app/js/**/*.js".to_string()];
        manifest.files.styles = vec!["app/styles/**/*.scss".to_string()];
        manifest.files.images = vec!["app/images/**/*".to_string()];

        let bindings = bindings(&manifest).unwrap();
        let roots = watch_roots(&bindings);

        assert_eq!(
            roots,
            vec![
                Utf8PathBuf::from("app/images"),
                Utf8PathBuf::from("app/js"),
                Utf8PathBuf::from("app/styles"),
            ]
        );
    }
}
