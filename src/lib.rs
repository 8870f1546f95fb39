#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

pub mod config;
mod error;
mod lint;
mod pipeline;
mod registry;
mod reload;
mod report;
mod supervisor;
mod watch;

pub use crate::config::{App, Files, Lint, Manifest};
pub use crate::error::*;
pub use crate::registry::{Registry, RunSummary, TaskRun, TaskStatus};
pub use crate::watch::watch;

use crate::reload::ReloadHandle;
use crate::supervisor::Supervisor;

/// The standard task wiring: the five concrete tasks plus the `build`
/// composite, whose graph makes `clean` strictly precede the parallel
/// generation group.
pub fn standard_registry() -> Result<Registry, RegistryError> {
    let mut registry = Registry::new();

    registry.register("clean", &[], pipeline::clean::run)?;
    registry.register("scripts", &[], pipeline::scripts::run)?;
    registry.register("styles", &[], pipeline::styles::run)?;
    registry.register("images", &[], pipeline::images::run)?;
    registry.register("copy", &[], pipeline::copy::run)?;
    registry.register(
        "build",
        &[&["clean"], &["scripts", "styles", "images", "copy"]],
        |_| Ok(()),
    )?;

    Ok(registry)
}

/// The `develop` composite: run `build`, start the live-reload channel and
/// the application supervisor, then dispatch watch-triggered rebuilds until
/// the process is terminated.
pub fn develop(manifest: &Manifest, registry: &Registry) -> Result<(), KarakuriError> {
    let summary = registry.run("build", manifest)?;
    if !summary.success() {
        eprintln!("The initial build had failures, continuing anyway...");
    }

    let reload: Option<ReloadHandle> = if manifest.auto_reload {
        Some(reload::start(manifest.app.livereload_port)?)
    } else {
        None
    };

    let supervisor = Supervisor::start(manifest, reload.clone())?;

    let handle = reload;
    watch::watch(manifest, registry, move |_task| {
        if let Some(supervisor) = &supervisor {
            supervisor.reap();
        }
        if let Some(handle) = &handle {
            handle.notify();
        }
    })?;

    Ok(())
}
