//! The development supervisor.
//!
//! Runs the web application as a child process while `develop` is active.
//! The child's stdout is scanned line by line for the manifest's literal
//! ready signal; on a match the live-reload channel is notified, which is
//! the only synchronization between "server restarted and ready" and "tell
//! connected browsers to refresh". Template changes restart the child; an
//! unexpected exit is logged, not retried. The child is killed when the
//! supervisor is dropped; the watcher threads live until process exit.

use std::io::{BufRead, BufReader};
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use notify::RecursiveMode;
use notify_debouncer_full::new_debouncer;

use crate::Manifest;
use crate::config::App;
use crate::error::{SupervisorError, WatchError};
use crate::pipeline::glob_base;
use crate::reload::ReloadHandle;

const DEBOUNCE: Duration = Duration::from_millis(250);

struct Inner {
    app: App,
    reload: Option<ReloadHandle>,
    child: Mutex<Option<Child>>,
}

pub struct Supervisor {
    inner: Arc<Inner>,
}

impl Supervisor {
    /// Spawn the application process and the template watcher that restarts
    /// it. Returns `Ok(None)` when the manifest declares no app command.
    pub fn start(
        manifest: &Manifest,
        reload: Option<ReloadHandle>,
    ) -> Result<Option<Supervisor>, SupervisorError> {
        if manifest.app.command.is_empty() {
            return Ok(None);
        }

        let inner = Arc::new(Inner {
            app: manifest.app.clone(),
            reload,
            child: Mutex::new(None),
        });

        inner.respawn()?;
        watch_templates(manifest, inner.clone())?;

        Ok(Some(Supervisor { inner }))
    }

    /// Log an unexpected child exit, leaving restart to a template change.
    pub fn reap(&self) {
        let mut guard = self.inner.child.lock().unwrap();
        if let Some(child) = guard.as_mut() {
            if let Ok(Some(status)) = child.try_wait() {
                tracing::error!(%status, "application exited unexpectedly");
                eprintln!("The application process exited unexpectedly ({status})");
                *guard = None;
            }
        }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.inner.kill();
    }
}

impl Inner {
    fn respawn(&self) -> Result<(), SupervisorError> {
        let (program, args) = self
            .app
            .command
            .split_first()
            .ok_or(SupervisorError::EmptyCommand)?;

        let mut child = Command::new(program)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| SupervisorError::Spawn {
                command: self.app.command.join(" "),
                source,
            })?;

        tracing::info!(pid = child.id(), command = %program, "application started");

        if let Some(stdout) = child.stdout.take() {
            scan_stdout(stdout, self.app.ready_signal.clone(), self.reload.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            forward_stderr(stderr);
        }

        *self.child.lock().unwrap() = Some(child);
        Ok(())
    }

    fn restart(&self) {
        eprintln!("Template changed, restarting the application process...");
        self.kill();
        if let Err(err) = self.respawn() {
            tracing::error!(error = %err, "restart failed");
            eprintln!("Couldn't restart the application: {err}");
        }
    }

    fn kill(&self) {
        if let Some(mut child) = self.child.lock().unwrap().take() {
            child.kill().ok();
            child.wait().ok();
        }
    }
}

/// Does this stdout line announce that the server is accepting connections?
fn is_ready_signal(line: &str, signal: &str) -> bool {
    !signal.is_empty() && line.starts_with(signal)
}

/// Forward child stdout to ours, notifying the reload channel when the
/// ready signal shows up.
fn scan_stdout(stdout: std::process::ChildStdout, signal: String, reload: Option<ReloadHandle>) {
    std::thread::spawn(move || {
        for line in BufReader::new(stdout).lines() {
            let Ok(line) = line else { break };

            if is_ready_signal(&line, &signal) {
                tracing::debug!("application reported ready");
                if let Some(reload) = &reload {
                    reload.notify();
                }
            }

            println!("{line}");
        }
    });
}

fn forward_stderr(stderr: std::process::ChildStderr) {
    std::thread::spawn(move || {
        for line in BufReader::new(stderr).lines() {
            let Ok(line) = line else { break };
            eprintln!("{line}");
        }
    });
}

/// Watch the template globs on a dedicated thread; any matching change
/// restarts the application process.
fn watch_templates(manifest: &Manifest, inner: Arc<Inner>) -> Result<(), SupervisorError> {
    if manifest.app.templates.is_empty() {
        return Ok(());
    }

    let patterns: Vec<glob::Pattern> = manifest
        .app
        .templates
        .iter()
        .map(|source| glob::Pattern::new(source))
        .collect::<Result<_, _>>()
        .map_err(WatchError::Pattern)?;

    let cwd = std::env::current_dir().map_err(WatchError::Io)?;

    let (tx, rx) = std::sync::mpsc::channel();
    let mut debouncer = new_debouncer(DEBOUNCE, None, tx).map_err(WatchError::Notify)?;

    for source in &manifest.app.templates {
        let base = glob_base(source);
        let root = if base.as_str().is_empty() {
            camino::Utf8PathBuf::from(".")
        } else {
            base
        };
        debouncer
            .watch(root.as_std_path(), RecursiveMode::Recursive)
            .map_err(WatchError::Notify)?;
    }

    std::thread::spawn(move || {
        // The thread owns the debouncer; it runs until process exit.
        let _debouncer = debouncer;

        while let Ok(result) = rx.recv() {
            let Ok(events) = result else { continue };

            // Events carry absolute paths; relative manifest globs match
            // against the working-directory-relative form.
            let hit = events
                .iter()
                .flat_map(|de| &de.event.paths)
                .filter_map(|path| path.strip_prefix(&cwd).unwrap_or(path).to_str())
                .any(|path| patterns.iter().any(|p| p.matches(path)));

            if hit {
                inner.restart();
            }
        }
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_manifest;

    #[test]
    fn ready_signal_matches_on_line_prefix() {
        let signal = "Express server listening on";
        assert!(is_ready_signal(
            "Express server listening on 3000, in development mode.",
            signal
        ));
        assert!(!is_ready_signal("warming up...", signal));
        assert!(!is_ready_signal(
            "prefix Express server listening on 3000",
            signal
        ));
        assert!(!is_ready_signal("anything", ""));
    }

    #[test]
    fn empty_command_disables_the_supervisor() {
        let manifest = test_manifest(camino::Utf8Path::new("."));
        let supervisor = Supervisor::start(&manifest, None).unwrap();
        assert!(supervisor.is_none());
    }

    #[test]
    fn child_process_lifecycle() {
        let mut manifest = test_manifest(camino::Utf8Path::new("."));
        manifest.app.command = vec!["sleep".to_string(), "30".to_string()];

        let supervisor = Supervisor::start(&manifest, None).unwrap().unwrap();
        supervisor.reap();
        assert!(supervisor.inner.child.lock().unwrap().is_some());

        // Dropping the supervisor kills the child.
        drop(supervisor);
    }
}
