use camino::Utf8PathBuf;
use thiserror::Error;

/// Top level error for the CLI entry points.
#[derive(Debug, Error)]
pub enum KarakuriError {
    #[error("Failed to load the manifest:\n{0}")]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Error while watching for file changes:\n{0}")]
    Watch(#[from] WatchError),

    #[error("Error in the live-reload channel:\n{0}")]
    Reload(#[from] ReloadError),

    #[error("Error in the application supervisor:\n{0}")]
    Supervisor(#[from] SupervisorError),
}

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Couldn't read '{path}'.\n{source}")]
    Read {
        path: Utf8PathBuf,
        source: std::io::Error,
    },

    #[error("Couldn't parse '{path}'.\n{source}")]
    Parse {
        path: Utf8PathBuf,
        source: serde_json::Error,
    },
}

/// Errors surfaced while resolving the task graph, before any action runs.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Task '{0}' is not registered")]
    NotFound(String),

    #[error("Task '{task}' names unregistered prerequisite '{prerequisite}'")]
    Unknown { task: String, prerequisite: String },

    #[error("Task '{0}' is part of a prerequisite cycle")]
    Cycle(String),

    #[error("Task '{0}' is registered twice")]
    Duplicate(String),
}

/// A source file violated one of the configured forbidden-token rules.
#[derive(Debug, Error)]
#[error("{path}:{line}: forbidden token `{token}`")]
pub struct LintError {
    pub path: Utf8PathBuf,
    pub line: usize,
    pub token: String,
}

#[derive(Debug, Error)]
pub enum WatchError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Notify(#[from] notify::Error),

    #[error("Couldn't compile glob pattern.\n{0}")]
    Pattern(#[from] glob::PatternError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Debug, Error)]
pub enum ReloadError {
    #[error("Couldn't bind the live-reload socket.\n{0}")]
    Bind(std::io::Error),
}

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("The app command in the manifest is empty")]
    EmptyCommand,

    #[error("Couldn't spawn '{command}'.\n{source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error(transparent)]
    Watch(#[from] WatchError),
}
