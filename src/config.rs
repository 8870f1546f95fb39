//! The build manifest.
//!
//! Everything the pipeline does is driven by a single declarative JSON file,
//! `karakuri.json` by default. The manifest is deserialized once at startup
//! and passed by reference into every task invocation; nothing mutates it
//! afterwards and there is no ambient global to reach for.
//!
//! Field names are camelCase on disk:
//!
//! ```json
//! {
//!     "publicDirectory": "public/",
//!     "copyBase": "app/",
//!     "sourceMaps": true,
//!     "minifyImages": true,
//!     "autoReload": true,
//!     "files": {
//!         "scripts": ["app/js/**/*.js"],
//!         "styles": ["app/styles/**/[!_]*.scss"],
//!         "watchStyles": ["app/styles/**/*.scss"],
//!         "images": ["app/images/**/*"],
//!         "copy": ["app/views/**/*.html", "app/lib/**/*"],
//!         "nodeModules": ["node_modules/"],
//!         "stylesMap": "maps/"
//!     }
//! }
//! ```

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;

use crate::error::ManifestError;

pub const DEFAULT_MANIFEST: &str = "karakuri.json";

/// Read-only build configuration, loaded once at process start.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Manifest {
    /// Base directory every task writes into.
    pub public_directory: Utf8PathBuf,
    /// Base path stripped from `files.copy` matches to preserve their
    /// relative layout below `public_directory`.
    pub copy_base: Utf8PathBuf,
    /// Emit source maps alongside the minified stylesheets.
    #[serde(default)]
    pub source_maps: bool,
    /// Re-encode images instead of copying them through unchanged.
    #[serde(default)]
    pub minify_images: bool,
    /// Broadcast a live-reload message after watch-triggered rebuilds.
    #[serde(default)]
    pub auto_reload: bool,
    pub files: Files,
    #[serde(default)]
    pub lint: Lint,
    #[serde(default)]
    pub app: App,
}

/// Per-category input globs and style-compiler paths.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Files {
    /// Script inputs, concatenated in glob match order.
    pub scripts: Vec<String>,
    /// Stylesheet entry points. Partials belong in `watch_styles` only.
    pub styles: Vec<String>,
    /// Stylesheets to watch, including partials that are never compiled
    /// on their own.
    #[serde(default)]
    pub watch_styles: Vec<String>,
    pub images: Vec<String>,
    /// Everything else that should land in the public tree as-is.
    #[serde(default)]
    pub copy: Vec<String>,
    /// Additional include search paths for the style compiler.
    #[serde(default)]
    pub node_modules: Vec<Utf8PathBuf>,
    /// Directory for emitted source maps, relative to the css output dir.
    #[serde(default = "default_styles_map")]
    pub styles_map: Utf8PathBuf,
}

fn default_styles_map() -> Utf8PathBuf {
    Utf8PathBuf::from("maps")
}

/// Forbidden-token rules for the script and style linters.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Lint {
    #[serde(default = "default_forbid_scripts")]
    pub forbid_scripts: Vec<String>,
    #[serde(default = "default_forbid_styles")]
    pub forbid_styles: Vec<String>,
}

fn default_forbid_scripts() -> Vec<String> {
    vec!["debugger".to_string()]
}

fn default_forbid_styles() -> Vec<String> {
    vec!["!important".to_string()]
}

impl Default for Lint {
    fn default() -> Self {
        Lint {
            forbid_scripts: default_forbid_scripts(),
            forbid_styles: default_forbid_styles(),
        }
    }
}

/// The supervised application process used by the `develop` task.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct App {
    /// Argv of the application process. Empty disables the supervisor.
    #[serde(default)]
    pub command: Vec<String>,
    /// Template globs whose changes restart the application.
    #[serde(default)]
    pub templates: Vec<String>,
    /// Literal stdout prefix the child prints once it accepts connections.
    #[serde(default = "default_ready_signal")]
    pub ready_signal: String,
    #[serde(default = "default_livereload_port")]
    pub livereload_port: u16,
}

fn default_ready_signal() -> String {
    "Express server listening on".to_string()
}

fn default_livereload_port() -> u16 {
    35729
}

impl Default for App {
    fn default() -> Self {
        App {
            command: Vec::new(),
            templates: Vec::new(),
            ready_signal: default_ready_signal(),
            livereload_port: default_livereload_port(),
        }
    }
}

impl Manifest {
    /// Load and parse the manifest file.
    pub fn load(path: &Utf8Path) -> Result<Manifest, ManifestError> {
        let text = fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.to_owned(),
            source,
        })?;

        serde_json::from_str(&text).map_err(|source| ManifestError::Parse {
            path: path.to_owned(),
            source,
        })
    }

    pub fn js_dir(&self) -> Utf8PathBuf {
        self.public_directory.join("js")
    }

    pub fn css_dir(&self) -> Utf8PathBuf {
        self.public_directory.join("css")
    }

    pub fn images_dir(&self) -> Utf8PathBuf {
        self.public_directory.join("images")
    }
}

/// Shared fixture for pipeline tests: a manifest rooted in a temp dir with
/// no inputs configured.
#[cfg(test)]
pub(crate) fn test_manifest(root: &Utf8Path) -> Manifest {
    Manifest {
        public_directory: root.join("public"),
        copy_base: root.join("app"),
        source_maps: false,
        minify_images: false,
        auto_reload: false,
        files: Files {
            scripts: vec![],
            styles: vec![],
            watch_styles: vec![],
            images: vec![],
            copy: vec![],
            node_modules: vec![],
            styles_map: "maps".into(),
        },
        lint: Lint::default(),
        app: App::default(),
    }
}
