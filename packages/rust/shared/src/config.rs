//! Project configuration for buildgate.
//!
//! Project config lives at `<project>/buildgate.toml`. Every section is
//! optional; CLI flags override config file values, which override defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BuildGateError, Result};
use crate::types::{BuildMode, PackageManifest};

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = "buildgate.toml";

/// Package metadata file name.
pub const PACKAGE_FILE_NAME: &str = "package.json";

// ---------------------------------------------------------------------------
// Config structs (matching buildgate.toml schema)
// ---------------------------------------------------------------------------

/// Top-level project config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Production build settings.
    #[serde(default)]
    pub build: BuildSection,

    /// Development settings (also drives the lint rule).
    #[serde(default)]
    pub dev: DevSection,

    /// Static asset handling.
    #[serde(default)]
    pub assets: AssetsSection,

    /// Entry name -> modules bundled into that entry.
    #[serde(default = "default_entry")]
    pub entry: BTreeMap<String, Vec<String>>,

    /// Module resolution.
    #[serde(default)]
    pub resolve: ResolveSection,

    /// External bundling engine.
    #[serde(default)]
    pub engine: EngineSection,
}

/// `[build]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildSection {
    /// Output root, relative to the project directory.
    #[serde(default = "default_assets_root")]
    pub assets_root: String,

    /// Sub-directory of `assets_root` holding emitted static assets.
    #[serde(default = "default_assets_sub_directory")]
    pub assets_sub_directory: String,

    /// URL prefix for emitted assets in production.
    #[serde(default = "default_public_path")]
    pub assets_public_path: String,

    /// Emit source maps for production bundles.
    #[serde(default = "default_true")]
    pub production_source_map: bool,
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            assets_root: default_assets_root(),
            assets_sub_directory: default_assets_sub_directory(),
            assets_public_path: default_public_path(),
            production_source_map: true,
        }
    }
}

/// `[dev]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevSection {
    #[serde(default = "default_assets_sub_directory")]
    pub assets_sub_directory: String,

    /// URL prefix for emitted assets in development.
    #[serde(default = "default_public_path")]
    pub assets_public_path: String,

    /// Include the lint rule in the pipeline.
    #[serde(default = "default_true")]
    pub use_eslint: bool,

    /// Report lint problems as errors instead of warnings.
    #[serde(default)]
    pub show_eslint_errors_in_overlay: bool,

    #[serde(default = "default_true")]
    pub css_source_map: bool,
}

impl Default for DevSection {
    fn default() -> Self {
        Self {
            assets_sub_directory: default_assets_sub_directory(),
            assets_public_path: default_public_path(),
            use_eslint: true,
            show_eslint_errors_in_overlay: false,
            css_source_map: true,
        }
    }
}

/// `[assets]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetsSection {
    /// Files strictly smaller than this many bytes are inlined as data URIs.
    #[serde(default = "default_inline_limit")]
    pub inline_limit: u64,
}

impl Default for AssetsSection {
    fn default() -> Self {
        Self {
            inline_limit: default_inline_limit(),
        }
    }
}

/// `[resolve]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveSection {
    /// Extensions that may be omitted in imports.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Import aliases. Targets starting with `.` are resolved against the
    /// project root; anything else is passed through as a module path.
    #[serde(default = "default_alias")]
    pub alias: BTreeMap<String, String>,
}

impl Default for ResolveSection {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            alias: default_alias(),
        }
    }
}

/// `[engine]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSection {
    /// Executable that runs the bundler.
    #[serde(default = "default_engine_command")]
    pub command: String,

    /// Arguments passed before the request is streamed on stdin.
    #[serde(default = "default_engine_args")]
    pub args: Vec<String>,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            command: default_engine_command(),
            args: default_engine_args(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_assets_root() -> String {
    "dist".into()
}
fn default_assets_sub_directory() -> String {
    "static".into()
}
fn default_public_path() -> String {
    "/".into()
}
fn default_inline_limit() -> u64 {
    10_000
}
fn default_entry() -> BTreeMap<String, Vec<String>> {
    BTreeMap::from([(
        "app".to_string(),
        vec!["babel-polyfill".to_string(), "./src/main.js".to_string()],
    )])
}
fn default_extensions() -> Vec<String> {
    [".js", ".vue", ".json", ".less"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_alias() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("vue$".to_string(), "vue/dist/vue.esm.js".to_string()),
        ("@".to_string(), "./src".to_string()),
    ])
}
fn default_engine_command() -> String {
    "node".into()
}
fn default_engine_args() -> Vec<String> {
    vec!["build/bundle.js".into()]
}

// ---------------------------------------------------------------------------
// Runtime settings (merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Everything a build run needs, with the mode fixed up front.
#[derive(Debug, Clone)]
pub struct BuildSettings {
    /// Absolute project directory.
    pub project_dir: PathBuf,
    pub mode: BuildMode,
    pub config: AppConfig,
}

impl BuildSettings {
    pub fn new(project_dir: impl Into<PathBuf>, mode: BuildMode, config: AppConfig) -> Self {
        Self {
            project_dir: project_dir.into(),
            mode,
            config,
        }
    }

    /// Absolute output root (`<project>/dist`).
    pub fn assets_root(&self) -> PathBuf {
        self.project_dir.join(&self.config.build.assets_root)
    }

    /// Directory cleared before each production build (`<project>/dist/static`).
    pub fn clean_target(&self) -> PathBuf {
        self.assets_root()
            .join(&self.config.build.assets_sub_directory)
    }

    /// Public path for the current mode.
    pub fn public_path(&self) -> &str {
        match self.mode {
            BuildMode::Production => &self.config.build.assets_public_path,
            BuildMode::Development => &self.config.dev.assets_public_path,
        }
    }

    /// Asset sub-directory for the current mode.
    pub fn assets_sub_directory(&self) -> &str {
        match self.mode {
            BuildMode::Production => &self.config.build.assets_sub_directory,
            BuildMode::Development => &self.config.dev.assets_sub_directory,
        }
    }

    /// Whether CSS source maps are produced for the current mode.
    pub fn css_source_map(&self) -> bool {
        match self.mode {
            BuildMode::Production => self.config.build.production_source_map,
            BuildMode::Development => self.config.dev.css_source_map,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Path to the config file inside a project directory.
pub fn config_file_path(project_dir: &Path) -> PathBuf {
    project_dir.join(CONFIG_FILE_NAME)
}

/// Load the project config. Returns defaults if the file does not exist.
pub fn load_config(project_dir: &Path) -> Result<AppConfig> {
    let path = config_file_path(project_dir);

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the project config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| BuildGateError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| BuildGateError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Write a default config file into the project directory.
/// Returns the path to the created file.
pub fn init_config(project_dir: &Path) -> Result<PathBuf> {
    let path = config_file_path(project_dir);
    if path.exists() {
        return Err(BuildGateError::config(format!(
            "{} already exists",
            path.display()
        )));
    }

    let content = toml::to_string_pretty(&AppConfig::default())
        .map_err(|e| BuildGateError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| BuildGateError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read `package.json` from the project directory.
pub fn load_package_manifest(project_dir: &Path) -> Result<PackageManifest> {
    let path = project_dir.join(PACKAGE_FILE_NAME);
    let content = std::fs::read_to_string(&path).map_err(|e| BuildGateError::io(&path, e))?;

    serde_json::from_str(&content)
        .map_err(|e| BuildGateError::config(format!("failed to parse {}: {e}", path.display())))
}
