//! The configuration document handed to the bundling engine.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;

use buildgate_assets::{AssetPipelineConfig, TransformRule};
use buildgate_shared::{BuildMode, BuildSettings};

/// One build's worth of bundler configuration. Immutable once built.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRequest {
    pub mode: BuildMode,
    /// Base directory entries and loaders resolve against.
    pub context: PathBuf,
    pub entry: BTreeMap<String, Vec<String>>,
    pub output: OutputOptions,
    pub resolve: ResolveOptions,
    pub module: ModuleOptions,
    pub node: NodeShims,
    pub stats: StatsOptions,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputOptions {
    pub path: PathBuf,
    /// Bundle name template; `[name]` is the entry name.
    pub filename: String,
    pub public_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolveOptions {
    pub extensions: Vec<String>,
    pub alias: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModuleOptions {
    pub rules: Vec<TransformRule>,
}

/// Node built-ins the bundler must not polyfill for browser output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeShims {
    #[serde(rename = "setImmediate")]
    pub set_immediate: bool,
    pub dgram: String,
    pub fs: String,
    pub net: String,
    pub tls: String,
    pub child_process: String,
}

impl Default for NodeShims {
    fn default() -> Self {
        let empty = || "empty".to_string();
        Self {
            set_immediate: false,
            dgram: empty(),
            fs: empty(),
            net: empty(),
            tls: empty(),
            child_process: empty(),
        }
    }
}

/// How the engine should render its summary text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsOptions {
    pub colors: bool,
    pub modules: bool,
    pub children: bool,
    pub chunks: bool,
    pub chunk_modules: bool,
}

impl Default for StatsOptions {
    fn default() -> Self {
        Self {
            colors: true,
            modules: false,
            children: false,
            chunks: false,
            chunk_modules: false,
        }
    }
}

impl BuildRequest {
    /// Assemble a request from settings and the rule table.
    ///
    /// The public path is chosen by `settings.mode`; nothing here reads the
    /// process environment.
    pub fn new(settings: &BuildSettings, pipeline: &AssetPipelineConfig) -> Self {
        let config = &settings.config;

        let alias = config
            .resolve
            .alias
            .iter()
            .map(|(key, target)| {
                let target = if target.starts_with('.') {
                    let relative = target.strip_prefix("./").unwrap_or(target);
                    settings.project_dir.join(relative).to_string_lossy().into_owned()
                } else {
                    target.clone()
                };
                (key.clone(), target)
            })
            .collect();

        Self {
            mode: settings.mode,
            context: settings.project_dir.clone(),
            entry: config.entry.clone(),
            output: OutputOptions {
                path: settings.assets_root(),
                filename: "[name].js".into(),
                public_path: settings.public_path().to_string(),
            },
            resolve: ResolveOptions {
                extensions: config.resolve.extensions.clone(),
                alias,
            },
            module: ModuleOptions {
                rules: pipeline.rules().to_vec(),
            },
            node: NodeShims::default(),
            stats: StatsOptions::default(),
        }
    }
}
