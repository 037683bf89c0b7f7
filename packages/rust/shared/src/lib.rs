//! Shared types, error model, and configuration for buildgate.
//!
//! This crate is the foundation depended on by all other buildgate crates.
//! It provides:
//! - [`BuildGateError`]: the unified error type
//! - Domain types ([`BuildMode`], [`BuildResult`], [`Violation`], [`PackageManifest`])
//! - Configuration ([`AppConfig`], [`BuildSettings`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, AssetsSection, BuildSection, BuildSettings, CONFIG_FILE_NAME, DevSection,
    EngineSection, PACKAGE_FILE_NAME, ResolveSection, config_file_path, init_config, load_config,
    load_config_from, load_package_manifest,
};
pub use error::{BuildGateError, Result};
pub use types::{BuildMode, BuildResult, Engines, PackageManifest, Violation};
