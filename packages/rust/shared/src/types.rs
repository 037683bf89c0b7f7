//! Core domain types shared across buildgate crates.

use serde::{Deserialize, Serialize};

use crate::error::{BuildGateError, Result};

// ---------------------------------------------------------------------------
// BuildMode
// ---------------------------------------------------------------------------

/// Which flavor of asset pipeline settings to build with.
///
/// Parsed from `NODE_ENV`-style values and exported back to the bundling
/// engine under the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    Development,
    Production,
}

impl BuildMode {
    /// The `NODE_ENV` value for this mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }
}

impl std::fmt::Display for BuildMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BuildMode {
    type Err = BuildGateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Self::Production),
            "development" | "dev" => Ok(Self::Development),
            other => Err(BuildGateError::config(format!(
                "unknown build mode '{other}': expected 'production' or 'development'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Version gate
// ---------------------------------------------------------------------------

/// A single unmet toolchain requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Tool name, e.g. `node`.
    pub tool: String,
    /// Installed version, or `not found`.
    pub current: String,
    /// Declared range from package metadata.
    pub required: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} should be {}", self.tool, self.current, self.required)
    }
}

// ---------------------------------------------------------------------------
// BuildResult
// ---------------------------------------------------------------------------

/// What the bundling engine reports once a compile run finishes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildResult {
    pub has_errors: bool,
    pub has_warnings: bool,
    /// Human-readable stats text, printed verbatim.
    pub summary: String,
}

// ---------------------------------------------------------------------------
// Package metadata
// ---------------------------------------------------------------------------

/// The subset of `package.json` buildgate cares about.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageManifest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub engines: Engines,
}

/// Declared toolchain ranges (`"engines"` in `package.json`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Engines {
    /// Primary runtime range. Always enforced when declared.
    #[serde(default)]
    pub node: Option<String>,
    /// Package manager range. Enforced only when the tool is installed.
    #[serde(default)]
    pub npm: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_mode_parses_node_env_values() {
        assert_eq!("production".parse::<BuildMode>().unwrap(), BuildMode::Production);
        assert_eq!(" Development ".parse::<BuildMode>().unwrap(), BuildMode::Development);
        assert!("staging".parse::<BuildMode>().is_err());
        assert_eq!(BuildMode::Production.to_string(), "production");
    }

    #[test]
    fn violation_display() {
        let v = Violation {
            tool: "node".into(),
            current: "6.0.0".into(),
            required: "^8.0.0".into(),
        };
        assert_eq!(v.to_string(), "node: 6.0.0 should be ^8.0.0");
    }

    #[test]
    fn package_manifest_reads_engines() {
        let json = r#"{
            "name": "demo-app",
            "version": "1.0.0",
            "engines": { "node": ">= 6.0.0", "npm": ">= 3.0.0" },
            "scripts": { "build": "node build/build.js" }
        }"#;
        let manifest: PackageManifest = serde_json::from_str(json).expect("parse");
        assert_eq!(manifest.name.as_deref(), Some("demo-app"));
        assert_eq!(manifest.engines.node.as_deref(), Some(">= 6.0.0"));
        assert_eq!(manifest.engines.npm.as_deref(), Some(">= 3.0.0"));
    }

    #[test]
    fn package_manifest_without_engines() {
        let manifest: PackageManifest = serde_json::from_str(r#"{"name":"x"}"#).expect("parse");
        assert!(manifest.engines.node.is_none());
        assert!(manifest.engines.npm.is_none());
    }
}
