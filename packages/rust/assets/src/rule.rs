//! Transform rules: one file pattern mapped to one named handler.

use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use buildgate_shared::{BuildGateError, Result};

/// Handler that inlines small files and emits hashed copies of large ones.
pub const URL_HANDLER: &str = "url-loader";

/// What kind of source a rule is responsible for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleCategory {
    Lint,
    Script,
    Component,
    Image,
    Media,
    Font,
}

impl RuleCategory {
    /// Output directory for emitted files of this category, if any.
    pub fn output_dir(&self) -> Option<&'static str> {
        match self {
            Self::Image => Some("img"),
            Self::Media => Some("media"),
            Self::Font => Some("fonts"),
            Self::Lint | Self::Script | Self::Component => None,
        }
    }
}

/// Stage a rule runs in. Normal rules carry no marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Enforce {
    Pre,
}

/// A single entry of the ordered dispatch table.
///
/// Serializes to the shape the bundling engine expects:
/// `{ "test": "<regex>", "loader": "<handler>", "enforce"?, "include"?, "options"? }`.
#[derive(Debug, Clone, Serialize)]
pub struct TransformRule {
    #[serde(rename = "test", serialize_with = "serialize_regex")]
    pub pattern: Regex,
    #[serde(rename = "loader")]
    pub handler: String,
    #[serde(skip)]
    pub category: RuleCategory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enforce: Option<Enforce>,
    /// Directories the resource must live under. Empty means anywhere.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<PathBuf>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub options: Map<String, Value>,
}

fn serialize_regex<S: Serializer>(re: &Regex, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(re.as_str())
}

impl TransformRule {
    /// Create a rule from a regex source and a handler name.
    pub fn new(category: RuleCategory, pattern: &str, handler: impl Into<String>) -> Result<Self> {
        let pattern = Regex::new(pattern)
            .map_err(|e| BuildGateError::config(format!("invalid rule pattern '{pattern}': {e}")))?;

        Ok(Self {
            pattern,
            handler: handler.into(),
            category,
            enforce: None,
            include: Vec::new(),
            options: Map::new(),
        })
    }

    /// Run this rule in the `pre` stage, ahead of every normal rule.
    pub fn enforce_pre(mut self) -> Self {
        self.enforce = Some(Enforce::Pre);
        self
    }

    /// Restrict the rule to resources under `dirs`.
    pub fn include<I, P>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.include.extend(dirs.into_iter().map(Into::into));
        self
    }

    /// Set a handler option.
    pub fn option(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.options.insert(key.to_string(), value.into());
        self
    }

    pub fn is_pre(&self) -> bool {
        self.enforce == Some(Enforce::Pre)
    }

    /// Whether this rule applies to `resource` (a path without query string).
    pub fn matches(&self, resource: &str) -> bool {
        if !self.pattern.is_match(resource) {
            return false;
        }
        self.include.is_empty()
            || self
                .include
                .iter()
                .any(|dir| Path::new(resource).starts_with(dir))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn include_restricts_matches() {
        let rule = TransformRule::new(RuleCategory::Script, r"\.js$", "babel-loader")
            .unwrap()
            .include(["/app/src"]);

        assert!(rule.matches("/app/src/main.js"));
        assert!(!rule.matches("/app/node_modules/lib/index.js"));
        // Prefix must be a whole path component.
        assert!(!rule.matches("/app/srcfoo/main.js"));
    }

    #[test]
    fn invalid_pattern_is_config_error() {
        let err = TransformRule::new(RuleCategory::Image, r"\.(png", URL_HANDLER).unwrap_err();
        assert!(matches!(err, BuildGateError::Config { .. }));
    }

    #[test]
    fn serializes_engine_shape() {
        let rule = TransformRule::new(RuleCategory::Lint, r"\.(js|vue)$", "eslint-loader")
            .unwrap()
            .enforce_pre()
            .option("emitWarning", true);

        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(json["test"], r"\.(js|vue)$");
        assert_eq!(json["loader"], "eslint-loader");
        assert_eq!(json["enforce"], "pre");
        assert_eq!(json["options"]["emitWarning"], true);
        assert!(json.get("include").is_none());
        assert!(json.get("category").is_none());
    }
}
