//! The ordered rule table and file-to-rule resolution.

use std::path::PathBuf;

use serde_json::json;
use tracing::{debug, trace};

use buildgate_shared::{BuildGateError, BuildSettings, Result};

use crate::rule::{RuleCategory, TransformRule, URL_HANDLER};

/// Settings that shape the default rule table.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Project root; `include` directories are resolved against it.
    pub project_dir: PathBuf,
    /// Prefix for emitted asset names (`static` -> `static/img/...`).
    pub assets_sub_directory: String,
    /// Inline threshold in bytes.
    pub inline_limit: u64,
    /// Append the lint rule in front of the table.
    pub use_eslint: bool,
    /// Lint problems become build errors instead of warnings.
    pub lint_errors: bool,
    pub css_source_map: bool,
    pub cache_busting: bool,
}

impl From<&BuildSettings> for PipelineOptions {
    fn from(settings: &BuildSettings) -> Self {
        Self {
            project_dir: settings.project_dir.clone(),
            assets_sub_directory: settings.assets_sub_directory().to_string(),
            inline_limit: settings.config.assets.inline_limit,
            use_eslint: settings.config.dev.use_eslint,
            lint_errors: settings.config.dev.show_eslint_errors_in_overlay,
            css_source_map: settings.css_source_map(),
            cache_busting: true,
        }
    }
}

/// The result of resolving one request against the table.
#[derive(Debug, Clone)]
pub struct Resolution<'a> {
    /// The request as given, query string included.
    pub request: &'a str,
    /// The request without its query string; this is what was matched.
    pub resource: &'a str,
    /// The query string without the leading `?`.
    pub query: Option<&'a str>,
    /// `pre` stage rules that also apply, in declaration order.
    pub pre: Vec<&'a TransformRule>,
    /// The first normal rule that matched.
    pub rule: &'a TransformRule,
}

/// Ordered dispatch table from file pattern to transform rule.
///
/// Read-only once built; the first matching rule wins.
#[derive(Debug, Clone)]
pub struct AssetPipelineConfig {
    rules: Vec<TransformRule>,
}

impl AssetPipelineConfig {
    /// Wrap an explicit, already ordered rule list.
    pub fn with_rules(rules: Vec<TransformRule>) -> Self {
        Self { rules }
    }

    /// Assemble the standard table: optional lint rule, then component,
    /// script, image, media and font rules.
    pub fn from_options(opts: &PipelineOptions) -> Result<Self> {
        let mut rules = Vec::with_capacity(6);

        if opts.use_eslint {
            rules.push(lint_rule(opts)?);
        }

        rules.push(
            TransformRule::new(RuleCategory::Component, r"\.vue$", "vue-loader")?
                .option("cssSourceMap", opts.css_source_map)
                .option("cacheBusting", opts.cache_busting)
                .option(
                    "transformToRequire",
                    json!({
                        "video": ["src", "poster"],
                        "source": "src",
                        "img": "src",
                        "image": "xlink:href",
                    }),
                ),
        );

        rules.push(
            TransformRule::new(RuleCategory::Script, r"\.js$", "babel-loader")?.include([
                opts.project_dir.join("src"),
                opts.project_dir.join("test"),
                opts.project_dir.join("node_modules/webpack-dev-server/client"),
            ]),
        );

        rules.push(url_rule(
            opts,
            RuleCategory::Image,
            r"\.(png|jpe?g|gif|svg)$",
        )?);
        rules.push(url_rule(
            opts,
            RuleCategory::Media,
            r"\.(mp4|webm|ogg|mp3|wav|flac|aac)$",
        )?);
        rules.push(url_rule(opts, RuleCategory::Font, r"\.(woff2?|eot|ttf|otf)$")?);

        debug!(rules = rules.len(), lint = opts.use_eslint, "asset pipeline assembled");
        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[TransformRule] {
        &self.rules
    }

    /// Find the rule that handles `request`. Pure; performs no I/O.
    pub fn resolve<'a>(&'a self, request: &'a str) -> Option<Resolution<'a>> {
        let (resource, query) = split_query(request);

        let rule = self
            .rules
            .iter()
            .filter(|r| !r.is_pre())
            .find(|r| r.matches(resource))?;

        let pre = self
            .rules
            .iter()
            .filter(|r| r.is_pre() && r.matches(resource))
            .collect();

        trace!(request, handler = %rule.handler, "resolved");
        Some(Resolution {
            request,
            resource,
            query,
            pre,
            rule,
        })
    }

    /// Like [`resolve`](Self::resolve), but an unmatched request is an
    /// [`BuildGateError::UnsupportedAsset`] error.
    pub fn require<'a>(&'a self, request: &'a str) -> Result<Resolution<'a>> {
        self.resolve(request)
            .ok_or_else(|| BuildGateError::UnsupportedAsset {
                path: request.to_string(),
            })
    }
}

/// Split `path?query` into its path and query parts.
pub fn split_query(request: &str) -> (&str, Option<&str>) {
    match request.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (request, None),
    }
}

/// Prefix an asset name template with the mode's asset sub-directory.
pub fn assets_path(sub_directory: &str, template: &str) -> String {
    let sub = sub_directory.trim_matches('/');
    if sub.is_empty() {
        template.to_string()
    } else {
        format!("{sub}/{template}")
    }
}

fn lint_rule(opts: &PipelineOptions) -> Result<TransformRule> {
    Ok(
        TransformRule::new(RuleCategory::Lint, r"\.(js|vue)$", "eslint-loader")?
            .enforce_pre()
            .include([opts.project_dir.join("src"), opts.project_dir.join("test")])
            .option("formatter", "eslint-friendly-formatter")
            .option("emitWarning", !opts.lint_errors),
    )
}

fn url_rule(opts: &PipelineOptions, category: RuleCategory, pattern: &str) -> Result<TransformRule> {
    let dir = category.output_dir().ok_or_else(|| {
        BuildGateError::validation(format!("{category:?} assets have no output directory"))
    })?;
    let name = assets_path(
        &opts.assets_sub_directory,
        &format!("{dir}/[name].[hash:7].[ext]"),
    );

    Ok(TransformRule::new(category, pattern, URL_HANDLER)?
        .option("limit", opts.inline_limit)
        .option("name", name))
}
