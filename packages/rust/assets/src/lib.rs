//! Asset pipeline configuration for buildgate.
//!
//! An ordered table of [`TransformRule`]s decides which handler each source
//! file goes through before the bundler sees it. The table is assembled
//! once from [`PipelineOptions`] and never mutated afterwards; handing it to
//! the bundling engine is the orchestrator's job.

pub mod emit;
pub mod pipeline;
pub mod rule;

pub use emit::{AssetOutput, UrlAsset, content_hash, data_uri, render_name};
pub use pipeline::{AssetPipelineConfig, PipelineOptions, Resolution, assets_path, split_query};
pub use rule::{Enforce, RuleCategory, TransformRule, URL_HANDLER};
