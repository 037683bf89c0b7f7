//! Inline-or-emit policy for static assets routed to [`URL_HANDLER`].
//!
//! Files below the rule's `limit` become `data:` URIs; everything else is
//! written under a content-hashed name so unchanged assets stay cacheable.

use std::path::Path;

use base64::Engine;
use regex::{Captures, Regex};
use sha2::{Digest, Sha256};

use buildgate_shared::{BuildGateError, Result};

use crate::rule::{TransformRule, URL_HANDLER};

/// Hex digits in a full SHA-256 digest.
const FULL_HASH_LEN: usize = 64;

/// Where an asset ends up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetOutput {
    /// Embedded directly into the referencing module.
    Inline { data_uri: String },
    /// Emitted as a standalone file at this path, relative to the output root.
    File { path: String },
}

/// Options of a [`URL_HANDLER`] rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlAsset {
    pub limit: u64,
    /// Name template, e.g. `static/img/[name].[hash:7].[ext]`.
    pub name: String,
}

impl UrlAsset {
    /// Read the policy from a rule. Returns `None` for rules handled elsewhere.
    pub fn from_rule(rule: &TransformRule) -> Option<Self> {
        if rule.handler != URL_HANDLER {
            return None;
        }
        Some(Self {
            // No limit means every file is inlined.
            limit: rule
                .options
                .get("limit")
                .and_then(|v| v.as_u64())
                .unwrap_or(u64::MAX),
            name: rule
                .options
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or("[hash].[ext]")
                .to_string(),
        })
    }

    /// Decide how `resource` with the given contents is delivered.
    pub fn emit(&self, resource: &str, contents: &[u8]) -> Result<AssetOutput> {
        if (contents.len() as u64) < self.limit {
            return Ok(AssetOutput::Inline {
                data_uri: data_uri(resource, contents),
            });
        }
        Ok(AssetOutput::File {
            path: render_name(&self.name, resource, contents)?,
        })
    }
}

/// Lowercase hex SHA-256 of `contents`.
pub fn content_hash(contents: &[u8]) -> String {
    format!("{:x}", Sha256::digest(contents))
}

/// Expand `[name]`, `[ext]`, `[hash]` and `[hash:N]` in a name template.
pub fn render_name(template: &str, resource: &str, contents: &[u8]) -> Result<String> {
    let path = Path::new(resource);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("");
    let hash = content_hash(contents);

    let re = Regex::new(r"\[hash(?::(\d+))?\]")
        .map_err(|e| BuildGateError::validation(e.to_string()))?;

    let mut bad_len = None;
    let hashed = re.replace_all(template, |caps: &Captures| {
        let len = caps
            .get(1)
            .map(|m| m.as_str().parse::<usize>().unwrap_or(0))
            .unwrap_or(FULL_HASH_LEN);
        if len == 0 || len > FULL_HASH_LEN {
            bad_len = Some(caps[0].to_string());
            return String::new();
        }
        hash[..len].to_string()
    });

    if let Some(token) = bad_len {
        return Err(BuildGateError::validation(format!(
            "invalid hash length in name template '{template}': {token}"
        )));
    }

    Ok(hashed.replace("[name]", stem).replace("[ext]", ext))
}

/// Build a base64 `data:` URI for `contents`.
pub fn data_uri(resource: &str, contents: &[u8]) -> String {
    let ext = Path::new(resource)
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("");
    format!(
        "data:{};base64,{}",
        mime_for(ext),
        base64::engine::general_purpose::STANDARD.encode(contents)
    )
}

fn mime_for(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "ogg" => "audio/ogg",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "flac" => "audio/flac",
        "aac" => "audio/aac",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "eot" => "application/vnd.ms-fontobject",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        _ => "application/octet-stream",
    }
}
