//! Toolchain version gate.
//!
//! Installed tool versions are compared against the npm-style ranges declared
//! under `"engines"` in `package.json`. Every mismatch is collected before the
//! gate fails so the user sees all of them at once.

use std::io::ErrorKind;
use std::process::Command;

use semver::{Version, VersionReq};
use tracing::{debug, info, instrument, warn};

use buildgate_shared::{BuildGateError, Engines, Result, Violation};

/// The primary runtime. Always checked.
pub const RUNTIME_TOOL: &str = "node";

/// The package manager. Checked only when installed.
pub const PACKAGE_MANAGER_TOOL: &str = "npm";

// ---------------------------------------------------------------------------
// Ranges
// ---------------------------------------------------------------------------

/// An npm-style version range, e.g. `^8.0.0`, `>= 6.0.0 < 9` or `6.x || 8.x`.
#[derive(Debug, Clone)]
pub struct VersionRange {
    raw: String,
    alternatives: Vec<VersionReq>,
}

impl VersionRange {
    pub fn parse(raw: &str) -> Result<Self> {
        let alternatives = raw
            .split("||")
            .map(|set| {
                let translated = translate_comparator_set(set.trim());
                VersionReq::parse(&translated)
                    .map_err(|e| BuildGateError::version(raw, e.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            raw: raw.trim().to_string(),
            alternatives,
        })
    }

    /// Whether `version` satisfies any of the alternatives.
    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|req| req.matches(version))
    }

}

impl std::fmt::Display for VersionRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

impl std::str::FromStr for VersionRange {
    type Err = BuildGateError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Rewrite one npm comparator set (no `||`) into `semver` crate syntax.
///
/// npm separates comparators with spaces and treats a bare full version as an
/// exact match; the `semver` crate wants commas and reads bare versions as
/// caret ranges.
fn translate_comparator_set(set: &str) -> String {
    if set.is_empty() || set == "*" || set.eq_ignore_ascii_case("x") {
        return "*".into();
    }

    if let Some((low, high)) = set.split_once(" - ") {
        return format!(
            ">={}, <={}",
            strip_v(low.trim()),
            strip_v(high.trim())
        );
    }

    let mut comparators = Vec::new();
    let mut pending_op = String::new();

    for token in set.split_whitespace() {
        if token.chars().all(is_op_char) {
            pending_op.push_str(token);
            continue;
        }

        let op_len = token.find(|c: char| !is_op_char(c)).unwrap_or(token.len());
        let (op, version) = token.split_at(op_len);
        let op = format!("{pending_op}{op}");
        pending_op.clear();

        let version = strip_v(version);
        // Bare versions are exact (`1.2.3`) or X-ranges (`1.2` means `1.2.x`).
        if op.is_empty() && (is_full_version(version) || is_partial_version(version)) {
            comparators.push(format!("={version}"));
        } else {
            comparators.push(format!("{op}{version}"));
        }
    }

    comparators.join(", ")
}

fn is_op_char(c: char) -> bool {
    matches!(c, '<' | '>' | '=' | '~' | '^')
}

fn strip_v(s: &str) -> &str {
    s.strip_prefix('v').unwrap_or(s)
}

/// `1` or `1.2`: fewer than three numeric components and no wildcard.
fn is_partial_version(s: &str) -> bool {
    let parts: Vec<_> = s.split('.').collect();
    parts.len() < 3 && parts.iter().all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}

fn is_full_version(s: &str) -> bool {
    let core = s.split(['-', '+']).next().unwrap_or(s);
    let parts: Vec<_> = core.split('.').collect();
    parts.len() == 3 && parts.iter().all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}

/// Parse tool output such as `v8.8.0\n` into a version.
pub fn clean_version(raw: &str) -> Result<Version> {
    let trimmed = raw.trim();
    let first = trimmed.lines().next().unwrap_or("").trim();
    let bare = first.trim_start_matches(['=', 'v', 'V']).trim();
    Version::parse(bare).map_err(|e| BuildGateError::version(trimmed, e.to_string()))
}

// ---------------------------------------------------------------------------
// Requirements
// ---------------------------------------------------------------------------

/// One tool's installed version paired with its declared range.
#[derive(Debug, Clone)]
pub struct VersionRequirement {
    pub tool: String,
    /// `None` when the tool is not on the search path.
    pub current: Option<Version>,
    pub required: VersionRange,
}

impl VersionRequirement {
    /// The violation this requirement represents, if it is unmet.
    pub fn violation(&self) -> Option<Violation> {
        let current = match &self.current {
            Some(v) if self.required.matches(v) => return None,
            Some(v) => v.to_string(),
            None => "not found".to_string(),
        };
        Some(Violation {
            tool: self.tool.clone(),
            current,
            required: self.required.to_string(),
        })
    }
}

/// Source of installed tool versions.
pub trait ToolProbe {
    /// Raw version output of `tool`, or `None` if it is not installed.
    fn version(&self, tool: &str) -> Result<Option<String>>;
}

/// Probes the host by running `<tool> --version`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProbe;

impl ToolProbe for SystemProbe {
    fn version(&self, tool: &str) -> Result<Option<String>> {
        let output = match Command::new(tool).arg("--version").output() {
            Ok(output) => output,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(tool, "not found on search path");
                return Ok(None);
            }
            Err(e) => return Err(BuildGateError::io(tool, e)),
        };

        if !output.status.success() {
            warn!(tool, status = ?output.status, "version probe failed");
            return Ok(None);
        }

        Ok(Some(String::from_utf8_lossy(&output.stdout).trim().to_string()))
    }
}

/// Build the requirement list from declared engines and the probe.
///
/// The runtime is always included when a range is declared; the package
/// manager is skipped entirely when it is not installed.
pub fn collect_requirements(
    engines: &Engines,
    probe: &dyn ToolProbe,
) -> Result<Vec<VersionRequirement>> {
    let mut requirements = Vec::with_capacity(2);

    match engines.node.as_deref() {
        Some(range) => {
            let current = probe
                .version(RUNTIME_TOOL)?
                .map(|raw| clean_version(&raw))
                .transpose()?;
            requirements.push(VersionRequirement {
                tool: RUNTIME_TOOL.into(),
                current,
                required: VersionRange::parse(range)?,
            });
        }
        None => debug!(tool = RUNTIME_TOOL, "no engines range declared, skipping"),
    }

    if let Some(range) = engines.npm.as_deref() {
        match probe.version(PACKAGE_MANAGER_TOOL)? {
            Some(raw) => requirements.push(VersionRequirement {
                tool: PACKAGE_MANAGER_TOOL.into(),
                current: Some(clean_version(&raw)?),
                required: VersionRange::parse(range)?,
            }),
            None => debug!(tool = PACKAGE_MANAGER_TOOL, "not installed, skipping"),
        }
    } else {
        debug!(tool = PACKAGE_MANAGER_TOOL, "no engines range declared, skipping");
    }

    Ok(requirements)
}

/// Fail with every unmet requirement, or return silently.
#[instrument(skip_all, fields(requirements = requirements.len()))]
pub fn check(requirements: &[VersionRequirement]) -> Result<()> {
    let violations: Vec<Violation> = requirements
        .iter()
        .filter_map(VersionRequirement::violation)
        .collect();

    if violations.is_empty() {
        info!("toolchain versions satisfied");
        return Ok(());
    }

    for v in &violations {
        debug!(tool = %v.tool, current = %v.current, required = %v.required, "version mismatch");
    }
    Err(BuildGateError::Precondition { violations })
}

/// Collect requirements with `probe` and check them.
pub fn verify(engines: &Engines, probe: &dyn ToolProbe) -> Result<()> {
    check(&collect_requirements(engines, probe)?)
}
