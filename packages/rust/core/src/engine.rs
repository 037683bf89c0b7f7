//! Bundling engine seam and the subprocess-backed implementation.
//!
//! Protocol: the engine command is started in the project directory with
//! `NODE_ENV` set to the build mode. It receives one JSON [`BuildRequest`] on
//! stdin and prints one JSON report on stdout:
//!
//! ```json
//! { "errors": ["..."], "warnings": ["..."], "summary": "..." }
//! ```

use std::future::Future;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Stdio;

use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use buildgate_shared::{BuildGateError, BuildResult, BuildSettings, Result};

use crate::request::BuildRequest;

/// Something that can turn a [`BuildRequest`] into a [`BuildResult`].
///
/// Called exactly once per build; implementations must not retry.
pub trait BundlingEngine {
    fn compile(&self, request: &BuildRequest) -> impl Future<Output = Result<BuildResult>> + Send;
}

/// Report printed by the engine subprocess.
#[derive(Debug, Default, Deserialize)]
struct EngineReport {
    #[serde(default)]
    errors: Vec<String>,
    #[serde(default)]
    warnings: Vec<String>,
    #[serde(default)]
    summary: String,
}

impl From<EngineReport> for BuildResult {
    fn from(report: EngineReport) -> Self {
        let summary = if report.summary.is_empty() {
            report
                .errors
                .iter()
                .chain(report.warnings.iter())
                .cloned()
                .collect::<Vec<_>>()
                .join("\n")
        } else {
            report.summary
        };

        Self {
            has_errors: !report.errors.is_empty(),
            has_warnings: !report.warnings.is_empty(),
            summary,
        }
    }
}

/// Runs the bundler as a child process.
#[derive(Debug, Clone)]
pub struct ProcessEngine {
    command: String,
    args: Vec<String>,
    working_dir: PathBuf,
}

impl ProcessEngine {
    pub fn new(command: impl Into<String>, args: Vec<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            args,
            working_dir: working_dir.into(),
        }
    }

    /// Engine configured by the `[engine]` section, run in the project dir.
    pub fn from_settings(settings: &BuildSettings) -> Self {
        Self::new(
            settings.config.engine.command.clone(),
            settings.config.engine.args.clone(),
            settings.project_dir.clone(),
        )
    }
}

impl BundlingEngine for ProcessEngine {
    #[instrument(skip_all, fields(cmd = %self.command, mode = %request.mode))]
    async fn compile(&self, request: &BuildRequest) -> Result<BuildResult> {
        let payload = serde_json::to_vec(request)
            .map_err(|e| BuildGateError::Engine(format!("failed to serialize request: {e}")))?;

        info!(rules = request.module.rules.len(), "starting bundling engine");

        let mut child = Command::new(&self.command)
            .args(&self.args)
            .current_dir(&self.working_dir)
            .env("NODE_ENV", request.mode.as_str())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                BuildGateError::Engine(format!(
                    "failed to spawn engine: {e}. Is `{}` installed?",
                    self.command
                ))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| BuildGateError::Engine("failed to capture engine stdin".into()))?;

        let write = async move {
            let written = match stdin.write_all(&payload).await {
                Ok(()) => stdin.shutdown().await,
                Err(e) => Err(e),
            };
            match written {
                // The engine may exit without reading its input.
                Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                    warn!("engine closed stdin early");
                    Ok(())
                }
                other => other,
            }
        };

        let ((), output) = tokio::try_join!(write, child.wait_with_output())
            .map_err(|e| BuildGateError::Engine(format!("engine I/O failed: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!(status = ?output.status, bytes = output.stdout.len(), "engine exited");

        match serde_json::from_str::<EngineReport>(stdout.trim()) {
            Ok(report) => Ok(report.into()),
            Err(_) if !output.status.success() => Err(BuildGateError::Engine(format!(
                "engine exited with {} and no report",
                output.status
            ))),
            Err(e) => Err(BuildGateError::Engine(format!(
                "unreadable engine report: {e} (got: {})",
                stdout.chars().take(200).collect::<String>()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_flags() {
        let result: BuildResult = EngineReport {
            errors: vec![],
            warnings: vec!["asset size limit".into()],
            summary: "Hash: abc\nTime: 1200ms".into(),
        }
        .into();
        assert!(!result.has_errors);
        assert!(result.has_warnings);
        assert_eq!(result.summary, "Hash: abc\nTime: 1200ms");
    }

    #[test]
    fn empty_summary_falls_back_to_messages() {
        let result: BuildResult = EngineReport {
            errors: vec!["Module not found: ./missing".into()],
            warnings: vec!["unused export".into()],
            summary: String::new(),
        }
        .into();
        assert!(result.has_errors);
        assert_eq!(result.summary, "Module not found: ./missing\nunused export");
    }

    #[cfg(unix)]
    mod process {
        use buildgate_assets::{AssetPipelineConfig, PipelineOptions};
        use buildgate_shared::{AppConfig, BuildMode};

        use super::*;

        fn request(dir: &std::path::Path) -> BuildRequest {
            let settings = BuildSettings::new(dir, BuildMode::Production, AppConfig::default());
            let pipeline =
                AssetPipelineConfig::from_options(&PipelineOptions::from(&settings)).unwrap();
            BuildRequest::new(&settings, &pipeline)
        }

        fn shell(script: &str, dir: &std::path::Path) -> ProcessEngine {
            ProcessEngine::new("sh", vec!["-c".into(), script.into()], dir)
        }

        #[tokio::test]
        async fn passes_mode_and_reads_report() {
            let dir = tempfile::tempdir().unwrap();
            let engine = shell(
                r#"cat > request.json; printf '{"warnings":["w"],"summary":"%s"}' "$NODE_ENV""#,
                dir.path(),
            );

            let result = engine.compile(&request(dir.path())).await.unwrap();
            assert_eq!(result.summary, "production");
            assert!(result.has_warnings);
            assert!(!result.has_errors);

            let sent = std::fs::read_to_string(dir.path().join("request.json")).unwrap();
            let sent: serde_json::Value = serde_json::from_str(&sent).unwrap();
            assert_eq!(sent["output"]["filename"], "[name].js");
        }

        #[tokio::test]
        async fn error_report_with_failing_exit_is_still_a_result() {
            let dir = tempfile::tempdir().unwrap();
            let engine = shell(
                r#"cat > /dev/null; echo '{"errors":["boom"],"summary":"failed"}'; exit 2"#,
                dir.path(),
            );
            let result = engine.compile(&request(dir.path())).await.unwrap();
            assert!(result.has_errors);
        }

        #[tokio::test]
        async fn crash_without_report_is_engine_error() {
            let dir = tempfile::tempdir().unwrap();
            let engine = shell("cat > /dev/null; exit 3", dir.path());
            let err = engine.compile(&request(dir.path())).await.unwrap_err();
            assert!(matches!(err, BuildGateError::Engine(_)));
        }

        #[tokio::test]
        async fn garbage_output_is_engine_error() {
            let dir = tempfile::tempdir().unwrap();
            let engine = shell("cat > /dev/null; echo 'webpack: done'", dir.path());
            let err = engine.compile(&request(dir.path())).await.unwrap_err();
            assert!(err.to_string().contains("unreadable engine report"));
        }

        #[tokio::test]
        async fn missing_command_is_engine_error() {
            let dir = tempfile::tempdir().unwrap();
            let engine = ProcessEngine::new("buildgate-no-such-engine", vec![], dir.path());
            let err = engine.compile(&request(dir.path())).await.unwrap_err();
            assert!(err.to_string().contains("failed to spawn engine"));
        }
    }
}
