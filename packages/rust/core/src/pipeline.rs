//! End-to-end `build` pipeline: validate → clean → compile → report.
//!
//! [`BuildOrchestrator`] owns the state of one run. Every stage either
//! advances the state machine or sends it straight to [`BuildState::Failed`];
//! later stages never run after a failure.

use std::time::{Duration, Instant};

use tracing::{debug, error, info, instrument};

use buildgate_assets::{AssetPipelineConfig, PipelineOptions};
use buildgate_shared::{BuildGateError, BuildResult, BuildSettings, Engines, Result, Violation};

use crate::clean::OutputCleaner;
use crate::engine::BundlingEngine;
use crate::gate::{self, ToolProbe};
use crate::request::BuildRequest;

/// Exit code of a successful run.
pub const EXIT_SUCCESS: i32 = 0;

/// Exit code of any failed run.
pub const EXIT_FAILURE: i32 = 1;

// ---------------------------------------------------------------------------
// States
// ---------------------------------------------------------------------------

/// Where a build run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildState {
    Idle,
    Validating,
    Cleaning,
    Compiling,
    Reporting,
    Succeeded,
    Failed,
}

impl BuildState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_advance_to(&self, next: BuildState) -> bool {
        use BuildState::*;
        match (self, next) {
            (Idle, Validating)
            | (Validating, Cleaning)
            | (Cleaning, Compiling)
            | (Compiling, Reporting)
            | (Reporting, Succeeded) => true,
            (from, Failed) => !from.is_terminal() && *from != Idle,
            _ => false,
        }
    }

    /// Short label used in progress output and failure messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Validating => "checking versions",
            Self::Cleaning => "cleaning output",
            Self::Compiling => "compiling",
            Self::Reporting => "reporting",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for BuildState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Final report of one build run.
#[derive(Debug)]
pub struct BuildOutcome {
    /// Terminal state (`Succeeded` or `Failed`).
    pub state: BuildState,
    pub exit_code: i32,
    /// The stage that was active when the run failed.
    pub failed_stage: Option<BuildState>,
    pub error: Option<BuildGateError>,
    /// Engine result, when compilation finished.
    pub result: Option<BuildResult>,
    /// Every state visited, in order, starting at `Idle`.
    pub history: Vec<BuildState>,
    pub elapsed: Duration,
}

impl BuildOutcome {
    pub fn succeeded(&self) -> bool {
        self.state == BuildState::Succeeded
    }

    pub fn visited(&self, state: BuildState) -> bool {
        self.history.contains(&state)
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress callback for reporting build status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new stage.
    fn phase(&self, state: BuildState);
    /// Called with every unmet toolchain requirement.
    fn violations(&self, violations: &[Violation]);
    /// Called with the engine's summary text before the verdict.
    fn summary(&self, text: &str);
    /// Called once the run reaches a terminal state.
    fn done(&self, outcome: &BuildOutcome);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _state: BuildState) {}
    fn violations(&self, _violations: &[Violation]) {}
    fn summary(&self, _text: &str) {}
    fn done(&self, _outcome: &BuildOutcome) {}
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Runs one build: gate, clean, compile, report.
pub struct BuildOrchestrator<'a, P, E> {
    settings: &'a BuildSettings,
    engines: &'a Engines,
    probe: P,
    engine: E,
    state: BuildState,
    history: Vec<BuildState>,
}

impl<'a, P, E> BuildOrchestrator<'a, P, E>
where
    P: ToolProbe,
    E: BundlingEngine,
{
    pub fn new(settings: &'a BuildSettings, engines: &'a Engines, probe: P, engine: E) -> Self {
        Self {
            settings,
            engines,
            probe,
            engine,
            state: BuildState::Idle,
            history: vec![BuildState::Idle],
        }
    }

    /// Drive the run to a terminal state. Consumes the orchestrator: one
    /// build per instance.
    #[instrument(skip_all, fields(mode = %self.settings.mode, project = %self.settings.project_dir.display()))]
    pub async fn run(mut self, progress: &dyn ProgressReporter) -> BuildOutcome {
        let start = Instant::now();
        info!("starting build");

        // --- Validating ---
        self.advance(BuildState::Validating, progress);
        if let Err(e) = gate::verify(self.engines, &self.probe) {
            if let BuildGateError::Precondition { violations } = &e {
                progress.violations(violations);
            }
            return self.fail(e, None, start, progress);
        }

        // --- Cleaning ---
        self.advance(BuildState::Cleaning, progress);
        let cleaner = OutputCleaner::new(self.settings.assets_root());
        if let Err(e) = cleaner.clear(&self.settings.clean_target()) {
            return self.fail(e, None, start, progress);
        }

        // --- Compiling ---
        self.advance(BuildState::Compiling, progress);
        let result = match self.compile().await {
            Ok(result) => result,
            Err(e) => return self.fail(e, None, start, progress),
        };

        // --- Reporting ---
        self.advance(BuildState::Reporting, progress);
        progress.summary(&result.summary);

        if result.has_errors {
            let e = BuildGateError::Compilation {
                summary: result.summary.clone(),
            };
            return self.fail(e, Some(result), start, progress);
        }

        self.advance(BuildState::Succeeded, progress);
        let outcome = BuildOutcome {
            state: self.state,
            exit_code: EXIT_SUCCESS,
            failed_stage: None,
            error: None,
            result: Some(result),
            history: self.history,
            elapsed: start.elapsed(),
        };

        info!(
            warnings = outcome.result.as_ref().is_some_and(|r| r.has_warnings),
            elapsed_ms = outcome.elapsed.as_millis(),
            "build complete"
        );
        progress.done(&outcome);
        outcome
    }

    /// Build the request and hand it to the engine exactly once.
    async fn compile(&self) -> Result<BuildResult> {
        let pipeline = AssetPipelineConfig::from_options(&PipelineOptions::from(self.settings))?;
        let request = BuildRequest::new(self.settings, &pipeline);
        debug!(
            entries = request.entry.len(),
            public_path = %request.output.public_path,
            "build request ready"
        );
        self.engine.compile(&request).await
    }

    fn advance(&mut self, next: BuildState, progress: &dyn ProgressReporter) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!(from = ?self.state, to = ?next, "state transition");
        self.state = next;
        self.history.push(next);
        if !next.is_terminal() {
            progress.phase(next);
        }
    }

    fn fail(
        mut self,
        error: BuildGateError,
        result: Option<BuildResult>,
        start: Instant,
        progress: &dyn ProgressReporter,
    ) -> BuildOutcome {
        let stage = self.state;
        error!(stage = %stage, error = %error, "build failed");
        self.advance(BuildState::Failed, progress);

        let outcome = BuildOutcome {
            state: self.state,
            exit_code: EXIT_FAILURE,
            failed_stage: Some(stage),
            error: Some(error),
            result,
            history: self.history,
            elapsed: start.elapsed(),
        };
        progress.done(&outcome);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use buildgate_shared::{AppConfig, BuildMode};

    use super::*;
    use crate::gate::tests::FixedProbe;

    /// Engine returning a canned result and remembering what it was sent.
    struct FakeEngine {
        result: std::result::Result<BuildResult, String>,
        calls: AtomicUsize,
        seen: Mutex<Option<serde_json::Value>>,
        /// Set when the clean target still existed at compile time.
        saw_stale_output: Mutex<Option<bool>>,
        clean_target: std::path::PathBuf,
    }

    impl FakeEngine {
        fn returning(result: BuildResult, clean_target: &Path) -> Self {
            Self {
                result: Ok(result),
                calls: AtomicUsize::new(0),
                seen: Mutex::new(None),
                saw_stale_output: Mutex::new(None),
                clean_target: clean_target.to_path_buf(),
            }
        }

        fn crashing(clean_target: &Path) -> Self {
            Self {
                result: Err("engine crashed".into()),
                ..Self::returning(BuildResult::default(), clean_target)
            }
        }
    }

    impl BundlingEngine for &FakeEngine {
        async fn compile(&self, request: &BuildRequest) -> Result<BuildResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.seen.lock().unwrap() = Some(serde_json::to_value(request).unwrap());
            *self.saw_stale_output.lock().unwrap() = Some(self.clean_target.exists());
            self.result.clone().map_err(BuildGateError::Engine)
        }
    }

    /// Records reporter callbacks as strings.
    #[derive(Default)]
    struct RecordingProgress(Mutex<Vec<String>>);

    impl RecordingProgress {
        fn events(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    impl ProgressReporter for RecordingProgress {
        fn phase(&self, state: BuildState) {
            self.0.lock().unwrap().push(format!("phase:{state:?}"));
        }
        fn violations(&self, violations: &[Violation]) {
            for v in violations {
                self.0.lock().unwrap().push(format!("violation:{v}"));
            }
        }
        fn summary(&self, text: &str) {
            self.0.lock().unwrap().push(format!("summary:{text}"));
        }
        fn done(&self, outcome: &BuildOutcome) {
            self.0.lock().unwrap().push(format!("done:{}", outcome.exit_code));
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        settings: BuildSettings,
        stale_file: std::path::PathBuf,
    }

    fn fixture(mode: BuildMode) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let settings = BuildSettings::new(dir.path(), mode, AppConfig::default());
        let target = settings.clean_target();
        std::fs::create_dir_all(target.join("img")).unwrap();
        let stale_file = target.join("img/old.1234567.png");
        std::fs::write(&stale_file, b"stale").unwrap();
        std::fs::write(settings.assets_root().join("index.html"), b"<html>").unwrap();
        Fixture {
            _dir: dir,
            settings,
            stale_file,
        }
    }

    fn engines(node: &str) -> Engines {
        Engines {
            node: Some(node.into()),
            npm: Some(">= 3.0.0".into()),
        }
    }

    fn ok_result(has_warnings: bool) -> BuildResult {
        BuildResult {
            has_errors: false,
            has_warnings,
            summary: "Hash: 3f2a\napp.js  120 kB".into(),
        }
    }

    #[tokio::test]
    async fn successful_build_visits_every_stage() {
        let fx = fixture(BuildMode::Production);
        let engine = FakeEngine::returning(ok_result(false), &fx.settings.clean_target());
        let engines = engines("^8.0.0");
        let probe = FixedProbe::new(&[("node", "v8.8.0"), ("npm", "5.4.2")]);
        let progress = RecordingProgress::default();

        let outcome = BuildOrchestrator::new(&fx.settings, &engines, probe, &engine)
            .run(&progress)
            .await;

        assert!(outcome.succeeded());
        assert_eq!(outcome.exit_code, 0);
        assert_eq!(
            outcome.history,
            vec![
                BuildState::Idle,
                BuildState::Validating,
                BuildState::Cleaning,
                BuildState::Compiling,
                BuildState::Reporting,
                BuildState::Succeeded,
            ]
        );
        assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
        assert_eq!(*engine.saw_stale_output.lock().unwrap(), Some(false));
        assert!(!fx.stale_file.exists());
        assert!(fx.settings.assets_root().join("index.html").exists());

        let events = progress.events();
        assert_eq!(events.last().unwrap(), "done:0");
        assert!(events.contains(&"summary:Hash: 3f2a\napp.js  120 kB".to_string()));
    }

    #[tokio::test]
    async fn old_runtime_fails_before_cleaning() {
        let fx = fixture(BuildMode::Production);
        let engine = FakeEngine::returning(ok_result(false), &fx.settings.clean_target());
        let engines = engines("^8.0.0");
        let probe = FixedProbe::new(&[("node", "v6.0.0"), ("npm", "5.4.2")]);
        let progress = RecordingProgress::default();

        let outcome = BuildOrchestrator::new(&fx.settings, &engines, probe, &engine)
            .run(&progress)
            .await;

        assert_eq!(outcome.state, BuildState::Failed);
        assert_eq!(outcome.exit_code, 1);
        assert_eq!(outcome.failed_stage, Some(BuildState::Validating));
        assert!(!outcome.visited(BuildState::Cleaning));
        assert!(fx.stale_file.exists(), "cleaner must not run");
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);

        let BuildGateError::Precondition { violations } = outcome.error.unwrap() else {
            panic!("expected precondition error");
        };
        assert_eq!(violations.len(), 1);
        assert!(
            progress
                .events()
                .contains(&"violation:node: 6.0.0 should be ^8.0.0".to_string())
        );
    }

    #[tokio::test]
    async fn compilation_errors_fail_with_summary() {
        let fx = fixture(BuildMode::Production);
        let result = BuildResult {
            has_errors: true,
            has_warnings: false,
            summary: "ERROR in ./src/main.js".into(),
        };
        let engine = FakeEngine::returning(result, &fx.settings.clean_target());
        let engines = engines("^8.0.0");
        let probe = FixedProbe::new(&[("node", "8.8.0")]);

        let outcome = BuildOrchestrator::new(&fx.settings, &engines, probe, &engine)
            .run(&SilentProgress)
            .await;

        assert_eq!(outcome.exit_code, 1);
        assert_eq!(outcome.failed_stage, Some(BuildState::Reporting));
        assert!(matches!(
            outcome.error,
            Some(BuildGateError::Compilation { ref summary }) if summary == "ERROR in ./src/main.js"
        ));
        assert!(outcome.result.unwrap().has_errors);
    }

    #[tokio::test]
    async fn warnings_alone_succeed() {
        let fx = fixture(BuildMode::Production);
        let engine = FakeEngine::returning(ok_result(true), &fx.settings.clean_target());
        let engines = engines("^8.0.0");
        let probe = FixedProbe::new(&[("node", "8.8.0")]);

        let outcome = BuildOrchestrator::new(&fx.settings, &engines, probe, &engine)
            .run(&SilentProgress)
            .await;

        assert!(outcome.succeeded());
        assert_eq!(outcome.exit_code, 0);
        assert!(outcome.result.unwrap().has_warnings);
    }

    #[tokio::test]
    async fn engine_crash_is_single_shot_failure() {
        let fx = fixture(BuildMode::Production);
        let engine = FakeEngine::crashing(&fx.settings.clean_target());
        let engines = engines("^8.0.0");
        let probe = FixedProbe::new(&[("node", "8.8.0")]);

        let outcome = BuildOrchestrator::new(&fx.settings, &engines, probe, &engine)
            .run(&SilentProgress)
            .await;

        assert_eq!(outcome.exit_code, 1);
        assert_eq!(outcome.failed_stage, Some(BuildState::Compiling));
        assert!(!outcome.visited(BuildState::Reporting));
        assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn request_uses_mode_public_path() {
        let mut fx = fixture(BuildMode::Development);
        fx.settings.config.build.assets_public_path = "/prod/".into();
        fx.settings.config.dev.assets_public_path = "/dev/".into();
        let engine = FakeEngine::returning(ok_result(false), &fx.settings.clean_target());
        let engines = engines("^8.0.0");
        let probe = FixedProbe::new(&[("node", "8.8.0")]);

        BuildOrchestrator::new(&fx.settings, &engines, probe, &engine)
            .run(&SilentProgress)
            .await;

        let seen = engine.seen.lock().unwrap().clone().unwrap();
        assert_eq!(seen["mode"], "development");
        assert_eq!(seen["output"]["publicPath"], "/dev/");
    }

    #[test]
    fn transitions() {
        use BuildState::*;
        assert!(Idle.can_advance_to(Validating));
        assert!(!Idle.can_advance_to(Compiling));
        assert!(!Validating.can_advance_to(Compiling));
        assert!(Cleaning.can_advance_to(Failed));
        assert!(!Succeeded.can_advance_to(Failed));
        assert!(!Idle.can_advance_to(Failed));
        assert!(Failed.is_terminal());
    }
}
