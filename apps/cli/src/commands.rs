//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use buildgate_assets::{AssetOutput, AssetPipelineConfig, PipelineOptions, UrlAsset};
use buildgate_core::gate::{self, SystemProbe};
use buildgate_core::{
    BuildOrchestrator, BuildOutcome, BuildState, OutputCleaner, ProcessEngine, ProgressReporter,
};
use buildgate_shared::{
    AppConfig, BuildGateError, BuildMode, BuildSettings, Violation, init_config, load_config,
    load_config_from, load_package_manifest,
};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use console::Style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// buildgate: version-gated production builds for front-end projects.
#[derive(Parser)]
#[command(
    name = "buildgate",
    version,
    about = "Check the toolchain, clean stale output and run the bundler.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Project directory (defaults to the current directory).
    #[arg(long, default_value = ".", global = true)]
    pub project: PathBuf,

    /// Config file to use instead of `<project>/buildgate.toml`.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Build mode: production (default) or development. The shell's
    /// `NODE_ENV` is not consulted.
    #[arg(long, global = true)]
    pub mode: Option<BuildMode>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Check versions, clean the output and compile the project.
    Build,

    /// Only check the installed toolchain against `package.json` engines.
    Check,

    /// Only remove stale output under the assets sub-directory.
    Clean,

    /// Show which rule handles each file and how assets would be emitted.
    Resolve {
        /// Files to resolve, relative to the project directory.
        #[arg(required = true)]
        files: Vec<String>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr; stdout is kept
/// for the build summary.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "buildgate=warn",
        1 => "buildgate=info",
        2 => "buildgate=debug",
        _ => "buildgate=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<ExitCode> {
    let project_dir = std::path::absolute(&cli.project)
        .wrap_err_with(|| format!("cannot resolve project dir '{}'", cli.project.display()))?;

    match cli.command {
        Command::Build => {
            let settings = settings(&project_dir, cli.config.as_deref(), cli.mode)?;
            cmd_build(&settings).await
        }
        Command::Check => cmd_check(&project_dir),
        Command::Clean => {
            let settings = settings(&project_dir, cli.config.as_deref(), cli.mode)?;
            cmd_clean(&settings)
        }
        Command::Resolve { files } => {
            let settings = settings(&project_dir, cli.config.as_deref(), cli.mode)?;
            cmd_resolve(&settings, &files)
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(&project_dir),
            ConfigAction::Show => cmd_config_show(&project_dir, cli.config.as_deref()),
        },
    }
}

fn load_app_config(project_dir: &Path, config: Option<&Path>) -> Result<AppConfig> {
    let config = match config {
        Some(path) => load_config_from(path)?,
        None => load_config(project_dir)?,
    };
    Ok(config)
}

/// Resolve settings once; the mode is fixed here and passed down explicitly.
fn settings(project_dir: &Path, config: Option<&Path>, mode: Option<BuildMode>) -> Result<BuildSettings> {
    let config = load_app_config(project_dir, config)?;
    Ok(BuildSettings::new(project_dir, build_mode(mode), config))
}

/// Production unless `--mode` says otherwise.
fn build_mode(flag: Option<BuildMode>) -> BuildMode {
    flag.unwrap_or(BuildMode::Production)
}

// ---------------------------------------------------------------------------
// Presentation
// ---------------------------------------------------------------------------

const VERSION_HEADER: &str = "To use this template, you must update following to modules:";
const FAILED_BANNER: &str = "  Build failed with errors.\n";
const COMPLETE_BANNER: &str = "  Build complete.\n";
const SERVE_TIP: &str = "  Tip: built files are meant to be served over an HTTP server.\n  \
                         Opening index.html over file:// won't work.\n";

fn print_violations(violations: &[Violation]) {
    let red = Style::new().red();
    let green = Style::new().green();

    println!();
    println!("{}", Style::new().yellow().apply_to(VERSION_HEADER));
    println!();
    for v in violations {
        println!(
            "  {}: {} should be {}",
            v.tool,
            red.apply_to(&v.current),
            green.apply_to(&v.required)
        );
    }
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
    mode: BuildMode,
}

impl CliProgress {
    fn new(mode: BuildMode) -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner, mode }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, state: BuildState) {
        let message = match state {
            BuildState::Compiling => format!("building for {}...", self.mode),
            other => format!("{other}..."),
        };
        self.spinner.set_message(message);
    }

    fn violations(&self, violations: &[Violation]) {
        self.spinner.suspend(|| print_violations(violations));
    }

    fn summary(&self, text: &str) {
        self.spinner.finish_and_clear();
        if !text.is_empty() {
            println!("{text}\n");
        }
    }

    fn done(&self, _outcome: &BuildOutcome) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_build(settings: &BuildSettings) -> Result<ExitCode> {
    let manifest = load_package_manifest(&settings.project_dir)?;
    let engine = ProcessEngine::from_settings(settings);

    info!(
        project = %settings.project_dir.display(),
        mode = %settings.mode,
        "starting build"
    );

    let progress = CliProgress::new(settings.mode);
    let outcome = BuildOrchestrator::new(settings, &manifest.engines, SystemProbe, engine)
        .run(&progress)
        .await;

    let (verdict, code) = verdict(&outcome);
    print_verdict(&verdict);

    info!(elapsed_ms = outcome.elapsed.as_millis(), exit_code = code, "build finished");
    Ok(ExitCode::from(code))
}

/// What the user is told once a build run ends.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Verdict {
    /// Success banner plus the serving tip.
    Complete,
    /// Failure banner after the engine summary.
    Failed,
    /// Nothing more to print; the reporter already listed the violations.
    Violations,
    /// A non-compilation failure, naming the stage.
    StageError(String),
}

/// Map a finished run to its verdict and process exit code.
fn verdict(outcome: &BuildOutcome) -> (Verdict, u8) {
    let code = u8::try_from(outcome.exit_code).unwrap_or(1);
    let verdict = match &outcome.error {
        None => Verdict::Complete,
        Some(BuildGateError::Compilation { .. }) => Verdict::Failed,
        Some(BuildGateError::Precondition { .. }) => Verdict::Violations,
        Some(e) => {
            let stage = outcome.failed_stage.unwrap_or(BuildState::Idle);
            Verdict::StageError(format!("  Build failed while {stage}: {e}\n"))
        }
    };
    (verdict, code)
}

fn print_verdict(verdict: &Verdict) {
    let red = Style::new().red();
    match verdict {
        Verdict::Complete => {
            println!("{}", Style::new().cyan().apply_to(COMPLETE_BANNER));
            println!("{}", Style::new().yellow().apply_to(SERVE_TIP));
        }
        Verdict::Failed => println!("{}", red.apply_to(FAILED_BANNER)),
        Verdict::Violations => {}
        Verdict::StageError(message) => eprintln!("{}", red.apply_to(message)),
    }
}

fn cmd_check(project_dir: &Path) -> Result<ExitCode> {
    let manifest = load_package_manifest(project_dir)?;

    match gate::verify(&manifest.engines, &SystemProbe) {
        Ok(()) => {
            println!("{}", Style::new().green().apply_to("Toolchain versions satisfied."));
            Ok(ExitCode::SUCCESS)
        }
        Err(BuildGateError::Precondition { violations }) => {
            print_violations(&violations);
            Ok(ExitCode::FAILURE)
        }
        Err(e) => Err(e.into()),
    }
}

fn cmd_clean(settings: &BuildSettings) -> Result<ExitCode> {
    let target = settings.clean_target();
    OutputCleaner::new(settings.assets_root()).clear(&target)?;
    println!("Removed {}", target.display());
    Ok(ExitCode::SUCCESS)
}

fn cmd_resolve(settings: &BuildSettings, files: &[String]) -> Result<ExitCode> {
    let pipeline = AssetPipelineConfig::from_options(&PipelineOptions::from(settings))?;
    let dim = Style::new().dim();
    let mut unsupported = 0usize;

    for file in files {
        let (path, query) = buildgate_assets::split_query(file);
        let absolute = settings.project_dir.join(path);
        let request = match query {
            Some(q) => format!("{}?{q}", absolute.display()),
            None => absolute.display().to_string(),
        };

        let resolution = match pipeline.require(&request) {
            Ok(resolution) => resolution,
            Err(e @ BuildGateError::UnsupportedAsset { .. }) => {
                println!("{file}  {}", Style::new().red().apply_to(e));
                unsupported += 1;
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let mut handlers: Vec<&str> = resolution.pre.iter().map(|r| r.handler.as_str()).collect();
        handlers.push(&resolution.rule.handler);
        println!("{file}  {}", handlers.join(" -> "));

        let Some(asset) = UrlAsset::from_rule(resolution.rule) else {
            continue;
        };
        let bytes = std::fs::read(&absolute)
            .map_err(|e| eyre!("cannot read '{}': {e}", absolute.display()))?;
        match asset.emit(resolution.resource, &bytes)? {
            AssetOutput::Inline { data_uri } => {
                println!("  {} ({} bytes < {})", dim.apply_to("inline"), bytes.len(), asset.limit);
                info!(file = %file, uri_len = data_uri.len(), "asset inlined");
            }
            AssetOutput::File { path } => {
                println!("  {} {path}", dim.apply_to("emit"));
            }
        }
    }

    Ok(if unsupported == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn cmd_config_init(project_dir: &Path) -> Result<ExitCode> {
    let path = init_config(project_dir)?;
    println!("Config initialized at: {}", path.display());
    Ok(ExitCode::SUCCESS)
}

fn cmd_config_show(project_dir: &Path, config: Option<&Path>) -> Result<ExitCode> {
    let config = load_app_config(project_dir, config)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use buildgate_shared::BuildResult;
    use clap::CommandFactory;

    use super::*;

    fn outcome(error: Option<BuildGateError>, failed_stage: Option<BuildState>) -> BuildOutcome {
        let failed = error.is_some();
        BuildOutcome {
            state: if failed { BuildState::Failed } else { BuildState::Succeeded },
            exit_code: i32::from(failed),
            failed_stage,
            error,
            result: None,
            history: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    #[test]
    fn build_defaults_to_production() {
        let cli = Cli::try_parse_from(["buildgate", "build"]).unwrap();
        assert!(cli.mode.is_none());
        assert_eq!(build_mode(cli.mode), BuildMode::Production);

        let cli = Cli::try_parse_from(["buildgate", "build", "--mode", "development"]).unwrap();
        assert_eq!(build_mode(cli.mode), BuildMode::Development);

        assert!(Cli::try_parse_from(["buildgate", "build", "--mode", "staging"]).is_err());
    }

    #[test]
    fn mode_is_never_read_from_the_environment() {
        let cmd = Cli::command();
        let mode = cmd
            .get_arguments()
            .find(|a| a.get_id() == "mode")
            .expect("--mode is declared");
        assert!(mode.get_env().is_none());
    }

    #[test]
    fn warnings_only_is_complete() {
        let mut ok = outcome(None, None);
        ok.result = Some(BuildResult {
            has_errors: false,
            has_warnings: true,
            summary: "WARNING in asset size limit".into(),
        });
        assert_eq!(verdict(&ok), (Verdict::Complete, 0));
    }

    #[test]
    fn compilation_errors_show_failure_banner() {
        let failed = outcome(
            Some(BuildGateError::Compilation {
                summary: "ERROR in ./src/main.js".into(),
            }),
            Some(BuildState::Reporting),
        );
        assert_eq!(verdict(&failed), (Verdict::Failed, 1));
    }

    #[test]
    fn precondition_failure_adds_nothing_to_the_listing() {
        let failed = outcome(
            Some(BuildGateError::Precondition {
                violations: vec![Violation {
                    tool: "node".into(),
                    current: "6.0.0".into(),
                    required: "^8.0.0".into(),
                }],
            }),
            Some(BuildState::Validating),
        );
        assert_eq!(verdict(&failed), (Verdict::Violations, 1));
    }

    #[test]
    fn engine_crash_names_the_stage() {
        let failed = outcome(
            Some(BuildGateError::Engine("engine exited with 3 and no report".into())),
            Some(BuildState::Compiling),
        );
        let (verdict, code) = verdict(&failed);
        assert_eq!(code, 1);
        let Verdict::StageError(message) = &verdict else {
            panic!("expected a stage error, got {verdict:?}");
        };
        assert!(message.contains("Build failed while compiling"));
        assert!(message.contains("no report"));
    }
}
