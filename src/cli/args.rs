//! CLI argument definitions.
//!
//! All Clap derive structs for `redarena` command-line parsing.

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

// ============================================================================
// Root CLI
// ============================================================================

/// Authoritative match engine for offensive-security minigames.
#[derive(Parser, Debug)]
#[command(name = "redarena", author, version, about)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all non-error output.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Log output format.
    #[arg(long, default_value = "human", global = true, env = "REDARENA_LOG_FORMAT")]
    pub log_format: LogFormatChoice,

    /// Color output control.
    #[arg(long, default_value = "auto", global = true, env = "REDARENA_COLOR")]
    pub color: ColorChoice,
}

// ============================================================================
// Top-Level Commands
// ============================================================================

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the match engine server on stdio.
    Serve(ServeArgs),

    /// Inspect and validate scenario content.
    Scenarios(ScenariosCommand),

    /// Display version and build information.
    Version(VersionArgs),
}

// ============================================================================
// Serve Command
// ============================================================================

/// Arguments for `serve`.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Directory of scenario YAML files.
    #[arg(
        short,
        long,
        default_value = "./scenarios",
        env = "REDARENA_SCENARIOS"
    )]
    pub scenario_dir: PathBuf,

    /// Session tick cadence (e.g. `1s`, `250ms`).
    #[arg(long, default_value = "1s", value_parser = humantime::parse_duration)]
    pub tick_interval: Duration,

    /// Write the JSONL event stream to this file instead of stderr.
    #[arg(long, env = "REDARENA_EVENTS_FILE")]
    pub events_file: Option<PathBuf>,
}

// ============================================================================
// Scenarios Command
// ============================================================================

/// Scenario management commands.
#[derive(Args, Debug)]
pub struct ScenariosCommand {
    /// Scenario subcommand.
    #[command(subcommand)]
    pub subcommand: ScenariosSubcommand,
}

/// Scenario subcommands.
#[derive(Subcommand, Debug)]
pub enum ScenariosSubcommand {
    /// List the scenarios in a directory.
    List(ScenariosListArgs),

    /// Validate scenario files without starting the server.
    Validate(ScenariosValidateArgs),
}

/// Arguments for `scenarios list`.
#[derive(Args, Debug)]
pub struct ScenariosListArgs {
    /// Directory of scenario YAML files.
    #[arg(
        short,
        long,
        default_value = "./scenarios",
        env = "REDARENA_SCENARIOS"
    )]
    pub scenario_dir: PathBuf,

    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,
}

/// Arguments for `scenarios validate`.
#[derive(Args, Debug)]
pub struct ScenariosValidateArgs {
    /// Scenario files to validate.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,

    /// Treat warnings as errors.
    #[arg(long)]
    pub strict: bool,
}

// ============================================================================
// Version Command
// ============================================================================

/// Arguments for version display.
#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,
}

// ============================================================================
// CLI-Local Enums
// ============================================================================

/// Color output choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ColorChoice {
    /// Auto-detect terminal support.
    #[default]
    Auto,
    /// Always use color.
    Always,
    /// Never use color.
    Never,
}

/// Log format choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormatChoice {
    /// Human-readable log lines.
    #[default]
    Human,
    /// Newline-delimited JSON.
    Json,
}

/// Output format for structured output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output.
    #[default]
    Human,
    /// JSON output.
    Json,
}

// ============================================================================
// Tests
// ============================================================================
