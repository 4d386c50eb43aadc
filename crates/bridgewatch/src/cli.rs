//! Clap derive structures for the `bridgewatch` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// bridgewatch -- device registry for ADB-attached Android devices
#[derive(Debug, Parser)]
#[command(
    name = "bridgewatch",
    version,
    about = "Watch and drive Android devices over the ADB bridge",
    long_about = "Tracks devices reported by adb, merges them with the devices\n\
        declared in devices_config.json, and runs per-device commands.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config dir)
    #[arg(long, env = "BRIDGEWATCH_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Declared device list (overrides config)
    #[arg(long, global = true)]
    pub devices_config: Option<PathBuf>,

    /// adb executable (overrides config)
    #[arg(long, global = true)]
    pub adb: Option<String>,

    /// Output format [default: table, or `defaults.output` from config]
    #[arg(long, short = 'o', global = true)]
    pub output: Option<OutputFormat>,

    /// When to use color output [default: auto]
    #[arg(long, global = true)]
    pub color: Option<ColorMode>,

    /// How long to let the tracker report before answering, in ms
    #[arg(long, global = true)]
    pub settle_ms: Option<u64>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Stream registry changes until interrupted
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// List every known device, live or declared
    #[command(alias = "ls")]
    Devices,

    /// Show one device
    #[command(alias = "get")]
    Device {
        /// Device id (serial or ip[:port])
        udid: String,
    },

    /// Ask adb to reconnect a network device
    Reconnect {
        /// ip[:port] of the device
        address: String,
    },

    /// Kill the on-device server
    KillServer {
        udid: String,

        /// Pid to kill (defaults to the tracked server pid)
        #[arg(long)]
        pid: Option<i32>,
    },

    /// Start the on-device server
    StartServer { udid: String },

    /// Refresh a device's network interfaces
    UpdateInterfaces { udid: String },

    /// Run a shell command on a device
    Shell {
        udid: String,

        /// Command and arguments, joined with spaces
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Run a raw JSON command, e.g. '{"type":"START_SERVER","udid":"..."}'
    Exec {
        /// JSON command, or `-` to read it from stdin
        json: String,
    },

    /// Manage CLI configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Watch ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Print full snapshots instead of per-device events
    #[arg(long)]
    pub snapshots: bool,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Write a default config file and an empty devices config
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Display current resolved configuration
    Show,

    /// Print the config file path
    Path,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
