//! Clap derive structures for the `carelink` CLI.

use clap::{Args, Parser, Subcommand, ValueEnum};

use carelink_core::ThreadId;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// carelink -- listen to the Carelink realtime messaging channel
#[derive(Debug, Parser)]
#[command(
    name = "carelink",
    version,
    about = "Listen to Carelink realtime messaging from the command line",
    long_about = "Connects to the realtime messaging channel, subscribes to threads\n\
        and prints every event as it arrives. Dropped connections are\n\
        re-established with backoff and subscriptions are restored.",
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
    /// Profile to use
    #[arg(long, short = 'p', env = "CARELINK_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Channel endpoint, ws:// or wss:// (overrides profile)
    #[arg(long, short = 'e', env = "CARELINK_ENDPOINT", global = true)]
    pub endpoint: Option<String>,

    /// Tenant identifier (overrides profile)
    #[arg(long, env = "CARELINK_TENANT", global = true)]
    pub tenant: Option<String>,

    /// User identifier (overrides profile)
    #[arg(long, env = "CARELINK_USER", global = true)]
    pub user: Option<String>,

    /// Channel token
    #[arg(long, env = "CARELINK_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "CARELINK_OUTPUT",
        default_value = "plain",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress connection status lines
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One human-readable line per event (default)
    Plain,
    /// One JSON object per line
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
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
    /// Connect, subscribe and print events until interrupted
    #[command(alias = "l")]
    Listen(ListenArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Listen ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ListenArgs {
    /// Thread to subscribe to (repeatable)
    #[arg(long = "thread", short = 't', value_name = "ID")]
    pub threads: Vec<ThreadId>,

    /// Give up if the channel is not open within this many seconds (0 waits forever)
    #[arg(long, default_value = "0", value_name = "SECS")]
    pub open_timeout: u64,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Write a profile from --endpoint, --tenant and --user
    Init {
        /// Read the token from this environment variable at connect time
        #[arg(long, value_name = "VAR")]
        token_env: Option<String>,

        /// Replace an existing profile of the same name
        #[arg(long)]
        force: bool,
    },

    /// Display the current configuration (tokens masked)
    Show,

    /// Print the config file location
    Path,

    /// Store a token for the active profile in the system keyring
    SetToken,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
