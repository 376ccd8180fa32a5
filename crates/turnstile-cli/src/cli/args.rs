use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "turnstile",
    version,
    about = "Admission control for collaborative sessions: validate policies and replay traffic scenarios"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Validate a policy and print the effective configuration
    Config(ConfigArgs),
    /// Replay a timed scenario against the engine with a virtual clock
    Replay(ReplayArgs),
}

#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Policy file (YAML). Defaults apply when omitted.
    #[arg(long, env = "TURNSTILE_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct ReplayArgs {
    /// Scenario file (YAML)
    #[arg(long)]
    pub scenario: PathBuf,

    /// Policy file (YAML). Overrides a `config:` block inside the scenario.
    #[arg(long, env = "TURNSTILE_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Exit non-zero if any step was denied
    #[arg(long)]
    pub fail_on_deny: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}
