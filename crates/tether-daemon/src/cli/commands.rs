use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

const BUILD_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "tether")]
#[command(version = BUILD_VERSION)]
#[command(about = "tether - supervises local integrations and watches remote ones")]
#[command(long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[arg(short, long, global = true, value_name = "FILE", env = "TETHER_CONFIG", help = "Path to config file")]
    pub config: Option<PathBuf>,

    #[arg(short = 'd', long, global = true, value_name = "DIR", env = "TETHER_DATA_DIR", help = "Data directory path")]
    pub data_dir: Option<PathBuf>,

    #[arg(short, long, action = clap::ArgAction::Count, global = true, help = "Increase verbosity (-v, -vv, -vvv)")]
    pub verbose: u8,

    #[arg(short, long, global = true, help = "Suppress non-error output")]
    pub quiet: bool,

    #[arg(long, global = true, value_name = "FILE", help = "Write logs to file")]
    pub log_file: Option<PathBuf>,

    #[arg(long, global = true, default_value = "text", help = "Output format")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Start the daemon")]
    #[command(long_about = "Start the tether daemon.\n\nStarts autostart targets, the health sweeps, log rotation and the HTTP API, then runs until SIGINT or SIGTERM.")]
    Run {
        #[arg(long, value_name = "FILE", help = "Write PID to file")]
        pid_file: Option<PathBuf>,
        #[arg(long, help = "Notify systemd when ready")]
        systemd: bool,
    },

    #[command(about = "Show health reported by the running daemon")]
    Status {
        #[arg(help = "Only show this target")]
        slug: Option<String>,
        #[arg(long, help = "Show remote targets instead of local ones")]
        external: bool,
    },

    #[command(about = "List registered targets")]
    Targets,

    #[command(about = "Probe every registered target once and print the result")]
    Check {
        #[arg(help = "Only check this target")]
        slug: Option<String>,
    },

    #[command(about = "Manage configuration")]
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },

    #[command(about = "Show version information")]
    Version,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    #[command(about = "Show current configuration with secrets masked")]
    Show,
    #[command(about = "Validate configuration")]
    Validate,
}
