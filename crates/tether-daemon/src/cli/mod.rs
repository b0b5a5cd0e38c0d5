mod checks;
mod commands;
mod config_cmd;
mod info;
mod run;
mod utils;

pub use checks::run_checks;
pub use commands::{Cli, Commands, ConfigAction, OutputFormat};
pub use config_cmd::handle_config;
pub use info::{show_status, show_targets, show_version};
pub use run::run_daemon;
pub use utils::{init_logging, load_config};
