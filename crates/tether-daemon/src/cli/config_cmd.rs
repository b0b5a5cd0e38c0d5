use super::commands::{ConfigAction, OutputFormat};
use std::path::Path;
use tether_daemon::config::DaemonConfig;

pub fn handle_config(
    action: Option<ConfigAction>,
    config_path: &Path,
    config: &DaemonConfig,
    format: OutputFormat,
) -> anyhow::Result<()> {
    match action.unwrap_or(ConfigAction::Show) {
        ConfigAction::Show => {
            match format {
                OutputFormat::Json => {
                    // api_auth_token is skip_serializing
                    println!("{}", serde_json::to_string_pretty(config)?);
                }
                OutputFormat::Text => {
                    println!("Config file: {}", config_path.display());
                    if !config_path.exists() {
                        println!("  (not found, showing defaults)");
                    }
                    println!();
                    println!("{}", config.redacted());
                }
            }
        }
        ConfigAction::Validate => {
            config.validate()?;
            println!("\x1b[38;5;46m[OK]\x1b[0m {} is valid", config_path.display());
            for warning in config.check_security_warnings() {
                println!("\x1b[38;5;226m[WARN]\x1b[0m {}", warning.message);
                println!("       {}", warning.recommendation);
            }
        }
    }
    Ok(())
}
