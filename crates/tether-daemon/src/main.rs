mod cli;

use clap::Parser;
use cli::{
    handle_config, init_logging, load_config, run_checks, run_daemon, show_status, show_targets, show_version, Cli,
    Commands,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Version = cli.command {
        show_version(cli.format);
        return Ok(());
    }

    let (config_path, config) = load_config(&cli)?;
    init_logging(&cli, &config.logging)?;

    match cli.command {
        Commands::Run { pid_file, systemd } => {
            run_daemon(config, pid_file, systemd).await?;
        }
        Commands::Status { ref slug, external } => {
            show_status(&config, slug.as_deref(), external, cli.format).await?;
        }
        Commands::Targets => {
            show_targets(&config, cli.format)?;
        }
        Commands::Check { slug } => {
            run_checks(config, slug, cli.format).await?;
        }
        Commands::Config { action } => {
            handle_config(action, &config_path, &config, cli.format)?;
        }
        Commands::Version => {}
    }

    Ok(())
}
