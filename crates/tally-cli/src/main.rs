//! Tally operator CLI entrypoint.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

mod commands;
mod handlers;
mod settings;

use commands::{Commands, ConfigCommands};
use handlers::App;
use settings::Settings;

#[derive(Parser)]
#[command(name = "tally")]
#[command(author, version, about = "Tally credit ledger operator CLI", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the per-user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;
    tally_trace::init_tracing(&settings.logging)?;

    if let Commands::Config { command } = &cli.command {
        match command {
            ConfigCommands::Show => handlers::show_config(&settings, cli.json)?,
            ConfigCommands::Path => handlers::config_path()?,
        }
        return Ok(());
    }

    let app = App::open(settings, cli.json).await?;
    match cli.command {
        Commands::Balance { user } => handlers::balance(&app, &user).await?,
        Commands::Debit { user, action, cost } => handlers::debit(&app, &user, action, cost).await?,
        Commands::Credit { user, amount } => handlers::credit(&app, &user, amount).await?,
        Commands::Claim { user, date } => handlers::claim(&app, &user, date.as_deref()).await?,
        Commands::Grant { event, user, plan } => {
            handlers::grant(&app, &event, &user, &plan).await?
        }
        Commands::Plans => handlers::plans(&app)?,
        Commands::Health => handlers::health(&app).await?,
        Commands::Config { .. } => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use commands::ActionArg;

    #[test]
    fn test_parse_debit() {
        let cli = Cli::try_parse_from(["tally", "debit", "u1", "--action", "video", "--json"]).unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Debit { user, action, cost } => {
                assert_eq!(user, "u1");
                assert_eq!(action, ActionArg::Video);
                assert_eq!(cost, None);
            }
            _ => panic!("expected debit"),
        }
    }

    #[test]
    fn test_credit_default_amount() {
        let cli = Cli::try_parse_from(["tally", "credit", "u1"]).unwrap();
        assert!(matches!(cli.command, Commands::Credit { amount: 100, .. }));
    }

    #[test]
    fn test_grant_requires_plan() {
        assert!(Cli::try_parse_from(["tally", "grant", "cs_1", "u1"]).is_err());
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::try_parse_from(["tally", "plans", "--config", "/etc/tally.yaml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/tally.yaml")));
    }
}
