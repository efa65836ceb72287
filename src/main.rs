use clap::Parser;
use reward_maker::cli::{show_status, Cli, Commands};
use reward_maker::config::Config;
use std::path::Path;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = if Path::new(&cli.config).exists() {
        Config::load(&cli.config)?
    } else {
        eprintln!("Warning: {} not found, using default configuration", cli.config);
        Config::default()
    };

    // Initialize telemetry
    reward_maker::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Run(args) => {
            tracing::info!(live = args.live, "Starting orchestrator");
            args.execute(config).await?;
        }
        Commands::Select(args) => args.execute(&config).await?,
        Commands::Quote(args) => args.execute(&config).await?,
        Commands::Discover(args) => args.execute(&config).await?,
        Commands::Status => show_status(&config)?,
        Commands::Config => {
            println!("Current configuration:");
            print!("{}", config.redacted_summary());
        }
    }

    Ok(())
}
