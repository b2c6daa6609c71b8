// src/main.rs — Lumino controller entry point

use clap::Parser;

use lumino::cli::{Cli, Commands};
use lumino::infra::config::Config;
use lumino::infra::logger;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging (respects RUST_LOG)
    logger::init_logging(if cli.verbose { "info" } else { "warn" });

    if let Err(e) = run(cli).await {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Load config (falls back to defaults if no config.toml)
    let config = if let Some(ref path) = cli.config {
        Config::load_from(std::path::Path::new(path))?
    } else {
        Config::load()?
    };

    match cli.command {
        Commands::Run(args) => lumino::cli::run::run_session(config, args).await,
        Commands::Dose(args) => lumino::cli::dose::show_dose(&config, &args),
        Commands::Prescribe(args) => {
            lumino::cli::prescribe::run_prescribe(&config, &args).map(|_| ())
        }
        Commands::Descriptor { path } => {
            lumino::cli::descriptor::show_descriptor(&config, path.as_deref())
        }
    }
}
