// src/bin/lumino_monitor.rs — Live monitor entry point

use clap::Parser;

use lumino::cli::MonitorCli;
use lumino::infra::config::Config;
use lumino::infra::logger;

#[tokio::main]
async fn main() {
    logger::init_logging("info");

    if let Err(e) = run().await {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = MonitorCli::parse();

    let mut config = if let Some(ref path) = cli.config {
        Config::load_from(std::path::Path::new(path))?
    } else {
        Config::load()?
    };
    if let Some(port) = cli.port {
        config.sync.port = port;
    }

    lumino::cli::monitor::run_monitor(config).await
}
