// src/cli/run.rs — `lumino run`: drive one monitored session from the terminal

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use super::RunArgs;
use crate::controller::command::HELP;
use crate::controller::{ControllerSession, OperatorCommand};
use crate::infra::config::Config;
use crate::session::descriptor::load_parameters;
use crate::session::SystemClock;
use crate::supervisor::{ExternalMonitor, MonitorLauncher, MonitorSupervisor};

pub async fn run_session(config: Config, args: RunArgs) -> anyhow::Result<()> {
    let device = args.device.to_setting()?;
    let launcher: Box<dyn MonitorLauncher> = if args.attach {
        Box::new(ExternalMonitor::default())
    } else {
        Box::new(MonitorSupervisor::from_config(&config))
    };
    let poll_every = Duration::from_millis(config.controller.poll_ms.max(1));
    let sync_every = config.sync.update_interval();
    let descriptor_path = config.session.descriptor_path();

    let mut session = ControllerSession::new(config, device, launcher, Arc::new(SystemClock));

    if args.targets.from_descriptor {
        let params = load_parameters(&descriptor_path)?;
        eprintln!("  Loaded {} from {}", params.label(), descriptor_path.display());
        session.load_parameters(&params)?;
    }
    if let Some(energy) = args.targets.energy {
        session.set_energy(energy).await?;
    }
    if let Some(time) = args.targets.time {
        session.set_time(time).await?;
    }

    session
        .start()
        .await
        .context("Could not start therapy")?;
    eprintln!("  {}", session.status());
    eprintln!("{}", HELP);

    let (tx, mut rx) = mpsc::channel::<String>(16);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).await.is_err() {
                break;
            }
        }
    });
    let mut stdin_open = true;

    let mut poll = tokio::time::interval(poll_every);
    let mut sync = tokio::time::interval(sync_every);
    // Consume the immediate first tick; start already pushed a full snapshot.
    sync.tick().await;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            line = rx.recv(), if stdin_open => {
                let Some(line) = line else {
                    stdin_open = false;
                    continue;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match OperatorCommand::parse(&line) {
                    Ok(OperatorCommand::Stop) => {
                        session.stop().await;
                        eprintln!("  Therapy stopped.");
                        break;
                    }
                    Ok(cmd) => {
                        if let Err(e) = apply_command(&mut session, cmd).await {
                            eprintln!("  {}", e);
                        }
                    }
                    Err(e) => eprintln!("  {}", e),
                }
            }
            _ = poll.tick() => {
                if session.poll().await {
                    eprintln!("  Therapy complete.");
                    eprintln!("  {}", session.status());
                    break;
                }
            }
            _ = sync.tick() => {
                session.sync().await;
            }
            _ = &mut shutdown => {
                tracing::info!("Shutdown signal received");
                session.stop().await;
                eprintln!("\n  Therapy stopped.");
                break;
            }
        }
    }
    Ok(())
}

async fn apply_command(
    session: &mut ControllerSession,
    cmd: OperatorCommand,
) -> crate::infra::errors::Result<()> {
    match cmd {
        OperatorCommand::Pause => {
            session.pause().await?;
            eprintln!("  Paused. {}", session.status());
        }
        OperatorCommand::Resume => {
            session.resume().await?;
            eprintln!("  Resumed. {}", session.status());
        }
        OperatorCommand::Time(min) => {
            session.set_time(min).await?;
            eprintln!("  {}", session.status());
        }
        OperatorCommand::Energy(joules) => {
            session.set_energy(joules).await?;
            eprintln!("  {}", session.status());
        }
        OperatorCommand::Power(watts) => {
            session.set_master_power(watts).await?;
            eprintln!("  {}", session.status());
        }
        OperatorCommand::Status => eprintln!("  {}", session.status()),
        OperatorCommand::Help => eprintln!("{}", HELP),
        OperatorCommand::Stop => session.stop().await,
    }
    Ok(())
}
