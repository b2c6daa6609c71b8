// src/cli/monitor.rs — `lumino-monitor`: serve the controller and show live progress

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::infra::config::Config;
use crate::session::descriptor::load_parameters;
use crate::session::{Clock, SessionPhase, SystemClock};
use crate::sync::{MonitorEvent, MonitorServer, MonitorState};

const LOCAL_HELP: &str = "  Local controls: play, pause, toggle";

/// A line typed at the monitor's own terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LocalControl {
    Play,
    Pause,
    Toggle,
}

impl LocalControl {
    fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "play" | "start" | "resume" => Some(Self::Play),
            "pause" => Some(Self::Pause),
            "toggle" | "p" => Some(Self::Toggle),
            _ => None,
        }
    }

    /// Whether this control changes a replica currently in `phase`.
    fn applies_to(self, phase: SessionPhase) -> bool {
        match self {
            Self::Play => phase != SessionPhase::Running,
            Self::Pause => phase == SessionPhase::Running,
            Self::Toggle => true,
        }
    }
}

pub async fn run_monitor(config: Config) -> anyhow::Result<()> {
    let server = MonitorServer::bind(&config.sync).await?;
    let clock = SystemClock;

    let path = config.session.descriptor_path();
    let mut state = match load_parameters(&path) {
        Ok(params) => {
            println!("Session: {}", params.label());
            MonitorState::from_parameters(&params, config.dosimetry.ambiguous_target)
        }
        Err(e) => {
            tracing::warn!(kind = e.kind(), "{}", e);
            eprintln!("  {}", e);
            MonitorState::new()
        }
    };

    let (tx, mut rx) = mpsc::channel(64);
    let server_task = tokio::spawn(server.run(tx));

    let (line_tx, mut line_rx) = mpsc::channel::<String>(16);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line_tx.send(line).await.is_err() {
                break;
            }
        }
    });
    let mut stdin_open = true;
    eprintln!("{}", LOCAL_HELP);

    let mut tick = tokio::time::interval(config.monitor.tick());
    let auto_stop = config.monitor.auto_stop_on_disconnect;
    let mut last_line = String::new();

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            Some(event) = rx.recv() => match event {
                MonitorEvent::Connected(peer) => {
                    tracing::info!("Controller {} connected", peer);
                }
                MonitorEvent::Message(msg) => {
                    if let Err(e) = state.apply(msg, clock.now()) {
                        tracing::warn!("Could not apply controller message: {}", e);
                    }
                }
                MonitorEvent::Disconnected => {
                    if auto_stop {
                        tracing::info!("Controller disconnected; stopping local session");
                        state.reset();
                    } else {
                        tracing::info!("Controller disconnected; session keeps running");
                    }
                }
            },
            line = line_rx.recv(), if stdin_open => {
                let Some(line) = line else {
                    stdin_open = false;
                    continue;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match LocalControl::parse(&line) {
                    Some(control) if control.applies_to(state.phase()) => {
                        match state.toggle(clock.now()) {
                            Ok(phase) => eprintln!("  Therapy {}.", phase),
                            Err(e) => eprintln!("  {}", e),
                        }
                    }
                    Some(_) => eprintln!("  Therapy is already {}.", state.phase()),
                    None => eprintln!("  Unknown control '{}'.\n{}", line.trim(), LOCAL_HELP),
                }
            }
            _ = tick.tick() => {
                let readout = state.tick(clock.now());
                let line = readout.to_string();
                if line != last_line {
                    println!("{}", line);
                    last_line = line;
                }
                if readout.just_completed {
                    println!("Therapy complete.");
                }
            }
            _ = &mut shutdown => {
                tracing::info!("Shutdown signal received");
                break;
            }
        }
    }

    server_task.abort();
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM from the supervising controller.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!("SIGTERM handler unavailable: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_local_controls() {
        assert_eq!(LocalControl::parse(" Play "), Some(LocalControl::Play));
        assert_eq!(LocalControl::parse("pause"), Some(LocalControl::Pause));
        assert_eq!(LocalControl::parse("p"), Some(LocalControl::Toggle));
        assert_eq!(LocalControl::parse("stop"), None);
    }

    #[test]
    fn test_play_and_pause_only_apply_when_they_change_phase() {
        assert!(LocalControl::Play.applies_to(SessionPhase::Armed));
        assert!(LocalControl::Play.applies_to(SessionPhase::Paused));
        assert!(!LocalControl::Play.applies_to(SessionPhase::Running));
        assert!(LocalControl::Pause.applies_to(SessionPhase::Running));
        assert!(!LocalControl::Pause.applies_to(SessionPhase::Armed));
        assert!(LocalControl::Toggle.applies_to(SessionPhase::Running));
    }
}
