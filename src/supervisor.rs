// src/supervisor.rs — Monitor process lifecycle

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};

use crate::infra::config::Config;
use crate::infra::errors::{LuminoError, ProcessTerminationError, Result};

/// Something that can make sure a monitor is listening, and tear it down.
#[async_trait]
pub trait MonitorLauncher: Send {
    /// Start the monitor unless one is already running.
    async fn ensure_running(&mut self) -> Result<()>;

    /// Stop the monitor. Errors are for logging; the monitor is gone either way.
    async fn shutdown(&mut self) -> Result<()>;
}

/// Spawns `lumino-monitor` as a child process.
#[derive(Debug)]
pub struct MonitorSupervisor {
    program: PathBuf,
    args: Vec<String>,
    grace: Duration,
    child: Option<Child>,
}

impl MonitorSupervisor {
    pub fn new(program: PathBuf, args: Vec<String>, grace: Duration) -> Self {
        Self {
            program,
            args,
            grace,
            child: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.monitor.program_path(),
            config.monitor.args.clone(),
            Duration::from_millis(config.supervisor.grace_period_ms),
        )
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(|c| c.id())
    }

    pub fn is_alive(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Spawn the monitor. No-op while the previous child is still alive.
    pub fn spawn(&mut self) -> Result<u32> {
        if self.is_alive() {
            if let Some(pid) = self.pid() {
                tracing::debug!("Monitor already running (pid {})", pid);
                return Ok(pid);
            }
        }
        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| LuminoError::Spawn {
                program: self.program.display().to_string(),
                message: e.to_string(),
            })?;
        let pid = child.id().unwrap_or_default();
        tracing::info!("Started monitor {} (pid {})", self.program.display(), pid);
        self.child = Some(child);
        Ok(pid)
    }

    /// Ask the monitor to exit, then force-kill it after the grace period.
    pub async fn terminate(&mut self) -> std::result::Result<(), ProcessTerminationError> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        if let Ok(Some(status)) = child.try_wait() {
            tracing::debug!("Monitor already exited: {}", status);
            return Ok(());
        }
        let pid = child.id().unwrap_or_default();

        #[cfg(unix)]
        {
            let sent = Command::new("kill")
                .args(["-TERM", &pid.to_string()])
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await
                .map(|s| s.success())
                .unwrap_or(false);
            if sent {
                if let Ok(waited) = tokio::time::timeout(self.grace, child.wait()).await {
                    match waited {
                        Ok(status) => tracing::info!("Monitor (pid {}) exited: {}", pid, status),
                        Err(e) => tracing::warn!("Waiting for monitor (pid {}) failed: {}", pid, e),
                    }
                    return Ok(());
                }
            }
        }

        child.kill().await.map_err(ProcessTerminationError::Kill)?;
        if cfg!(unix) {
            Err(ProcessTerminationError::GraceExpired {
                pid,
                grace_ms: self.grace.as_millis() as u64,
            })
        } else {
            tracing::info!("Monitor (pid {}) killed", pid);
            Ok(())
        }
    }
}

#[async_trait]
impl MonitorLauncher for MonitorSupervisor {
    async fn ensure_running(&mut self) -> Result<()> {
        self.spawn().map(|_| ())
    }

    async fn shutdown(&mut self) -> Result<()> {
        self.terminate().await.map_err(Into::into)
    }
}

/// A monitor started by someone else (`lumino run --attach`, tests).
#[derive(Debug, Default)]
pub struct ExternalMonitor {
    pub launches: u32,
    pub shutdowns: u32,
}

#[async_trait]
impl MonitorLauncher for ExternalMonitor {
    async fn ensure_running(&mut self) -> Result<()> {
        self.launches += 1;
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<()> {
        self.shutdowns += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_spawn_missing_program() {
        let mut sup = MonitorSupervisor::new(
            PathBuf::from("/nonexistent/lumino-monitor"),
            Vec::new(),
            Duration::from_millis(100),
        );
        let err = sup.spawn().unwrap_err();
        assert!(matches!(err, LuminoError::Spawn { .. }));
        assert!(!sup.is_alive());
    }

    #[tokio::test]
    async fn test_terminate_without_child_is_noop() {
        let mut sup =
            MonitorSupervisor::new(PathBuf::from("unused"), Vec::new(), Duration::from_millis(10));
        assert!(sup.terminate().await.is_ok());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spawn_is_idempotent_and_terminates() {
        let mut sup = MonitorSupervisor::new(
            PathBuf::from("sleep"),
            vec!["30".into()],
            Duration::from_secs(5),
        );
        let first = sup.spawn().unwrap();
        let second = sup.spawn().unwrap();
        assert_eq!(first, second);
        assert!(sup.is_alive());

        sup.terminate().await.unwrap();
        assert!(!sup.is_alive());
        assert!(sup.pid().is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_ignored_sigterm_escalates_to_kill() {
        let mut sup = MonitorSupervisor::new(
            PathBuf::from("sh"),
            vec!["-c".into(), "trap '' TERM; sleep 5".into()],
            Duration::from_millis(200),
        );
        sup.spawn().unwrap();
        // Let the shell install its trap.
        tokio::time::sleep(Duration::from_millis(200)).await;
        let err = sup.terminate().await.unwrap_err();
        assert!(matches!(err, ProcessTerminationError::GraceExpired { .. }));
    }

    #[tokio::test]
    async fn test_external_monitor_counts_calls() {
        let mut ext = ExternalMonitor::default();
        ext.ensure_running().await.unwrap();
        ext.shutdown().await.unwrap();
        assert_eq!((ext.launches, ext.shutdowns), (1, 1));
    }
}
