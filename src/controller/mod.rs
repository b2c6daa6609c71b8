// src/controller/mod.rs — Controller session: owns settings, timer and monitor link
//
// A single task owns `ControllerSession` and is the only writer of its timer.
// Operator commands, the completion poll and the periodic sync all arrive as
// method calls on that task.

pub mod command;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::dosimetry::{
    average_power, format_joules, format_minutes, round2, DeviceSetting, PetInputs, PetSolution,
    PetTarget,
};
use crate::infra::config::Config;
use crate::infra::errors::{ConnectionError, LuminoError, Result};
use crate::session::{Clock, SessionPhase, SessionTimer, TherapyParameters};
use crate::supervisor::MonitorLauncher;
use crate::sync::{MonitorLink, ParameterUpdate, SyncMessage, TherapySnapshot};

pub use command::OperatorCommand;

pub struct ControllerSession {
    config: Config,
    device: DeviceSetting,
    inputs: PetInputs,
    params: TherapyParameters,
    timer: SessionTimer,
    session_id: Option<String>,
    link: Option<MonitorLink>,
    launcher: Box<dyn MonitorLauncher>,
    clock: Arc<dyn Clock>,
}

impl ControllerSession {
    pub fn new(
        config: Config,
        device: DeviceSetting,
        launcher: Box<dyn MonitorLauncher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            device,
            inputs: PetInputs::default(),
            params: TherapyParameters::default(),
            timer: SessionTimer::new(),
            session_id: None,
            link: None,
            launcher,
            clock,
        }
    }

    pub fn device(&self) -> &DeviceSetting {
        &self.device
    }

    pub fn inputs(&self) -> &PetInputs {
        &self.inputs
    }

    pub fn timer(&self) -> &SessionTimer {
        &self.timer
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn is_live(&self) -> bool {
        matches!(
            self.timer.phase(),
            SessionPhase::Running | SessionPhase::Paused
        )
    }

    pub fn monitor_connected(&self) -> bool {
        self.link.as_ref().is_some_and(|l| l.is_connected())
    }

    pub fn avg_power(&self) -> f64 {
        average_power(&self.device)
    }

    /// Take targets and labels from a session descriptor.
    ///
    /// Neither target counts as edited, so the configured ambiguous target
    /// decides when both are set.
    pub fn load_parameters(&mut self, params: &TherapyParameters) -> Result<()> {
        if self.is_live() {
            return Err(LuminoError::InvalidTransition {
                op: "load parameters",
                state: self.timer.phase().to_string(),
            });
        }
        self.timer.stop();
        self.inputs = PetInputs {
            energy_j: params.total_energy_j,
            time_min: params.time_min,
            last_edited: None,
        };
        self.params = params.clone();
        Ok(())
    }

    /// Solve the energy/time pair against the current average power.
    pub fn resolve(&mut self) -> Result<PetSolution> {
        let avg = self.avg_power();
        let fallback = self.config.dosimetry.ambiguous_target;
        let target = self.inputs.authoritative(fallback).ok_or_else(|| {
            LuminoError::InvalidParameters(
                "Please set a valid target Energy or Time for the therapy.".into(),
            )
        })?;
        if matches!(target, PetTarget::Energy(_)) && !(avg > 0.0) {
            return Err(LuminoError::InvalidParameters(
                "Average power is 0. Cannot deliver target energy. Adjust power settings.".into(),
            ));
        }
        self.inputs
            .resolve(avg, fallback)
            .ok_or_else(|| LuminoError::InvalidParameters("No therapy target set.".into()))
    }

    pub async fn set_energy(&mut self, energy_j: f64) -> Result<()> {
        let before = (self.inputs.clone(), self.device.clone());
        self.inputs.edit_energy(energy_j);
        self.commit_edit(before).await
    }

    pub async fn set_time(&mut self, time_min: f64) -> Result<()> {
        let before = (self.inputs.clone(), self.device.clone());
        self.inputs.edit_time(time_min);
        self.commit_edit(before).await
    }

    pub async fn set_master_power(&mut self, watts: u8) -> Result<()> {
        let before = (self.inputs.clone(), self.device.clone());
        self.device.set_master_power(watts)?;
        self.commit_edit(before).await
    }

    /// Apply an edit already made to `inputs`/`device`, restoring both if it is rejected.
    async fn commit_edit(&mut self, before: (PetInputs, DeviceSetting)) -> Result<()> {
        if let Err(e) = self.apply_live_edit().await {
            (self.inputs, self.device) = before;
            return Err(e);
        }
        Ok(())
    }

    /// Re-solve after an edit; while live, move the session length and tell the monitor.
    async fn apply_live_edit(&mut self) -> Result<()> {
        let solution = match self.resolve() {
            Ok(s) => s,
            // Targets may be half-entered before a session starts.
            Err(_) if !self.is_live() => return Ok(()),
            Err(e) => return Err(e),
        };
        if self.is_live() {
            let now = self.clock.now();
            self.timer.set_total_duration(solution.time_s, now);
            tracing::info!(
                "Session length changed to {:.2} s ({:.2} J)",
                solution.time_s,
                solution.energy_j
            );
            self.push_update(None).await;
        }
        Ok(())
    }

    /// Validate, launch the monitor, connect, then start the timer.
    ///
    /// Nothing is left running when any step fails.
    pub async fn start(&mut self) -> Result<()> {
        if self.is_live() {
            return Err(LuminoError::InvalidTransition {
                op: "start",
                state: self.timer.phase().to_string(),
            });
        }
        self.device.validate_for_start()?;
        let solution = self.resolve()?;
        self.timer.arm_duration(solution.time_s)?;

        if let Err(e) = self.launcher.ensure_running().await {
            self.timer.stop();
            return Err(e);
        }
        let startup = Duration::from_millis(self.config.monitor.startup_delay_ms);
        if !startup.is_zero() {
            tokio::time::sleep(startup).await;
        }

        let sync = &self.config.sync;
        let link = match MonitorLink::connect_with_retry(
            &sync.addr(),
            sync.connect_attempts,
            sync.connect_delay(),
        )
        .await
        {
            Ok(link) => link,
            Err(e) => {
                self.abort_start().await;
                return Err(e);
            }
        };
        self.link = Some(link);

        let now = self.clock.now();
        if let Err(e) = self.timer.start(now) {
            self.abort_start().await;
            return Err(e);
        }
        let session_id = uuid::Uuid::new_v4().to_string();
        self.session_id = Some(session_id.clone());

        let msg = SyncMessage::StartTherapy(self.snapshot(now));
        if let Err(e) = self.send(&msg).await {
            self.abort_start().await;
            return Err(e);
        }
        tracing::info!(
            "Session {} started: {:.2} s at {:.2} W",
            session_id,
            solution.time_s,
            self.avg_power()
        );
        Ok(())
    }

    async fn abort_start(&mut self) {
        if let Some(mut link) = self.link.take() {
            link.close().await;
        }
        if let Err(e) = self.launcher.shutdown().await {
            tracing::warn!("{}", e);
        }
        self.timer.stop();
        self.session_id = None;
    }

    pub async fn pause(&mut self) -> Result<()> {
        let was_paused = self.timer.is_paused();
        self.timer.pause(self.clock.now())?;
        if !was_paused {
            tracing::info!("Session paused");
            self.push_update(Some(true)).await;
        }
        Ok(())
    }

    pub async fn resume(&mut self) -> Result<()> {
        if !self.timer.is_paused() {
            return Err(LuminoError::InvalidTransition {
                op: "resume",
                state: self.timer.phase().to_string(),
            });
        }
        self.timer.resume(self.clock.now())?;
        tracing::info!("Session resumed");
        self.push_update(Some(false)).await;
        Ok(())
    }

    /// Stop from any state. Monitor errors are logged, never returned.
    pub async fn stop(&mut self) {
        if self.link.is_some() {
            if let Err(e) = self.send(&SyncMessage::StopTherapy).await {
                tracing::warn!("Could not notify monitor of stop: {}", e);
            }
        }
        self.release_monitor().await;
        if self.timer.phase() != SessionPhase::Idle {
            tracing::info!("Session stopped");
        }
        self.timer.stop();
        self.session_id = None;
    }

    /// Check for completion. Returns true on the tick the session finished.
    pub async fn poll(&mut self) -> bool {
        let tick = self.timer.tick(self.clock.now());
        if !tick.just_completed {
            return false;
        }
        tracing::info!(
            "Session {} complete",
            self.session_id.as_deref().unwrap_or("-")
        );
        if self.link.is_some() {
            if let Err(e) = self.send(&SyncMessage::TherapyCompleted).await {
                tracing::warn!("Could not notify monitor of completion: {}", e);
            }
        }
        self.release_monitor().await;
        self.session_id = None;
        true
    }

    /// Periodic refresh; reconnects and replays the session if the link dropped.
    pub async fn sync(&mut self) {
        if !self.is_live() {
            return;
        }
        if self.monitor_connected() {
            self.push_update(Some(self.timer.is_paused())).await;
            return;
        }

        tracing::info!("Monitor link down; reconnecting");
        if let Err(e) = self.launcher.ensure_running().await {
            tracing::warn!("{}", e);
            return;
        }
        let addr = self.config.sync.addr();
        match MonitorLink::connect_with_retry(&addr, 1, Duration::ZERO).await {
            Ok(link) => self.link = Some(link),
            Err(e) => {
                tracing::debug!("{}", e);
                return;
            }
        }
        let now = self.clock.now();
        let replay = SyncMessage::StartTherapy(self.snapshot(now));
        if let Err(e) = self.send(&replay).await {
            tracing::warn!("{}", e);
            return;
        }
        if self.timer.is_paused() {
            self.push_update(Some(true)).await;
        }
    }

    pub fn snapshot(&self, now: f64) -> TherapySnapshot {
        TherapySnapshot {
            session_id: self.session_id.clone().unwrap_or_default(),
            device: self.device.clone(),
            set_power: self.avg_power(),
            set_energy: self.inputs.energy_j,
            set_time_min: self.timer.total_duration_s() / 60.0,
            therapy_end_time: self.timer.projected_end_ts(now),
            condition: self.params.condition.clone(),
            body_part: self.params.body_part.clone(),
        }
    }

    pub fn update(&self, now: f64, paused: Option<bool>) -> ParameterUpdate {
        ParameterUpdate {
            set_energy: Some(self.inputs.energy_j),
            set_power: Some(self.avg_power()),
            frequency: Some(self.device.frequency_hz),
            set_time_min: Some(self.timer.total_duration_s() / 60.0),
            delivery_mode: Some(self.device.delivery_mode),
            paused,
            therapy_end_time: Some(self.timer.projected_end_ts(now)),
        }
    }

    async fn push_update(&mut self, paused: Option<bool>) {
        if self.link.is_none() {
            return;
        }
        let msg = SyncMessage::UpdateParameters(self.update(self.clock.now(), paused));
        if let Err(e) = self.send(&msg).await {
            tracing::warn!("Monitor update failed: {}", e);
        }
    }

    async fn send(&mut self, msg: &SyncMessage) -> Result<()> {
        let link = self
            .link
            .as_mut()
            .ok_or(LuminoError::Connection(ConnectionError::Closed))?;
        link.send(msg).await
    }

    async fn release_monitor(&mut self) {
        if let Some(mut link) = self.link.take() {
            link.close().await;
        }
        if let Err(e) = self.launcher.shutdown().await {
            tracing::warn!("{}", e);
        }
    }

    pub fn status(&self) -> ControllerStatus {
        let now = self.clock.now();
        let mut timer = self.timer.clone();
        let tick = timer.tick(now);
        ControllerStatus {
            phase: self.timer.phase(),
            remaining_s: tick.remaining_s,
            delivered_energy_j: self.timer.delivered_energy_j(self.avg_power(), now),
            target_energy_j: self.inputs.energy_j,
            time_min: self.inputs.time_min,
            avg_power_w: self.avg_power(),
            monitor_connected: self.monitor_connected(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControllerStatus {
    pub phase: SessionPhase,
    pub remaining_s: f64,
    pub delivered_energy_j: f64,
    pub target_energy_j: f64,
    pub time_min: f64,
    pub avg_power_w: f64,
    pub monitor_connected: bool,
}

impl fmt::Display for ControllerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} min left | {} J delivered | target {} J / {} min | {} W | monitor {}",
            self.phase,
            format_minutes(self.remaining_s),
            format_joules(self.delivered_energy_j),
            round2(self.target_energy_j),
            round2(self.time_min),
            round2(self.avg_power_w),
            if self.monitor_connected {
                "connected"
            } else {
                "offline"
            }
        )
    }
}
