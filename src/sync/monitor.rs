// src/sync/monitor.rs — Monitor side: socket server and session replica
//
// The server task only decodes frames and forwards them over a channel. The
// owning task applies them to `MonitorState`, which it alone mutates, and
// ticks the display independently of socket reads.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use super::protocol::{FrameDecoder, ParameterUpdate, SyncMessage, TherapySnapshot};
use crate::dosimetry::{format_joules, format_minutes, round2, DeliveryMode, TargetKind};
use crate::infra::config::SyncConfig;
use crate::infra::errors::{ConnectionError, LuminoError, Result};
use crate::session::{SessionPhase, SessionTimer, TherapyParameters};

const ACCEPT_RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    Connected(SocketAddr),
    Message(SyncMessage),
    /// Zero-length read or socket error; the server goes back to accepting.
    Disconnected,
}

/// Loopback server the controller connects to.
#[derive(Debug)]
pub struct MonitorServer {
    listener: TcpListener,
    read_buffer: usize,
}

impl MonitorServer {
    pub async fn bind(config: &SyncConfig) -> Result<Self> {
        let listener = TcpListener::bind(config.addr()).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::AddrInUse {
                ConnectionError::BindInUse {
                    host: config.host.clone(),
                    port: config.port,
                }
            } else {
                ConnectionError::Io(e)
            }
        })?;
        tracing::info!("Monitor listening on {}", config.addr());
        Ok(Self {
            listener,
            read_buffer: config.read_buffer_bytes.max(1),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept one controller at a time until the receiver goes away.
    pub async fn run(self, tx: mpsc::Sender<MonitorEvent>) -> Result<()> {
        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!("Accept failed: {}; retrying", e);
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                    continue;
                }
            };
            tracing::info!("Controller connected from {}", peer);
            if tx.send(MonitorEvent::Connected(peer)).await.is_err() {
                return Ok(());
            }
            serve_connection(stream, self.read_buffer, &tx).await;
            if tx.is_closed() {
                return Ok(());
            }
        }
    }
}

async fn serve_connection(mut stream: TcpStream, read_buffer: usize, tx: &mpsc::Sender<MonitorEvent>) {
    let mut buf = vec![0u8; read_buffer];
    let mut decoder = FrameDecoder::default();
    loop {
        match stream.read(&mut buf).await {
            Ok(0) => {
                tracing::info!("Controller closed the connection");
                break;
            }
            Ok(n) => {
                for decoded in decoder.push(&buf[..n]) {
                    match decoded {
                        Ok(msg) => {
                            tracing::debug!("Received {}", msg.command());
                            if tx.send(MonitorEvent::Message(msg)).await.is_err() {
                                return;
                            }
                        }
                        Err(e) => tracing::warn!("{}", e),
                    }
                }
            }
            Err(e) => {
                tracing::warn!("Socket read failed: {}", e);
                break;
            }
        }
    }
    let _ = tx.send(MonitorEvent::Disconnected).await;
}

/// The monitor's copy of the running session.
#[derive(Debug, Clone, Default)]
pub struct MonitorState {
    timer: SessionTimer,
    pub target_energy_j: f64,
    pub avg_power_w: f64,
    pub frequency_hz: u32,
    pub label: String,
    pub session_id: Option<String>,
}

impl MonitorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-fill the display from the session descriptor and arm the timer.
    pub fn from_parameters(params: &TherapyParameters, prefer: TargetKind) -> Self {
        let mut state = Self {
            target_energy_j: params.total_energy_j,
            avg_power_w: params.power_w,
            frequency_hz: params.pulse_freq_hz,
            label: params.label(),
            ..Self::default()
        };
        if let Err(e) = state.timer.arm(params, prefer) {
            tracing::warn!("Descriptor parameters cannot arm the timer: {}", e);
        }
        state
    }

    pub fn timer(&self) -> &SessionTimer {
        &self.timer
    }

    pub fn phase(&self) -> SessionPhase {
        self.timer.phase()
    }

    /// Apply one message from the controller. Last message wins.
    pub fn apply(&mut self, msg: SyncMessage, now: f64) -> Result<()> {
        match msg {
            SyncMessage::StartTherapy(snapshot) => self.start(snapshot, now),
            SyncMessage::UpdateParameters(update) => self.update(update, now),
            SyncMessage::StopTherapy | SyncMessage::TherapyCompleted => {
                tracing::info!("Received {}; monitor reset", msg.command());
                self.reset();
                Ok(())
            }
        }
    }

    pub fn reset(&mut self) {
        self.timer.stop();
        self.session_id = None;
    }

    fn start(&mut self, snapshot: TherapySnapshot, now: f64) -> Result<()> {
        self.timer.stop();
        let params = snapshot.parameters();
        self.target_energy_j = snapshot.set_energy;
        self.avg_power_w = snapshot.set_power;
        self.frequency_hz = snapshot.device.frequency_hz;
        if snapshot.device.delivery_mode != DeliveryMode::Unset {
            self.label = snapshot.device.delivery_mode.label().to_string();
        } else if !params.body_part.is_empty() {
            self.label = params.label();
        }

        let total = params.total_duration_s(TargetKind::Time)?;
        self.timer.arm_duration(total)?;
        self.timer.start(now)?;
        self.timer.resync_end(snapshot.therapy_end_time, now);
        tracing::info!(
            "Session {} started: {:.2} s, ends at {:.3}",
            snapshot.session_id,
            total,
            self.timer.projected_end_ts(now)
        );
        self.session_id = Some(snapshot.session_id);
        Ok(())
    }

    fn update(&mut self, update: ParameterUpdate, now: f64) -> Result<()> {
        if let Some(energy) = update.set_energy {
            self.target_energy_j = energy;
        }
        if let Some(power) = update.set_power {
            self.avg_power_w = power;
        }
        if let Some(freq) = update.frequency {
            self.frequency_hz = freq;
        }
        if let Some(mode) = update.delivery_mode {
            if mode != DeliveryMode::Unset {
                self.label = mode.label().to_string();
            }
        }
        if let Some(minutes) = update.set_time_min {
            self.timer.set_total_duration(minutes * 60.0, now);
        }

        match (update.paused, self.timer.phase()) {
            (Some(true), SessionPhase::Running) => {
                self.timer.pause(now)?;
                tracing::info!("Session paused by controller");
            }
            (Some(false), SessionPhase::Paused) => {
                self.timer.resume(now)?;
                tracing::info!("Session resumed by controller");
            }
            // Replica missed start_therapy but the controller is running.
            (Some(false), SessionPhase::Armed)
                if update.therapy_end_time.is_some_and(|end| end > now) =>
            {
                self.timer.start(now)?;
                tracing::info!("Session recovered from periodic update");
            }
            _ => {}
        }

        if let Some(end) = update.therapy_end_time {
            self.timer.resync_end(end, now);
        }
        Ok(())
    }

    /// Local play/pause from the monitor's own operator.
    ///
    /// Runs an armed or paused session for whatever time is left, or pauses a
    /// running one. Returns the phase after the toggle.
    pub fn toggle(&mut self, now: f64) -> Result<SessionPhase> {
        if self.timer.is_running() {
            self.timer.pause(now)?;
            tracing::info!(
                "Session paused locally at {:.2} s elapsed",
                self.timer.elapsed_s(now)
            );
            return Ok(SessionPhase::Paused);
        }
        if !(self.avg_power_w > 0.0) || !(self.timer.total_duration_s() > 0.0) {
            return Err(LuminoError::InvalidParameters(
                "No valid therapy time or power set. Load therapy data first.".into(),
            ));
        }
        match self.timer.start(now) {
            Ok(()) => {
                tracing::info!(
                    "Session started locally, ends at {:.3}",
                    self.timer.projected_end_ts(now)
                );
                Ok(SessionPhase::Running)
            }
            Err(LuminoError::AlreadyComplete) => {
                self.reset();
                Err(LuminoError::AlreadyComplete)
            }
            Err(e) => Err(e),
        }
    }

    /// Recompute the display at `now`.
    pub fn tick(&mut self, now: f64) -> MonitorReadout {
        let tick = self.timer.tick(now);
        if tick.just_completed {
            tracing::info!("Therapy complete");
        }
        MonitorReadout {
            phase: tick.phase,
            remaining_s: tick.remaining_s,
            delivered_energy_j: self.timer.delivered_energy_j(self.avg_power_w, now),
            target_energy_j: self.target_energy_j,
            avg_power_w: self.avg_power_w,
            frequency_hz: self.frequency_hz,
            label: self.label.clone(),
            just_completed: tick.just_completed,
        }
    }
}

/// What the monitor shows on each tick.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorReadout {
    pub phase: SessionPhase,
    pub remaining_s: f64,
    pub delivered_energy_j: f64,
    pub target_energy_j: f64,
    pub avg_power_w: f64,
    pub frequency_hz: u32,
    pub label: String,
    pub just_completed: bool,
}

impl fmt::Display for MonitorReadout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = if self.label.is_empty() {
            "N/A"
        } else {
            self.label.as_str()
        };
        write!(
            f,
            "[{}] {} min | {} J of {} J | {} W | {} Hz | {}",
            self.phase,
            format_minutes(self.remaining_s),
            format_joules(self.delivered_energy_j),
            round2(self.target_energy_j),
            round2(self.avg_power_w),
            self.frequency_hz,
            label
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dosimetry::DeviceSetting;

    const T0: f64 = 1_700_000_000.0;

    fn snapshot(time_min: f64, end: f64) -> SyncMessage {
        SyncMessage::StartTherapy(TherapySnapshot {
            session_id: "s-1".into(),
            device: DeviceSetting::default(),
            set_power: 5.0,
            set_energy: 5.0 * time_min * 60.0,
            set_time_min: time_min,
            therapy_end_time: end,
            condition: String::new(),
            body_part: String::new(),
        })
    }

    fn update(u: ParameterUpdate) -> SyncMessage {
        SyncMessage::UpdateParameters(u)
    }

    #[test]
    fn test_start_follows_transmitted_end_time() {
        let mut m = MonitorState::new();
        // Controller started 3 s before the message arrived.
        m.apply(snapshot(1.0, T0 + 57.0), T0).unwrap();
        let r = m.tick(T0);
        assert_eq!(r.phase, SessionPhase::Running);
        assert!((r.remaining_s - 57.0).abs() < 1e-6);
        assert!((r.delivered_energy_j - 15.0).abs() < 1e-6);
    }

    #[test]
    fn test_pause_and_resume_propagation() {
        let mut m = MonitorState::new();
        m.apply(snapshot(1.0, T0 + 60.0), T0).unwrap();
        m.apply(
            update(ParameterUpdate {
                paused: Some(true),
                ..Default::default()
            }),
            T0 + 20.0,
        )
        .unwrap();
        assert_eq!(m.phase(), SessionPhase::Paused);
        assert!((m.tick(T0 + 100.0).remaining_s - 40.0).abs() < 1e-6);

        m.apply(
            update(ParameterUpdate {
                paused: Some(false),
                therapy_end_time: Some(T0 + 140.0),
                ..Default::default()
            }),
            T0 + 100.0,
        )
        .unwrap();
        assert_eq!(m.phase(), SessionPhase::Running);
        assert!((m.tick(T0 + 110.0).remaining_s - 30.0).abs() < 1e-6);
    }

    #[test]
    fn test_stop_resets_from_any_state() {
        let mut m = MonitorState::new();
        m.apply(snapshot(1.0, T0 + 60.0), T0).unwrap();
        m.apply(SyncMessage::StopTherapy, T0 + 1.0).unwrap();
        assert_eq!(m.phase(), SessionPhase::Idle);
        assert_eq!(m.tick(T0 + 2.0).remaining_s, 0.0);

        m.apply(SyncMessage::TherapyCompleted, T0 + 3.0).unwrap();
        assert_eq!(m.phase(), SessionPhase::Idle);
    }

    #[test]
    fn test_partial_update_leaves_other_fields() {
        let mut m = MonitorState::new();
        m.apply(snapshot(1.0, T0 + 60.0), T0).unwrap();
        m.apply(
            update(ParameterUpdate {
                frequency: Some(8700),
                delivery_mode: Some(DeliveryMode::FootSwitch),
                ..Default::default()
            }),
            T0 + 1.0,
        )
        .unwrap();
        assert_eq!(m.frequency_hz, 8700);
        assert_eq!(m.avg_power_w, 5.0);
        assert_eq!(m.label, "Foot Switch");
    }

    #[test]
    fn test_descriptor_prefill_is_armed_not_running() {
        let params = TherapyParameters {
            power_w: 36.0,
            pulse_freq_hz: 8700,
            total_energy_j: 3100.0,
            time_min: 11.0,
            condition: "TMDs".into(),
            body_part: "TMJ".into(),
        };
        let mut m = MonitorState::from_parameters(&params, TargetKind::Time);
        assert_eq!(m.phase(), SessionPhase::Armed);
        let r = m.tick(T0);
        assert!((r.remaining_s - 660.0).abs() < 1e-9);
        assert_eq!(r.label, "Tmj - TMDs");
    }

    fn descriptor_params() -> TherapyParameters {
        TherapyParameters {
            power_w: 36.0,
            pulse_freq_hz: 8700,
            total_energy_j: 3100.0,
            time_min: 11.0,
            condition: "TMDs".into(),
            body_part: "TMJ".into(),
        }
    }

    #[test]
    fn test_armed_replica_starts_from_periodic_update() {
        let mut m = MonitorState::from_parameters(&descriptor_params(), TargetKind::Time);
        m.apply(
            update(ParameterUpdate {
                paused: Some(false),
                therapy_end_time: Some(T0 + 300.0),
                ..Default::default()
            }),
            T0,
        )
        .unwrap();
        assert_eq!(m.phase(), SessionPhase::Running);
        let r = m.tick(T0 + 100.0);
        assert!((r.remaining_s - 200.0).abs() < 1e-6);
        // Elapsed follows the controller's end time, not the local arm.
        assert!((m.timer().elapsed_s(T0 + 100.0) - 460.0).abs() < 1e-6);
    }

    #[test]
    fn test_armed_replica_ignores_stale_end_time() {
        let mut m = MonitorState::from_parameters(&descriptor_params(), TargetKind::Time);
        m.apply(
            update(ParameterUpdate {
                paused: Some(false),
                therapy_end_time: Some(T0 - 5.0),
                ..Default::default()
            }),
            T0,
        )
        .unwrap();
        assert_eq!(m.phase(), SessionPhase::Armed);
    }

    #[test]
    fn test_toggle_runs_and_pauses_armed_session() {
        let mut m = MonitorState::from_parameters(&descriptor_params(), TargetKind::Time);
        assert_eq!(m.toggle(T0).unwrap(), SessionPhase::Running);
        assert!((m.tick(T0 + 60.0).remaining_s - 600.0).abs() < 1e-6);

        assert_eq!(m.toggle(T0 + 60.0).unwrap(), SessionPhase::Paused);
        assert!((m.tick(T0 + 500.0).remaining_s - 600.0).abs() < 1e-6);

        assert_eq!(m.toggle(T0 + 500.0).unwrap(), SessionPhase::Running);
        let r = m.tick(T0 + 560.0);
        assert!((r.remaining_s - 540.0).abs() < 1e-6);
        assert!((r.delivered_energy_j - 36.0 * 120.0).abs() < 1e-6);
    }

    #[test]
    fn test_toggle_without_power_or_time_refused() {
        let mut m = MonitorState::new();
        assert!(matches!(
            m.toggle(T0),
            Err(LuminoError::InvalidParameters(_))
        ));
        assert_eq!(m.phase(), SessionPhase::Idle);

        let params = TherapyParameters {
            power_w: 0.0,
            ..descriptor_params()
        };
        let mut m = MonitorState::from_parameters(&params, TargetKind::Time);
        assert!(m.toggle(T0).is_err());
        assert_eq!(m.phase(), SessionPhase::Armed);
    }

    #[test]
    fn test_toggle_after_time_elapsed_resets() {
        let mut m = MonitorState::new();
        m.apply(snapshot(1.0, T0 + 60.0), T0).unwrap();
        // Pause well past the end, before any tick saw it.
        m.toggle(T0 + 90.0).unwrap();
        assert_eq!(m.phase(), SessionPhase::Paused);
        assert!(matches!(
            m.toggle(T0 + 95.0),
            Err(LuminoError::AlreadyComplete)
        ));
        assert_eq!(m.phase(), SessionPhase::Idle);
    }

    #[test]
    fn test_readout_display() {
        let r = MonitorReadout {
            phase: SessionPhase::Running,
            remaining_s: 90.0,
            delivered_energy_j: 42.7,
            target_energy_j: 3100.0,
            avg_power_w: 36.0,
            frequency_hz: 8700,
            label: String::new(),
            just_completed: false,
        };
        assert_eq!(
            r.to_string(),
            "[running] 1.50 min | 0042 J of 3100 J | 36 W | 8700 Hz | N/A"
        );
    }
}
