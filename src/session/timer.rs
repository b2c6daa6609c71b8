// src/session/timer.rs — Pause/resume-aware session timer
//
// Remaining time is always derived from an absolute end timestamp, never by
// decrementing a counter. Uneven polling and a replica re-synchronising from a
// transmitted end time therefore cannot accumulate drift.
//
// Invariants:
//   elapsed_at_pause_s <= total_duration_s
//   Running => segment_end_ts == segment_start_ts + (total_duration_s - elapsed_at_pause_s)

use std::fmt;

use serde::{Deserialize, Serialize};

use super::params::TherapyParameters;
use crate::dosimetry::TargetKind;
use crate::infra::errors::{LuminoError, Result};

/// Remaining time at or below this counts as finished.
pub const COMPLETION_EPSILON_S: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    #[default]
    Idle,
    Armed,
    Running,
    Paused,
    Completed,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Armed => "armed",
            SessionPhase::Running => "running",
            SessionPhase::Paused => "paused",
            SessionPhase::Completed => "completed",
        };
        f.write_str(s)
    }
}

/// Plain snapshot of the timer's bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SessionState {
    pub total_duration_s: f64,
    pub elapsed_at_pause_s: f64,
    pub segment_start_ts: f64,
    pub segment_end_ts: f64,
    pub is_running: bool,
    pub is_paused: bool,
}

/// Result of one `tick`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    pub remaining_s: f64,
    pub phase: SessionPhase,
    /// True only on the tick that moved Running -> Completed.
    pub just_completed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SessionTimer {
    phase: SessionPhase,
    total_duration_s: f64,
    elapsed_at_pause_s: f64,
    segment_start_ts: f64,
    segment_end_ts: f64,
}

impl SessionTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_running(&self) -> bool {
        self.phase == SessionPhase::Running
    }

    pub fn is_paused(&self) -> bool {
        self.phase == SessionPhase::Paused
    }

    pub fn total_duration_s(&self) -> f64 {
        self.total_duration_s
    }

    pub fn state(&self) -> SessionState {
        SessionState {
            total_duration_s: self.total_duration_s,
            elapsed_at_pause_s: self.elapsed_at_pause_s,
            segment_start_ts: self.segment_start_ts,
            segment_end_ts: self.segment_end_ts,
            is_running: self.is_running(),
            is_paused: self.is_paused(),
        }
    }

    /// Load parameters and compute the session length.
    ///
    /// Rejected while a session is live. On invalid parameters the timer is
    /// left Idle with nothing retained.
    pub fn arm(&mut self, params: &TherapyParameters, prefer: TargetKind) -> Result<()> {
        self.ensure_not_live("arm")?;
        self.stop();
        let total = params.total_duration_s(prefer)?;
        self.arm_duration(total)
    }

    /// Arm with an already-computed duration in seconds.
    pub fn arm_duration(&mut self, total_duration_s: f64) -> Result<()> {
        self.ensure_not_live("arm")?;
        self.stop();
        if !(total_duration_s > 0.0) || !total_duration_s.is_finite() {
            return Err(LuminoError::InvalidParameters(format!(
                "Calculated therapy duration must be positive, got {:.2}s",
                total_duration_s
            )));
        }
        self.total_duration_s = total_duration_s;
        self.phase = SessionPhase::Armed;
        Ok(())
    }

    /// Begin (or continue) a segment at `now`.
    pub fn start(&mut self, now: f64) -> Result<()> {
        match self.phase {
            SessionPhase::Idle | SessionPhase::Armed | SessionPhase::Paused => {}
            other => {
                return Err(LuminoError::InvalidTransition {
                    op: "start",
                    state: other.to_string(),
                })
            }
        }
        let remaining = self.total_duration_s - self.elapsed_at_pause_s;
        if remaining <= COMPLETION_EPSILON_S {
            return Err(LuminoError::AlreadyComplete);
        }
        self.segment_start_ts = now;
        self.segment_end_ts = now + remaining;
        self.phase = SessionPhase::Running;
        Ok(())
    }

    pub fn resume(&mut self, now: f64) -> Result<()> {
        self.start(now)
    }

    /// Close the current segment. A second pause is a no-op.
    pub fn pause(&mut self, now: f64) -> Result<()> {
        match self.phase {
            SessionPhase::Paused => return Ok(()),
            SessionPhase::Running => {}
            other => {
                return Err(LuminoError::InvalidTransition {
                    op: "pause",
                    state: other.to_string(),
                })
            }
        }
        self.elapsed_at_pause_s = self.elapsed_s(now);
        self.phase = SessionPhase::Paused;
        Ok(())
    }

    /// Reset to Idle. Reachable from every state.
    pub fn stop(&mut self) {
        *self = Self::default();
    }

    /// Remaining seconds at `now`.
    ///
    /// The only mutation is a live session with nothing left moving to
    /// Completed. A Paused session whose total was cut below its elapsed
    /// time completes here too.
    pub fn tick(&mut self, now: f64) -> Tick {
        let remaining_s = match self.phase {
            SessionPhase::Running => self.segment_end_ts - now,
            SessionPhase::Paused => self.total_duration_s - self.elapsed_at_pause_s,
            SessionPhase::Completed => 0.0,
            SessionPhase::Idle | SessionPhase::Armed => {
                (self.total_duration_s - self.elapsed_at_pause_s).max(0.0)
            }
        };
        if self.is_live() && remaining_s <= COMPLETION_EPSILON_S {
            self.elapsed_at_pause_s = self.total_duration_s;
            self.phase = SessionPhase::Completed;
            return Tick {
                remaining_s: 0.0,
                phase: SessionPhase::Completed,
                just_completed: true,
            };
        }
        Tick {
            remaining_s,
            phase: self.phase,
            just_completed: false,
        }
    }

    /// Total time spent Running, clamped to the session length.
    pub fn elapsed_s(&self, now: f64) -> f64 {
        let segment = if self.is_running() {
            now - self.segment_start_ts
        } else {
            0.0
        };
        (self.elapsed_at_pause_s + segment).clamp(0.0, self.total_duration_s)
    }

    pub fn delivered_energy_j(&self, avg_power_w: f64, now: f64) -> f64 {
        avg_power_w * self.elapsed_s(now)
    }

    /// Change the session length without restarting the clock.
    ///
    /// Elapsed time is kept; while Running the end timestamp moves. A total
    /// shorter than what already elapsed completes on the next tick, whether
    /// Running or Paused.
    pub fn set_total_duration(&mut self, total_duration_s: f64, now: f64) {
        let total = total_duration_s.max(0.0);
        match self.phase {
            SessionPhase::Running => {
                let elapsed = self.elapsed_s(now);
                self.total_duration_s = total;
                // Fold the open segment so the invariant holds with the new total.
                self.elapsed_at_pause_s = elapsed.min(total);
                self.segment_start_ts = now;
                self.segment_end_ts = now + (total - self.elapsed_at_pause_s);
            }
            SessionPhase::Paused => {
                self.total_duration_s = total;
                self.elapsed_at_pause_s = self.elapsed_at_pause_s.min(total);
            }
            SessionPhase::Idle | SessionPhase::Armed => {
                self.total_duration_s = total;
                self.elapsed_at_pause_s = 0.0;
                self.phase = if total > 0.0 {
                    SessionPhase::Armed
                } else {
                    SessionPhase::Idle
                };
            }
            SessionPhase::Completed => {}
        }
    }

    /// Align a Running timer with an end timestamp received from its peer.
    ///
    /// The elapsed time implied by `end_ts` replaces the local one.
    pub fn resync_end(&mut self, end_ts: f64, now: f64) {
        if !self.is_running() || !(end_ts > 0.0) {
            return;
        }
        let remaining = (end_ts - now).clamp(0.0, self.total_duration_s);
        let elapsed = self.total_duration_s - remaining;
        self.elapsed_at_pause_s = elapsed;
        self.segment_start_ts = now;
        self.segment_end_ts = now + remaining;
    }

    /// Absolute end time if the session kept running from `now`.
    pub fn projected_end_ts(&self, now: f64) -> f64 {
        match self.phase {
            SessionPhase::Running => self.segment_end_ts,
            SessionPhase::Armed | SessionPhase::Paused => {
                now + (self.total_duration_s - self.elapsed_at_pause_s)
            }
            SessionPhase::Idle | SessionPhase::Completed => 0.0,
        }
    }

    fn is_live(&self) -> bool {
        matches!(self.phase, SessionPhase::Running | SessionPhase::Paused)
    }

    fn ensure_not_live(&self, op: &'static str) -> Result<()> {
        if self.is_live() {
            return Err(LuminoError::InvalidTransition {
                op,
                state: self.phase.to_string(),
            });
        }
        Ok(())
    }
}
