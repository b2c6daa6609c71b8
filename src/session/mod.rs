// src/session/mod.rs — Session model shared by controller and monitor

pub mod clock;
pub mod descriptor;
pub mod params;
pub mod timer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use params::TherapyParameters;
pub use timer::{SessionPhase, SessionState, SessionTimer, Tick, COMPLETION_EPSILON_S};
