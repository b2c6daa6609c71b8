// src/sync/mod.rs — Controller/monitor synchronisation over loopback TCP

pub mod link;
pub mod monitor;
pub mod protocol;

pub use link::MonitorLink;
pub use monitor::{MonitorEvent, MonitorReadout, MonitorServer, MonitorState};
pub use protocol::{
    decode_message, encode_frame, FrameDecoder, ParameterUpdate, SyncMessage, TherapySnapshot,
};
