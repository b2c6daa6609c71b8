// src/sync/protocol.rs — Controller/monitor wire messages and framing
//
// One JSON object per message, tagged by `command`, terminated by '\n'.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dosimetry::{DeliveryMode, DeviceSetting};
use crate::infra::errors::{LuminoError, Result};
use crate::session::TherapyParameters;

/// Buffered bytes without a complete frame beyond this are discarded.
pub const MAX_FRAME_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum SyncMessage {
    StartTherapy(TherapySnapshot),
    UpdateParameters(ParameterUpdate),
    StopTherapy,
    TherapyCompleted,
}

impl SyncMessage {
    pub fn command(&self) -> &'static str {
        match self {
            SyncMessage::StartTherapy(_) => "start_therapy",
            SyncMessage::UpdateParameters(_) => "update_parameters",
            SyncMessage::StopTherapy => "stop_therapy",
            SyncMessage::TherapyCompleted => "therapy_completed",
        }
    }
}

/// Everything the monitor needs to run its own copy of the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TherapySnapshot {
    #[serde(default)]
    pub session_id: String,
    #[serde(flatten)]
    pub device: DeviceSetting,
    /// Average power, W.
    pub set_power: f64,
    pub set_energy: f64,
    pub set_time_min: f64,
    /// Absolute Unix timestamp at which the controller expects to finish.
    pub therapy_end_time: f64,
    #[serde(default)]
    pub condition: String,
    #[serde(default)]
    pub body_part: String,
}

impl TherapySnapshot {
    pub fn parameters(&self) -> TherapyParameters {
        TherapyParameters {
            power_w: self.set_power,
            pulse_freq_hz: self.device.frequency_hz,
            total_energy_j: self.set_energy,
            time_min: self.set_time_min,
            condition: self.condition.clone(),
            body_part: self.body_part.clone(),
        }
    }
}

/// Partial update; the monitor applies only the fields present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_energy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_power: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_time_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_mode: Option<DeliveryMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub therapy_end_time: Option<f64>,
}

impl ParameterUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Serialize one message as a newline-terminated frame.
pub fn encode_frame(msg: &SyncMessage) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec(msg)
        .map_err(|e| LuminoError::MalformedMessage(format!("encode {}: {}", msg.command(), e)))?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Decode a single frame body.
pub fn decode_message(bytes: &[u8]) -> Result<SyncMessage> {
    let value: Value = serde_json::from_slice(bytes).map_err(|e| malformed(bytes, &e))?;
    message_from_value(value, bytes)
}

fn message_from_value(value: Value, raw: &[u8]) -> Result<SyncMessage> {
    if !value.is_object() {
        return Err(LuminoError::MalformedMessage(format!(
            "expected a JSON object, got {}",
            preview(raw)
        )));
    }
    serde_json::from_value(value).map_err(|e| malformed(raw, &e))
}

fn malformed(raw: &[u8], e: &serde_json::Error) -> LuminoError {
    LuminoError::MalformedMessage(format!("{} ({})", e, preview(raw)))
}

fn preview(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    let text = text.trim();
    if text.chars().count() > 80 {
        format!("{}...", text.chars().take(80).collect::<String>())
    } else {
        text.to_string()
    }
}

/// Incremental decoder for a byte stream of frames.
///
/// Accepts newline-terminated frames and also bare concatenated objects from
/// peers that send one object per write. A frame that fails to decode yields
/// an error for that frame only; decoding continues with the next one.
#[derive(Debug)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    max_frame: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(MAX_FRAME_BYTES)
    }
}

impl FrameDecoder {
    pub fn new(max_frame: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_frame,
        }
    }

    /// Bytes held back waiting for the rest of a frame.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    pub fn push(&mut self, data: &[u8]) -> Vec<Result<SyncMessage>> {
        self.buf.extend_from_slice(data);
        let mut out = Vec::new();

        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            decode_line(&line[..pos], &mut out);
        }

        self.decode_tail(&mut out);

        if self.buf.len() > self.max_frame {
            out.push(Err(LuminoError::MalformedMessage(format!(
                "frame exceeds {} bytes without terminator; discarded",
                self.max_frame
            ))));
            self.buf.clear();
        }
        out
    }

    /// Try the unterminated remainder as bare objects, keeping a partial one.
    fn decode_tail(&mut self, out: &mut Vec<Result<SyncMessage>>) {
        if self.buf.iter().all(|b| b.is_ascii_whitespace()) {
            self.buf.clear();
            return;
        }
        let mut stream = serde_json::Deserializer::from_slice(&self.buf).into_iter::<Value>();
        let mut consumed = 0;
        let mut drop_rest = false;
        loop {
            match stream.next() {
                Some(Ok(value)) => {
                    let end = stream.byte_offset();
                    out.push(message_from_value(value, &self.buf[consumed..end]));
                    consumed = end;
                }
                Some(Err(e)) if e.is_eof() => break,
                Some(Err(e)) => {
                    out.push(Err(malformed(&self.buf[consumed..], &e)));
                    drop_rest = true;
                    break;
                }
                None => break,
            }
        }
        if drop_rest {
            self.buf.clear();
        } else {
            self.buf.drain(..consumed);
        }
    }
}

fn decode_line(line: &[u8], out: &mut Vec<Result<SyncMessage>>) {
    if line.iter().all(|b| b.is_ascii_whitespace()) {
        return;
    }
    let mut stream = serde_json::Deserializer::from_slice(line).into_iter::<Value>();
    let mut consumed = 0;
    loop {
        match stream.next() {
            Some(Ok(value)) => {
                let end = stream.byte_offset();
                out.push(message_from_value(value, &line[consumed..end]));
                consumed = end;
            }
            Some(Err(e)) => {
                out.push(Err(malformed(&line[consumed..], &e)));
                return;
            }
            None => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn update_time(min: f64) -> SyncMessage {
        SyncMessage::UpdateParameters(ParameterUpdate {
            set_time_min: Some(min),
            ..Default::default()
        })
    }

    #[test]
    fn test_command_tags() {
        let json = serde_json::to_string(&SyncMessage::StopTherapy).unwrap();
        assert_eq!(json, r#"{"command":"stop_therapy"}"#);
        let json = serde_json::to_string(&update_time(5.0)).unwrap();
        assert_eq!(json, r#"{"command":"update_parameters","set_time_min":5.0}"#);
    }

    #[test]
    fn test_start_therapy_wire_fields() {
        let msg = SyncMessage::StartTherapy(TherapySnapshot {
            session_id: "abc".into(),
            device: DeviceSetting::default(),
            set_power: 3.5,
            set_energy: 210.0,
            set_time_min: 1.0,
            therapy_end_time: 1_700_000_060.0,
            condition: "TMDs".into(),
            body_part: "TMJ".into(),
        });
        let v: Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["command"], "start_therapy");
        assert_eq!(v["master_power"], 0);
        assert_eq!(v["mode"], "CW");
        assert_eq!(v["pulse_duration"], 0.01);
        assert_eq!(v["wavelengths"]["808nm"]["power_percent"], 0);
        assert_eq!(v["therapy_end_time"], 1_700_000_060.0);

        let back = decode_message(v.to_string().as_bytes()).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_full_snapshot_accepted_as_update() {
        // Peers may send the whole snapshot under update_parameters.
        let raw = r#"{"command":"update_parameters","master_power":10,"set_power":7.5,
            "set_energy":450,"set_time_min":1.0,"frequency":10,"delivery_mode":"Hand Probe",
            "therapy_end_time":0}"#;
        match decode_message(raw.as_bytes()).unwrap() {
            SyncMessage::UpdateParameters(u) => {
                assert_eq!(u.set_power, Some(7.5));
                assert_eq!(u.frequency, Some(10));
                assert_eq!(u.delivery_mode, Some(DeliveryMode::HandProbe));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unknown_command_is_malformed() {
        let err = decode_message(br#"{"command":"self_destruct"}"#).unwrap_err();
        assert!(matches!(err, LuminoError::MalformedMessage(_)));
        assert!(decode_message(b"[1,2]").is_err());
    }

    #[test]
    fn test_decoder_split_frame() {
        let frame = encode_frame(&update_time(5.0)).unwrap();
        let (a, b) = frame.split_at(10);
        let mut d = FrameDecoder::default();
        assert!(d.push(a).is_empty());
        assert!(d.pending() > 0);
        let out = d.push(b);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].as_ref().unwrap(), &update_time(5.0));
        assert_eq!(d.pending(), 0);
    }

    #[test]
    fn test_decoder_garbage_then_valid() {
        let mut d = FrameDecoder::default();
        let mut bytes = b"{\"command\": garbage\n".to_vec();
        bytes.extend(encode_frame(&SyncMessage::StopTherapy).unwrap());
        let out = d.push(&bytes);
        assert_eq!(out.len(), 2);
        assert!(out[0].is_err());
        assert_eq!(out[1].as_ref().unwrap(), &SyncMessage::StopTherapy);
    }

    #[test]
    fn test_decoder_bare_objects_without_newline() {
        let mut d = FrameDecoder::default();
        let out = d.push(br#"{"command":"stop_therapy"}{"command":"therapy_completed"}{"comm"#);
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].as_ref().unwrap(), &SyncMessage::TherapyCompleted);
        let out = d.push(br#"and":"stop_therapy"}"#);
        assert_eq!(out.len(), 1);
        assert!(out[0].is_ok());
    }

    #[test]
    fn test_decoder_unterminated_garbage_dropped() {
        let mut d = FrameDecoder::default();
        let out = d.push(b"hello");
        assert_eq!(out.len(), 1);
        assert!(out[0].is_err());
        assert_eq!(d.pending(), 0);
    }

    #[test]
    fn test_decoder_oversized_partial_discarded() {
        let mut d = FrameDecoder::new(16);
        let out = d.push(br#"{"command":"update_parameters","set_energy":"#);
        assert_eq!(out.len(), 1);
        assert!(out[0].is_err());
        assert_eq!(d.pending(), 0);
    }
}
