use crate::types::Sample;
use crc16::{State, CCITT_FALSE};
use glam::Vec3;
use thiserror::Error;

/// Marker that opens every frame on the wire.
pub const MARKER: [u8; 3] = [0x77, 0x55, 0xAA];
/// channel (1) + sequence (2) + 6 x f32 (24).
pub const PAYLOAD_LEN: usize = 27;
/// Trailing little-endian CRC-16.
pub const CRC_LEN: usize = 2;
/// Bytes that follow a matched marker.
pub const BODY_LEN: usize = PAYLOAD_LEN + CRC_LEN;
/// Full frame size including marker.
pub const FRAME_LEN: usize = MARKER.len() + BODY_LEN;

/// Largest magnitude accepted for any sensor value.
pub const MAX_ABS_VALUE: f32 = 1.0e5;

/// Per-frame rejection reasons. Never fatal: the reader resynchronizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("checksum mismatch (computed {computed:#06x}, received {received:#06x})")]
    Corrupt { computed: u16, received: u16 },
    #[error("non-finite or out-of-range sensor value (channel {channel}, sequence {sequence})")]
    InvalidValue { channel: u8, sequence: u16 },
}

/// CRC-16/CCITT-FALSE over `data`.
pub fn crc16(data: &[u8]) -> u16 {
    State::<CCITT_FALSE>::calculate(data)
}

/// Byte-at-a-time marker search.
///
/// Keeps the last three bytes seen and reports a match as soon as they
/// equal [`MARKER`]. Because it never skips blocks, it relocks after a
/// partial or damaged frame of any length.
#[derive(Debug, Default)]
pub struct FrameSynchronizer {
    window: [u8; 3],
    filled: usize,
}

impl FrameSynchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one byte. Returns `true` when the marker has just completed;
    /// the window is cleared so the next search starts fresh.
    pub fn push(&mut self, byte: u8) -> bool {
        self.window = [self.window[1], self.window[2], byte];
        self.filled = (self.filled + 1).min(MARKER.len());

        if self.filled == MARKER.len() && self.window == MARKER {
            self.reset();
            return true;
        }
        false
    }

    pub fn reset(&mut self) {
        self.window = [0; 3];
        self.filled = 0;
    }
}

/// Validate and decode the bytes following a marker.
pub fn decode_frame(body: &[u8; BODY_LEN]) -> Result<Sample, ProtocolError> {
    let (payload, crc) = body.split_at(PAYLOAD_LEN);
    let received = u16::from_le_bytes([crc[0], crc[1]]);
    let computed = crc16(payload);
    if computed != received {
        return Err(ProtocolError::Corrupt { computed, received });
    }

    let sample = decode_payload(payload);

    // A CRC collision can still carry garbage.
    let values = [sample.accel, sample.gyro];
    let sane = values
        .iter()
        .flat_map(|v| v.to_array())
        .all(|v| v.is_finite() && v.abs() <= MAX_ABS_VALUE);
    if !sane {
        return Err(ProtocolError::InvalidValue {
            channel: sample.channel,
            sequence: sample.sequence,
        });
    }

    Ok(sample)
}

/// Unpack a 27-byte payload. Layout:
/// `[channel u8][sequence u16][ax ay az gx gy gz: f32]`, all little-endian.
fn decode_payload(payload: &[u8]) -> Sample {
    let f = |index: usize| -> f32 {
        let offset = 3 + index * 4;
        f32::from_le_bytes([
            payload[offset],
            payload[offset + 1],
            payload[offset + 2],
            payload[offset + 3],
        ])
    };

    Sample {
        channel: payload[0],
        sequence: u16::from_le_bytes([payload[1], payload[2]]),
        accel: Vec3::new(f(0), f(1), f(2)),
        gyro: Vec3::new(f(3), f(4), f(5)),
    }
}

/// Pack a sample into its payload bytes.
pub fn encode_payload(sample: &Sample) -> [u8; PAYLOAD_LEN] {
    let mut payload = [0u8; PAYLOAD_LEN];
    payload[0] = sample.channel;
    payload[1..3].copy_from_slice(&sample.sequence.to_le_bytes());

    let values = sample.accel.to_array().into_iter().chain(sample.gyro.to_array());
    for (i, value) in values.enumerate() {
        let offset = 3 + i * 4;
        payload[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }
    payload
}

/// Build a complete wire frame (marker, payload, CRC) for `sample`.
pub fn encode_frame(sample: &Sample) -> [u8; FRAME_LEN] {
    let payload = encode_payload(sample);
    let mut frame = [0u8; FRAME_LEN];
    frame[..MARKER.len()].copy_from_slice(&MARKER);
    frame[MARKER.len()..MARKER.len() + PAYLOAD_LEN].copy_from_slice(&payload);
    frame[MARKER.len() + PAYLOAD_LEN..].copy_from_slice(&crc16(&payload).to_le_bytes());
    frame
}
