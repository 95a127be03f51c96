use crate::protocol::{decode_frame, FrameSynchronizer, ProtocolError, BODY_LEN};
use crate::types::{GyroUnit, Sample};
use std::collections::VecDeque;
use std::io::{self, Read};
use thiserror::Error;

/// Failures that end the ingestion loop.
#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("byte source closed")]
    StreamClosed,
    #[error("byte source read failed: {0}")]
    Io(#[from] io::Error),
    /// The ingestion task panicked or was cancelled.
    #[error("ingestion task failed: {0}")]
    TaskFailed(#[source] tokio::task::JoinError),
}

/// Non-fatal events observed while reading or calibrating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Diagnostic {
    /// Checksum mismatch, frame dropped.
    Corrupt { computed: u16, received: u16 },
    /// CRC passed but a sensor value was NaN, infinite or out of range.
    InvalidValue { channel: u8, sequence: u16 },
    /// Sequence did not follow the previous accepted frame. Sample kept.
    SequenceGap { previous: u16, current: u16 },
    /// Calibration window closed without any samples.
    CalibrationDegenerate,
}

impl Diagnostic {
    fn log(&self) {
        match *self {
            Diagnostic::Corrupt { computed, received } => {
                tracing::warn!(computed, received, "Dropping frame with bad checksum");
            }
            Diagnostic::InvalidValue { channel, sequence } => {
                tracing::warn!(channel, sequence, "Dropping frame with invalid sensor values");
            }
            Diagnostic::SequenceGap { previous, current } => {
                tracing::warn!(previous, current, "Sequence gap");
            }
            Diagnostic::CalibrationDegenerate => {
                tracing::warn!("Calibration collected no samples, using zero gyro bias");
            }
        }
    }
}

impl From<ProtocolError> for Diagnostic {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Corrupt { computed, received } => {
                Diagnostic::Corrupt { computed, received }
            }
            ProtocolError::InvalidValue { channel, sequence } => {
                Diagnostic::InvalidValue { channel, sequence }
            }
        }
    }
}

/// Running counters kept by a [`StreamReader`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReaderStats {
    pub accepted: u64,
    pub corrupt: u64,
    pub invalid: u64,
    pub gaps: u64,
    /// Valid frames skipped by the channel filter.
    pub filtered: u64,
}

/// Anything that yields validated samples one at a time.
pub trait SampleSource {
    fn read_sample(&mut self) -> Result<Sample, ReaderError>;

    /// Report a diagnostic raised by a downstream stage.
    fn report(&mut self, diagnostic: Diagnostic) {
        diagnostic.log();
    }
}

type DiagnosticHook = Box<dyn FnMut(&Diagnostic) + Send>;

/// Blocking reader that turns a byte source into validated samples.
///
/// Damaged frames are absorbed: the reader logs a diagnostic, rescans the
/// rejected bytes for the next marker and carries on. Only the source
/// closing or failing is surfaced to the caller.
pub struct StreamReader<R> {
    source: R,
    sync: FrameSynchronizer,
    /// Bytes handed back for rescanning after a rejected frame.
    pending: VecDeque<u8>,
    last_sequence: Option<u16>,
    channel: Option<u8>,
    gyro_unit: GyroUnit,
    stats: ReaderStats,
    hook: Option<DiagnosticHook>,
}

impl<R: Read> StreamReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            source,
            sync: FrameSynchronizer::new(),
            pending: VecDeque::with_capacity(BODY_LEN),
            last_sequence: None,
            channel: None,
            gyro_unit: GyroUnit::default(),
            stats: ReaderStats::default(),
            hook: None,
        }
    }

    /// Only deliver samples from `channel`. `None` delivers everything.
    pub fn with_channel(mut self, channel: Option<u8>) -> Self {
        self.channel = channel;
        self
    }

    /// Unit the transmitter uses for gyro rates. Delivered samples are
    /// always converted to rad/s.
    pub fn with_gyro_unit(mut self, unit: GyroUnit) -> Self {
        self.gyro_unit = unit;
        self
    }

    /// Observe every diagnostic in addition to the log output.
    pub fn on_diagnostic(mut self, hook: impl FnMut(&Diagnostic) + Send + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    pub fn stats(&self) -> ReaderStats {
        self.stats
    }

    pub fn last_sequence(&self) -> Option<u16> {
        self.last_sequence
    }

    /// Block until a sample passing the configured channel filter arrives.
    pub fn read_sample(&mut self) -> Result<Sample, ReaderError> {
        match self.channel {
            Some(channel) => self.read_sample_on(channel),
            None => self.next_valid(),
        }
    }

    /// Block until a sample from `channel` arrives, skipping other channels.
    pub fn read_sample_on(&mut self, channel: u8) -> Result<Sample, ReaderError> {
        loop {
            let sample = self.next_valid()?;
            if sample.channel == channel {
                return Ok(sample);
            }
            self.stats.filtered += 1;
            tracing::trace!(channel = sample.channel, "Skipping sample from other channel");
        }
    }

    fn next_valid(&mut self) -> Result<Sample, ReaderError> {
        loop {
            self.synchronize()?;

            let mut body = [0u8; BODY_LEN];
            self.fill(&mut body)?;

            match decode_frame(&body) {
                Ok(raw) => {
                    self.stats.accepted += 1;
                    self.track_sequence(raw.sequence);
                    return Ok(Sample {
                        gyro: self.gyro_unit.to_radians(raw.gyro),
                        ..raw
                    });
                }
                Err(err) => {
                    match err {
                        ProtocolError::Corrupt { .. } => self.stats.corrupt += 1,
                        ProtocolError::InvalidValue { .. } => self.stats.invalid += 1,
                    }
                    self.emit(err.into());
                    // The marker may have been a false hit; the real one
                    // can sit inside what we just consumed.
                    self.pending.extend(body);
                }
            }
        }
    }

    fn track_sequence(&mut self, sequence: u16) {
        if let Some(previous) = self.last_sequence {
            if sequence != previous.wrapping_add(1) {
                self.stats.gaps += 1;
                self.emit(Diagnostic::SequenceGap {
                    previous,
                    current: sequence,
                });
            }
        }
        self.last_sequence = Some(sequence);
    }

    fn emit(&mut self, diagnostic: Diagnostic) {
        diagnostic.log();
        if let Some(hook) = self.hook.as_mut() {
            hook(&diagnostic);
        }
    }

    fn synchronize(&mut self) -> Result<(), ReaderError> {
        let mut byte = [0u8; 1];
        loop {
            self.fill(&mut byte)?;
            if self.sync.push(byte[0]) {
                return Ok(());
            }
        }
    }

    /// Fill `buf` completely, draining rescanned bytes before the source.
    fn fill(&mut self, buf: &mut [u8]) -> Result<(), ReaderError> {
        let mut filled = 0;
        while filled < buf.len() {
            if let Some(byte) = self.pending.pop_front() {
                buf[filled] = byte;
                filled += 1;
                continue;
            }
            match self.source.read(&mut buf[filled..]) {
                Ok(0) => return Err(ReaderError::StreamClosed),
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

impl<R: Read> SampleSource for StreamReader<R> {
    fn read_sample(&mut self) -> Result<Sample, ReaderError> {
        StreamReader::read_sample(self)
    }

    fn report(&mut self, diagnostic: Diagnostic) {
        self.emit(diagnostic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{encode_frame, MARKER};
    use glam::Vec3;
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};

    fn frame(channel: u8, sequence: u16) -> Vec<u8> {
        encode_frame(&Sample {
            channel,
            sequence,
            accel: Vec3::new(0.0, 0.0, 9.81),
            gyro: Vec3::new(90.0, 0.0, -180.0),
        })
        .to_vec()
    }

    fn stream(frames: &[(u8, u16)]) -> Vec<u8> {
        frames.iter().flat_map(|&(c, s)| frame(c, s)).collect()
    }

    fn recorded(bytes: Vec<u8>) -> (StreamReader<Cursor<Vec<u8>>>, Arc<Mutex<Vec<Diagnostic>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        let reader = StreamReader::new(Cursor::new(bytes))
            .on_diagnostic(move |d| sink.lock().unwrap().push(*d));
        (reader, log)
    }

    /// Hands out at most one byte per read and fails with `Interrupted` in between.
    struct Trickle {
        bytes: Vec<u8>,
        pos: usize,
        interrupt: bool,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.interrupt = !self.interrupt;
            if self.interrupt {
                return Err(io::Error::new(io::ErrorKind::Interrupted, "signal"));
            }
            if self.pos >= self.bytes.len() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    #[test]
    fn empty_source_is_stream_closed() {
        let mut reader = StreamReader::new(Cursor::new(Vec::new()));
        assert!(matches!(reader.read_sample(), Err(ReaderError::StreamClosed)));
    }

    #[test]
    fn truncated_frame_is_stream_closed() {
        let mut bytes = frame(1, 0);
        bytes.truncate(20);
        let mut reader = StreamReader::new(Cursor::new(bytes));
        assert!(matches!(reader.read_sample(), Err(ReaderError::StreamClosed)));
    }

    #[test]
    fn gap_reported_once_between_six_and_eight() {
        let (mut reader, log) = recorded(stream(&[(1, 5), (1, 6), (1, 8)]));
        let seqs: Vec<u16> = (0..3).map(|_| reader.read_sample().unwrap().sequence).collect();
        assert_eq!(seqs, vec![5, 6, 8]);
        assert_eq!(
            *log.lock().unwrap(),
            vec![Diagnostic::SequenceGap {
                previous: 6,
                current: 8
            }]
        );
        assert_eq!(reader.stats().gaps, 1);
    }

    #[test]
    fn sequence_wraps_without_gap() {
        let (mut reader, log) = recorded(stream(&[(1, 65534), (1, 65535), (1, 0), (1, 1)]));
        for _ in 0..4 {
            reader.read_sample().unwrap();
        }
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(reader.last_sequence(), Some(1));
    }

    #[test]
    fn channel_filter_skips_other_pipes() {
        let bytes = stream(&[(1, 0), (2, 1), (1, 2), (2, 3)]);
        let mut reader = StreamReader::new(Cursor::new(bytes)).with_channel(Some(2));
        assert_eq!(reader.read_sample().unwrap().sequence, 1);
        assert_eq!(reader.read_sample().unwrap().sequence, 3);
        assert_eq!(reader.stats().filtered, 2);
        // Sequence tracking sees every channel.
        assert_eq!(reader.stats().gaps, 0);
    }

    #[test]
    fn gyro_converted_to_radians() {
        let mut reader = StreamReader::new(Cursor::new(frame(1, 0)));
        let sample = reader.read_sample().unwrap();
        assert!((sample.gyro.x - std::f32::consts::FRAC_PI_2).abs() < 1e-6);
        assert!((sample.gyro.z + std::f32::consts::PI).abs() < 1e-6);

        let mut reader = StreamReader::new(Cursor::new(frame(1, 0)))
            .with_gyro_unit(GyroUnit::RadiansPerSecond);
        assert_eq!(reader.read_sample().unwrap().gyro, Vec3::new(90.0, 0.0, -180.0));
    }

    #[test]
    fn partial_and_interrupted_reads() {
        let source = Trickle {
            bytes: stream(&[(1, 0), (1, 1)]),
            pos: 0,
            interrupt: false,
        };
        let mut reader = StreamReader::new(source);
        assert_eq!(reader.read_sample().unwrap().sequence, 0);
        assert_eq!(reader.read_sample().unwrap().sequence, 1);
        assert!(matches!(reader.read_sample(), Err(ReaderError::StreamClosed)));
    }

    #[test]
    fn relocks_on_frame_inside_truncated_one() {
        // A frame cut short right after its marker: the next real frame
        // starts inside the 29 bytes the decoder consumes.
        let mut bytes = MARKER.to_vec();
        bytes.extend_from_slice(&[0x11, 0x22, 0x33]);
        bytes.extend(frame(1, 9));

        let (mut reader, log) = recorded(bytes);
        assert_eq!(reader.read_sample().unwrap().sequence, 9);
        let log = log.lock().unwrap();
        assert_eq!(log.len(), 1);
        assert!(matches!(log[0], Diagnostic::Corrupt { .. }));
    }

    #[test]
    fn invalid_value_is_skipped() {
        let mut bytes = encode_frame(&Sample {
            channel: 1,
            sequence: 0,
            accel: Vec3::new(f32::NAN, 0.0, 9.81),
            gyro: Vec3::ZERO,
        })
        .to_vec();
        bytes.extend(frame(1, 1));

        let (mut reader, log) = recorded(bytes);
        assert_eq!(reader.read_sample().unwrap().sequence, 1);
        assert_eq!(
            *log.lock().unwrap(),
            vec![Diagnostic::InvalidValue {
                channel: 1,
                sequence: 0
            }]
        );
        assert_eq!(reader.stats().invalid, 1);
    }
}
