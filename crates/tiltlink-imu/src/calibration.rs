use crate::reader::{Diagnostic, ReaderError, SampleSource};
use crate::types::{CalibrationResult, Sample};
use glam::{DVec3, Vec3};
use std::time::{Duration, Instant};

/// Accumulates a stationary window into a gyro bias and gravity estimate.
///
/// Gyro readings are averaged; the accelerometer goes through a single-pole
/// low-pass `g = alpha * g + (1 - alpha) * accel` starting from zero.
#[derive(Debug, Clone)]
pub struct Calibrator {
    gyro_sum: DVec3,
    gravity: Vec3,
    alpha: f32,
    count: u32,
}

impl Calibrator {
    pub fn new(alpha: f32) -> Self {
        Self {
            gyro_sum: DVec3::ZERO,
            gravity: Vec3::ZERO,
            alpha,
            count: 0,
        }
    }

    pub fn push(&mut self, sample: &Sample) {
        self.gyro_sum += sample.gyro.as_dvec3();
        self.gravity = self.gravity * self.alpha + sample.accel * (1.0 - self.alpha);
        self.count += 1;
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    /// Close the window. With no samples the bias falls back to zero and
    /// the result is flagged degenerate.
    pub fn finish(&self) -> CalibrationResult {
        if self.count == 0 {
            return CalibrationResult::degenerate();
        }
        CalibrationResult {
            gyro_bias: (self.gyro_sum / self.count as f64).as_vec3(),
            gravity: self.gravity,
            sample_count: self.count,
            degenerate: false,
        }
    }
}

/// Read from `source` for `duration` of wall-clock time and calibrate.
///
/// The window opens when the first sample arrives; later samples count while
/// the elapsed time is still below `duration`. The device must be at rest.
///
/// Also returns the sample that closed the window. It was read after the
/// window ended, so it belongs to whatever stage runs next.
pub fn calibrate<S: SampleSource + ?Sized>(
    source: &mut S,
    duration: Duration,
    alpha: f32,
) -> Result<(CalibrationResult, Sample), ReaderError> {
    tracing::info!(?duration, "Calibrating gyro, keep the device still");

    let mut calibrator = Calibrator::new(alpha);
    let mut opened: Option<Instant> = None;

    let closing = loop {
        let sample = source.read_sample()?;
        let now = Instant::now();
        let start = *opened.get_or_insert(now);
        if now.duration_since(start) >= duration {
            break sample;
        }
        calibrator.push(&sample);
    };

    let result = calibrator.finish();
    if result.degenerate {
        source.report(Diagnostic::CalibrationDegenerate);
    } else {
        tracing::info!(
            samples = result.sample_count,
            bias_x = result.gyro_bias.x,
            bias_y = result.gyro_bias.y,
            bias_z = result.gyro_bias.z,
            gravity_x = result.gravity.x,
            gravity_y = result.gravity.y,
            gravity_z = result.gravity.z,
            "Calibration complete"
        );
    }
    Ok((result, closing))
}
