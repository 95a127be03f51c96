use crate::fusion::AttitudeFilter;
use crate::types::{Attitude, CalibrationResult, Sample};
use std::time::Instant;

/// Steady-state stage: bias correction, timing and fusion.
///
/// The step size is the wall-clock time between consecutive samples; the
/// first sample only seeds the clock.
pub struct AttitudeEstimator {
    filter: Box<dyn AttitudeFilter + Send>,
    calibration: CalibrationResult,
    last_arrival: Option<Instant>,
}

impl AttitudeEstimator {
    pub fn new(filter: Box<dyn AttitudeFilter + Send>, calibration: CalibrationResult) -> Self {
        Self {
            filter,
            calibration,
            last_arrival: None,
        }
    }

    /// Process a sample that arrived just now.
    pub fn process(&mut self, sample: &Sample) -> Attitude {
        self.process_at(sample, Instant::now())
    }

    pub fn process_at(&mut self, sample: &Sample, arrival: Instant) -> Attitude {
        let dt = self
            .last_arrival
            .map(|last| arrival.saturating_duration_since(last).as_secs_f64())
            .unwrap_or(0.0);
        self.last_arrival = Some(arrival);
        self.step(sample, dt)
    }

    /// Run the filter with an explicit step size.
    pub fn step(&mut self, sample: &Sample, dt: f64) -> Attitude {
        let gyro = sample.gyro - self.calibration.gyro_bias;
        let out = self.filter.update(gyro, sample.accel, dt);
        let (roll, pitch, yaw) = self.filter.to_euler();

        Attitude {
            orientation: out.orientation,
            gravity: out.gravity,
            roll,
            pitch,
            yaw,
            rate_hz: if dt > 0.0 { (1.0 / dt) as f32 } else { 0.0 },
        }
    }
}
