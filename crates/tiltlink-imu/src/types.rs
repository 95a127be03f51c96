use glam::{Quat, Vec3};

/// One validated reading from the dongle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Radio pipe the reading arrived on.
    pub channel: u8,
    /// Dongle frame counter, wraps at 65536.
    pub sequence: u16,
    /// Linear acceleration (m/s^2).
    pub accel: Vec3,
    /// Angular velocity. Device units on the wire, rad/s once delivered by
    /// [`StreamReader`](crate::reader::StreamReader).
    pub gyro: Vec3,
}

/// Startup gyro bias and resting gravity estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationResult {
    /// Mean gyro reading over the calibration window (rad/s).
    pub gyro_bias: Vec3,
    /// Low-pass filtered accelerometer at rest, body frame.
    pub gravity: Vec3,
    /// Number of samples that fell inside the window.
    pub sample_count: u32,
    /// Set when no samples were collected and the bias fell back to zero.
    pub degenerate: bool,
}

impl CalibrationResult {
    /// A zero-bias result, used when calibration collected nothing.
    pub fn degenerate() -> Self {
        Self {
            gyro_bias: Vec3::ZERO,
            gravity: Vec3::ZERO,
            sample_count: 0,
            degenerate: true,
        }
    }
}

/// Fused orientation output published to consumers.
#[derive(Debug, Clone, Copy)]
pub struct Attitude {
    /// Orientation as a unit quaternion.
    pub orientation: Quat,
    /// Estimated gravity direction in body frame (unit length).
    pub gravity: Vec3,
    /// Rotation about X (rad).
    pub roll: f32,
    /// Rotation about Y (rad).
    pub pitch: f32,
    /// Rotation about Z (rad). Uncorrected, drifts.
    pub yaw: f32,
    /// Instantaneous sample rate derived from the last dt (Hz).
    pub rate_hz: f32,
}

impl Default for Attitude {
    fn default() -> Self {
        Self {
            orientation: Quat::IDENTITY,
            gravity: Vec3::Z,
            roll: 0.0,
            pitch: 0.0,
            yaw: 0.0,
            rate_hz: 0.0,
        }
    }
}

/// Unit the transmitter reports angular rate in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GyroUnit {
    #[default]
    DegreesPerSecond,
    RadiansPerSecond,
}

impl GyroUnit {
    /// Convert a rate in this unit to rad/s.
    pub fn to_radians(self, rate: Vec3) -> Vec3 {
        match self {
            GyroUnit::DegreesPerSecond => rate * std::f32::consts::PI / 180.0,
            GyroUnit::RadiansPerSecond => rate,
        }
    }
}
