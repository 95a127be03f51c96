use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Serial link to the dongle.
    pub serial: SerialConfig,
    /// Sensor conventions.
    pub imu: ImuConfig,
    /// Startup gyro calibration.
    pub calibration: CalibrationConfig,
    /// Attitude filter selection and gains.
    pub filter: FilterConfig,
    /// Motor mixing from the gravity vector.
    pub motor: MotorConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Serial device the dongle enumerates as. Line settings (baud rate)
    /// are configured outside the program.
    pub port: String,
    /// Radio pipe to listen to.
    pub channel: ChannelSelect,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyACM0".into(),
            channel: ChannelSelect::Pipe(2),
        }
    }
}

/// `channel = "any"` or `channel = { pipe = 2 }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelSelect {
    Any,
    Pipe(u8),
}

impl ChannelSelect {
    pub fn as_filter(self) -> Option<u8> {
        match self {
            ChannelSelect::Any => None,
            ChannelSelect::Pipe(pipe) => Some(pipe),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GyroUnitConfig {
    #[default]
    DegreesPerSecond,
    RadiansPerSecond,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImuConfig {
    /// Unit the transmitter firmware reports angular rate in.
    pub gyro_unit: GyroUnitConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Length of the stationary window, seconds.
    pub duration_secs: f64,
    /// Low-pass coefficient for the resting gravity estimate (0.9-0.95).
    pub gravity_alpha: f32,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            duration_secs: 2.0,
            gravity_alpha: 0.9,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FilterMode {
    #[default]
    Mahony,
    Complementary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub mode: FilterMode,
    /// Mahony proportional gain.
    pub kp: f32,
    /// Mahony integral gain. Zero disables the drift term.
    pub ki: f32,
    /// Complementary gyro weight.
    pub alpha: f32,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            mode: FilterMode::Mahony,
            kp: 1.2,
            ki: 0.0,
            alpha: 0.98,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotorConfig {
    /// Percent duty cycle per unit of gravity tilt.
    pub scale: f32,
}

impl Default for MotorConfig {
    fn default() -> Self {
        Self { scale: 70.0 }
    }
}

impl AppConfig {
    /// Reject values the filters cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        let c = &self.calibration;
        anyhow::ensure!(
            c.duration_secs.is_finite() && c.duration_secs >= 0.0,
            "calibration.duration_secs must be a non-negative number, got {}",
            c.duration_secs
        );
        anyhow::ensure!(
            (0.0..1.0).contains(&c.gravity_alpha),
            "calibration.gravity_alpha must be in [0, 1), got {}",
            c.gravity_alpha
        );

        let f = &self.filter;
        anyhow::ensure!(
            f.kp.is_finite() && f.kp >= 0.0 && f.ki.is_finite() && f.ki >= 0.0,
            "filter gains must be non-negative, got kp={} ki={}",
            f.kp,
            f.ki
        );
        anyhow::ensure!(
            (0.0..=1.0).contains(&f.alpha),
            "filter.alpha must be in [0, 1], got {}",
            f.alpha
        );

        anyhow::ensure!(
            self.motor.scale.is_finite(),
            "motor.scale must be finite"
        );
        Ok(())
    }
}
