use glam::Vec3;

/// Rotation sense of one motor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Reverse,
    Stopped,
}

/// Signed drive command for one motor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotorCommand {
    /// PWM duty cycle magnitude in percent, 0..=100.
    pub duty: f32,
    pub direction: Direction,
}

impl MotorCommand {
    fn from_signed(value: f32) -> Self {
        let direction = if value > 0.0 {
            Direction::Forward
        } else if value < 0.0 {
            Direction::Reverse
        } else {
            Direction::Stopped
        };
        Self {
            duty: value.abs().min(100.0),
            direction,
        }
    }
}

/// Differential drive mix derived from tilt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriveMix {
    pub left: MotorCommand,
    pub right: MotorCommand,
}

/// Tilt forward/back drives both wheels, tilt sideways steers.
pub fn mix_from_gravity(gravity: Vec3, scale: f32) -> DriveMix {
    let forward = gravity.x * scale;
    let turn = gravity.y * scale;
    DriveMix {
        left: MotorCommand::from_signed(forward - turn),
        right: MotorCommand::from_signed(forward + turn),
    }
}
