use glam::{Quat, Vec3};

/// Result of one filter step.
#[derive(Debug, Clone, Copy)]
pub struct FilterOutput {
    /// Orientation after the step (unit quaternion).
    pub orientation: Quat,
    /// Gravity direction in body frame as estimated by the filter.
    pub gravity: Vec3,
}

/// Common contract of the fusion strategies.
///
/// `gyro` is bias-corrected angular rate in rad/s, `accel` the raw
/// accelerometer reading, `dt` the wall-clock seconds since the previous
/// sample. Angles are radians.
pub trait AttitudeFilter {
    fn update(&mut self, gyro: Vec3, accel: Vec3, dt: f64) -> FilterOutput;

    fn orientation(&self) -> Quat;

    /// `(roll, pitch, yaw)`.
    fn to_euler(&self) -> (f32, f32, f32);
}

/// Fusion strategy and its gains, picked once at construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterKind {
    Mahony { kp: f32, ki: f32 },
    Complementary { alpha: f32 },
}

impl FilterKind {
    pub fn build(self) -> Box<dyn AttitudeFilter + Send> {
        match self {
            FilterKind::Mahony { kp, ki } => Box::new(MahonyFilter::new(kp, ki)),
            FilterKind::Complementary { alpha } => Box::new(ComplementaryFilter::new(alpha)),
        }
    }
}

impl Default for FilterKind {
    fn default() -> Self {
        FilterKind::Mahony { kp: 1.2, ki: 0.0 }
    }
}

/// Direction of gravity in body frame implied by `q`.
pub fn gravity_from_quat(q: Quat) -> Vec3 {
    Vec3::new(
        2.0 * (q.x * q.z - q.w * q.y),
        2.0 * (q.w * q.x + q.y * q.z),
        q.w * q.w - q.x * q.x - q.y * q.y + q.z * q.z,
    )
}

/// Aerospace (ZYX) Euler angles of `q` as `(roll, pitch, yaw)`.
pub fn euler_from_quat(q: Quat) -> (f32, f32, f32) {
    let sinr = 2.0 * (q.w * q.x + q.y * q.z);
    let cosr = 1.0 - 2.0 * (q.x * q.x + q.y * q.y);
    let roll = sinr.atan2(cosr);

    let sinp = 2.0 * (q.w * q.y - q.z * q.x);
    let pitch = if sinp.abs() >= 1.0 {
        std::f32::consts::FRAC_PI_2.copysign(sinp)
    } else {
        sinp.asin()
    };

    let siny = 2.0 * (q.w * q.z + q.x * q.y);
    let cosy = 1.0 - 2.0 * (q.y * q.y + q.z * q.z);
    let yaw = siny.atan2(cosy);

    (roll, pitch, yaw)
}

/// Inverse of [`euler_from_quat`].
pub fn quat_from_euler(roll: f32, pitch: f32, yaw: f32) -> Quat {
    let (sr, cr) = (roll * 0.5).sin_cos();
    let (sp, cp) = (pitch * 0.5).sin_cos();
    let (sy, cy) = (yaw * 0.5).sin_cos();

    Quat::from_xyzw(
        sr * cp * cy - cr * sp * sy,
        cr * sp * cy + sr * cp * sy,
        cr * cp * sy - sr * sp * cy,
        cr * cp * cy + sr * sp * sy,
    )
}

/// Negative, NaN and infinite steps integrate nothing.
fn step_seconds(dt: f64) -> f32 {
    if dt.is_finite() && dt > 0.0 {
        dt as f32
    } else {
        0.0
    }
}

/// Mahony nonlinear complementary filter (IMU only, no magnetometer).
///
/// Gravity error between the measured accelerometer direction and the one
/// implied by the current quaternion is fed back into the gyro rate through
/// a PI controller before integration. Yaw has no reference and drifts.
#[derive(Debug, Clone)]
pub struct MahonyFilter {
    kp: f32,
    ki: f32,
    integral: Vec3,
    q: Quat,
}

impl MahonyFilter {
    pub fn new(kp: f32, ki: f32) -> Self {
        Self {
            kp,
            ki,
            integral: Vec3::ZERO,
            q: Quat::IDENTITY,
        }
    }

    /// Accumulated integral feedback.
    pub fn integral_error(&self) -> Vec3 {
        self.integral
    }
}

impl AttitudeFilter for MahonyFilter {
    fn update(&mut self, gyro: Vec3, accel: Vec3, dt: f64) -> FilterOutput {
        let v = gravity_from_quat(self.q);

        let norm = accel.length();
        if norm == 0.0 || !norm.is_finite() {
            tracing::debug!("Zero-norm accelerometer, skipping filter update");
            return FilterOutput {
                orientation: self.q,
                gravity: v,
            };
        }
        let a = accel / norm;

        // Zero exactly when measured and estimated gravity agree.
        let error = a.cross(v);

        let dt = step_seconds(dt);
        self.integral += error * (self.ki * dt);
        let omega = gyro + error * self.kp + self.integral;

        // dq/dt = 0.5 * q ⊗ (0, omega), one explicit Euler step.
        let q = self.q;
        let h = 0.5 * dt;
        let next = Quat::from_xyzw(
            q.x + (q.w * omega.x + q.y * omega.z - q.z * omega.y) * h,
            q.y + (q.w * omega.y - q.x * omega.z + q.z * omega.x) * h,
            q.z + (q.w * omega.z + q.x * omega.y - q.y * omega.x) * h,
            q.w + (-q.x * omega.x - q.y * omega.y - q.z * omega.z) * h,
        );

        // Must happen every step or the norm walks away.
        self.q = next.normalize();

        FilterOutput {
            orientation: self.q,
            gravity: v,
        }
    }

    fn orientation(&self) -> Quat {
        self.q
    }

    fn to_euler(&self) -> (f32, f32, f32) {
        euler_from_quat(self.q)
    }
}

/// Angle-blending complementary filter.
///
/// Roll and pitch blend gyro integration with accelerometer tilt; yaw is
/// pure gyro integration.
#[derive(Debug, Clone)]
pub struct ComplementaryFilter {
    alpha: f32,
    roll: f32,
    pitch: f32,
    yaw: f32,
}

impl ComplementaryFilter {
    /// `alpha` is the gyro weight, typically 0.98.
    pub fn new(alpha: f32) -> Self {
        Self {
            alpha,
            roll: 0.0,
            pitch: 0.0,
            yaw: 0.0,
        }
    }
}

impl AttitudeFilter for ComplementaryFilter {
    fn update(&mut self, gyro: Vec3, accel: Vec3, dt: f64) -> FilterOutput {
        let dt = step_seconds(dt);

        self.roll += gyro.x * dt;
        self.pitch += gyro.y * dt;
        self.yaw += gyro.z * dt;

        if accel != Vec3::ZERO && accel.is_finite() {
            let accel_roll = accel.y.atan2(accel.z);
            let accel_pitch = (-accel.x).atan2((accel.y * accel.y + accel.z * accel.z).sqrt());

            self.roll = self.alpha * self.roll + (1.0 - self.alpha) * accel_roll;
            self.pitch = self.alpha * self.pitch + (1.0 - self.alpha) * accel_pitch;
        } else {
            tracing::debug!("Zero-norm accelerometer, gyro integration only");
        }

        let orientation = self.orientation();
        FilterOutput {
            orientation,
            gravity: gravity_from_quat(orientation),
        }
    }

    fn orientation(&self) -> Quat {
        quat_from_euler(self.roll, self.pitch, self.yaw)
    }

    fn to_euler(&self) -> (f32, f32, f32) {
        (self.roll, self.pitch, self.yaw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_4;

    const G: Vec3 = Vec3::new(0.0, 0.0, 9.81);

    fn norm_error(q: Quat) -> f32 {
        (q.length() - 1.0).abs()
    }

    #[test]
    fn identity_gravity_points_down_body_z() {
        assert_eq!(gravity_from_quat(Quat::IDENTITY), Vec3::Z);
    }

    #[test]
    fn euler_round_trip() {
        let q = quat_from_euler(0.3, -0.2, 1.1);
        let (r, p, y) = euler_from_quat(q);
        assert!((r - 0.3).abs() < 1e-5);
        assert!((p + 0.2).abs() < 1e-5);
        assert!((y - 1.1).abs() < 1e-5);
    }

    #[test]
    fn gimbal_lock_pitch_is_clamped() {
        let q = quat_from_euler(0.0, std::f32::consts::FRAC_PI_2, 0.0);
        let (_, p, _) = euler_from_quat(q);
        assert!((p - std::f32::consts::FRAC_PI_2).abs() < 1e-3);
    }

    #[test]
    fn mahony_stays_level_when_aligned() {
        let mut filter = MahonyFilter::new(1.2, 0.1);
        for _ in 0..100 {
            let out = filter.update(Vec3::ZERO, G, 0.01);
            assert!((out.gravity - Vec3::Z).length() < 1e-6);
        }
        let (roll, pitch, yaw) = filter.to_euler();
        assert!(roll.abs() < 1e-6 && pitch.abs() < 1e-6 && yaw.abs() < 1e-6);
    }

    #[test]
    fn mahony_zero_accel_skips_update() {
        let mut filter = MahonyFilter::new(1.0, 0.5);
        filter.update(Vec3::new(0.2, 0.0, 0.0), G, 0.1);
        let before = filter.orientation();
        let integral = filter.integral_error();

        let out = filter.update(Vec3::new(5.0, 5.0, 5.0), Vec3::ZERO, 0.1);
        assert_eq!(out.orientation, before);
        assert_eq!(filter.orientation(), before);
        assert_eq!(filter.integral_error(), integral);
    }

    #[test]
    fn mahony_keeps_unit_norm() {
        let mut filter = MahonyFilter::new(2.0, 0.3);
        for i in 0..5000 {
            let t = i as f32 * 0.01;
            let gyro = Vec3::new(t.sin() * 3.0, (t * 0.7).cos() * 2.0, 1.5);
            let accel = Vec3::new((t * 1.3).sin(), (t * 0.4).cos() * 4.0, 9.0 + t.sin());
            let out = filter.update(gyro, accel, 0.004 + (i % 7) as f64 * 0.001);
            assert!(norm_error(out.orientation) < 1e-6, "step {i}");
        }
    }

    #[test]
    fn mahony_converges_to_tilted_gravity() {
        // Device rolled by 45 degrees: gravity splits between body y and z.
        let accel = Vec3::new(0.0, FRAC_PI_4.sin(), FRAC_PI_4.cos()) * 9.81;
        let mut filter = MahonyFilter::new(2.0, 0.0);
        for _ in 0..3000 {
            filter.update(Vec3::ZERO, accel, 0.01);
        }
        let (roll, pitch, _) = filter.to_euler();
        assert!((roll - FRAC_PI_4).abs() < 1e-2, "roll {roll}");
        assert!(pitch.abs() < 1e-2);
    }

    #[test]
    fn mahony_integrates_gyro_without_correction() {
        // Pure yaw rate: gravity unchanged, so no feedback. 0.5 rad/s for 1 s.
        let mut filter = MahonyFilter::new(1.0, 0.0);
        for _ in 0..1000 {
            filter.update(Vec3::new(0.0, 0.0, 0.5), G, 0.001);
        }
        let (_, _, yaw) = filter.to_euler();
        assert!((yaw - 0.5).abs() < 1e-3, "yaw {yaw}");
    }

    #[test]
    fn complementary_blends_towards_accel_tilt() {
        let accel = Vec3::new(0.0, FRAC_PI_4.sin(), FRAC_PI_4.cos()) * 9.81;
        let mut filter = ComplementaryFilter::new(0.98);

        let out = filter.update(Vec3::ZERO, accel, 0.01);
        let (roll, _, _) = filter.to_euler();
        assert!((roll - 0.02 * FRAC_PI_4).abs() < 1e-6);
        assert!(norm_error(out.orientation) < 1e-6);

        for _ in 0..1000 {
            filter.update(Vec3::ZERO, accel, 0.01);
        }
        let (roll, pitch, _) = filter.to_euler();
        assert!((roll - FRAC_PI_4).abs() < 1e-4);
        assert!(pitch.abs() < 1e-6);
    }

    #[test]
    fn complementary_yaw_is_pure_integration() {
        let mut filter = ComplementaryFilter::new(0.98);
        for _ in 0..100 {
            filter.update(Vec3::new(0.0, 0.0, 0.2), G, 0.05);
        }
        let (_, _, yaw) = filter.to_euler();
        assert!((yaw - 1.0).abs() < 1e-4);
    }

    #[test]
    fn complementary_gravity_matches_tilt() {
        let mut filter = ComplementaryFilter::new(0.0);
        let out = filter.update(Vec3::ZERO, Vec3::new(0.0, 1.0, 1.0), 0.01);
        let expected = Vec3::new(0.0, FRAC_PI_4.sin(), FRAC_PI_4.cos());
        assert!((out.gravity - expected).length() < 1e-5);
    }

    #[test]
    fn invalid_dt_integrates_nothing() {
        let mut filter = ComplementaryFilter::new(1.0);
        filter.update(Vec3::ONE, G, -0.5);
        filter.update(Vec3::ONE, G, f64::NAN);
        assert_eq!(filter.to_euler(), (0.0, 0.0, 0.0));
    }

    #[test]
    fn kind_builds_selected_strategy() {
        let mut filter = FilterKind::Complementary { alpha: 1.0 }.build();
        filter.update(Vec3::new(0.0, 0.0, 1.0), Vec3::ZERO, 1.0);
        assert_eq!(filter.to_euler().2, 1.0);

        let filter = FilterKind::default().build();
        assert_eq!(filter.orientation(), Quat::IDENTITY);
    }
}
