mod motor;

use anyhow::{Context, Result};
use std::fs::File;
use std::io::BufReader;
use std::time::Duration;
use tiltlink_config::{AppConfig, FilterMode, GyroUnitConfig};
use tiltlink_imu::fusion::FilterKind;
use tiltlink_imu::types::{Attitude, GyroUnit};
use tiltlink_imu::{ImuClient, ImuSettings};
use tracing::{info, warn};

/// How often the status line is written.
const STATUS_INTERVAL: Duration = Duration::from_millis(250);

fn imu_settings(config: &AppConfig) -> ImuSettings {
    let filter = match config.filter.mode {
        FilterMode::Mahony => FilterKind::Mahony {
            kp: config.filter.kp,
            ki: config.filter.ki,
        },
        FilterMode::Complementary => FilterKind::Complementary {
            alpha: config.filter.alpha,
        },
    };
    let gyro_unit = match config.imu.gyro_unit {
        GyroUnitConfig::DegreesPerSecond => GyroUnit::DegreesPerSecond,
        GyroUnitConfig::RadiansPerSecond => GyroUnit::RadiansPerSecond,
    };

    ImuSettings {
        channel: config.serial.channel.as_filter(),
        gyro_unit,
        calibration_duration: Duration::from_secs_f64(config.calibration.duration_secs),
        gravity_alpha: config.calibration.gravity_alpha,
        filter,
    }
}

fn log_status(attitude: &Attitude, motor_scale: f32) {
    let mix = motor::mix_from_gravity(attitude.gravity, motor_scale);
    info!(
        roll_deg = format_args!("{:8.2}", attitude.roll.to_degrees()),
        pitch_deg = format_args!("{:8.2}", attitude.pitch.to_degrees()),
        yaw_deg = format_args!("{:8.2}", attitude.yaw.to_degrees()),
        rate_hz = format_args!("{:6.1}", attitude.rate_hz),
        gravity = format_args!(
            "{:6.2},{:6.2},{:6.2}",
            attitude.gravity.x, attitude.gravity.y, attitude.gravity.z
        ),
        left_duty = mix.left.duty,
        left_dir = ?mix.left.direction,
        right_duty = mix.right.duty,
        right_dir = ?mix.right.direction,
        "Attitude"
    );
}

/// Report attitude until ingestion ends or the user interrupts.
async fn run(client: ImuClient, motor_scale: f32) -> Result<()> {
    let mut status = tokio::time::interval(STATUS_INTERVAL);

    loop {
        tokio::select! {
            _ = status.tick() => {
                if client.is_finished() {
                    break;
                }
                if client.calibration().is_some() {
                    log_status(&client.attitude(), motor_scale);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Stopping");
                return Ok(());
            }
        }
    }

    client.join().await.context("IMU ingestion stopped")
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tiltlink=info,tiltlink_imu=info,tiltlink_config=info".into()),
        )
        .init();

    info!("tiltlink starting");

    // Load config.
    let config = tiltlink_config::load_config().unwrap_or_else(|e| {
        warn!(?e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    let settings = imu_settings(&config);
    info!(port = %config.serial.port, ?settings, "Config loaded");

    // Open the dongle (fall back to mock if it is not plugged in).
    let client = match File::open(&config.serial.port) {
        Ok(port) => {
            info!("Dongle opened");
            ImuClient::spawn(BufReader::new(port), settings)
        }
        Err(e) => {
            warn!(?e, "Dongle not available, using mock (no attitude)");
            ImuClient::mock()
        }
    };

    run(client, config.motor.scale).await
}
