pub mod calibration;
pub mod estimator;
pub mod fusion;
pub mod protocol;
pub mod reader;
pub mod types;

use calibration::calibrate;
use estimator::AttitudeEstimator;
use fusion::FilterKind;
use reader::{ReaderError, StreamReader};
use std::io::Read;
use std::time::Duration;
use tokio::sync::watch;
use types::{Attitude, CalibrationResult, GyroUnit};

/// Everything the ingestion task needs to know up front.
#[derive(Debug, Clone, Copy)]
pub struct ImuSettings {
    /// Only use samples from this radio pipe.
    pub channel: Option<u8>,
    pub gyro_unit: GyroUnit,
    pub calibration_duration: Duration,
    /// Low-pass coefficient for the resting gravity estimate.
    pub gravity_alpha: f32,
    pub filter: FilterKind,
}

impl Default for ImuSettings {
    fn default() -> Self {
        Self {
            channel: Some(2),
            gyro_unit: GyroUnit::DegreesPerSecond,
            calibration_duration: Duration::from_secs(2),
            gravity_alpha: 0.9,
            filter: FilterKind::default(),
        }
    }
}

/// Client for the IMU dongle.
///
/// Reads the serial byte stream on a blocking task, calibrates gyro bias,
/// runs the attitude filter and publishes the latest attitude.
pub struct ImuClient {
    attitude_rx: watch::Receiver<Attitude>,
    calibration_rx: watch::Receiver<Option<CalibrationResult>>,
    task: tokio::task::JoinHandle<Result<(), ReaderError>>,
}

impl ImuClient {
    /// Start ingesting from `source`. Must be called inside a Tokio runtime.
    pub fn spawn<R>(source: R, settings: ImuSettings) -> Self
    where
        R: Read + Send + 'static,
    {
        let (attitude_tx, attitude_rx) = watch::channel(Attitude::default());
        let (calibration_tx, calibration_rx) = watch::channel(None);

        let task = tokio::task::spawn_blocking(move || {
            let reader = StreamReader::new(source)
                .with_channel(settings.channel)
                .with_gyro_unit(settings.gyro_unit);
            imu_read_loop(reader, settings, attitude_tx, calibration_tx)
        });

        Self {
            attitude_rx,
            calibration_rx,
            task,
        }
    }

    /// Create a mock client for development without the dongle connected.
    pub fn mock() -> Self {
        let (attitude_tx, attitude_rx) = watch::channel(Attitude::default());
        let (calibration_tx, calibration_rx) = watch::channel(None);
        let task = tokio::spawn(async move {
            // Keep the senders alive.
            let _tx = (attitude_tx, calibration_tx);
            tokio::signal::ctrl_c().await.ok();
            Ok(())
        });
        Self {
            attitude_rx,
            calibration_rx,
            task,
        }
    }

    /// Latest fused attitude (non-blocking).
    pub fn attitude(&self) -> Attitude {
        *self.attitude_rx.borrow()
    }

    /// Startup calibration, once it has finished.
    pub fn calibration(&self) -> Option<CalibrationResult> {
        *self.calibration_rx.borrow()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the ingestion task to end and return why it stopped.
    pub async fn join(self) -> Result<(), ReaderError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(?e, "IMU ingestion task failed");
                Err(ReaderError::TaskFailed(e))
            }
        }
    }
}

/// Blocking task body: calibrate, then fuse until the stream ends.
fn imu_read_loop<R: Read>(
    mut reader: StreamReader<R>,
    settings: ImuSettings,
    attitude_tx: watch::Sender<Attitude>,
    calibration_tx: watch::Sender<Option<CalibrationResult>>,
) -> Result<(), ReaderError> {
    let (calibration, closing) = calibrate(
        &mut reader,
        settings.calibration_duration,
        settings.gravity_alpha,
    )?;
    calibration_tx.send_replace(Some(calibration));

    tracing::info!(filter = ?settings.filter, "Starting attitude filter");
    let mut estimator = AttitudeEstimator::new(settings.filter.build(), calibration);
    let mut sample_count: u64 = 0;
    // The sample that closed the calibration window seeds the filter clock.
    let mut pending = Some(closing);

    loop {
        let next = match pending.take() {
            Some(sample) => Ok(sample),
            None => reader.read_sample(),
        };
        let sample = match next {
            Ok(sample) => sample,
            Err(e) => {
                let stats = reader.stats();
                tracing::warn!(
                    ?e,
                    accepted = stats.accepted,
                    corrupt = stats.corrupt,
                    invalid = stats.invalid,
                    gaps = stats.gaps,
                    "IMU stream ended"
                );
                return Err(e);
            }
        };

        let attitude = estimator.process(&sample);
        if attitude_tx.send(attitude).is_err() {
            tracing::info!("No attitude receivers left, stopping");
            return Ok(());
        }

        sample_count += 1;
        if sample_count % 1000 == 0 {
            tracing::debug!(sample_count, "IMU samples processed");
        }
    }
}
