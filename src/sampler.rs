//! The periodic sampling task.
//!
//! Reads the sensor once per tick and pushes into the [`MotionAccumulator`].
//! It never waits on the consumer; while motion detection is stopped it parks
//! until the accumulator is started again.

use embassy_time::{Duration, Ticker};
use log::{info, warn};

use crate::AppError;
use crate::config::MotionConfig;
use crate::motion::MotionAccumulator;
use crate::ports::SensorSource;

pub struct Sampler<S> {
    source: S,
    period: Duration,
}

impl<S: SensorSource> Sampler<S> {
    /// Configure the sensor for the requested range and rate.
    pub fn new(mut source: S, config: &MotionConfig) -> Result<Self, S::Error> {
        source.configure(config.range, config.sample_rate_hz)?;
        info!(
            "sampling {:?} at {} Hz",
            config.range, config.sample_rate_hz
        );
        Ok(Self {
            source,
            period: config.sample_period(),
        })
    }

    /// Take one sample. Returns whether the accumulator kept it.
    pub fn tick(&mut self, accumulator: &MotionAccumulator) -> Result<bool, AppError> {
        let sample = self.source.sample().map_err(|e| {
            warn!("sensor: {:?}", e);
            AppError::SensorRead
        })?;
        Ok(accumulator.push(sample))
    }

    /// Sample forever at the configured rate.
    pub async fn start_sampling(mut self, accumulator: &MotionAccumulator) -> ! {
        let mut ticker = Ticker::every(self.period);
        loop {
            if !accumulator.is_running() {
                info!("sampler idle");
                accumulator.wait_running().await;
                info!("sampler running");
                ticker.reset();
            }
            if let Err(e) = self.tick(accumulator) {
                warn!("{}", e);
            }
            ticker.next().await;
        }
    }
}
