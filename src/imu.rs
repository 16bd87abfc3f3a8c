//! The onboard ICM-42670 as the tag's motion sensor.

use icm42670::{Address, GyroOdr, Icm42670, PowerMode, prelude::*};
use log::info;

use crate::bsp::I2cType;
use crate::motion::GyroSample;
use crate::ports::{GyroRange, SensorSource};

pub type Error = icm42670::Error<esp_hal::i2c::master::Error>;

pub struct ImuSource {
    device: Icm42670<I2cType<'static>>,
    rate_hz: u32,
}

impl ImuSource {
    /// Initialize the sensor with the gyroscope powered.
    pub fn new(i2c: I2cType<'static>) -> Result<Self, Error> {
        let mut device = Icm42670::new(i2c, Address::Primary)?;
        device.soft_reset()?;
        device.set_power_mode(PowerMode::GyroLowNoise)?;
        info!("ICM42670 ready");
        Ok(Self { device, rate_hz: 1 })
    }
}

/// Slowest output data rate that still delivers `rate_hz`.
fn odr_for(rate_hz: u32) -> GyroOdr {
    match rate_hz {
        0..=12 => GyroOdr::Hz12_5,
        13..=25 => GyroOdr::Hz25,
        26..=50 => GyroOdr::Hz50,
        51..=100 => GyroOdr::Hz100,
        101..=200 => GyroOdr::Hz200,
        201..=400 => GyroOdr::Hz400,
        401..=800 => GyroOdr::Hz800,
        _ => GyroOdr::Hz1600,
    }
}

impl SensorSource for ImuSource {
    type Error = Error;

    fn configure(&mut self, range: GyroRange, rate_hz: u32) -> Result<(), Error> {
        let range = match range {
            GyroRange::Dps250 => icm42670::GyroRange::Deg250,
            GyroRange::Dps500 => icm42670::GyroRange::Deg500,
            GyroRange::Dps1000 => icm42670::GyroRange::Deg1000,
            GyroRange::Dps2000 => icm42670::GyroRange::Deg2000,
        };
        self.device.set_gyro_range(range)?;
        self.device.set_gyro_odr(odr_for(rate_hz))?;
        self.rate_hz = rate_hz.max(1);
        Ok(())
    }

    /// The sensor reports °/s; one tick turns that into radians.
    fn sample(&mut self) -> Result<GyroSample, Error> {
        let gyro = self.device.gyro_norm()?;
        let per_tick = |dps: f32| dps.to_radians() / self.rate_hz as f32;
        Ok(GyroSample {
            x: per_tick(gyro.x),
            y: per_tick(gyro.y),
            z: per_tick(gyro.z),
        })
    }
}
