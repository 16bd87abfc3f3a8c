//! Board Support Package for the esp32c3-rust-devkit board, wired as a tag.
//!
//! <https://github.com/esp-rs/esp-rust-board>
//!
//! ### I2C Peripherals
//!
//! | Peripheral | Part number | Reference                                                                   | Crate                                     | Address |
//! | ---------- | ----------- | --------------------------------------------------------------------------- | ----------------------------------------- | ------- |
//! | IMU        | ICM-42670-P | [Datasheet](https://invensense.tdk.com/download-pdf/icm-42670-p-datasheet/) | [Link](https://crates.io/crates/icm42670) | 0x68    |
//!
//! #### I2C Bus Connection
//!
//! | Signal | GPIO   |
//! | ------ | ------ |
//! | SDA    | GPIO10 |
//! | SCL    | GPIO8  |
//!
//! ### I/Os
//!
//! | I/O Devices | GPIO  | Role                                      |
//! | ----------- | ----- | ----------------------------------------- |
//! | WS2812 LED  | GPIO2 | Sound indicator (the board has no buzzer) |
//! | Button/Boot | GPIO9 | The tag's only button                     |
//!
//! The motion sampler runs on an interrupt executor so it preempts the
//! thread-mode executor that hosts the coordinator, the button and BLE.

use bt_hci::controller::ExternalController;
use embassy_executor::SendSpawner;
use esp_hal::{
    clock::CpuClock,
    gpio::{Input, Pull},
    i2c::master::{Config, I2c},
    interrupt::{Priority, software::SoftwareInterruptControl},
    rmt::Rmt,
    rng::Rng,
    time::RateExtU32,
    timer::systimer::SystemTimer,
};
use esp_hal_embassy::InterruptExecutor;
use esp_hal_smartled::{SmartLedsAdapter, smartLedBuffer};
use esp_wifi::{EspWifiController, ble::controller::BleConnector};
use log::info;
use static_cell::StaticCell;

use crate::indicator::Led;
use crate::ports::BatteryGauge;

pub type I2cType<'a> = I2c<'a, esp_hal::Blocking>;

const SLOTS: usize = 20;
pub type BleController = ExternalController<BleConnector<'static>, SLOTS>;

/// Board-specific peripherals.
pub struct Board {
    /// Onboard RGB LED
    pub led: Led,
    /// I2c bus, owned by the IMU
    pub i2c: I2cType<'static>,
    /// BLE controller
    pub ble_controller: BleController,
    /// Boot button
    pub button: Input<'static>,
    /// Spawner for the high priority executor running the sampler
    pub sampler_spawner: SendSpawner,
}

impl Board {
    /// Initialize the board.
    pub fn init() -> Self {
        let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
        let p = esp_hal::init(config);
        esp_alloc::heap_allocator!(72 * 1024);

        info!("{} initialized!", esp_hal::chip!());

        let led = {
            let rmt = Rmt::new(p.RMT, 80.MHz()).expect("Failed to initialize RMT0");
            SmartLedsAdapter::new(rmt.channel0, p.GPIO2, smartLedBuffer!(1))
        };
        info!("Initialized WS2812 LED");

        let i2c = I2c::new(p.I2C0, Config::default())
            .expect("Failed to initialize I2C0")
            .with_scl(p.GPIO8)
            .with_sda(p.GPIO10);
        info!("Initialized I2C bus");

        let rng = Rng::new(p.RNG);

        let timer0 = SystemTimer::new(p.SYSTIMER);
        esp_hal_embassy::init(timer0.alarm0);
        info!("Initialized Embassy Executor");

        let sampler_spawner = {
            let sw_ints = SoftwareInterruptControl::new(p.SW_INTERRUPT);
            static EXECUTOR: StaticCell<InterruptExecutor<2>> = StaticCell::new();
            EXECUTOR
                .init(InterruptExecutor::new(sw_ints.software_interrupt2))
                .start(Priority::Priority2)
        };
        info!("Initialized sampler executor");

        info!("Initializing BLE controller...");
        let controller: BleController = {
            let timg0 = esp_hal::timer::timg::TimerGroup::new(p.TIMG0);
            static WIFI: StaticCell<EspWifiController<'static>> = StaticCell::new();
            let init = WIFI.init(
                esp_wifi::init(timg0.timer0, rng, p.RADIO_CLK)
                    .expect("Failed to initialize BLE controller"),
            );
            let bluetooth = p.BT;
            let connector = esp_wifi::ble::controller::BleConnector::new(init, bluetooth);
            ExternalController::new(connector)
        };
        Self {
            led,
            i2c,
            ble_controller: controller,
            button: Input::new(p.GPIO9, Pull::Up),
            sampler_spawner,
        }
    }
}

/// Restart the chip. Used after a factory reset.
pub fn restart() -> ! {
    esp_hal::system::software_reset()
}

/// The devkit runs from USB and has no cell to measure.
pub struct UsbPower;

impl BatteryGauge for UsbPower {
    fn percent(&mut self) -> u8 {
        100
    }
}
