//! The RGB LED standing in for the speaker.

use esp_hal_smartled::{LedAdapterError, SmartLedsAdapter};
use log::error;
use smart_leds::colors::{BLACK, ORANGE};
use smart_leds::{RGB8, SmartLedsWrite, brightness};

use crate::ports::SoundOutput;

/// One WS2812 on RMT channel 0.
pub type Led = SmartLedsAdapter<esp_hal::rmt::Channel<esp_hal::Blocking, 0>, 25>;

/// Set the colour and brightness of the specified LED.
pub fn write_led(led: &mut Led, colour: RGB8, level: u8) -> Result<(), LedAdapterError> {
    led.write(brightness([colour].into_iter(), level))
}

pub struct Indicator {
    led: Led,
    colour: RGB8,
    level: u8,
}

impl Indicator {
    pub fn new(led: Led) -> Self {
        Self {
            led,
            colour: ORANGE,
            level: 50,
        }
    }

    fn show(&mut self, colour: RGB8) {
        if let Err(e) = write_led(&mut self.led, colour, self.level) {
            error!("Failed to write to LED: {:?}", e);
        }
    }
}

impl SoundOutput for Indicator {
    fn on(&mut self) {
        self.show(self.colour);
    }

    fn off(&mut self) {
        self.show(BLACK);
    }
}
