use trouble_host::prelude::*;

use crate::coordinator::SoundTrigger;

#[gatt_service(uuid = service::BATTERY)]
pub struct BatteryService {
    #[descriptor(uuid = descriptors::MEASUREMENT_DESCRIPTION, read, value = "Battery %")]
    #[characteristic(uuid = characteristic::BATTERY_LEVEL, read, notify)]
    pub level: u8,
}

#[gatt_service(uuid = "6a4e3200-667b-11e3-949a-0800200c9a66")]
pub struct TagService {
    /// Requests from the owner's device, one [`Command`] byte per write.
    #[characteristic(uuid = "6a4e3201-667b-11e3-949a-0800200c9a66", write)]
    pub control: u8,
    #[descriptor(uuid = descriptors::MEASUREMENT_DESCRIPTION, read, value = "Sound completed")]
    #[characteristic(uuid = "6a4e3202-667b-11e3-949a-0800200c9a66", notify)]
    pub sound_completed: bool,
    #[descriptor(uuid = descriptors::MEASUREMENT_DESCRIPTION, read, value = "Motion in last period")]
    #[characteristic(uuid = "6a4e3203-667b-11e3-949a-0800200c9a66", read, notify)]
    pub motion: bool,
    #[descriptor(uuid = descriptors::MEASUREMENT_DESCRIPTION, read, value = "Serial number lookup open")]
    #[characteristic(uuid = "6a4e3204-667b-11e3-949a-0800200c9a66", read)]
    pub serial_lookup: bool,
}

#[gatt_server]
pub struct GattServer {
    pub tag: TagService,
    pub battery: BatteryService,
}

/// A byte written to [`TagService::control`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Sound(SoundTrigger),
    SoundStop,
    MotionStart,
    MotionStop,
    MotionPoll,
    BatteryRequest,
}

impl TryFrom<u8> for Command {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        Ok(match value {
            0x01 => Command::Sound(SoundTrigger::Remote),
            0x02 => Command::Sound(SoundTrigger::UnwantedTracking),
            0x03 => Command::SoundStop,
            0x04 => Command::MotionStart,
            0x05 => Command::MotionStop,
            0x06 => Command::MotionPoll,
            0x07 => Command::BatteryRequest,
            other => return Err(other),
        })
    }
}
