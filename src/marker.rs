//! Cold-reset marker kept in RTC fast memory, which survives a software reset
//! but not a power cycle.

use crate::ports::ResetMarker;

const MAGIC: u32 = 0xC01D_B007;

#[esp_hal::ram(rtc_fast, persistent)]
static mut COLD_RESET: u32 = 0;

pub struct RtcMarker;

impl ResetMarker for RtcMarker {
    fn set_marker(&mut self) {
        // SAFETY: only the coordinator task touches the marker.
        unsafe { (&raw mut COLD_RESET).write_volatile(MAGIC) }
    }

    fn check_and_clear_marker(&mut self) -> bool {
        // SAFETY: only the coordinator task touches the marker.
        unsafe {
            let set = (&raw const COLD_RESET).read_volatile() == MAGIC;
            (&raw mut COLD_RESET).write_volatile(0);
            set
        }
    }
}
