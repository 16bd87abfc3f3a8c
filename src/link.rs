//! The accessory network as the coordinator sees it.
//!
//! [`AccessoryLink`] records what the coordinator asked for in a [`Shared`]
//! block; the BLE tasks pick it up from there.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Instant};
use log::info;
use portable_atomic::{AtomicBool, AtomicU64, Ordering};

use crate::ports::{ServiceControl, ServiceError};

/// How long a nearby device may read the serial number after the owner
/// opened the lookup.
pub const LOOKUP_WINDOW: Duration = Duration::from_secs(5 * 60);

pub struct Shared {
    ready: AtomicBool,
    enabled: AtomicBool,
    pairing: AtomicBool,
    /// Tick at which the serial number lookup closes.
    lookup_until: AtomicU64,
    /// Raised when `enabled` or `pairing` changes.
    pub changed: Signal<CriticalSectionRawMutex, ()>,
    pub sound_completed: Signal<CriticalSectionRawMutex, ()>,
    pub battery: Signal<CriticalSectionRawMutex, u8>,
}

impl Shared {
    pub const fn new() -> Self {
        Self {
            ready: AtomicBool::new(false),
            enabled: AtomicBool::new(false),
            pairing: AtomicBool::new(false),
            lookup_until: AtomicU64::new(0),
            changed: Signal::new(),
            sound_completed: Signal::new(),
            battery: Signal::new(),
        }
    }

    /// The radio stack is up; requests can be served.
    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn pairing(&self) -> bool {
        self.pairing.load(Ordering::SeqCst)
    }

    pub fn exit_pairing(&self) {
        self.pairing.store(false, Ordering::SeqCst);
    }

    /// A new owner connected. Completions of sounds it never asked for are
    /// not reported to it.
    pub fn owner_connected(&self) {
        self.sound_completed.reset();
    }

    pub fn serial_lookup_open(&self, now: Instant) -> bool {
        now.as_ticks() < self.lookup_until.load(Ordering::SeqCst)
    }

    fn open_serial_lookup(&self, now: Instant) {
        let until = now + LOOKUP_WINDOW;
        self.lookup_until.store(until.as_ticks(), Ordering::SeqCst);
    }
}

impl Default for Shared {
    fn default() -> Self {
        Self::new()
    }
}

/// State shared between [`AccessoryLink`] and the radio.
pub static SHARED: Shared = Shared::new();

/// [`ServiceControl`] over the BLE GATT server.
pub struct AccessoryLink {
    shared: &'static Shared,
}

impl AccessoryLink {
    pub fn new() -> Self {
        Self::with(&SHARED)
    }

    pub fn with(shared: &'static Shared) -> Self {
        Self { shared }
    }
}

impl Default for AccessoryLink {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceControl for AccessoryLink {
    fn enable(&mut self) -> Result<(), ServiceError> {
        if !self.is_ready() {
            return Err(ServiceError::NotReady);
        }
        self.shared.enabled.store(true, Ordering::SeqCst);
        self.shared.changed.signal(());
        Ok(())
    }

    fn disable(&mut self) -> Result<(), ServiceError> {
        if !self.is_ready() {
            return Err(ServiceError::NotReady);
        }
        self.shared.enabled.store(false, Ordering::SeqCst);
        self.shared.pairing.store(false, Ordering::SeqCst);
        self.shared.changed.signal(());
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.shared.ready.load(Ordering::SeqCst)
    }

    fn sound_completed_indicate(&mut self) -> Result<(), ServiceError> {
        self.shared.sound_completed.signal(());
        Ok(())
    }

    fn pairing_mode_enter(&mut self) -> Result<(), ServiceError> {
        if !self.shared.enabled() {
            return Err(ServiceError::NotReady);
        }
        self.shared.pairing.store(true, Ordering::SeqCst);
        self.shared.changed.signal(());
        Ok(())
    }

    fn serial_number_lookup_enable(&mut self) -> Result<(), ServiceError> {
        self.shared.open_serial_lookup(Instant::now());
        Ok(())
    }

    fn factory_reset(&mut self) -> Result<(), ServiceError> {
        info!("[link] forgetting owner");
        self.shared.enabled.store(false, Ordering::SeqCst);
        self.shared.pairing.store(false, Ordering::SeqCst);
        self.shared.lookup_until.store(0, Ordering::SeqCst);
        self.shared.changed.signal(());
        Ok(())
    }

    fn battery_level_set(&mut self, percent: u8) {
        self.shared.battery.signal(percent);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_wait_for_the_radio() {
        static SHARED: Shared = Shared::new();
        let mut link = AccessoryLink::with(&SHARED);
        assert_eq!(link.enable(), Err(ServiceError::NotReady));
        assert!(!SHARED.enabled());

        SHARED.mark_ready();
        assert_eq!(link.enable(), Ok(()));
        assert!(SHARED.enabled());
        assert!(SHARED.changed.signaled());
    }

    #[test]
    fn pairing_needs_the_service_enabled() {
        static SHARED: Shared = Shared::new();
        SHARED.mark_ready();
        let mut link = AccessoryLink::with(&SHARED);
        assert_eq!(link.pairing_mode_enter(), Err(ServiceError::NotReady));

        link.enable().unwrap();
        link.pairing_mode_enter().unwrap();
        assert!(SHARED.pairing());
        link.disable().unwrap();
        assert!(!SHARED.pairing());
    }

    #[test]
    fn completion_is_not_carried_over_to_the_next_owner() {
        static SHARED: Shared = Shared::new();
        let mut link = AccessoryLink::with(&SHARED);
        link.sound_completed_indicate().unwrap();
        assert!(SHARED.sound_completed.signaled());

        SHARED.owner_connected();
        assert!(!SHARED.sound_completed.signaled());

        link.sound_completed_indicate().unwrap();
        assert!(SHARED.sound_completed.signaled());
    }

    #[test]
    fn serial_lookup_closes_after_its_window() {
        static SHARED: Shared = Shared::new();
        let mut link = AccessoryLink::with(&SHARED);
        let opened = Instant::now();
        assert!(!SHARED.serial_lookup_open(opened));

        link.serial_number_lookup_enable().unwrap();
        let now = Instant::now();
        assert!(SHARED.serial_lookup_open(now));
        assert!(SHARED.serial_lookup_open(opened + LOOKUP_WINDOW - Duration::from_secs(1)));
        assert!(!SHARED.serial_lookup_open(now + LOOKUP_WINDOW));

        link.factory_reset().unwrap();
        assert!(!SHARED.serial_lookup_open(now));
    }
}
