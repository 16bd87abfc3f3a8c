//! Capabilities the core consumes from the board and the accessory-network
//! library.
//!
//! Concrete implementations are injected at start-up; tests use fakes that
//! return canned successes and failures.

use core::fmt::Debug;

use thiserror::Error;

use crate::motion::GyroSample;

/// Full-scale range of the gyroscope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GyroRange {
    Dps250,
    Dps500,
    Dps1000,
    Dps2000,
}

/// A motion sensor delivering one sample per sampling tick.
pub trait SensorSource {
    type Error: Debug;

    /// Apply full-scale range and output data rate before sampling starts.
    fn configure(&mut self, range: GyroRange, rate_hz: u32) -> Result<(), Self::Error>;

    /// Read the sample for the current tick, as rotation in radians over one
    /// sampling period.
    fn sample(&mut self) -> Result<GyroSample, Self::Error>;
}

/// Error reported by the accessory-network library.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ServiceError {
    #[error("service is not ready")]
    NotReady,
    #[error("request rejected with code {0}")]
    Rejected(i32),
}

/// Requests the coordinator issues to the accessory-network library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Enable,
    Disable,
    SoundCompleted,
    PairingModeEnter,
    SerialNumberLookup,
    FactoryReset,
}

/// The accessory-network library, seen from the coordinator.
pub trait ServiceControl {
    fn enable(&mut self) -> Result<(), ServiceError>;
    fn disable(&mut self) -> Result<(), ServiceError>;
    fn is_ready(&self) -> bool;
    fn sound_completed_indicate(&mut self) -> Result<(), ServiceError>;
    fn pairing_mode_enter(&mut self) -> Result<(), ServiceError>;
    fn serial_number_lookup_enable(&mut self) -> Result<(), ServiceError>;
    fn factory_reset(&mut self) -> Result<(), ServiceError>;
    fn battery_level_set(&mut self, percent: u8);
}

/// Sound (or stand-in indicator) output.
pub trait SoundOutput {
    fn on(&mut self);
    fn off(&mut self);
}

/// Battery state of charge.
pub trait BatteryGauge {
    fn percent(&mut self) -> u8;
}

/// Marker that survives the restart following a factory reset.
pub trait ResetMarker {
    fn set_marker(&mut self);
    /// Returns whether the marker was set, clearing it.
    fn check_and_clear_marker(&mut self) -> bool;
}

#[cfg(test)]
pub(crate) mod fakes {
    //! Fakes for the port traits, all writing into one shared journal so
    //! tests can check the order of calls across ports.

    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Call {
        Service(Operation),
        SoundOn,
        SoundOff,
        Battery(u8),
    }

    #[derive(Debug, Clone, Default)]
    pub struct Journal(Rc<RefCell<Vec<Call>>>);

    impl Journal {
        pub fn record(&self, call: Call) {
            self.0.borrow_mut().push(call);
        }

        pub fn calls(&self) -> Vec<Call> {
            self.0.borrow().clone()
        }

        pub fn count(&self, call: Call) -> usize {
            self.0.borrow().iter().filter(|c| **c == call).count()
        }

        pub fn clear(&self) {
            self.0.borrow_mut().clear();
        }
    }

    pub struct FakeService {
        pub ready: bool,
        journal: Journal,
        /// Canned results per operation, consumed front to back.
        /// An empty queue means success.
        results: Vec<(Operation, VecDeque<Result<(), ServiceError>>)>,
    }

    impl FakeService {
        pub fn new(journal: &Journal) -> Self {
            Self {
                ready: true,
                journal: journal.clone(),
                results: Vec::new(),
            }
        }

        pub fn fail_next(&mut self, op: Operation, times: usize) {
            let queue = self.queue(op);
            for _ in 0..times {
                queue.push_back(Err(ServiceError::Rejected(-5)));
            }
        }

        fn queue(&mut self, op: Operation) -> &mut VecDeque<Result<(), ServiceError>> {
            if let Some(i) = self.results.iter().position(|(o, _)| *o == op) {
                return &mut self.results[i].1;
            }
            self.results.push((op, VecDeque::new()));
            &mut self.results.last_mut().unwrap().1
        }

        fn call(&mut self, op: Operation) -> Result<(), ServiceError> {
            self.journal.record(Call::Service(op));
            self.queue(op).pop_front().unwrap_or(Ok(()))
        }
    }

    impl ServiceControl for FakeService {
        fn enable(&mut self) -> Result<(), ServiceError> {
            self.call(Operation::Enable)
        }
        fn disable(&mut self) -> Result<(), ServiceError> {
            self.call(Operation::Disable)
        }
        fn is_ready(&self) -> bool {
            self.ready
        }
        fn sound_completed_indicate(&mut self) -> Result<(), ServiceError> {
            self.call(Operation::SoundCompleted)
        }
        fn pairing_mode_enter(&mut self) -> Result<(), ServiceError> {
            self.call(Operation::PairingModeEnter)
        }
        fn serial_number_lookup_enable(&mut self) -> Result<(), ServiceError> {
            self.call(Operation::SerialNumberLookup)
        }
        fn factory_reset(&mut self) -> Result<(), ServiceError> {
            self.call(Operation::FactoryReset)
        }
        fn battery_level_set(&mut self, percent: u8) {
            self.journal.record(Call::Battery(percent));
        }
    }

    pub struct FakeSound(pub Journal);

    impl SoundOutput for FakeSound {
        fn on(&mut self) {
            self.0.record(Call::SoundOn);
        }
        fn off(&mut self) {
            self.0.record(Call::SoundOff);
        }
    }

    pub struct FakeGauge(pub u8);

    impl BatteryGauge for FakeGauge {
        fn percent(&mut self) -> u8 {
            self.0
        }
    }

    #[derive(Debug, Default)]
    pub struct FakeMarker {
        pub set: bool,
    }

    impl ResetMarker for FakeMarker {
        fn set_marker(&mut self) {
            self.set = true;
        }
        fn check_and_clear_marker(&mut self) -> bool {
            core::mem::take(&mut self.set)
        }
    }
}
