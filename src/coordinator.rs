//! Turns gestures and accessory-network callbacks into actions.
//!
//! The coordinator owns the service activation state, the sound and motion
//! sub-states and the [`RetryScheduler`]. Every method runs on one cooperative
//! context and takes the current time explicitly, so the owner decides where
//! time comes from.

use embassy_time::{Duration, Instant};
use log::{debug, error, info, warn};

use crate::AppError;
use crate::config::{Action, Config};
use crate::gesture::{ButtonEdge, GestureClass, GestureClassifier, GestureEvent};
use crate::motion::{self, MotionAccumulator};
use crate::ports::{
    BatteryGauge, Operation, ResetMarker, ServiceControl, ServiceError, SoundOutput,
};
use crate::scheduler::{Purpose, RetryScheduler, ScheduledTask};

/// Activation state of the accessory-network service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Disabled,
    Enabling,
    Enabled,
    Disabling,
}

/// Why a sound is playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundTrigger {
    /// Requested by a connected owner device.
    Remote,
    /// Requested by the service after it flagged unwanted tracking.
    UnwantedTracking,
    /// Local feedback for a button action.
    Acknowledge,
}

impl SoundTrigger {
    /// Sounds the service asked for must be reported back when they end.
    fn requested_by_service(self) -> bool {
        !matches!(self, Self::Acknowledge)
    }
}

/// What the owner has to do after an event was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Play the chime for `chime`, call
    /// [`Coordinator::finish_factory_reset`] and restart.
    FactoryReset { chime: Duration },
}

pub struct Coordinator<'a, S, O, B, K> {
    config: Config,
    pub(crate) service: S,
    pub(crate) sound: O,
    battery: B,
    marker: K,
    accumulator: &'a MotionAccumulator,
    classifier: GestureClassifier,
    scheduler: RetryScheduler,
    state: ServiceState,
    playing: Option<SoundTrigger>,
    motion_enabled: bool,
    pairing_mode: bool,
    /// Set by a cold boot: enter pairing mode as soon as the service is up.
    pair_once_enabled: bool,
    halted: bool,
}

impl<'a, S, O, B, K> Coordinator<'a, S, O, B, K>
where
    S: ServiceControl,
    O: SoundOutput,
    B: BatteryGauge,
    K: ResetMarker,
{
    pub fn new(
        config: Config,
        service: S,
        sound: O,
        battery: B,
        marker: K,
        accumulator: &'a MotionAccumulator,
    ) -> Self {
        Self {
            classifier: GestureClassifier::new(config.gestures),
            config,
            service,
            sound,
            battery,
            marker,
            accumulator,
            scheduler: RetryScheduler::new(),
            state: ServiceState::Disabled,
            playing: None,
            motion_enabled: false,
            pairing_mode: false,
            pair_once_enabled: false,
            halted: false,
        }
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    pub fn playing(&self) -> Option<SoundTrigger> {
        self.playing
    }

    pub fn motion_enabled(&self) -> bool {
        self.motion_enabled
    }

    pub fn pairing_mode(&self) -> bool {
        self.pairing_mode
    }

    /// Set once a factory reset started; every later event is ignored.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn scheduler(&self) -> &RetryScheduler {
        &self.scheduler
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.scheduler.next_deadline()
    }

    /// Run once at start-up. After a factory reset the accessory comes back
    /// unpaired, so the service is enabled and put in pairing mode straight
    /// away to make it discoverable. Returns whether this was such a cold boot.
    pub fn boot(&mut self, now: Instant) -> bool {
        if !self.marker.check_and_clear_marker() {
            return false;
        }
        info!("first boot after factory reset, enabling service");
        self.pair_once_enabled = true;
        if let Err(e) = self.begin_enable(now, 0) {
            warn!("{}", e);
        }
        true
    }

    pub fn on_button(&mut self, edge: ButtonEdge, now: Instant) -> Flow {
        if self.halted {
            return Flow::Continue;
        }
        match self.classifier.on_edge(edge) {
            Ok(Some(event)) => self.on_gesture(event, now),
            Ok(None) => Flow::Continue,
            Err(e) => {
                debug!("edge dropped: {}", e);
                Flow::Continue
            }
        }
    }

    pub fn on_gesture(&mut self, event: GestureEvent, now: Instant) -> Flow {
        if self.halted {
            return Flow::Continue;
        }
        let Some(binding) = self.config.buttons.binding(event.button) else {
            warn!("{}", AppError::UnknownButton(event.button));
            return Flow::Continue;
        };
        let action = binding.action(event.class);

        if event.class == GestureClass::Long
            && event.hold_duration >= self.config.gestures.factory_reset_hold()
        {
            return self.factory_reset();
        }

        if let Err(e) = self.perform(action, now) {
            warn!("{:?}: {}", action, e);
        }
        Flow::Continue
    }

    /// Carry out a button action.
    pub fn perform(&mut self, action: Action, now: Instant) -> Result<(), AppError> {
        if self.halted {
            return Ok(());
        }
        match action {
            Action::Nothing => {
                debug!("gesture not bound to an action");
                Ok(())
            }
            Action::ToggleService => self.toggle_service(now),
            Action::ResumePairing => self.resume_pairing(now),
            Action::SerialNumberLookup => self.serial_number_lookup(now),
        }
    }

    /// Flip the service between enabled and disabled. A toggle while a
    /// transition is still retrying abandons it and heads the other way.
    fn toggle_service(&mut self, now: Instant) -> Result<(), AppError> {
        match self.state {
            ServiceState::Disabled => self.begin_enable(now, 0),
            ServiceState::Enabled => self.begin_disable(now, 0),
            ServiceState::Enabling => {
                self.scheduler.cancel(Purpose::EnableRetry);
                info!("enabling superseded, disabling instead");
                self.begin_disable(now, 0)
            }
            ServiceState::Disabling => {
                self.scheduler.cancel(Purpose::DisableRetry);
                info!("disabling superseded, enabling instead");
                self.begin_enable(now, 0)
            }
        }
    }

    fn begin_enable(&mut self, now: Instant, retry_count: u32) -> Result<(), AppError> {
        self.state = ServiceState::Enabling;
        match self.call(Operation::Enable) {
            Ok(()) => {
                self.state = ServiceState::Enabled;
                info!("service enabled");
                if core::mem::take(&mut self.pair_once_enabled) {
                    match self.call(Operation::PairingModeEnter) {
                        Ok(()) => {
                            self.pairing_mode = true;
                            info!("pairing mode entered");
                        }
                        Err(e) => warn!("{}", e),
                    }
                }
                Ok(())
            }
            Err(e) => {
                self.scheduler.schedule(
                    Purpose::EnableRetry,
                    now,
                    self.config.retry_backoff,
                    retry_count + 1,
                );
                Err(e)
            }
        }
    }

    fn begin_disable(&mut self, now: Instant, retry_count: u32) -> Result<(), AppError> {
        self.state = ServiceState::Disabling;
        self.pair_once_enabled = false;
        match self.call(Operation::Disable) {
            Ok(()) => {
                self.state = ServiceState::Disabled;
                self.pairing_mode = false;
                info!("service disabled");
                Ok(())
            }
            Err(e) => {
                self.scheduler.schedule(
                    Purpose::DisableRetry,
                    now,
                    self.config.retry_backoff,
                    retry_count + 1,
                );
                Err(e)
            }
        }
    }

    /// Pairing and lookup failures are reported and dropped, never retried.
    fn resume_pairing(&mut self, now: Instant) -> Result<(), AppError> {
        if self.state != ServiceState::Enabled {
            info!("pairing needs the service enabled, ignored");
            return Ok(());
        }
        if self.pairing_mode {
            info!("already in pairing mode");
            return Ok(());
        }
        self.call(Operation::PairingModeEnter)?;
        self.pairing_mode = true;
        info!("pairing mode resumed");
        self.sound_start(SoundTrigger::Acknowledge, now);
        Ok(())
    }

    fn serial_number_lookup(&mut self, now: Instant) -> Result<(), AppError> {
        if self.state != ServiceState::Enabled {
            info!("serial number lookup needs the service enabled, ignored");
            return Ok(());
        }
        self.call(Operation::SerialNumberLookup)?;
        info!("serial number lookup enabled");
        self.sound_start(SoundTrigger::Acknowledge, now);
        Ok(())
    }

    /// Start a sound, or extend the one already playing. The output is turned
    /// on once and the single auto-stop is moved.
    pub fn sound_start(&mut self, trigger: SoundTrigger, now: Instant) {
        if self.halted {
            return;
        }
        match self.playing {
            None => {
                info!("sound started ({:?})", trigger);
                self.sound.on();
            }
            // feedback never cuts short or hides a sound the service asked for
            Some(current) if current.requested_by_service() && !trigger.requested_by_service() => {
                debug!("{:?} sound playing, {:?} ignored", current, trigger);
                return;
            }
            Some(_) => debug!("sound already playing, restarting timeout"),
        }
        let timeout = match trigger {
            SoundTrigger::Remote => self.config.sound.remote,
            SoundTrigger::UnwantedTracking => self.config.sound.unwanted_tracking,
            SoundTrigger::Acknowledge => self.config.sound.acknowledge,
        };
        self.playing = Some(trigger);
        self.scheduler.schedule(Purpose::SoundTimeout, now, timeout, 0);
    }

    /// Stop on request. The service is not told, it asked for this.
    pub fn sound_stop(&mut self) {
        if self.halted {
            return;
        }
        self.scheduler.cancel(Purpose::SoundTimeout);
        if self.playing.take().is_some() {
            info!("sound stopped");
            self.sound.off();
        }
    }

    fn sound_timed_out(&mut self) {
        let Some(trigger) = self.playing.take() else {
            return;
        };
        if trigger.requested_by_service() {
            if let Err(e) = self.call(Operation::SoundCompleted) {
                warn!("{}", e);
            }
        }
        info!("sound timed out");
        self.sound.off();
    }

    pub fn motion_start(&mut self) {
        if self.halted {
            return;
        }
        if self.motion_enabled {
            debug!("motion detection already running");
            return;
        }
        self.accumulator.start();
        self.motion_enabled = true;
        info!("motion detection started");
    }

    /// Close the current window and report whether it saw motion. The
    /// accumulator keeps running into the next window.
    pub fn motion_period_elapsed(&mut self) -> Result<bool, AppError> {
        if self.halted {
            return Ok(false);
        }
        if !self.motion_enabled {
            warn!("motion polled while detection is off");
            return Ok(false);
        }
        let window = self.accumulator.read_and_reset();
        let detected = motion::is_motion(&window, &self.config.motion).inspect_err(|e| {
            error!("{}", e);
        })?;
        if detected {
            info!("motion detected");
        }
        Ok(detected)
    }

    pub fn motion_stop(&mut self) {
        if self.halted {
            return;
        }
        self.accumulator.stop();
        self.motion_enabled = false;
        info!("motion detection stopped");
    }

    pub fn battery_level_request(&mut self) {
        if self.halted {
            return;
        }
        let percent = self.battery.percent();
        debug!("battery at {}%", percent);
        self.service.battery_level_set(percent);
    }

    pub fn pairing_mode_exited(&mut self) {
        if self.halted {
            return;
        }
        self.pairing_mode = false;
        info!("pairing mode exited");
    }

    /// Run every scheduled task due at `now`.
    pub fn run_due(&mut self, now: Instant) {
        while let Some(task) = self.scheduler.pop_due(now) {
            if self.halted {
                return;
            }
            self.run_task(task, now);
        }
    }

    fn run_task(&mut self, task: ScheduledTask, now: Instant) {
        let result = match task.purpose {
            Purpose::SoundTimeout => {
                self.sound_timed_out();
                Ok(())
            }
            Purpose::EnableRetry if self.state == ServiceState::Enabling => {
                info!("enable retry #{}", task.retry_count);
                self.begin_enable(now, task.retry_count)
            }
            Purpose::DisableRetry if self.state == ServiceState::Disabling => {
                info!("disable retry #{}", task.retry_count);
                self.begin_disable(now, task.retry_count)
            }
            purpose => {
                debug!("stale {:?} in state {:?}", purpose, self.state);
                Ok(())
            }
        };
        if let Err(e) = result {
            warn!("{}, retrying in {} ms", e, self.config.retry_backoff.as_millis());
        }
    }

    /// Pre-empt everything: drop pending work, stop motion detection, reset
    /// the service and start the chime. Nothing is handled afterwards.
    pub fn factory_reset(&mut self) -> Flow {
        warn!("factory reset");
        self.halted = true;
        self.scheduler.cancel_all();
        if self.motion_enabled {
            self.accumulator.stop();
            self.motion_enabled = false;
        }
        if let Err(e) = self.service.factory_reset() {
            error!("{}", AppError::ActionFailed(Operation::FactoryReset, e));
        }
        if self.playing.take().is_none() {
            self.sound.on();
        }
        Flow::FactoryReset {
            chime: self.config.sound.factory_reset_chime,
        }
    }

    /// End the chime and leave the marker for the next boot.
    pub fn finish_factory_reset(&mut self) {
        self.sound.off();
        self.marker.set_marker();
        info!("factory reset complete, restarting");
    }

    fn call(&mut self, op: Operation) -> Result<(), AppError> {
        let failed = |e| AppError::ActionFailed(op, e);
        if !self.service.is_ready() {
            return Err(failed(ServiceError::NotReady));
        }
        match op {
            Operation::Enable => self.service.enable(),
            Operation::Disable => self.service.disable(),
            Operation::SoundCompleted => self.service.sound_completed_indicate(),
            Operation::PairingModeEnter => self.service.pairing_mode_enter(),
            Operation::SerialNumberLookup => self.service.serial_number_lookup_enable(),
            Operation::FactoryReset => self.service.factory_reset(),
        }
        .map_err(failed)
    }
}
