//! The coordinator actor.
//!
//! Button edges and accessory-network callbacks arrive as [`Message`]s in the
//! actor's inbox. Scheduled work (sound timeouts, enable/disable retries) runs
//! when the earliest deadline passes. Both happen on the actor's own task, so
//! the coordinator never sees two events at once.

use core::future::pending;

use ector::{DynamicAddress, Inbox};
use embassy_futures::select::{Either, select};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Instant, Timer};
use log::info;

use crate::coordinator::{Coordinator, Flow, SoundTrigger};
use crate::gesture::ButtonEdge;
use crate::ports::{BatteryGauge, ResetMarker, ServiceControl, SoundOutput};

/// Where the answer to a motion poll is delivered.
pub type MotionReply = Signal<CriticalSectionRawMutex, bool>;

/// The actor's message type: everything that can happen to the accessory.
pub enum Message {
    /// A button changed level.
    Button(ButtonEdge),
    /// The service asks for a sound.
    SoundStart(SoundTrigger),
    /// The service asks to stop the sound.
    SoundStop,
    /// The service wants motion detection running.
    MotionStart,
    MotionStop,
    /// A polling period ended; whether it saw motion goes to the reply.
    MotionPeriodElapsed(&'static MotionReply),
    BatteryLevelRequest,
    PairingModeExited,
}

/// The actor's private data: the coordinator and how to restart the chip.
pub struct Agent<S, O, B, K> {
    coordinator: Coordinator<'static, S, O, B, K>,
    restart: fn() -> !,
}

impl<S, O, B, K> Agent<S, O, B, K>
where
    S: ServiceControl,
    O: SoundOutput,
    B: BatteryGauge,
    K: ResetMarker,
{
    pub fn new(coordinator: Coordinator<'static, S, O, B, K>, restart: fn() -> !) -> Self {
        Self {
            coordinator,
            restart,
        }
    }

    /// The message handler
    pub async fn act(&mut self, msg: Message) -> Flow {
        let now = Instant::now();
        let c = &mut self.coordinator;
        match msg {
            Message::Button(edge) => return c.on_button(edge, now),
            Message::SoundStart(trigger) => c.sound_start(trigger, now),
            Message::SoundStop => c.sound_stop(),
            Message::MotionStart => c.motion_start(),
            Message::MotionStop => c.motion_stop(),
            Message::MotionPeriodElapsed(reply) => {
                // an empty window was already logged, report it as still
                reply.signal(c.motion_period_elapsed().unwrap_or(false));
            }
            Message::BatteryLevelRequest => c.battery_level_request(),
            Message::PairingModeExited => c.pairing_mode_exited(),
        }
        Flow::Continue
    }

    /// Play the chime to completion, then restart. Does not return.
    pub async fn shutdown(&mut self, chime: Duration) -> ! {
        Timer::after(chime).await;
        self.coordinator.finish_factory_reset();
        (self.restart)()
    }
}

impl<S, O, B, K> ector::Actor for Agent<S, O, B, K>
where
    S: ServiceControl,
    O: SoundOutput,
    B: BatteryGauge,
    K: ResetMarker,
{
    type Message = Message;

    /// Actor pattern for either handling new incoming messages or running a scheduled action.
    async fn on_mount<M>(&mut self, _: DynamicAddress<Message>, mut inbox: M) -> !
    where
        M: Inbox<Self::Message>,
    {
        info!("Coordinator started!");
        self.coordinator.boot(Instant::now());
        loop {
            let next = self.coordinator.next_deadline();
            let deadline = async {
                match next {
                    Some(at) => Timer::at(at).await,
                    None => pending().await,
                }
            };
            let flow = match select(inbox.next(), deadline).await {
                Either::First(msg) => self.act(msg).await,
                Either::Second(_) => {
                    self.coordinator.run_due(Instant::now());
                    Flow::Continue
                }
            };
            if let Flow::FactoryReset { chime } = flow {
                self.shutdown(chime).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use embassy_futures::block_on;

    use super::*;
    use crate::config::Config;
    use crate::motion::{GyroSample, MotionAccumulator};
    use crate::ports::Operation;
    use crate::ports::fakes::{Call, FakeGauge, FakeMarker, FakeService, FakeSound, Journal};

    type TestAgent = Agent<FakeService, FakeSound, FakeGauge, FakeMarker>;

    fn restart() -> ! {
        panic!("restart requested")
    }

    fn agent(journal: &Journal, accumulator: &'static MotionAccumulator) -> TestAgent {
        let coordinator = Coordinator::new(
            Config::default(),
            FakeService::new(journal),
            FakeSound(journal.clone()),
            FakeGauge(42),
            FakeMarker::default(),
            accumulator,
        );
        Agent::new(coordinator, restart)
    }

    #[test]
    fn motion_poll_answers_through_the_reply() {
        static ACC: MotionAccumulator = MotionAccumulator::new();
        static REPLY: MotionReply = Signal::new();
        let journal = Journal::default();
        let mut agent = agent(&journal, &ACC);

        block_on(agent.act(Message::MotionStart));
        assert!(ACC.is_running());

        // polled before the first sample: reported as no motion
        block_on(agent.act(Message::MotionPeriodElapsed(&REPLY)));
        assert_eq!(REPLY.try_take(), Some(false));

        ACC.push(GyroSample {
            x: 0.0,
            y: 0.5,
            z: 0.0,
        });
        block_on(agent.act(Message::MotionPeriodElapsed(&REPLY)));
        assert_eq!(REPLY.try_take(), Some(true));

        block_on(agent.act(Message::MotionStop));
        assert!(!ACC.is_running());
    }

    #[test]
    fn protocol_requests_reach_the_ports() {
        static ACC: MotionAccumulator = MotionAccumulator::new();
        let journal = Journal::default();
        let mut agent = agent(&journal, &ACC);

        block_on(agent.act(Message::SoundStart(SoundTrigger::Remote)));
        block_on(agent.act(Message::SoundStop));
        block_on(agent.act(Message::BatteryLevelRequest));
        assert_eq!(
            journal.calls(),
            [Call::SoundOn, Call::SoundOff, Call::Battery(42)]
        );
    }

    #[test]
    fn long_hold_toggles_the_service() {
        static ACC: MotionAccumulator = MotionAccumulator::new();
        let journal = Journal::default();
        let mut agent = agent(&journal, &ACC);

        let press = ButtonEdge::press(0, Instant::from_millis(0));
        let release = ButtonEdge::release(0, Instant::from_millis(4000));
        assert_eq!(block_on(agent.act(Message::Button(press))), Flow::Continue);
        assert_eq!(block_on(agent.act(Message::Button(release))), Flow::Continue);
        assert_eq!(journal.calls(), [Call::Service(Operation::Enable)]);
    }

    #[test]
    fn factory_reset_hold_asks_for_shutdown() {
        static ACC: MotionAccumulator = MotionAccumulator::new();
        let journal = Journal::default();
        let mut agent = agent(&journal, &ACC);

        block_on(agent.act(Message::Button(ButtonEdge::press(0, Instant::from_millis(0)))));
        let flow = block_on(agent.act(Message::Button(ButtonEdge::release(
            0,
            Instant::from_millis(11_000),
        ))));
        assert!(matches!(flow, Flow::FactoryReset { .. }));
        assert!(agent.coordinator.is_halted());
    }

    #[test]
    #[should_panic(expected = "restart requested")]
    fn shutdown_restarts_after_the_chime() {
        static ACC: MotionAccumulator = MotionAccumulator::new();
        let journal = Journal::default();
        let mut agent = agent(&journal, &ACC);
        agent.coordinator.factory_reset();
        block_on(agent.shutdown(Duration::from_millis(5)));
    }
}
