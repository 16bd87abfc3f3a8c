//! Delayed and retried work for the coordinator.
//!
//! Every task is tagged with a [`Purpose`] and each purpose holds at most one
//! pending task: scheduling again replaces it. The owner polls
//! [`RetryScheduler::pop_due`] from its own context, so tasks never run
//! concurrently with anything else the coordinator does.

use embassy_time::{Duration, Instant};
use heapless::Vec;
use log::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    /// Stop a playing sound.
    SoundTimeout,
    /// Try enabling the service again.
    EnableRetry,
    /// Try disabling the service again.
    DisableRetry,
}

impl Purpose {
    pub const COUNT: usize = 3;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledTask {
    pub purpose: Purpose,
    pub due: Instant,
    /// How many attempts already failed before this one.
    pub retry_count: u32,
}

#[derive(Debug, Default)]
pub struct RetryScheduler {
    tasks: Vec<ScheduledTask, { Purpose::COUNT }>,
}

impl RetryScheduler {
    pub const fn new() -> Self {
        Self { tasks: Vec::new() }
    }

    /// Schedule `purpose` to run `delay` after `now`, replacing any pending
    /// task with the same purpose. Returns the replaced task.
    pub fn schedule(
        &mut self,
        purpose: Purpose,
        now: Instant,
        delay: Duration,
        retry_count: u32,
    ) -> Option<ScheduledTask> {
        let replaced = self.cancel(purpose);
        let task = ScheduledTask {
            purpose,
            due: now + delay,
            retry_count,
        };
        debug!("scheduled {:?} in {} ms", purpose, delay.as_millis());
        // one slot per purpose and the old one was just removed
        let _ = self.tasks.push(task);
        replaced
    }

    /// Drop the pending task for `purpose`, if any.
    pub fn cancel(&mut self, purpose: Purpose) -> Option<ScheduledTask> {
        let index = self.tasks.iter().position(|t| t.purpose == purpose)?;
        Some(self.tasks.swap_remove(index))
    }

    pub fn cancel_all(&mut self) {
        self.tasks.clear();
    }

    pub fn get(&self, purpose: Purpose) -> Option<&ScheduledTask> {
        self.tasks.iter().find(|t| t.purpose == purpose)
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// When the earliest pending task is due.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.tasks.iter().map(|t| t.due).min()
    }

    /// Remove and return the earliest task due at or before `now`.
    pub fn pop_due(&mut self, now: Instant) -> Option<ScheduledTask> {
        let (index, _) = self
            .tasks
            .iter()
            .enumerate()
            .filter(|(_, t)| t.due <= now)
            .min_by_key(|(_, t)| t.due)?;
        Some(self.tasks.swap_remove(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(ms: u64) -> Instant {
        Instant::from_millis(ms)
    }

    #[test]
    fn rescheduling_replaces_the_pending_task() {
        let mut s = RetryScheduler::new();
        assert_eq!(
            s.schedule(Purpose::SoundTimeout, at(0), Duration::from_secs(5), 0),
            None
        );
        let replaced = s.schedule(Purpose::SoundTimeout, at(2000), Duration::from_secs(5), 0);
        assert_eq!(replaced.map(|t| t.due), Some(at(5000)));
        assert_eq!(s.get(Purpose::SoundTimeout).map(|t| t.due), Some(at(7000)));
        assert_eq!(s.pop_due(at(6999)), None);
        assert_eq!(s.pop_due(at(7000)).map(|t| t.purpose), Some(Purpose::SoundTimeout));
        assert!(s.is_empty());
    }

    #[test]
    fn cancel_is_idempotent() {
        let mut s = RetryScheduler::new();
        s.schedule(Purpose::EnableRetry, at(0), Duration::from_secs(1), 3);
        s.schedule(Purpose::SoundTimeout, at(0), Duration::from_secs(1), 0);
        assert!(s.cancel(Purpose::EnableRetry).is_some());
        assert!(s.cancel(Purpose::EnableRetry).is_none());
        assert!(s.cancel(Purpose::DisableRetry).is_none());
        assert!(s.get(Purpose::SoundTimeout).is_some());
        assert_eq!(s.next_deadline(), Some(at(1000)));
    }

    #[test]
    fn due_tasks_run_in_deadline_order() {
        let mut s = RetryScheduler::new();
        s.schedule(Purpose::SoundTimeout, at(0), Duration::from_millis(300), 0);
        s.schedule(Purpose::EnableRetry, at(0), Duration::from_millis(100), 1);
        s.schedule(Purpose::DisableRetry, at(0), Duration::from_millis(200), 2);
        assert_eq!(s.next_deadline(), Some(at(100)));

        let order: std::vec::Vec<_> = core::iter::from_fn(|| s.pop_due(at(1000)))
            .map(|t| t.purpose)
            .collect();
        assert_eq!(
            order,
            [Purpose::EnableRetry, Purpose::DisableRetry, Purpose::SoundTimeout]
        );
        assert_eq!(s.next_deadline(), None);
    }

    #[test]
    fn keeps_retry_count() {
        let mut s = RetryScheduler::new();
        s.schedule(Purpose::DisableRetry, at(10), Duration::from_secs(1), 4);
        let task = s.pop_due(at(1010)).unwrap();
        assert_eq!(task.retry_count, 4);
    }
}
