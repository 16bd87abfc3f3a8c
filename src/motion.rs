//! Double-buffered accumulation of gyroscope samples.
//!
//! The sampler pushes into the active slot every tick. The coordinator, on its
//! own much slower schedule, swaps in the other (zeroed) slot and reads the
//! one it just detached. The swap is a single atomic index exchange: neither
//! side holds a lock across the accumulation window.
//!
//! Each slot carries a `writing` flag raised by the producer for the length
//! of one push. After the swap the consumer waits for that flag to drop, so it
//! never reads a half-applied sample and at most waits out one push.
//!
//! There is exactly one producer (the sampling task) and one consumer (the
//! coordinator). The consumer must not run at a higher priority than the
//! producer.

use core::hint::spin_loop;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use log::debug;
use portable_atomic::{AtomicBool, AtomicF64, AtomicU32, AtomicUsize, Ordering};

use crate::AppError;
use crate::config::MotionConfig;

/// One gyroscope sample, as rotation in radians over one sampling period.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GyroSample {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Accumulated rotation over one polling window.
///
/// Axis A is the sensor's X axis and axis B its Y axis.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RotationWindow {
    pub sum_axis_a: f64,
    pub sum_axis_b: f64,
    pub sample_count: u32,
}

impl RotationWindow {
    pub fn is_empty(&self) -> bool {
        self.sample_count == 0
    }

    /// Mean per-sample rotation on both axes.
    pub fn average(&self) -> Result<(f64, f64), AppError> {
        if self.is_empty() {
            return Err(AppError::EmptyWindow);
        }
        let n = self.sample_count as f64;
        Ok((self.sum_axis_a / n, self.sum_axis_b / n))
    }
}

/// Whether the average rotation rate over `window` exceeds the configured
/// threshold on either axis.
///
/// An empty window is an error: the consumer polled before the sampler
/// delivered anything.
pub fn is_motion(window: &RotationWindow, config: &MotionConfig) -> Result<bool, AppError> {
    let (a, b) = window.average()?;
    let rate = config.sample_rate_hz as f64;
    let (rate_a, rate_b) = (a * rate, b * rate);
    debug!(
        "window of {} samples: {} rad/s, {} rad/s",
        window.sample_count, rate_a, rate_b
    );
    Ok(rate_a.abs() > config.threshold || rate_b.abs() > config.threshold)
}

struct Slot {
    sum_a: AtomicF64,
    sum_b: AtomicF64,
    count: AtomicU32,
    /// Raised by the producer while it updates this slot.
    writing: AtomicBool,
}

impl Slot {
    const fn new() -> Self {
        Self {
            sum_a: AtomicF64::new(0.0),
            sum_b: AtomicF64::new(0.0),
            count: AtomicU32::new(0),
            writing: AtomicBool::new(false),
        }
    }

    /// Only the producer calls this, so plain load/store is enough.
    fn add(&self, a: f64, b: f64) {
        let sum_a = self.sum_a.load(Ordering::Relaxed);
        self.sum_a.store(sum_a + a, Ordering::Relaxed);
        let sum_b = self.sum_b.load(Ordering::Relaxed);
        self.sum_b.store(sum_b + b, Ordering::Relaxed);
        let count = self.count.load(Ordering::Relaxed);
        self.count.store(count.saturating_add(1), Ordering::Relaxed);
    }

    fn clear(&self) {
        self.sum_a.store(0.0, Ordering::Relaxed);
        self.sum_b.store(0.0, Ordering::Relaxed);
        self.count.store(0, Ordering::Relaxed);
    }

    /// Wait out a push that was already under way.
    fn settle(&self) {
        while self.writing.load(Ordering::SeqCst) {
            spin_loop();
        }
    }

    fn snapshot(&self) -> RotationWindow {
        RotationWindow {
            sum_axis_a: self.sum_a.load(Ordering::Relaxed),
            sum_axis_b: self.sum_b.load(Ordering::Relaxed),
            sample_count: self.count.load(Ordering::Relaxed),
        }
    }
}

/// Two accumulation slots and the index of the one receiving samples.
struct MotionBuffer {
    slots: [Slot; 2],
    active: AtomicUsize,
}

impl MotionBuffer {
    const fn new() -> Self {
        Self {
            slots: [Slot::new(), Slot::new()],
            active: AtomicUsize::new(0),
        }
    }

    fn reset(&self) {
        for slot in &self.slots {
            slot.settle();
            slot.clear();
        }
        self.active.store(0, Ordering::SeqCst);
    }
}

/// Shared between the sampling task and the coordinator, usually as a
/// `static`.
pub struct MotionAccumulator {
    buffer: MotionBuffer,
    running: AtomicBool,
    started: Signal<CriticalSectionRawMutex, ()>,
}

impl Default for MotionAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl MotionAccumulator {
    pub const fn new() -> Self {
        Self {
            buffer: MotionBuffer::new(),
            running: AtomicBool::new(false),
            started: Signal::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Begin accepting samples into a clean buffer. Does nothing if already
    /// running.
    pub fn start(&self) {
        if self.is_running() {
            return;
        }
        self.buffer.reset();
        self.running.store(true, Ordering::SeqCst);
        self.started.signal(());
    }

    /// Stop accepting samples and clear both slots.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.buffer.reset();
    }

    /// Resolves once the accumulator is running.
    pub async fn wait_running(&self) {
        while !self.is_running() {
            self.started.wait().await;
        }
    }

    /// Add one sample to the active window. Returns whether it was taken;
    /// samples are dropped while stopped.
    pub fn push(&self, sample: GyroSample) -> bool {
        let buffer = &self.buffer;
        loop {
            if !self.is_running() {
                return false;
            }
            let index = buffer.active.load(Ordering::SeqCst);
            let slot = &buffer.slots[index];
            slot.writing.store(true, Ordering::SeqCst);
            // The consumer may have swapped between the load and raising the flag.
            let still_active = buffer.active.load(Ordering::SeqCst) == index;
            if still_active && self.is_running() {
                slot.add(sample.x as f64, sample.y as f64);
                slot.writing.store(false, Ordering::SeqCst);
                return true;
            }
            slot.writing.store(false, Ordering::SeqCst);
        }
    }

    /// Detach the active window, install a zeroed one in its place and return
    /// what the detached window accumulated.
    pub fn read_and_reset(&self) -> RotationWindow {
        let buffer = &self.buffer;
        let fresh = buffer.active.load(Ordering::SeqCst) ^ 1;
        buffer.slots[fresh].clear();
        let detached = buffer.active.swap(fresh, Ordering::SeqCst);
        let slot = &buffer.slots[detached];
        slot.settle();
        slot.snapshot()
    }
}
