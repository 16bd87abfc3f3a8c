#![cfg_attr(not(test), no_std)]

use ector::mutex::NoopRawMutex;
use embassy_sync::channel::Sender;
use thiserror::Error;

pub mod agent;
pub mod config;
pub mod coordinator;
pub mod gesture;
pub mod link;
pub mod motion;
pub mod ports;
pub mod sampler;
pub mod scheduler;

#[cfg(feature = "esp32c3")]
pub mod ble;
#[cfg(feature = "esp32c3")]
pub mod bsp;
#[cfg(feature = "esp32c3")]
pub mod buttons;
#[cfg(feature = "esp32c3")]
pub mod imu;
#[cfg(feature = "esp32c3")]
pub mod indicator;
#[cfg(feature = "esp32c3")]
pub mod marker;

/// Depth of every actor's inbox.
pub const INBOX_DEPTH: usize = 10;

/// Alias for the actor's inbox
pub type ActorInbox<M> = Sender<'static, NoopRawMutex, M, INBOX_DEPTH>;

/// Identifies a physical button on the board.
pub type ButtonId = u8;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AppError {
    #[error("Motion window polled before any sample arrived")]
    EmptyWindow,
    #[error("{0:?} failed: {1}")]
    ActionFailed(ports::Operation, ports::ServiceError),
    #[error("Release of button {0} without a matching press")]
    SpuriousEdge(ButtonId),
    #[error("Button {0} is not wired to any role")]
    UnknownButton(ButtonId),
    #[error("Failed to read from the motion sensor")]
    SensorRead,
    #[error("Failed to send message to the coordinator actor")]
    ActorSend,
}
