//! Offloads the button to an async task that turns level changes into
//! timestamped [`ButtonEdge`]s for the coordinator.

use embassy_time::{Duration, Instant, Timer};
use esp_hal::gpio::Input;

use crate::agent::Message;
use crate::gesture::ButtonEdge;
use crate::{ActorInbox, ButtonId};

/// If we wanted multiple buttons to use this task, we could do so by
/// increasing the pool size of the task.
#[embassy_executor::task(pool_size = 1)]
pub async fn button_task(mut button: Input<'static>, id: ButtonId, coordinator: ActorInbox<Message>) {
    let debounce = Duration::from_millis(50);
    loop {
        button.wait_for_low().await;
        let edge = ButtonEdge::press(id, Instant::now());
        coordinator.send(Message::Button(edge)).await;
        Timer::after(debounce).await;
        button.wait_for_high().await;
        let edge = ButtonEdge::release(id, Instant::now());
        coordinator.send(Message::Button(edge)).await;
        Timer::after(debounce).await;
    }
}
