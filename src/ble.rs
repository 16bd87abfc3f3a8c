//! BLE transport for the accessory network.
//!
//! The owner's device writes [`Command`] bytes that become coordinator
//! [`Message`]s. The coordinator talks back through
//! [`AccessoryLink`](crate::link::AccessoryLink).

use core::future::pending;

use embassy_futures::select::{Either3, Either4, select3, select4};
use embassy_time::{Duration, Instant, Timer};
use log::{error, info, warn};
use static_cell::StaticCell;
use trouble_host::prelude::*;

pub use gatt::{Command, GattServer};

use crate::agent::{Message, MotionReply};
use crate::link::SHARED;
use crate::bsp::BleController;
use crate::{ActorInbox, AppError};

mod gatt;
mod notify;

/// Maximum number of connections
const CONN_MAX: usize = 1;

/// Max number of L2CAP channels.
const L2CAP_CHANNELS_MAX: usize = 2; // Signal + att

/// Max L2CAP MTU size.
const L2CAP_MTU: usize = 256;

/// How long the tag stays discoverable after the owner asks to pair.
const PAIRING_WINDOW: Duration = Duration::from_secs(60);

type BleResources = HostResources<CONN_MAX, L2CAP_CHANNELS_MAX, L2CAP_MTU>;

static MOTION_REPLY: MotionReply = MotionReply::new();

#[embassy_executor::task]
async fn ble_task(mut runner: Runner<'static, BleController>) {
    runner.run().await.expect("Error in BLE task");
}

/// Create an advertiser to use to connect to a BLE Central, and wait for it to connect.
///
/// Only a tag in pairing mode is discoverable.
pub async fn advertise<'server, 'values, C: Controller>(
    name: &'values str,
    peripheral: &mut Peripheral<'values, C>,
    server: &'server GattServer<'values>,
    pairing: bool,
) -> Result<GattConnection<'values, 'server>, BleHostError<C::Error>> {
    let flags = match pairing {
        true => LE_GENERAL_DISCOVERABLE | BR_EDR_NOT_SUPPORTED,
        false => BR_EDR_NOT_SUPPORTED,
    };
    let mut advertiser_data = [0; 31];
    AdStructure::encode_slice(
        &[
            AdStructure::Flags(flags),
            AdStructure::ServiceUuids16(&[[0x0f, 0x18]]),
            AdStructure::CompleteLocalName(name.as_bytes()),
        ],
        &mut advertiser_data[..],
    )?;
    let advertiser = peripheral
        .advertise(
            &Default::default(),
            Advertisement::ConnectableScannableUndirected {
                adv_data: &advertiser_data[..],
                scan_data: &[],
            },
        )
        .await?;
    info!("[adv] advertising (pairing: {})", pairing);
    let conn = advertiser.accept().await?.with_attribute_server(server)?;
    info!("[adv] connection established");
    Ok(conn)
}

fn send(inbox: ActorInbox<Message>, msg: Message) {
    if inbox.try_send(msg).is_err() {
        error!("{}", AppError::ActorSend);
    }
}

fn exit_pairing(inbox: ActorInbox<Message>) {
    SHARED.exit_pairing();
    send(inbox, Message::PairingModeExited);
}

/// Advertise while the service is enabled and serve one owner at a time.
pub async fn serve<'values>(
    name: &'values str,
    server: &'static GattServer<'values>,
    peripheral: &mut Peripheral<'values, BleController>,
    inbox: ActorInbox<Message>,
) -> ! {
    loop {
        if !SHARED.enabled() {
            SHARED.changed.wait().await;
            continue;
        }
        let pairing = SHARED.pairing();
        let window = async {
            match pairing {
                true => Timer::after(PAIRING_WINDOW).await,
                false => pending().await,
            }
        };
        let adv = advertise(name, peripheral, server, pairing);
        match select3(adv, SHARED.changed.wait(), window).await {
            Either3::First(Ok(conn)) => {
                if pairing {
                    exit_pairing(inbox);
                }
                if let Err(e) = server.run_connection(&conn, inbox).await {
                    warn!("[gatt] connection ended with error: {:?}", e);
                }
            }
            Either3::First(Err(e)) => {
                warn!("[adv] error: {:?}", e);
                Timer::after(Duration::from_secs(1)).await;
            }
            Either3::Second(()) => {}
            Either3::Third(()) => {
                info!("[adv] pairing window closed");
                exit_pairing(inbox);
            }
        }
    }
}

impl<'values> GattServer<'values> {
    /// Build the stack for the GATT server and start background tasks required.
    pub fn start(
        name: &'values str,
        appearance: impl Into<&'static BluetoothUuid16>,
        spawner: embassy_executor::Spawner,
        controller: BleController,
    ) -> (&'static Self, Peripheral<'values, BleController>) {
        let address = Address::random([0x42, 0x5A, 0xE3, 0x1E, 0x83, 0xE7]);
        info!("Our address = {:?}", address);

        let resources = {
            static RESOURCES: StaticCell<BleResources> = StaticCell::new();
            RESOURCES.init(BleResources::new())
        };
        let stack = {
            static STACK: StaticCell<Stack<'_, BleController>> = StaticCell::new();
            STACK.init(trouble_host::new(controller, resources).set_random_address(address))
        };
        let host = stack.build();
        let server = {
            static SERVER: StaticCell<GattServer<'_>> = StaticCell::new();
            SERVER.init(
                GattServer::new_with_config(GapConfig::Peripheral(PeripheralConfig {
                    name,
                    appearance: appearance.into(),
                }))
                .expect("Error creating Gatt Server"),
            )
        };
        info!("Starting Gatt Server");
        spawner.must_spawn(ble_task(host.runner));
        SHARED.mark_ready();
        (server, host.peripheral)
    }

    /// Process GATT events for one connection until it drops or the service is disabled.
    pub async fn run_connection<'server>(
        &self,
        conn: &GattConnection<'values, 'server>,
        inbox: ActorInbox<Message>,
    ) -> Result<(), trouble_host::Error> {
        SHARED.owner_connected();
        let reason = loop {
            let event = select4(
                conn.next(),
                SHARED.sound_completed.wait(),
                SHARED.battery.wait(),
                SHARED.changed.wait(),
            )
            .await;
            match event {
                Either4::First(GattConnectionEvent::Disconnected { reason }) => break reason,
                Either4::First(GattConnectionEvent::Gatt { event: Err(e) }) => {
                    warn!("[gatt] error processing event: {:?}", e)
                }
                Either4::First(GattConnectionEvent::Gatt { event: Ok(event) }) => {
                    let command = match &event {
                        GattEvent::Write(write) if write.handle() == self.tag.control.handle => {
                            write.data().first().copied()
                        }
                        _ => None,
                    };
                    let lookup = SHARED.serial_lookup_open(Instant::now());
                    self.set(&self.tag.serial_lookup, &lookup)?;
                    match event.accept() {
                        Ok(reply) => reply.send().await,
                        Err(e) => warn!("[gatt] error sending response: {:?}", e),
                    }
                    if let Some(byte) = command {
                        self.dispatch(conn, byte, inbox).await?;
                    }
                }
                Either4::First(_) => {} // ignore other events
                Either4::Second(()) => self.notify_sound_completed(conn).await?,
                Either4::Third(percent) => self.notify_battery(conn, percent).await?,
                Either4::Fourth(()) => {
                    if !SHARED.enabled() {
                        info!("[gatt] service disabled, dropping owner");
                        conn.raw().disconnect();
                        return Ok(());
                    }
                }
            }
        };
        info!("[gatt] disconnected: {:?}", reason);
        Ok(())
    }

    async fn dispatch(
        &self,
        conn: &GattConnection<'_, '_>,
        byte: u8,
        inbox: ActorInbox<Message>,
    ) -> Result<(), trouble_host::Error> {
        let command = match Command::try_from(byte) {
            Ok(command) => command,
            Err(unknown) => {
                warn!("[gatt] unknown command {:#04x}", unknown);
                return Ok(());
            }
        };
        info!("[gatt] {:?}", command);
        match command {
            Command::Sound(trigger) => send(inbox, Message::SoundStart(trigger)),
            Command::SoundStop => send(inbox, Message::SoundStop),
            Command::MotionStart => send(inbox, Message::MotionStart),
            Command::MotionStop => send(inbox, Message::MotionStop),
            Command::BatteryRequest => send(inbox, Message::BatteryLevelRequest),
            Command::MotionPoll => {
                MOTION_REPLY.reset();
                if inbox.try_send(Message::MotionPeriodElapsed(&MOTION_REPLY)).is_err() {
                    error!("{}", AppError::ActorSend);
                    return Ok(());
                }
                let moved = MOTION_REPLY.wait().await;
                self.set(&self.tag.motion, &moved)?;
                self.notify_motion(conn, moved).await?;
            }
        }
        Ok(())
    }
}
