#![no_std]
#![no_main]

use ector::{ActorContext, mutex::NoopRawMutex};
use embassy_executor::Spawner;
use esp_backtrace as _;
use log::info;
use trouble_host::prelude::appearance;

use tag_accessory::{
    INBOX_DEPTH,
    agent::Agent,
    ble::{self, GattServer},
    bsp::{self, Board, UsbPower},
    buttons::button_task,
    config::{BOOT_BUTTON, Config},
    coordinator::Coordinator,
    imu::ImuSource,
    indicator::Indicator,
    link::AccessoryLink,
    marker::RtcMarker,
    motion::MotionAccumulator,
    sampler::Sampler,
};

type TagAgent = Agent<AccessoryLink, Indicator, UsbPower, RtcMarker>;

static ACCUMULATOR: MotionAccumulator = MotionAccumulator::new();

#[embassy_executor::task]
async fn sampler_task(sampler: Sampler<ImuSource>) {
    sampler.start_sampling(&ACCUMULATOR).await
}

#[embassy_executor::task]
async fn agent_task(
    context: &'static ActorContext<TagAgent, NoopRawMutex, INBOX_DEPTH>,
    agent: TagAgent,
) {
    context.mount(agent).await;
}

#[esp_hal_embassy::main]
async fn main(spawner: Spawner) -> ! {
    esp_println::logger::init_logger_from_env();
    let name = "Esp tag";
    let board = Board::init();
    let config = Config::default();

    let imu = ImuSource::new(board.i2c).expect("Failed to initialize ICM42670");
    let sampler = Sampler::new(imu, &config.motion).expect("Failed to configure ICM42670");
    board.sampler_spawner.must_spawn(sampler_task(sampler));

    let (server, mut peripheral) = GattServer::start(
        name,
        &appearance::tag::GENERIC_TAG,
        spawner,
        board.ble_controller,
    );

    let coordinator = Coordinator::new(
        config,
        AccessoryLink::new(),
        Indicator::new(board.led),
        UsbPower,
        RtcMarker,
        &ACCUMULATOR,
    );
    static CONTEXT: ActorContext<TagAgent, NoopRawMutex, INBOX_DEPTH> = ActorContext::new();
    let inbox = CONTEXT.address();
    spawner.must_spawn(agent_task(&CONTEXT, Agent::new(coordinator, bsp::restart)));
    spawner.must_spawn(button_task(board.button, BOOT_BUTTON, inbox));
    info!("Tag running");

    ble::serve(name, server, &mut peripheral, inbox).await
}
