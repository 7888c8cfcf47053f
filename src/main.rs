#![no_std]
#![no_main]

use defmt::*;

use embassy_executor::Spawner;
use embassy_rp::bind_interrupts;
use embassy_rp::gpio::{Input, Level, Output, OutputOpenDrain, Pull};
use embassy_rp::i2c::{self, I2c};
use embassy_rp::peripherals::UART0;
use embassy_rp::spi::{self, Phase, Polarity, Spi};
use embassy_rp::uart::{self, BufferedInterruptHandler, BufferedUart};
use embassy_time::{Delay, Instant, Timer};
use embedded_hal_bus::spi::ExclusiveDevice;
use display_interface_spi::SPIInterface;
use static_cell::StaticCell;

use {defmt_rtt as _, panic_probe as _};

use auto_heat_rs::buttons::Buttons;
use auto_heat_rs::controller::{Controller, Hardware};
use auto_heat_rs::eeprom::Eeprom24;
use auto_heat_rs::sensor::{OneWireBus, Sensor};
use auto_heat_rs::serial::SerialLink;
use auto_heat_rs::settings::SettingsStore;
use auto_heat_rs::sh1107::Sh1107;
use auto_heat_rs::{SERIAL_BAUD, TICK_INTERVAL_MS};

bind_interrupts!(struct Irqs {
    UART0_IRQ => BufferedInterruptHandler<UART0>;
});

#[embassy_executor::main]
async fn main(_spawner: Spawner) {
    info!("Program start");
    let p = embassy_rp::init(Default::default());

    // Buttons, active high
    let primary = Input::new(p.PIN_2, Pull::Down);
    let increment = Input::new(p.PIN_3, Pull::Down);
    let decrement = Input::new(p.PIN_4, Pull::Down);
    let mut buttons = Buttons::new(primary, increment, decrement);

    // Heater relay
    let heater = Output::new(p.PIN_15, Level::Low);

    // Thermometer
    let wire = OutputOpenDrain::new(p.PIN_16, Level::High);
    let bus = match OneWireBus::new(wire, Delay) {
        Ok(bus) => bus,
        Err(_) => defmt::panic!("one-wire bus held low"),
    };

    // Settings EEPROM
    let mut i2c_config = i2c::Config::default();
    i2c_config.frequency = 100_000;
    let i2c = I2c::new_blocking(p.I2C1, p.PIN_7, p.PIN_6, i2c_config);

    // Display pins
    let dc = Output::new(p.PIN_8, Level::Low); // Data/Command
    let cs = Output::new(p.PIN_9, Level::High); // Chip Select
    let sclk = p.PIN_10; // Serial Clock
    let mosi = p.PIN_11; // Master Out Slave In
    let rst = Output::new(p.PIN_12, Level::Low); // Reset

    let mut spi_config = spi::Config::default();
    spi_config.frequency = 2_000_000;
    spi_config.phase = Phase::CaptureOnSecondTransition;
    spi_config.polarity = Polarity::IdleHigh;

    let spi = Spi::new_blocking_txonly(p.SPI1, sclk, mosi, spi_config);
    let spi_device = unwrap!(ExclusiveDevice::new_no_delay(spi, cs));
    let mut display = Sh1107::new(SPIInterface::new(spi_device, dc), rst);
    if display.init(&mut Delay).is_err() {
        warn!("display init failed");
    }

    // Serial link to the desktop monitor
    static TX_BUF: StaticCell<[u8; 64]> = StaticCell::new();
    let tx_buf = &mut TX_BUF.init([0; 64])[..];
    static RX_BUF: StaticCell<[u8; 64]> = StaticCell::new();
    let rx_buf = &mut RX_BUF.init([0; 64])[..];

    let mut uart_config = uart::Config::default();
    uart_config.baudrate = SERIAL_BAUD;
    let uart = BufferedUart::new(p.UART0, Irqs, p.PIN_0, p.PIN_1, tx_buf, rx_buf, uart_config);

    let mut hw = Hardware {
        sensor: Sensor::new(bus),
        store: SettingsStore::new(Eeprom24::new(i2c, Delay)),
        heater,
        screen: display,
        serial: SerialLink::new(uart),
    };

    let mut controller = Controller::boot(&mut hw);

    info!("Begin loop logic");
    loop {
        let levels = buttons.sample();
        let report = controller.tick(&mut hw, levels, Instant::now());
        trace!("{}", report);
        Timer::after_millis(TICK_INTERVAL_MS).await;
    }
}
