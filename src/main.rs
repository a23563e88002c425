//! bridgemon firmware entry point.
//!
//! USB CDC-ACM ↔ UART bridge on the nRF52840 with a live status screen.
//!
//! ## Task layout
//!
//! ```text
//!  host ──USB CDC──► usb_to_uart ──► UARTE0 ──► flight controller
//!  host ◄─USB CDC─── uart_to_usb ◄── UARTE0 ◄──
//!                        │
//!            counters + notifications (bridgemon lib)
//!                        │
//!                        ▼
//!                   display task ──I²C──► SSD1306
//! ```
//!
//! Settings live in flash and are loaded before anything else starts;
//! the UART baud rate comes from them.

#![no_std]
#![no_main]

mod bridge;
mod storage;
mod ui;
mod usb;

use bridgemon::config::{LINK_UART, LINK_USB};
use bridgemon::render::Link;
use bridgemon::settings::{SettingKey, Settings, SettingsStore};
use bridgemon::{notify, NotificationQueue, Severity, StatusCounters};
use defmt::{error, info, warn};
use embassy_embedded_hal::adapter::BlockingAsync;
use embassy_executor::Spawner;
use embassy_nrf::gpio::{Level, Output, OutputDrive};
use embassy_nrf::nvmc::Nvmc;
use embassy_nrf::twim::{self, Twim};
use embassy_nrf::uarte::{self, Baudrate, UarteRxWithIdle, UarteTx};
use embassy_nrf::{bind_interrupts, peripherals};
use embassy_usb::UsbDevice;
use {defmt_rtt as _, panic_probe as _};

use crate::bridge::Telemetry;
use crate::storage::FlashSettingsStore;
use crate::usb::cdc_device::{self, UsbDriver};

bind_interrupts!(struct Irqs {
    SPIM0_SPIS0_TWIM0_TWIS0_SPI0_TWI0 => twim::InterruptHandler<peripherals::TWISPI0>;
    UARTE0_UART0 => uarte::InterruptHandler<peripherals::UARTE0>;
});

// ═══════════════════════════════════════════════════════════════════════════
// Shared state
// ═══════════════════════════════════════════════════════════════════════════

static USB_STATUS: StatusCounters = StatusCounters::new();
static UART_STATUS: StatusCounters = StatusCounters::new();
static NOTIFICATIONS: NotificationQueue = NotificationQueue::new();

/// Tag for notifications about the stored configuration.
const CFG_TAG: &str = "cfg";

// ═══════════════════════════════════════════════════════════════════════════
// Tasks
// ═══════════════════════════════════════════════════════════════════════════

#[embassy_executor::task]
async fn display_task(i2c: Twim<'static, peripherals::TWISPI0>, reset: Output<'static>) {
    let links = [
        Link {
            name: LINK_USB,
            counters: &USB_STATUS,
        },
        Link {
            name: LINK_UART,
            counters: &UART_STATUS,
        },
    ];
    ui::run_display(i2c, reset, links, &NOTIFICATIONS).await;
}

#[embassy_executor::task]
async fn usb_task(device: UsbDevice<'static, UsbDriver>) -> ! {
    cdc_device::run_usb_device(device).await
}

#[embassy_executor::task]
async fn usb_to_uart_task(
    usb_rx: embassy_usb::class::cdc_acm::Receiver<'static, UsbDriver>,
    uart_tx: UarteTx<'static, peripherals::UARTE0>,
) -> ! {
    bridge::usb_to_uart(usb_rx, uart_tx, telemetry()).await
}

#[embassy_executor::task]
async fn uart_to_usb_task(
    uart_rx: UarteRxWithIdle<'static, peripherals::UARTE0, peripherals::TIMER0>,
    usb_tx: embassy_usb::class::cdc_acm::Sender<'static, UsbDriver>,
) -> ! {
    bridge::uart_to_usb(uart_rx, usb_tx, telemetry()).await
}

fn telemetry() -> Telemetry {
    Telemetry {
        usb: &USB_STATUS,
        uart: &UART_STATUS,
        queue: &NOTIFICATIONS,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Boot
// ═══════════════════════════════════════════════════════════════════════════

/// Load the stored settings, seeding flash with the defaults on first
/// boot. Any storage failure falls back to the defaults for this run.
async fn boot_settings<S: SettingsStore>(store: &mut S) -> Settings {
    match store.get(SettingKey::Ssid).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            info!("No settings in flash - writing defaults");
            let defaults = Settings::default();
            if let Err(e) = defaults.write_all(store).await {
                error!("Writing default settings failed: {}", e);
                let _ = notify!(NOTIFICATIONS, Severity::Error, CFG_TAG, "save failed");
            }
            return defaults;
        }
        Err(e) => warn!("Settings probe failed: {}", e),
    }

    match Settings::load(store).await {
        Ok(settings) => settings,
        Err(e) => {
            error!("Loading settings failed: {} - using defaults", e);
            let _ = notify!(NOTIFICATIONS, Severity::Error, CFG_TAG, "load failed");
            Settings::default()
        }
    }
}

/// UARTE only runs at the fixed rates the peripheral supports.
fn baudrate(rate: u32) -> Option<Baudrate> {
    Some(match rate {
        1_200 => Baudrate::BAUD1200,
        2_400 => Baudrate::BAUD2400,
        4_800 => Baudrate::BAUD4800,
        9_600 => Baudrate::BAUD9600,
        14_400 => Baudrate::BAUD14400,
        19_200 => Baudrate::BAUD19200,
        28_800 => Baudrate::BAUD28800,
        38_400 => Baudrate::BAUD38400,
        57_600 => Baudrate::BAUD57600,
        76_800 => Baudrate::BAUD76800,
        115_200 => Baudrate::BAUD115200,
        230_400 => Baudrate::BAUD230400,
        250_000 => Baudrate::BAUD250000,
        460_800 => Baudrate::BAUD460800,
        921_600 => Baudrate::BAUD921600,
        1_000_000 => Baudrate::BAUD1M,
        _ => return None,
    })
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("bridgemon starting");
    let p = embassy_nrf::init(Default::default());

    // Settings first: the UART configuration depends on them.
    let mut store = FlashSettingsStore::new(BlockingAsync::new(Nvmc::new(p.NVMC)));
    let settings = boot_settings(&mut store).await;
    info!(
        "Settings: {} baud, protocol {}",
        settings.baud_rate, settings.protocol
    );

    // OLED on TWIM0, reset line idles high.
    let i2c = Twim::new(p.TWISPI0, Irqs, p.P0_26, p.P0_27, twim::Config::default());
    let oled_reset = Output::new(p.P0_28, Level::High, OutputDrive::Standard);
    if let Err(e) = spawner.spawn(display_task(i2c, oled_reset)) {
        error!("Failed to spawn display task: {}", e);
    }

    // UART towards the flight controller.
    let mut uart_config = uarte::Config::default();
    uart_config.baudrate = match baudrate(settings.baud_rate) {
        Some(rate) => rate,
        None => {
            warn!("Unsupported baud rate {} - using 115200", settings.baud_rate);
            let _ = notify!(
                NOTIFICATIONS,
                Severity::Warning,
                LINK_UART,
                "baud {} unsupported",
                settings.baud_rate
            );
            Baudrate::BAUD115200
        }
    };
    let uart = uarte::Uarte::new(p.UARTE0, Irqs, p.P0_08, p.P0_06, uart_config);
    let (uart_tx, uart_rx) = uart.split_with_idle(p.TIMER0, p.PPI_CH0, p.PPI_CH1);

    // USB serial port towards the host.
    let usb = cdc_device::init(p.USBD, &USB_STATUS, &NOTIFICATIONS);

    if let Err(e) = spawner.spawn(usb_task(usb.device)) {
        error!("Failed to spawn USB task: {}", e);
    }
    if let Err(e) = spawner.spawn(usb_to_uart_task(usb.receiver, uart_tx)) {
        error!("Failed to spawn USB → UART task: {}", e);
    }
    if let Err(e) = spawner.spawn(uart_to_usb_task(uart_rx, usb.sender)) {
        error!("Failed to spawn UART → USB task: {}", e);
    }

    let _ = notify!(NOTIFICATIONS, Severity::Info, CFG_TAG, "bridge up");
    info!("All tasks spawned");
}
