//! Application-wide constants and compile-time configuration.
//!
//! All hardware pin assignments, timing parameters, capacities and
//! settings defaults live here so they can be tuned in one place.

// Display

/// I²C address of the SSD1306 OLED.
pub const OLED_ADDRESS: u8 = 0x3C;

/// How long the OLED reset line is held low during init (ms).
pub const OLED_RESET_HOLD_MS: u32 = 20;

/// Render period (ms). 200 ms = 5 updates per second.
pub const RENDER_PERIOD_MS: u64 = 200;

/// Render period in microseconds, the unit of the cadence scheduler.
pub const RENDER_PERIOD_US: u64 = RENDER_PERIOD_MS * 1_000;

/// Display width in pixels (right edge is `DISPLAY_WIDTH - 1`).
pub const DISPLAY_WIDTH: i32 = 128;

/// Height of one text line in pixels.
pub const LINE_HEIGHT: i32 = 10;

/// Characters that fit on one line with a 6 px wide font.
pub const LINE_CHARS: usize = 21;

/// Identifying header drawn top-left on every frame.
pub const HEADER: &str = "db";

/// Notifications drained and drawn per render cycle (the lines left
/// under the header and the two link rows).
pub const NOTIFY_LINES: usize = 3;

// Notifications

/// Maximum notifications held by the queue.
pub const NOTIFY_CAPACITY: usize = 8;

/// Capacity of a notification source tag.
pub const NOTIFY_TAG_LEN: usize = 8;

/// Capacity of a notification text.
pub const NOTIFY_TEXT_LEN: usize = 48;

// Links

/// Name shown for the USB CDC link.
pub const LINK_USB: &str = "usb";

/// Name shown for the UART link.
pub const LINK_UART: &str = "uart";

/// Number of monitored links.
pub const LINK_COUNT: usize = 2;

// USB

/// USB VID/PID - use the "pid.codes" open-source test VID.
/// Replace with your own allocated VID/PID for production.
pub const USB_VID: u16 = 0x1209;
pub const USB_PID: u16 = 0x0002;

/// USB device strings.
pub const USB_MANUFACTURER: &str = "bridgemon";
pub const USB_PRODUCT: &str = "USB-UART Bridge";
pub const USB_SERIAL_NUMBER: &str = "000001";

/// Max packet size of the CDC-ACM bulk endpoints.
pub const USB_CDC_PACKET_SIZE: u16 = 64;

// GPIO pin assignments (nRF52840-DK defaults)
//
// These are logical names; actual `embassy_nrf::peripherals::*` types are
// selected in `main.rs`.  Adjust for your custom PCB.
//
//   I²C SDA        → P0.26
//   I²C SCL        → P0.27
//   OLED RST       → P0.28
//   UART TX        → P0.06
//   UART RX        → P0.08

// HTTP

/// Route of the settings page.
pub const SETTINGS_ROUTE: &str = "/settings.html";

/// Bytes read from the page source per response chunk.
pub const HTTP_CHUNK_SIZE: usize = 1024;

// Settings defaults

pub const DEFAULT_SSID: &str = "DroneBridge";
pub const DEFAULT_PWD: &str = "dronebridge";
pub const DEFAULT_CHANNEL: u8 = 6;
pub const DEFAULT_UART_BAUD_RATE: u32 = 115_200;
pub const DEFAULT_UART_PIN_TX: u8 = 6;
pub const DEFAULT_UART_PIN_RX: u8 = 8;
/// 1 = MSP/LTM, 2 = MAVLink, 4 = transparent.
pub const DEFAULT_SERIAL_PROTOCOL: u8 = 4;
pub const DEFAULT_TRANSPARENT_BUF_SIZE: u16 = 64;
pub const DEFAULT_LTM_FRAMES_PER_PACKET: u8 = 2;

/// Capacity of string settings (SSID, password).
pub const SETTING_STR_LEN: usize = 64;

// Settings storage

/// Flash page index where settings storage starts (4 KB per page on nRF52840).
pub const STORAGE_FLASH_PAGE_START: u32 = 240;

/// Number of flash pages reserved for settings storage.
pub const STORAGE_FLASH_PAGE_COUNT: u32 = 4;
