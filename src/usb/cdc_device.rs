//! USB CDC-ACM device - the host end of the bridge.
//!
//! Initialises the Embassy USB stack on the nRF52840 hardware USB
//! peripheral and exposes one virtual serial port. Bus state changes
//! are posted to the notification queue so they show up on the OLED.

use bridgemon::config::{self, LINK_USB};
use bridgemon::{notify, NotificationQueue, Severity, StatusCounters};
use bridgemon::status::LinkField;
use defmt::info;
use embassy_nrf::usb::vbus_detect::HardwareVbusDetect;
use embassy_nrf::usb::Driver;
use embassy_nrf::{self, bind_interrupts, peripherals};
use embassy_usb::class::cdc_acm::{CdcAcmClass, Receiver, Sender, State};
use embassy_usb::{Builder, Config, UsbDevice};
use static_cell::StaticCell;

bind_interrupts!(struct Irqs {
    USBD => embassy_nrf::usb::InterruptHandler<peripherals::USBD>;
    CLOCK_POWER => embassy_nrf::usb::vbus_detect::InterruptHandler;
});

/// Concrete USB driver type for this board.
pub type UsbDriver = Driver<'static, peripherals::USBD, HardwareVbusDetect>;

static CDC_STATE: StaticCell<State> = StaticCell::new();
static USB_CONFIG_DESC: StaticCell<[u8; 256]> = StaticCell::new();
static USB_BOS_DESC: StaticCell<[u8; 256]> = StaticCell::new();
static USB_MSOS_DESC: StaticCell<[u8; 256]> = StaticCell::new();
static USB_CTRL_BUF: StaticCell<[u8; 64]> = StaticCell::new();
static USB_BUS_HANDLER: StaticCell<UsbBusHandler> = StaticCell::new();

/// Reports bus events as notifications and counts host attachments.
struct UsbBusHandler {
    counters: &'static StatusCounters,
    queue: &'static NotificationQueue,
}

impl embassy_usb::Handler for UsbBusHandler {
    fn configured(&mut self, configured: bool) {
        if configured {
            self.counters.increment(LinkField::NumConn, 1);
            let _ = notify!(self.queue, Severity::Info, LINK_USB, "host attached");
        } else {
            let _ = notify!(self.queue, Severity::Warning, LINK_USB, "host detached");
        }
    }

    fn suspended(&mut self, suspended: bool) {
        if suspended {
            let _ = notify!(self.queue, Severity::Info, LINK_USB, "bus suspended");
        }
    }
}

/// Build result containing the USB device runner and both halves of the
/// serial port.
pub struct UsbCdcDevice {
    pub device: UsbDevice<'static, UsbDriver>,
    pub sender: Sender<'static, UsbDriver>,
    pub receiver: Receiver<'static, UsbDriver>,
}

/// Initialise the USB stack and create the CDC-ACM function.
///
/// Must be called exactly once.  All static buffers are consumed here.
pub fn init(
    usbd: peripherals::USBD,
    counters: &'static StatusCounters,
    queue: &'static NotificationQueue,
) -> UsbCdcDevice {
    // Create the low-level USB driver with hardware VBUS detection.
    let driver = Driver::new(usbd, Irqs, HardwareVbusDetect::new(Irqs));

    // USB device-level configuration.
    let mut usb_config = Config::new(config::USB_VID, config::USB_PID);
    usb_config.manufacturer = Some(config::USB_MANUFACTURER);
    usb_config.product = Some(config::USB_PRODUCT);
    usb_config.serial_number = Some(config::USB_SERIAL_NUMBER);
    usb_config.max_power = 100; // mA
    usb_config.max_packet_size_0 = 64;

    // Interface association descriptors so Windows binds usbser.sys.
    usb_config.device_class = 0xEF;
    usb_config.device_sub_class = 0x02;
    usb_config.device_protocol = 0x01;
    usb_config.composite_with_iads = true;

    // Allocate static descriptor buffers.
    let config_desc = USB_CONFIG_DESC.init([0u8; 256]);
    let bos_desc = USB_BOS_DESC.init([0u8; 256]);
    let msos_desc = USB_MSOS_DESC.init([0u8; 256]);
    let ctrl_buf = USB_CTRL_BUF.init([0u8; 64]);

    // Build the USB device.
    let mut builder = Builder::new(
        driver,
        usb_config,
        config_desc,
        bos_desc,
        msos_desc,
        ctrl_buf,
    );

    let handler = USB_BUS_HANDLER.init(UsbBusHandler { counters, queue });
    builder.handler(handler);

    let cdc_state = CDC_STATE.init(State::new());
    let class = CdcAcmClass::new(&mut builder, cdc_state, config::USB_CDC_PACKET_SIZE);
    let (sender, receiver) = class.split();

    let device = builder.build();

    info!("USB CDC-ACM device initialised");

    UsbCdcDevice {
        device,
        sender,
        receiver,
    }
}

/// Run the USB device stack - must be spawned as a dedicated Embassy task.
///
/// This handles USB enumeration, suspend/resume, and endpoint servicing.
pub async fn run_usb_device(mut device: UsbDevice<'static, UsbDriver>) -> ! {
    info!("USB device task started");
    device.run().await
}
