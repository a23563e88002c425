//! Byte pumps between the USB serial port and the UART.
//!
//! Each direction runs as its own task and is the producer for the link
//! counters: bytes and packets on the link they arrive from and the link
//! they leave by, plus an error count and a notification for anything
//! that goes wrong.

use bridgemon::config::{LINK_UART, LINK_USB, USB_CDC_PACKET_SIZE};
use bridgemon::{notify, NotificationQueue, Severity, StatusCounters};
use defmt::{debug, info, warn};
use embassy_nrf::peripherals;
use embassy_nrf::uarte::{UarteRxWithIdle, UarteTx};
use embassy_usb::class::cdc_acm::{Receiver, Sender};
use embassy_usb::driver::EndpointError;

use crate::usb::cdc_device::UsbDriver;

const PACKET: usize = USB_CDC_PACKET_SIZE as usize;

/// Counters and queue the pumps report into.
#[derive(Clone, Copy)]
pub struct Telemetry {
    pub usb: &'static StatusCounters,
    pub uart: &'static StatusCounters,
    pub queue: &'static NotificationQueue,
}

/// Host → UART. Waits for the host to open the port, then forwards every
/// OUT packet until the port goes away.
pub async fn usb_to_uart(
    mut usb_rx: Receiver<'static, UsbDriver>,
    mut uart_tx: UarteTx<'static, peripherals::UARTE0>,
    telemetry: Telemetry,
) -> ! {
    info!("USB → UART pump started");

    let mut buf = [0u8; PACKET];
    loop {
        usb_rx.wait_connection().await;
        info!("USB serial port opened");

        loop {
            let n = match usb_rx.read_packet(&mut buf).await {
                Ok(n) => n,
                Err(EndpointError::Disabled) => break,
                Err(EndpointError::BufferOverflow) => {
                    telemetry.usb.record_error();
                    let _ = notify!(telemetry.queue, Severity::Warning, LINK_USB, "rx overflow");
                    continue;
                }
            };
            telemetry.usb.record_rx(n as u32);

            match uart_tx.write(&buf[..n]).await {
                Ok(()) => telemetry.uart.record_tx(n as u32),
                Err(e) => {
                    warn!("UART write failed: {}", e);
                    telemetry.uart.record_error();
                    let _ = notify!(telemetry.queue, Severity::Error, LINK_UART, "tx {:?}", e);
                }
            }
        }

        info!("USB serial port closed");
    }
}

/// UART → host. Reads until the line goes idle and forwards what arrived
/// in packet-sized pieces. Bytes arriving while no host is attached are
/// counted on the UART side and dropped.
pub async fn uart_to_usb(
    mut uart_rx: UarteRxWithIdle<'static, peripherals::UARTE0, peripherals::TIMER0>,
    mut usb_tx: Sender<'static, UsbDriver>,
    telemetry: Telemetry,
) -> ! {
    info!("UART → USB pump started");

    let mut buf = [0u8; PACKET];
    loop {
        let n = match uart_rx.read_until_idle(&mut buf).await {
            Ok(n) => n,
            Err(e) => {
                warn!("UART read failed: {}", e);
                telemetry.uart.record_error();
                let _ = notify!(telemetry.queue, Severity::Error, LINK_UART, "rx {:?}", e);
                continue;
            }
        };
        if n == 0 {
            continue;
        }
        telemetry.uart.record_rx(n as u32);

        if !usb_tx.dtr() {
            debug!("no host - dropped {} bytes", n);
            continue;
        }

        match usb_tx.write_packet(&buf[..n]).await {
            Ok(()) => telemetry.usb.record_tx(n as u32),
            Err(EndpointError::Disabled) => debug!("USB gone - dropped {} bytes", n),
            Err(EndpointError::BufferOverflow) => {
                telemetry.usb.record_error();
                let _ = notify!(telemetry.queue, Severity::Warning, LINK_USB, "tx overflow");
            }
        }
    }
}
