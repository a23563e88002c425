//! USB Device subsystem - presents a CDC-ACM serial port to the host.
//!
//! The nRF52840's built-in USB 2.0 Full-Speed controller is driven by
//! `embassy-usb`. The single CDC-ACM function is the host side of the
//! bridge; `bridge.rs` pumps its endpoints to and from the UART.

pub mod cdc_device;
