//! Host-testable core of bridgemon.
//!
//! Everything the firmware shares between tasks lives here: per-link
//! counters, the notification queue, the status screen renderer, the
//! settings model and the web server lifecycle. None of it touches
//! hardware directly, so it builds and tests on the host.
//!
//! Usage: `cargo test --lib`
//!
//! Note: The embedded binary uses main.rs with #![no_std] and #![no_main]
//! and pulls in the hardware glue (OLED, flash, USB, UART) on top of this
//! library.

#![cfg_attr(not(test), no_std)]

// ═══════════════════════════════════════════════════════════════════════════
// Shared state
// ═══════════════════════════════════════════════════════════════════════════

pub mod config;
pub mod error;
pub mod notify;
pub mod status;

// ═══════════════════════════════════════════════════════════════════════════
// Consumers of shared state
// ═══════════════════════════════════════════════════════════════════════════

pub mod render;
pub mod settings;
pub mod web;

pub use error::Error;
pub use notify::{Notification, NotificationQueue, Receipt, Severity};
pub use render::{Cadence, DisplayDriver, DisplayRenderer, Link};
pub use status::{LinkField, LinkStatus, StatusCounters};
