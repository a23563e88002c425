//! Unified error type for bridgemon.
//!
//! We avoid `alloc` - all error variants carry only fixed-size data.
//! Implements `defmt::Format` (behind the `defmt` feature) for efficient
//! on-target logging.

use core::fmt;

/// Top-level error type used across the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    // Notifications
    /// The queue is full and holds nothing the new message may evict.
    QueueFull,

    /// Formatted text exceeded its bound and was shortened.
    MessageTruncated,

    // Display
    /// I²C transaction to the display failed; the cycle was skipped.
    DisplayBusFault,

    /// Reset line or display controller could not be brought up.
    HardwareInitFailure,

    /// A frame was requested before `init()` succeeded.
    NotInitialized,

    // Settings
    /// Backing store read/write failed.
    Storage,

    /// No value stored under the requested key.
    SettingNotFound,

    /// Stored bytes do not decode to the key's value type.
    InvalidSetting,

    // HTTP
    /// The HTTP server refused to start.
    ServerStart,
}

impl Error {
    /// Whether the owning task can keep going after this error.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Error::HardwareInitFailure)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Error::QueueFull => "notification queue full",
            Error::MessageTruncated => "message truncated",
            Error::DisplayBusFault => "display bus fault",
            Error::HardwareInitFailure => "display init failed",
            Error::NotInitialized => "display not initialised",
            Error::Storage => "settings storage error",
            Error::SettingNotFound => "setting not found",
            Error::InvalidSetting => "invalid setting value",
            Error::ServerStart => "http server failed to start",
        };
        f.write_str(msg)
    }
}
