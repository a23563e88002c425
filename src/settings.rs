//! Bridge configuration and the key/value store it persists to.
//!
//! The display core never touches settings directly; a configuration
//! handler loads them at boot and writes them back after a change.
//!
//! Storage layout:
//!   - One item per [`SettingKey`], keyed by its one-byte id.
//!   - Values are encoded as `[tag][payload]`; strings carry a length
//!     byte: `[0][len][bytes...]`.

use heapless::String;

use crate::config::{
    DEFAULT_CHANNEL, DEFAULT_LTM_FRAMES_PER_PACKET, DEFAULT_PWD, DEFAULT_SERIAL_PROTOCOL,
    DEFAULT_SSID, DEFAULT_TRANSPARENT_BUF_SIZE, DEFAULT_UART_BAUD_RATE, DEFAULT_UART_PIN_RX,
    DEFAULT_UART_PIN_TX, SETTING_STR_LEN,
};
use crate::error::Error;
use crate::notify::bounded;

/// Largest encoded value: a full-length string plus tag and length bytes.
pub const MAX_ENCODED_LEN: usize = SETTING_STR_LEN + 2;

const TAG_STR: u8 = 0;
const TAG_U8: u8 = 1;
const TAG_U16: u8 = 2;
const TAG_U32: u8 = 3;

/// Persisted configuration entries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SettingKey {
    Ssid,
    WifiPassword,
    WifiChannel,
    BaudRate,
    UartPinTx,
    UartPinRx,
    Protocol,
    TransparentPacketSize,
    LtmFramesPerPacket,
}

impl SettingKey {
    pub const ALL: [SettingKey; 9] = [
        SettingKey::Ssid,
        SettingKey::WifiPassword,
        SettingKey::WifiChannel,
        SettingKey::BaudRate,
        SettingKey::UartPinTx,
        SettingKey::UartPinRx,
        SettingKey::Protocol,
        SettingKey::TransparentPacketSize,
        SettingKey::LtmFramesPerPacket,
    ];

    /// Stable storage key. Never renumber.
    pub fn id(self) -> u8 {
        match self {
            SettingKey::Ssid => 0x01,
            SettingKey::WifiPassword => 0x02,
            SettingKey::WifiChannel => 0x03,
            SettingKey::BaudRate => 0x04,
            SettingKey::UartPinTx => 0x05,
            SettingKey::UartPinRx => 0x06,
            SettingKey::Protocol => 0x07,
            SettingKey::TransparentPacketSize => 0x08,
            SettingKey::LtmFramesPerPacket => 0x09,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.id() == id)
    }

    /// Field name as used by the settings page form.
    pub fn name(self) -> &'static str {
        match self {
            SettingKey::Ssid => "ssid",
            SettingKey::WifiPassword => "wifi_pass",
            SettingKey::WifiChannel => "wifi_chan",
            SettingKey::BaudRate => "baud",
            SettingKey::UartPinTx => "gpio_tx",
            SettingKey::UartPinRx => "gpio_rx",
            SettingKey::Protocol => "proto",
            SettingKey::TransparentPacketSize => "trans_pack_size",
            SettingKey::LtmFramesPerPacket => "ltm_per_packet",
        }
    }

    /// Key for a settings page form field.
    pub fn from_name(name: &str) -> Result<Self, Error> {
        Self::ALL
            .into_iter()
            .find(|k| k.name() == name)
            .ok_or(Error::SettingNotFound)
    }
}

/// A typed setting value.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SettingValue {
    Str(String<SETTING_STR_LEN>),
    U8(u8),
    U16(u16),
    U32(u32),
}

impl SettingValue {
    /// String value, cut to [`SETTING_STR_LEN`] bytes.
    pub fn text(s: &str) -> Self {
        SettingValue::Str(bounded(s).0)
    }

    /// Serialize into `buf`. Returns the number of bytes written.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, Error> {
        let len = match self {
            SettingValue::Str(s) => 2 + s.len(),
            SettingValue::U8(_) => 2,
            SettingValue::U16(_) => 3,
            SettingValue::U32(_) => 5,
        };
        if buf.len() < len {
            return Err(Error::Storage);
        }

        match self {
            SettingValue::Str(s) => {
                buf[0] = TAG_STR;
                buf[1] = s.len() as u8;
                buf[2..len].copy_from_slice(s.as_bytes());
            }
            SettingValue::U8(v) => {
                buf[0] = TAG_U8;
                buf[1] = *v;
            }
            SettingValue::U16(v) => {
                buf[0] = TAG_U16;
                buf[1..len].copy_from_slice(&v.to_le_bytes());
            }
            SettingValue::U32(v) => {
                buf[0] = TAG_U32;
                buf[1..len].copy_from_slice(&v.to_le_bytes());
            }
        }
        Ok(len)
    }

    /// Deserialize from bytes written by [`encode`](Self::encode).
    pub fn decode(data: &[u8]) -> Result<Self, Error> {
        let (&tag, rest) = data.split_first().ok_or(Error::InvalidSetting)?;
        match tag {
            TAG_STR => {
                let (&len, bytes) = rest.split_first().ok_or(Error::InvalidSetting)?;
                let bytes = bytes.get(..len as usize).ok_or(Error::InvalidSetting)?;
                let s = core::str::from_utf8(bytes).map_err(|_| Error::InvalidSetting)?;
                let s = String::try_from(s).map_err(|_| Error::InvalidSetting)?;
                Ok(SettingValue::Str(s))
            }
            TAG_U8 => rest
                .first()
                .map(|&v| SettingValue::U8(v))
                .ok_or(Error::InvalidSetting),
            TAG_U16 => rest
                .get(..2)
                .and_then(|b| b.try_into().ok())
                .map(|b| SettingValue::U16(u16::from_le_bytes(b)))
                .ok_or(Error::InvalidSetting),
            TAG_U32 => rest
                .get(..4)
                .and_then(|b| b.try_into().ok())
                .map(|b| SettingValue::U32(u32::from_le_bytes(b)))
                .ok_or(Error::InvalidSetting),
            _ => Err(Error::InvalidSetting),
        }
    }
}

/// Key/value persistence for settings.
///
/// Implemented over `sequential-storage` on the device and over an
/// in-memory map on the host.
#[allow(async_fn_in_trait)]
pub trait SettingsStore {
    async fn set(&mut self, key: SettingKey, value: &SettingValue) -> Result<(), Error>;

    /// `Ok(None)` when nothing was ever stored under `key`.
    async fn get(&mut self, key: SettingKey) -> Result<Option<SettingValue>, Error>;
}

/// Everything the bridge persists.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Settings {
    pub ssid: String<SETTING_STR_LEN>,
    pub password: String<SETTING_STR_LEN>,
    pub channel: u8,
    pub baud_rate: u32,
    pub uart_pin_tx: u8,
    pub uart_pin_rx: u8,
    /// 1 = MSP/LTM, 2 = MAVLink, 4 = transparent.
    pub protocol: u8,
    pub transparent_packet_size: u16,
    pub ltm_frames_per_packet: u8,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ssid: bounded(DEFAULT_SSID).0,
            password: bounded(DEFAULT_PWD).0,
            channel: DEFAULT_CHANNEL,
            baud_rate: DEFAULT_UART_BAUD_RATE,
            uart_pin_tx: DEFAULT_UART_PIN_TX,
            uart_pin_rx: DEFAULT_UART_PIN_RX,
            protocol: DEFAULT_SERIAL_PROTOCOL,
            transparent_packet_size: DEFAULT_TRANSPARENT_BUF_SIZE,
            ltm_frames_per_packet: DEFAULT_LTM_FRAMES_PER_PACKET,
        }
    }
}

impl Settings {
    pub fn value(&self, key: SettingKey) -> SettingValue {
        match key {
            SettingKey::Ssid => SettingValue::Str(self.ssid.clone()),
            SettingKey::WifiPassword => SettingValue::Str(self.password.clone()),
            SettingKey::WifiChannel => SettingValue::U8(self.channel),
            SettingKey::BaudRate => SettingValue::U32(self.baud_rate),
            SettingKey::UartPinTx => SettingValue::U8(self.uart_pin_tx),
            SettingKey::UartPinRx => SettingValue::U8(self.uart_pin_rx),
            SettingKey::Protocol => SettingValue::U8(self.protocol),
            SettingKey::TransparentPacketSize => SettingValue::U16(self.transparent_packet_size),
            SettingKey::LtmFramesPerPacket => SettingValue::U8(self.ltm_frames_per_packet),
        }
    }

    /// Set one field. The value type must match the key, and a few fields
    /// are range checked.
    pub fn apply(&mut self, key: SettingKey, value: SettingValue) -> Result<(), Error> {
        match (key, value) {
            (SettingKey::Ssid, SettingValue::Str(s)) if !s.is_empty() => self.ssid = s,
            (SettingKey::WifiPassword, SettingValue::Str(s)) => self.password = s,
            (SettingKey::WifiChannel, SettingValue::U8(v)) if (1..=13).contains(&v) => {
                self.channel = v
            }
            (SettingKey::BaudRate, SettingValue::U32(v)) if v > 0 => self.baud_rate = v,
            (SettingKey::UartPinTx, SettingValue::U8(v)) => self.uart_pin_tx = v,
            (SettingKey::UartPinRx, SettingValue::U8(v)) => self.uart_pin_rx = v,
            (SettingKey::Protocol, SettingValue::U8(v)) => self.protocol = v,
            (SettingKey::TransparentPacketSize, SettingValue::U16(v)) if v > 0 => {
                self.transparent_packet_size = v
            }
            (SettingKey::LtmFramesPerPacket, SettingValue::U8(v)) if v > 0 => {
                self.ltm_frames_per_packet = v
            }
            _ => return Err(Error::InvalidSetting),
        }
        Ok(())
    }

    /// Write every entry, stopping at the first failure.
    pub async fn write_all<S: SettingsStore>(&self, store: &mut S) -> Result<(), Error> {
        for key in SettingKey::ALL {
            store.set(key, &self.value(key)).await?;
        }
        Ok(())
    }

    /// Read every entry. Missing or malformed entries keep their default;
    /// store failures are returned.
    pub async fn load<S: SettingsStore>(store: &mut S) -> Result<Self, Error> {
        let mut settings = Settings::default();
        for key in SettingKey::ALL {
            let value = match store.get(key).await {
                Ok(Some(value)) => value,
                Ok(None) | Err(Error::InvalidSetting) => continue,
                Err(e) => return Err(e),
            };
            // A wrong type or out-of-range value keeps the default.
            let _ = settings.apply(key, value);
        }
        Ok(settings)
    }
}

/// Settings kept in RAM. Backs host tests and boards without flash.
#[derive(Default)]
pub struct MemoryStore {
    entries: heapless::LinearMap<SettingKey, SettingValue, 9>,
    /// Fail every `set` once this many writes succeeded.
    fail_after: Option<usize>,
    writes: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a store that breaks after `writes` successful writes.
    pub fn failing_after(writes: usize) -> Self {
        Self {
            fail_after: Some(writes),
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SettingsStore for MemoryStore {
    async fn set(&mut self, key: SettingKey, value: &SettingValue) -> Result<(), Error> {
        if self.fail_after.is_some_and(|limit| self.writes >= limit) {
            return Err(Error::Storage);
        }
        self.entries
            .insert(key, value.clone())
            .map_err(|_| Error::Storage)?;
        self.writes += 1;
        Ok(())
    }

    async fn get(&mut self, key: SettingKey) -> Result<Option<SettingValue>, Error> {
        Ok(self.entries.get(&key).cloned())
    }
}
