//! Persistent settings storage.
//!
//! Uses the nRF52840's internal flash via `sequential-storage` crate
//! to keep the bridge settings across power cycles.
//!
//! Storage layout:
//!   - One map item per setting, keyed by `SettingKey::id()`.
//!   - Each item is a `SettingValue` in its tagged byte encoding.
//!   - The flash pages are managed by `sequential-storage` which
//!     handles wear levelling and GC.

use bridgemon::config::{STORAGE_FLASH_PAGE_COUNT, STORAGE_FLASH_PAGE_START};
use bridgemon::settings::{SettingKey, SettingValue, SettingsStore, MAX_ENCODED_LEN};
use bridgemon::Error;
use defmt::{debug, error};
use embedded_storage_async::nor_flash::NorFlash;
use sequential_storage::cache::NoCache;

/// Flash page size for nRF52840 (4 KB).
const FLASH_PAGE_SIZE: u32 = 4096;

/// Start address of our storage region.
const STORAGE_START: u32 = STORAGE_FLASH_PAGE_START * FLASH_PAGE_SIZE;

/// End address (exclusive) of our storage region.
const STORAGE_END: u32 = (STORAGE_FLASH_PAGE_START + STORAGE_FLASH_PAGE_COUNT) * FLASH_PAGE_SIZE;

/// Scratch space for one stored item: key, length header and value,
/// rounded up generously for word alignment.
const MAX_RECORD_SIZE: usize = 128;

/// Settings kept in the reserved flash pages.
pub struct FlashSettingsStore<F> {
    flash: F,
}

impl<F: NorFlash> FlashSettingsStore<F> {
    pub fn new(flash: F) -> Self {
        Self { flash }
    }
}

impl<F: NorFlash> SettingsStore for FlashSettingsStore<F> {
    async fn set(&mut self, key: SettingKey, value: &SettingValue) -> Result<(), Error> {
        let mut data_buf = [0u8; MAX_ENCODED_LEN];
        let len = value.encode(&mut data_buf)?;
        let item = &data_buf[..len];

        let mut buf = [0u8; MAX_RECORD_SIZE];
        sequential_storage::map::store_item::<u8, &[u8], _>(
            &mut self.flash,
            STORAGE_START..STORAGE_END,
            &mut NoCache::new(),
            &mut buf,
            &key.id(),
            &item,
        )
        .await
        .map_err(|e| {
            error!(
                "Flash write error ({}): {:?}",
                key.name(),
                defmt::Debug2Format(&e)
            );
            Error::Storage
        })?;

        debug!("Stored {} ({} bytes)", key.name(), len);
        Ok(())
    }

    async fn get(&mut self, key: SettingKey) -> Result<Option<SettingValue>, Error> {
        let mut buf = [0u8; MAX_RECORD_SIZE];

        match sequential_storage::map::fetch_item::<u8, &[u8], _>(
            &mut self.flash,
            STORAGE_START..STORAGE_END,
            &mut NoCache::new(),
            &mut buf,
            &key.id(),
        )
        .await
        {
            Ok(Some(data)) => SettingValue::decode(data).map(Some),
            Ok(None) => Ok(None),
            Err(e) => {
                error!(
                    "Flash read error ({}): {:?}",
                    key.name(),
                    defmt::Debug2Format(&e)
                );
                Err(Error::Storage)
            }
        }
    }
}
