//! Per-link throughput and error counters shared between tasks.
//!
//! Link drivers bump counters as bytes move; the display task takes a
//! snapshot once per frame and zeroes the counters in the same critical
//! section, so every increment lands in exactly one snapshot.

use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

/// Counters accumulated for one link since the last reset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkStatus {
    pub tx_bytes: u32,
    pub rx_bytes: u32,
    pub tx_pkts: u32,
    pub rx_pkts: u32,
    /// Clients connected, where the link has a notion of clients.
    pub num_conn: u32,
    pub errors: u32,
}

/// Names one field of [`LinkStatus`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkField {
    TxBytes,
    RxBytes,
    TxPkts,
    RxPkts,
    NumConn,
    Errors,
}

impl LinkField {
    pub const ALL: [LinkField; 6] = [
        LinkField::TxBytes,
        LinkField::RxBytes,
        LinkField::TxPkts,
        LinkField::RxPkts,
        LinkField::NumConn,
        LinkField::Errors,
    ];
}

impl LinkStatus {
    /// All counters at zero.
    pub const fn zero() -> Self {
        Self {
            tx_bytes: 0,
            rx_bytes: 0,
            tx_pkts: 0,
            rx_pkts: 0,
            num_conn: 0,
            errors: 0,
        }
    }

    /// Read one field.
    pub fn get(&self, field: LinkField) -> u32 {
        match field {
            LinkField::TxBytes => self.tx_bytes,
            LinkField::RxBytes => self.rx_bytes,
            LinkField::TxPkts => self.tx_pkts,
            LinkField::RxPkts => self.rx_pkts,
            LinkField::NumConn => self.num_conn,
            LinkField::Errors => self.errors,
        }
    }

    fn field_mut(&mut self, field: LinkField) -> &mut u32 {
        match field {
            LinkField::TxBytes => &mut self.tx_bytes,
            LinkField::RxBytes => &mut self.rx_bytes,
            LinkField::TxPkts => &mut self.tx_pkts,
            LinkField::RxPkts => &mut self.rx_pkts,
            LinkField::NumConn => &mut self.num_conn,
            LinkField::Errors => &mut self.errors,
        }
    }

    /// Saturating add so counters never wrap back below an earlier value.
    fn bump(&mut self, field: LinkField, delta: u32) {
        let slot = self.field_mut(field);
        *slot = slot.saturating_add(delta);
    }

    fn absorb(&mut self, other: &LinkStatus) {
        for field in LinkField::ALL {
            self.bump(field, other.get(field));
        }
    }

    /// True when nothing was counted in the interval.
    pub fn is_idle(&self) -> bool {
        *self == Self::zero()
    }
}

/// Lock-protected [`LinkStatus`] for one link.
///
/// Producers only ever add; the renderer is the only caller of
/// [`snapshot_and_reset`](Self::snapshot_and_reset). Every operation is a
/// single short critical section with no I/O inside.
pub struct StatusCounters {
    inner: Mutex<CriticalSectionRawMutex, Cell<LinkStatus>>,
}

impl StatusCounters {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(Cell::new(LinkStatus::zero())),
        }
    }

    /// Add `delta` to one counter.
    pub fn increment(&self, field: LinkField, delta: u32) {
        self.update(|s| s.bump(field, delta));
    }

    /// One frame sent: bytes and packet count move together.
    pub fn record_tx(&self, bytes: u32) {
        self.update(|s| {
            s.bump(LinkField::TxBytes, bytes);
            s.bump(LinkField::TxPkts, 1);
        });
    }

    /// One frame received.
    pub fn record_rx(&self, bytes: u32) {
        self.update(|s| {
            s.bump(LinkField::RxBytes, bytes);
            s.bump(LinkField::RxPkts, 1);
        });
    }

    pub fn record_error(&self) {
        self.increment(LinkField::Errors, 1);
    }

    /// Copy all counters and zero them in the same critical section.
    pub fn snapshot_and_reset(&self) -> LinkStatus {
        self.inner.lock(|cell| cell.replace(LinkStatus::zero()))
    }

    /// Fold a snapshot back in, e.g. when the frame that consumed it was
    /// never shown. Increments made since the snapshot are kept.
    pub fn restore(&self, snapshot: &LinkStatus) {
        self.update(|s| s.absorb(snapshot));
    }

    /// Copy without resetting.
    pub fn peek(&self) -> LinkStatus {
        self.inner.lock(|cell| cell.get())
    }

    fn update(&self, f: impl FnOnce(&mut LinkStatus)) {
        self.inner.lock(|cell| {
            let mut status = cell.get();
            f(&mut status);
            cell.set(status);
        });
    }
}

impl Default for StatusCounters {
    fn default() -> Self {
        Self::new()
    }
}
