//! Bounded, severity-ordered queue of diagnostic messages.
//!
//! Any task may raise a notification; the display task drains the most
//! urgent ones each frame. When the queue is full a new message only gets
//! in by evicting something strictly less severe, so the queue always holds
//! the most important messages seen so far rather than the most recent.
//!
//! ## Ordering
//!
//! Priority is `(severity desc, sequence asc)`: errors before warnings
//! before info, and FIFO within a severity. Entries are kept in a sorted
//! fixed array, lowest priority first, so `dequeue_highest` is a `pop` and
//! the eviction victim (least severe, oldest) sits at the end of the
//! lowest-severity run at the front.

use core::cell::RefCell;
use core::cmp::Ordering;
use core::fmt::{self, Write};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use heapless::{String, Vec};

use crate::config::{NOTIFY_CAPACITY, NOTIFY_TAG_LEN, NOTIFY_TEXT_LEN};
use crate::error::Error;

/// Source tag of a notification (`"uart"`, `"usb"`, `"http"`, ...).
pub type Tag = String<NOTIFY_TAG_LEN>;

/// Message body of a notification.
pub type Text = String<NOTIFY_TEXT_LEN>;

/// How urgent a notification is. `Error > Warning > Info`.
///
/// The discriminants are the 8-bit significance levels used on the wire
/// by older firmware (0 = lowest, 255 = highest).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Severity {
    Info = 64,
    Warning = 128,
    Error = 192,
}

impl Severity {
    pub fn level(self) -> u8 {
        self as u8
    }

    /// Map a raw significance level onto the band at or below it.
    pub fn from_level(level: u8) -> Self {
        match level {
            192..=u8::MAX => Severity::Error,
            128..=191 => Severity::Warning,
            _ => Severity::Info,
        }
    }

    /// Single-character marker used on the display.
    pub fn marker(self) -> char {
        match self {
            Severity::Info => 'I',
            Severity::Warning => 'W',
            Severity::Error => 'E',
        }
    }
}

/// One queued diagnostic message.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Notification {
    pub severity: Severity,
    pub source_tag: Tag,
    pub text: Text,
    /// Assigned at enqueue, strictly increasing. Lower = older.
    pub sequence: u64,
}

impl Notification {
    /// `Greater` means `self` is dequeued before `other`.
    pub fn priority_cmp(&self, other: &Self) -> Ordering {
        self.severity
            .cmp(&other.severity)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// Outcome of a successful enqueue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Receipt {
    pub sequence: u64,
    /// A less severe entry was dropped to make room.
    pub evicted: bool,
    /// Tag or text was cut to fit.
    pub truncated: bool,
}

impl Receipt {
    /// Treat truncation as an error, for callers that need the full text.
    pub fn strict(self) -> Result<Self, Error> {
        if self.truncated {
            Err(Error::MessageTruncated)
        } else {
            Ok(self)
        }
    }
}

/// `fmt::Write` sink that stops at the string's capacity instead of
/// failing. Cuts on a char boundary.
struct Truncating<'a, const N: usize> {
    buf: &'a mut String<N>,
    truncated: bool,
}

impl<const N: usize> Write for Truncating<'_, N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if self.truncated {
            return Ok(());
        }
        let room = N - self.buf.len();
        if s.len() <= room {
            let _ = self.buf.push_str(s);
            return Ok(());
        }
        let mut cut = room;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        let _ = self.buf.push_str(&s[..cut]);
        self.truncated = true;
        Ok(())
    }
}

/// Format `args` into a fixed-capacity string. Returns the (possibly
/// shortened) text and whether anything was cut.
pub fn compose<const N: usize>(args: fmt::Arguments<'_>) -> (String<N>, bool) {
    let mut buf = String::new();
    let mut sink = Truncating {
        buf: &mut buf,
        truncated: false,
    };
    // A `Display` impl may bail out half way; keep whatever it wrote.
    let _ = sink.write_fmt(args);
    let truncated = sink.truncated;
    (buf, truncated)
}

/// Copy `s` into a fixed-capacity string, cutting if needed.
pub fn bounded<const N: usize>(s: &str) -> (String<N>, bool) {
    compose(format_args!("{}", s))
}

struct Inner<const N: usize> {
    /// Ascending priority: `entries.last()` is dequeued next.
    entries: Vec<Notification, N>,
    next_sequence: u64,
}

impl<const N: usize> Inner<N> {
    const fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_sequence: 0,
        }
    }

    /// Least severe, oldest entry.
    fn victim_index(&self) -> Option<usize> {
        let lowest = self.entries.first()?.severity;
        let run = self.entries.partition_point(|e| e.severity == lowest);
        Some(run - 1)
    }

    /// Insert under the admission rule. Returns whether an entry was evicted.
    fn admit(&mut self, notification: Notification) -> Result<bool, Error> {
        let mut evicted = false;
        if self.entries.is_full() {
            let victim = self.victim_index().ok_or(Error::QueueFull)?;
            if notification.severity <= self.entries[victim].severity {
                return Err(Error::QueueFull);
            }
            self.entries.remove(victim);
            evicted = true;
        }

        let pos = self
            .entries
            .partition_point(|e| e.priority_cmp(&notification) == Ordering::Less);
        self.entries
            .insert(pos, notification)
            .map_err(|_| Error::QueueFull)?;
        Ok(evicted)
    }

    /// Insert a returning entry. On a full queue it displaces the lowest
    /// priority entry if it outranks it, sequence included, so an older
    /// entry beats newer ones of the same severity.
    fn readmit(&mut self, notification: Notification) -> Result<(), Error> {
        if self.entries.is_full() {
            match self.entries.first() {
                Some(lowest) if notification.priority_cmp(lowest) == Ordering::Greater => {
                    self.entries.remove(0);
                }
                _ => return Err(Error::QueueFull),
            }
        }

        let pos = self
            .entries
            .partition_point(|e| e.priority_cmp(&notification) == Ordering::Less);
        self.entries
            .insert(pos, notification)
            .map_err(|_| Error::QueueFull)
    }
}

/// Fixed-capacity notification queue shared by all tasks.
///
/// Many producers, one consumer. Every method is one short critical
/// section; formatting happens before the lock is taken.
pub struct NotificationQueue<const N: usize = NOTIFY_CAPACITY> {
    inner: Mutex<CriticalSectionRawMutex, RefCell<Inner<N>>>,
}

impl<const N: usize> NotificationQueue<N> {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Inner::new())),
        }
    }

    /// Queue a message. Tag and text are cut to their capacities.
    ///
    /// Fails with [`Error::QueueFull`] when the queue is full and every
    /// entry is at least as severe as `severity`. The caller drops the
    /// message; nothing else is affected.
    pub fn enqueue(
        &self,
        severity: Severity,
        source_tag: &str,
        text: &str,
    ) -> Result<Receipt, Error> {
        let (text, text_cut) = bounded::<NOTIFY_TEXT_LEN>(text);
        self.submit(severity, source_tag, text, text_cut)
    }

    /// Queue a message formatted from `args`, see [`notify!`](crate::notify!).
    pub fn enqueue_fmt(
        &self,
        severity: Severity,
        source_tag: &str,
        args: fmt::Arguments<'_>,
    ) -> Result<Receipt, Error> {
        let (text, text_cut) = compose::<NOTIFY_TEXT_LEN>(args);
        self.submit(severity, source_tag, text, text_cut)
    }

    fn submit(
        &self,
        severity: Severity,
        source_tag: &str,
        text: Text,
        text_cut: bool,
    ) -> Result<Receipt, Error> {
        let (source_tag, tag_cut) = bounded::<NOTIFY_TAG_LEN>(source_tag);
        let mut notification = Notification {
            severity,
            source_tag,
            text,
            sequence: 0,
        };

        self.inner.lock(|cell| {
            let mut inner = cell.borrow_mut();
            notification.sequence = inner.next_sequence;
            inner.next_sequence += 1;
            let sequence = notification.sequence;
            let evicted = inner.admit(notification)?;
            Ok(Receipt {
                sequence,
                evicted,
                truncated: text_cut || tag_cut,
            })
        })
    }

    /// Re-admit a notification taken out by [`dequeue_highest`](Self::dequeue_highest),
    /// keeping its sequence. On a full queue it takes the place of the
    /// lowest priority entry when it outranks it; otherwise it is refused
    /// with [`Error::QueueFull`].
    pub fn requeue(&self, notification: Notification) -> Result<(), Error> {
        self.inner
            .lock(|cell| cell.borrow_mut().readmit(notification))
    }

    /// Copies of up to `K` most urgent entries, most urgent first. The
    /// queue is left as is.
    pub fn peek_top<const K: usize>(&self) -> Vec<Notification, K> {
        self.inner.lock(|cell| {
            cell.borrow()
                .entries
                .iter()
                .rev()
                .take(K)
                .cloned()
                .collect()
        })
    }

    /// Remove the entry with `sequence`, if it is still queued.
    pub fn remove(&self, sequence: u64) -> Option<Notification> {
        self.inner.lock(|cell| {
            let mut inner = cell.borrow_mut();
            let index = inner.entries.iter().position(|e| e.sequence == sequence)?;
            Some(inner.entries.remove(index))
        })
    }

    /// Remove and return the most urgent entry.
    pub fn dequeue_highest(&self) -> Option<Notification> {
        self.inner.lock(|cell| cell.borrow_mut().entries.pop())
    }

    /// Copy of the entry `dequeue_highest` would return.
    pub fn peek_highest(&self) -> Option<Notification> {
        self.inner.lock(|cell| cell.borrow().entries.last().cloned())
    }

    pub fn len(&self) -> usize {
        self.inner.lock(|cell| cell.borrow().entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Drop every queued entry. Sequence numbering continues.
    pub fn clear(&self) {
        self.inner.lock(|cell| cell.borrow_mut().entries.clear());
    }
}

impl<const N: usize> Default for NotificationQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// printf-style enqueue:
///
/// ```
/// use bridgemon::notify;
/// use bridgemon::notify::{NotificationQueue, Severity};
///
/// let queue: NotificationQueue<4> = NotificationQueue::new();
/// let _ = notify!(queue, Severity::Warning, "uart", "framing errors: {}", 3);
/// ```
#[macro_export]
macro_rules! notify {
    ($queue:expr, $severity:expr, $tag:expr, $($arg:tt)*) => {
        $queue.enqueue_fmt($severity, $tag, format_args!($($arg)*))
    };
}
