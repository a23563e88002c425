//! Status screen renderer.
//!
//! Five times a second the display task takes a snapshot of every link's
//! counters, drains the most urgent notifications and draws one frame:
//!
//! ```text
//! db               1:01:01
//! usb t  64 r 128
//! uart t   0 r  12
//! E uart: rx overrun
//! W usb: host gone
//! ```
//!
//! The renderer only knows the display through [`DisplayDriver`]; the
//! SSD1306 implementation lives with the firmware binary.

use core::fmt;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use heapless::{String, Vec};

use crate::config::{
    DISPLAY_WIDTH, HEADER, LINE_CHARS, LINE_HEIGHT, NOTIFY_LINES, OLED_RESET_HOLD_MS,
};
use crate::error::Error;
use crate::notify::{compose, Notification, NotificationQueue};
use crate::status::{LinkStatus, StatusCounters};

/// Horizontal anchoring of a string relative to its `x` coordinate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Alignment {
    Left,
    Center,
    Right,
}

/// The few operations the renderer needs from a text display.
///
/// Drawing goes to a framebuffer; nothing reaches the panel until
/// [`display`](Self::display).
pub trait DisplayDriver {
    type Error;

    /// Bring up the controller and select the font.
    fn init(&mut self) -> Result<(), Self::Error>;

    /// Blank the framebuffer.
    fn clear(&mut self) -> Result<(), Self::Error>;

    /// Draw `text` with its top edge at `y`, anchored at `x`.
    fn draw_string(
        &mut self,
        x: i32,
        y: i32,
        text: &str,
        alignment: Alignment,
    ) -> Result<(), Self::Error>;

    /// Push the framebuffer to the panel.
    fn display(&mut self) -> Result<(), Self::Error>;
}

/// Longest `H:MM:SS` for a `u64` second count.
pub const UPTIME_LEN: usize = 24;

/// Format elapsed seconds as `H:MM:SS`; hours are not wrapped.
pub fn uptime_string(elapsed_secs: u64) -> String<UPTIME_LEN> {
    let hours = elapsed_secs / 3600;
    let minutes = (elapsed_secs / 60) % 60;
    let seconds = elapsed_secs % 60;
    compose(format_args!("{}:{:02}:{:02}", hours, minutes, seconds)).0
}

/// Room for a link row with two full-width `u32` counters.
pub const LINK_LINE_LEN: usize = 32;

/// `"<link> t <tx> r <rx>"`, byte counts padded to three columns.
pub fn link_line(name: &str, status: &LinkStatus) -> String<LINK_LINE_LEN> {
    compose(format_args!(
        "{} t {:>3} r {:>3}",
        name, status.tx_bytes, status.rx_bytes
    ))
    .0
}

struct NotificationRow<'a>(&'a Notification);

impl fmt::Display for NotificationRow<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}: {}",
            self.0.severity.marker(),
            self.0.source_tag,
            self.0.text
        )
    }
}

/// One screen row for a notification: `"E uart: rx overrun"`, cut to the
/// line width.
pub fn notification_line(notification: &Notification) -> String<LINE_CHARS> {
    compose(format_args!("{}", NotificationRow(notification))).0
}

/// Absolute-deadline scheduler for the render loop.
///
/// Each wake is `previous deadline + period`, independent of how long the
/// frame took, so per-frame jitter never accumulates. A frame that overruns
/// whole periods skips them and rejoins the original grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Cadence {
    period_us: u64,
    next_us: u64,
}

impl Cadence {
    /// First deadline is one period after `start_us`.
    pub const fn new(start_us: u64, period_us: u64) -> Self {
        Self {
            period_us,
            next_us: start_us + period_us,
        }
    }

    pub const fn period_us(&self) -> u64 {
        self.period_us
    }

    /// Deadline to sleep until, given the time the frame finished.
    pub fn next_deadline(&mut self, now_us: u64) -> u64 {
        let mut deadline = self.next_us;
        if now_us > deadline && self.period_us > 0 {
            let missed = (now_us - deadline).div_ceil(self.period_us);
            deadline += missed * self.period_us;
        }
        self.next_us = deadline + self.period_us;
        deadline
    }
}

/// A link shown on screen: its label and its shared counters.
#[derive(Clone, Copy)]
pub struct Link<'a> {
    pub name: &'a str,
    pub counters: &'a StatusCounters,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RendererState {
    Uninitialized,
    Rendering,
}

/// What a successful frame showed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameReport<const L: usize> {
    pub links: [LinkStatus; L],
    pub notifications: usize,
}

/// Owns the display and turns shared state into frames.
pub struct DisplayRenderer<'a, D, const L: usize, const Q: usize> {
    driver: D,
    state: RendererState,
    links: [Link<'a>; L],
    queue: &'a NotificationQueue<Q>,
}

impl<'a, D, const L: usize, const Q: usize> DisplayRenderer<'a, D, L, Q>
where
    D: DisplayDriver,
{
    pub fn new(driver: D, links: [Link<'a>; L], queue: &'a NotificationQueue<Q>) -> Self {
        Self {
            driver,
            state: RendererState::Uninitialized,
            links,
            queue,
        }
    }

    pub fn state(&self) -> RendererState {
        self.state
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Pulse the reset line, then bring up the driver.
    ///
    /// On failure the renderer stays `Uninitialized`; the rest of the
    /// system keeps running without a screen.
    pub fn init<P, T>(&mut self, reset: &mut P, delay: &mut T) -> Result<(), Error>
    where
        P: OutputPin,
        T: DelayNs,
    {
        if self.state == RendererState::Rendering {
            return Ok(());
        }

        reset.set_low().map_err(|_| Error::HardwareInitFailure)?;
        delay.delay_ms(OLED_RESET_HOLD_MS);
        reset.set_high().map_err(|_| Error::HardwareInitFailure)?;

        self.driver.init().map_err(|_| Error::HardwareInitFailure)?;
        self.state = RendererState::Rendering;
        Ok(())
    }

    /// Snapshot, draw, flip, then drain.
    ///
    /// Notifications are drawn from copies and only removed from the queue
    /// once the flip went through. If drawing or the flip fails the frame
    /// is dropped with [`Error::DisplayBusFault`], the snapshots are handed
    /// back and the queue keeps everything it held.
    pub fn render_cycle(&mut self, uptime_us: u64) -> Result<FrameReport<L>, Error> {
        if self.state != RendererState::Rendering {
            return Err(Error::NotInitialized);
        }

        let mut snapshots = [LinkStatus::zero(); L];
        for (slot, link) in snapshots.iter_mut().zip(self.links.iter()) {
            *slot = link.counters.snapshot_and_reset();
        }

        let shown: Vec<Notification, NOTIFY_LINES> = self.queue.peek_top();

        let drawn = draw_frame(
            &mut self.driver,
            uptime_us / 1_000_000,
            &self.links,
            &snapshots,
            &shown,
        );

        if drawn.is_err() {
            for (link, snapshot) in self.links.iter().zip(snapshots.iter()) {
                link.counters.restore(snapshot);
            }
            return Err(Error::DisplayBusFault);
        }

        // An entry evicted while the frame was drawn is already gone.
        for notification in &shown {
            self.queue.remove(notification.sequence);
        }

        Ok(FrameReport {
            links: snapshots,
            notifications: shown.len(),
        })
    }
}

fn draw_frame<D: DisplayDriver>(
    driver: &mut D,
    uptime_secs: u64,
    links: &[Link<'_>],
    snapshots: &[LinkStatus],
    notifications: &[Notification],
) -> Result<(), D::Error> {
    driver.clear()?;
    driver.draw_string(0, 0, HEADER, Alignment::Left)?;
    driver.draw_string(
        DISPLAY_WIDTH - 1,
        0,
        &uptime_string(uptime_secs),
        Alignment::Right,
    )?;

    let mut y = LINE_HEIGHT;
    for (link, status) in links.iter().zip(snapshots) {
        driver.draw_string(0, y, &link_line(link.name, status), Alignment::Left)?;
        y += LINE_HEIGHT;
    }
    for notification in notifications {
        driver.draw_string(0, y, &notification_line(notification), Alignment::Left)?;
        y += LINE_HEIGHT;
    }

    driver.display()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::Severity;
    use crate::status::LinkField;
    use core::cell::RefCell;
    use core::convert::Infallible;

    #[derive(Debug, PartialEq)]
    enum Hw {
        ResetLow,
        ResetHigh,
        DelayNs(u64),
        DriverInit,
    }

    struct FakePin<'a>(&'a RefCell<std::vec::Vec<Hw>>);

    impl embedded_hal::digital::ErrorType for FakePin<'_> {
        type Error = Infallible;
    }

    impl OutputPin for FakePin<'_> {
        fn set_low(&mut self) -> Result<(), Self::Error> {
            self.0.borrow_mut().push(Hw::ResetLow);
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Self::Error> {
            self.0.borrow_mut().push(Hw::ResetHigh);
            Ok(())
        }
    }

    struct FakeDelay<'a>(&'a RefCell<std::vec::Vec<Hw>>);

    impl DelayNs for FakeDelay<'_> {
        fn delay_ns(&mut self, ns: u32) {
            let mut log = self.0.borrow_mut();
            match log.last_mut() {
                Some(Hw::DelayNs(total)) => *total += u64::from(ns),
                _ => log.push(Hw::DelayNs(u64::from(ns))),
            }
        }
    }

    #[derive(Default)]
    struct FakeDisplay<'a> {
        log: Option<&'a RefCell<std::vec::Vec<Hw>>>,
        fail_init: bool,
        fail_flip: bool,
        frame: std::vec::Vec<(i32, i32, std::string::String, Alignment)>,
        flips: usize,
    }

    impl DisplayDriver for FakeDisplay<'_> {
        type Error = ();

        fn init(&mut self) -> Result<(), ()> {
            if let Some(log) = self.log {
                log.borrow_mut().push(Hw::DriverInit);
            }
            if self.fail_init {
                Err(())
            } else {
                Ok(())
            }
        }

        fn clear(&mut self) -> Result<(), ()> {
            self.frame.clear();
            Ok(())
        }

        fn draw_string(
            &mut self,
            x: i32,
            y: i32,
            text: &str,
            alignment: Alignment,
        ) -> Result<(), ()> {
            self.frame.push((x, y, text.into(), alignment));
            Ok(())
        }

        fn display(&mut self) -> Result<(), ()> {
            if self.fail_flip {
                return Err(());
            }
            self.flips += 1;
            Ok(())
        }
    }

    fn ready<'a, const L: usize, const Q: usize>(
        display: FakeDisplay<'a>,
        links: [Link<'a>; L],
        queue: &'a NotificationQueue<Q>,
    ) -> DisplayRenderer<'a, FakeDisplay<'a>, L, Q> {
        let log = RefCell::new(std::vec::Vec::new());
        let mut renderer = DisplayRenderer::new(display, links, queue);
        renderer
            .init(&mut FakePin(&log), &mut FakeDelay(&log))
            .unwrap();
        renderer
    }

    #[test]
    fn uptime_formats_hours_minutes_seconds() {
        assert_eq!(uptime_string(3661).as_str(), "1:01:01");
        assert_eq!(uptime_string(59).as_str(), "0:00:59");
        assert_eq!(uptime_string(0).as_str(), "0:00:00");
        assert_eq!(uptime_string(100 * 3600 + 59 * 60).as_str(), "100:59:00");
    }

    #[test]
    fn uptime_fits_the_largest_value() {
        let s = uptime_string(u64::MAX);
        assert!(s.ends_with(":15"));
        assert!(s.starts_with("5124095576030431:"));
    }

    #[test]
    fn link_line_pads_counts() {
        let status = LinkStatus {
            tx_bytes: 5,
            rx_bytes: 1234,
            ..LinkStatus::zero()
        };
        assert_eq!(link_line("uart", &status).as_str(), "uart t   5 r 1234");
    }

    #[test]
    fn notification_line_is_cut_to_screen_width() {
        let queue: NotificationQueue<1> = NotificationQueue::new();
        queue
            .enqueue(Severity::Error, "uart", "receiver overrun on channel two")
            .unwrap();
        let line = notification_line(&queue.dequeue_highest().unwrap());
        assert_eq!(line.as_str(), "E uart: receiver over");
        assert_eq!(line.len(), LINE_CHARS);
    }

    #[test]
    fn init_pulses_reset_before_driver_init() {
        let log = RefCell::new(std::vec::Vec::new());
        let queue: NotificationQueue<2> = NotificationQueue::new();
        let display = FakeDisplay {
            log: Some(&log),
            ..Default::default()
        };
        let mut renderer = DisplayRenderer::new(display, [], &queue);
        assert_eq!(renderer.state(), RendererState::Uninitialized);

        renderer
            .init(&mut FakePin(&log), &mut FakeDelay(&log))
            .unwrap();

        assert_eq!(renderer.state(), RendererState::Rendering);
        assert_eq!(
            *log.borrow(),
            [
                Hw::ResetLow,
                Hw::DelayNs(u64::from(OLED_RESET_HOLD_MS) * 1_000_000),
                Hw::ResetHigh,
                Hw::DriverInit,
            ]
        );
    }

    #[test]
    fn failed_init_keeps_renderer_uninitialized() {
        let log = RefCell::new(std::vec::Vec::new());
        let queue: NotificationQueue<2> = NotificationQueue::new();
        let display = FakeDisplay {
            fail_init: true,
            ..Default::default()
        };
        let mut renderer = DisplayRenderer::new(display, [], &queue);

        assert_eq!(
            renderer.init(&mut FakePin(&log), &mut FakeDelay(&log)),
            Err(Error::HardwareInitFailure)
        );
        assert_eq!(renderer.state(), RendererState::Uninitialized);
        assert_eq!(renderer.render_cycle(0), Err(Error::NotInitialized));
    }

    #[test]
    fn frame_shows_header_uptime_links_and_notifications() {
        let usb = StatusCounters::new();
        let uart = StatusCounters::new();
        let queue: NotificationQueue<8> = NotificationQueue::new();
        let links = [
            Link { name: "usb", counters: &usb },
            Link { name: "uart", counters: &uart },
        ];
        let mut renderer = ready(FakeDisplay::default(), links, &queue);

        usb.increment(LinkField::TxBytes, 64);
        usb.increment(LinkField::RxBytes, 128);
        uart.record_rx(12);
        queue.enqueue(Severity::Info, "http", "server up").unwrap();
        queue.enqueue(Severity::Error, "uart", "rx overrun").unwrap();

        let report = renderer.render_cycle(3_661_500_000).unwrap();
        assert_eq!(report.notifications, 2);
        assert_eq!(report.links[0].tx_bytes, 64);

        let frame = &renderer.driver().frame;
        let rows: std::vec::Vec<_> = frame
            .iter()
            .map(|(x, y, t, a)| (*x, *y, t.as_str(), *a))
            .collect();
        assert_eq!(
            rows,
            [
                (0, 0, "db", Alignment::Left),
                (127, 0, "1:01:01", Alignment::Right),
                (0, 10, "usb t  64 r 128", Alignment::Left),
                (0, 20, "uart t   0 r  12", Alignment::Left),
                (0, 30, "E uart: rx overrun", Alignment::Left),
                (0, 40, "I http: server up", Alignment::Left),
            ]
        );
        assert_eq!(renderer.driver().flips, 1);

        assert!(usb.peek().is_idle());
        assert!(queue.is_empty());
    }

    #[test]
    fn drains_at_most_one_screen_of_notifications() {
        let queue: NotificationQueue<8> = NotificationQueue::new();
        for i in 0..5 {
            crate::notify!(queue, Severity::Warning, "t", "n{}", i).unwrap();
        }
        let mut renderer = ready(FakeDisplay::default(), [], &queue);

        let report = renderer.render_cycle(0).unwrap();
        assert_eq!(report.notifications, NOTIFY_LINES);
        assert_eq!(queue.len(), 5 - NOTIFY_LINES);
        assert_eq!(queue.peek_highest().unwrap().text.as_str(), "n3");
    }

    #[test]
    fn failed_flip_loses_no_counts_or_notifications() {
        let link = StatusCounters::new();
        let queue: NotificationQueue<4> = NotificationQueue::new();
        let display = FakeDisplay {
            fail_flip: true,
            ..Default::default()
        };
        let mut renderer = ready(display, [Link { name: "usb", counters: &link }], &queue);

        link.increment(LinkField::TxBytes, 300);
        link.record_error();
        queue.enqueue(Severity::Warning, "usb", "stall").unwrap();
        queue.enqueue(Severity::Info, "usb", "attached").unwrap();

        assert_eq!(renderer.render_cycle(1_000_000), Err(Error::DisplayBusFault));

        let status = link.peek();
        assert_eq!(status.tx_bytes, 300);
        assert_eq!(status.errors, 1);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.dequeue_highest().unwrap().text.as_str(), "stall");
        assert_eq!(queue.dequeue_highest().unwrap().text.as_str(), "attached");
    }

    /// Producers fill the queue while the frame goes out over the bus.
    struct BusyBusDisplay<'a> {
        queue: &'a NotificationQueue<4>,
        fail_flip: bool,
    }

    impl DisplayDriver for BusyBusDisplay<'_> {
        type Error = ();

        fn init(&mut self) -> Result<(), ()> {
            Ok(())
        }

        fn clear(&mut self) -> Result<(), ()> {
            Ok(())
        }

        fn draw_string(&mut self, _: i32, _: i32, _: &str, _: Alignment) -> Result<(), ()> {
            Ok(())
        }

        fn display(&mut self) -> Result<(), ()> {
            for i in 0..4 {
                let _ = crate::notify!(self.queue, Severity::Error, "uart", "late{}", i);
            }
            if self.fail_flip {
                Err(())
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn failed_flip_keeps_older_notifications_against_concurrent_producers() {
        let queue: NotificationQueue<4> = NotificationQueue::new();
        for i in 0..3 {
            crate::notify!(queue, Severity::Error, "uart", "early{}", i).unwrap();
        }
        let log = RefCell::new(std::vec::Vec::new());
        let display = BusyBusDisplay {
            queue: &queue,
            fail_flip: true,
        };
        let mut renderer = DisplayRenderer::new(display, [], &queue);
        renderer
            .init(&mut FakePin(&log), &mut FakeDelay(&log))
            .unwrap();

        assert_eq!(renderer.render_cycle(0), Err(Error::DisplayBusFault));

        let mut texts = std::vec::Vec::new();
        while let Some(n) = queue.dequeue_highest() {
            texts.push(n.text.to_string());
        }
        assert_eq!(texts, ["early0", "early1", "early2", "late0"]);
    }

    #[test]
    fn shown_notification_evicted_during_the_flip_leaves_newcomers_alone() {
        let queue: NotificationQueue<4> = NotificationQueue::new();
        for i in 0..4 {
            crate::notify!(queue, Severity::Info, "usb", "info{}", i).unwrap();
        }
        let log = RefCell::new(std::vec::Vec::new());
        let display = BusyBusDisplay {
            queue: &queue,
            fail_flip: false,
        };
        let mut renderer = DisplayRenderer::new(display, [], &queue);
        renderer
            .init(&mut FakePin(&log), &mut FakeDelay(&log))
            .unwrap();

        let report = renderer.render_cycle(0).unwrap();
        assert_eq!(report.notifications, NOTIFY_LINES);

        let mut texts = std::vec::Vec::new();
        while let Some(n) = queue.dequeue_highest() {
            texts.push(n.text.to_string());
        }
        assert_eq!(texts, ["late0", "late1", "late2", "late3"]);
    }

    #[test]
    fn frame_after_bus_fault_shows_the_held_back_state() {
        let link = StatusCounters::new();
        let queue: NotificationQueue<4> = NotificationQueue::new();
        let display = FakeDisplay {
            fail_flip: true,
            ..Default::default()
        };
        let mut renderer = ready(display, [Link { name: "usb", counters: &link }], &queue);

        link.increment(LinkField::RxBytes, 10);
        assert!(renderer.render_cycle(0).is_err());
        link.increment(LinkField::RxBytes, 5);

        renderer.driver.fail_flip = false;
        let report = renderer.render_cycle(200_000).unwrap();
        assert_eq!(report.links[0].rx_bytes, 15);
    }

    #[test]
    fn cadence_stays_on_grid_despite_variable_work() {
        const PERIOD: u64 = 200_000;
        let mut cadence = Cadence::new(0, PERIOD);
        let mut now = 0u64;
        let mut seed = 0x2545_f491u32;

        for cycle in 1..=100u64 {
            // xorshift: per-frame work between 0 and ~190 ms
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            now += u64::from(seed % 190_000);

            let wake = cadence.next_deadline(now);
            now = now.max(wake);
            assert_eq!(now, cycle * PERIOD, "cycle {cycle} drifted");
        }
    }

    #[test]
    fn cadence_does_not_accumulate_wake_latency() {
        const PERIOD: u64 = 200_000;
        const LATENCY: u64 = 750;
        let mut cadence = Cadence::new(0, PERIOD);
        let mut now = 0u64;

        for cycle in 1..=100u64 {
            now += 40_000 + (cycle % 3) * 50_000;
            // the timer fires a little late every time
            now = now.max(cadence.next_deadline(now)) + LATENCY;
            assert!(now - cycle * PERIOD <= LATENCY);
        }
    }

    #[test]
    fn cadence_skips_missed_slots_after_overrun() {
        let mut cadence = Cadence::new(1_000, 200);
        assert_eq!(cadence.next_deadline(1_050), 1_200);
        // frame ran until 1_650: the 1_400 and 1_600 slots are gone
        assert_eq!(cadence.next_deadline(1_650), 1_800);
        assert_eq!(cadence.next_deadline(1_810), 2_000);
        assert_eq!(cadence.period_us(), 200);
    }
}
