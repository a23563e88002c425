//! User interface subsystem - the status screen on the SSD1306 OLED.
//!
//! The display task owns the panel. It pulses the reset line once, then
//! renders a frame every `RENDER_PERIOD_MS` on a fixed grid: link
//! counters since the previous frame plus the most urgent notifications.
//!
//! ## Components
//!
//! - **Display**: SSD1306 128×64 OLED via I²C, behind `bridgemon::DisplayDriver`

pub mod display;

use bridgemon::config::{LINK_COUNT, RENDER_PERIOD_US};
use bridgemon::render::{Cadence, DisplayRenderer, Link};
use bridgemon::{Error, NotificationQueue};
use defmt::{debug, error, info, warn};
use embassy_time::{Delay, Instant, Timer};
use embedded_hal::digital::OutputPin;

use self::display::Oled;

/// Drive the status screen forever.
///
/// Returns only if the panel never comes up; the bridge keeps working
/// headless in that case.
pub async fn run_display<I2C, RST>(
    i2c: I2C,
    mut reset: RST,
    links: [Link<'static>; LINK_COUNT],
    queue: &'static NotificationQueue,
) where
    I2C: embedded_hal::i2c::I2c,
    RST: OutputPin,
{
    info!("Display task started");

    let mut renderer = DisplayRenderer::new(Oled::new(i2c), links, queue);
    if let Err(e) = renderer.init(&mut reset, &mut Delay) {
        error!("OLED init failed: {} - running without display", e);
        return;
    }
    info!("OLED initialised");

    let mut cadence = Cadence::new(Instant::now().as_micros(), RENDER_PERIOD_US);
    loop {
        match renderer.render_cycle(Instant::now().as_micros()) {
            Ok(frame) => debug!("frame drawn, {} notifications", frame.notifications),
            Err(Error::DisplayBusFault) => warn!("OLED bus fault - frame dropped"),
            Err(e) => warn!("render cycle failed: {}", e),
        }

        let wake = cadence.next_deadline(Instant::now().as_micros());
        Timer::at(Instant::from_micros(wake)).await;
    }
}
