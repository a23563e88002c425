//! SSD1306 OLED display wrapper.

use bridgemon::config::OLED_ADDRESS;
use bridgemon::render::{Alignment, DisplayDriver};
use bridgemon::Error;
use embedded_graphics::mono_font::ascii::FONT_6X10;
use embedded_graphics::mono_font::{MonoTextStyle, MonoTextStyleBuilder};
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics::text::{Alignment as TextAlignment, Baseline, Text, TextStyleBuilder};
use ssd1306::mode::BufferedGraphicsMode;
use ssd1306::prelude::*;
use ssd1306::I2CDisplayInterface;
use ssd1306::Ssd1306;

/// Type alias for the concrete display driver.
///
/// Generic over the I²C implementation so callers pass in their HAL's
/// I²C peripheral.
pub type Display<I2C> =
    Ssd1306<I2CInterface<I2C>, DisplaySize128x64, BufferedGraphicsMode<DisplaySize128x64>>;

/// 128×64 panel drawn through a RAM frame buffer; nothing reaches the
/// glass until [`DisplayDriver::display`].
pub struct Oled<I2C> {
    display: Display<I2C>,
}

impl<I2C> Oled<I2C>
where
    I2C: embedded_hal::i2c::I2c,
{
    pub fn new(i2c: I2C) -> Self {
        let interface = I2CDisplayInterface::new_custom_address(i2c, OLED_ADDRESS);
        let display = Ssd1306::new(interface, DisplaySize128x64, DisplayRotation::Rotate0)
            .into_buffered_graphics_mode();
        Self { display }
    }
}

fn character_style() -> MonoTextStyle<'static, BinaryColor> {
    MonoTextStyleBuilder::new()
        .font(&FONT_6X10)
        .text_color(BinaryColor::On)
        .build()
}

impl<I2C> DisplayDriver for Oled<I2C>
where
    I2C: embedded_hal::i2c::I2c,
{
    type Error = Error;

    fn init(&mut self) -> Result<(), Error> {
        self.display
            .init()
            .map_err(|_| Error::HardwareInitFailure)?;
        self.display.clear_buffer();
        self.display.flush().map_err(|_| Error::HardwareInitFailure)
    }

    fn clear(&mut self) -> Result<(), Error> {
        self.display.clear_buffer();
        Ok(())
    }

    fn draw_string(
        &mut self,
        x: i32,
        y: i32,
        text: &str,
        alignment: Alignment,
    ) -> Result<(), Error> {
        // Anchor is the top of the glyph box; x is the left edge, centre or
        // right edge depending on alignment.
        let text_style = TextStyleBuilder::new()
            .baseline(Baseline::Top)
            .alignment(match alignment {
                Alignment::Left => TextAlignment::Left,
                Alignment::Center => TextAlignment::Center,
                Alignment::Right => TextAlignment::Right,
            })
            .build();

        Text::with_text_style(text, Point::new(x, y), character_style(), text_style)
            .draw(&mut self.display)
            .map(|_| ())
            .map_err(|_| Error::DisplayBusFault)
    }

    fn display(&mut self) -> Result<(), Error> {
        self.display.flush().map_err(|_| Error::DisplayBusFault)
    }
}
