use display_interface::{DataFormat, DisplayError, WriteOnlyDataCommand};
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;

use crate::fmt::warn;
use crate::mode::MenuEntry;
use crate::screen::{self, ReadoutView, Screen};
use crate::settings::Scale;

const WIDTH: u8 = 128;
const HEIGHT: u8 = 64;
const BUFFER_SIZE: usize = (WIDTH as usize * HEIGHT as usize) / 8;
const ROW_BYTES: usize = WIDTH as usize / 8;

/// SH1107 128x64 OLED with a local frame buffer, flushed row by row.
pub struct Sh1107<DI, RST> {
    di: DI,
    rst: RST,
    buffer: [u8; BUFFER_SIZE],
}

impl<DI, RST> Sh1107<DI, RST>
where
    DI: WriteOnlyDataCommand,
    RST: OutputPin,
{
    pub fn new(di: DI, rst: RST) -> Self {
        Self {
            di,
            rst,
            buffer: [0; BUFFER_SIZE],
        }
    }

    pub fn init<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), DisplayError> {
        self.reset(delay)?;
        self.off()?;
        self.send_commands(&[0x00])?; // Set lower column address
        self.send_commands(&[0x10])?; // Set higher column address
        self.send_commands(&[0xB0])?; // Set page address
        self.send_commands(&[0xDC, 0x00])?; // Set display start line
        self.send_commands(&[0x81, 0x6F])?; // Set contrast control
        self.send_commands(&[0x21])?; // Set memory addressing mode (0x20 = Horizontal / 0x21 = Vertical)
        self.send_commands(&[0xA0])?; // Set segment remap (0xA0 / 0xA1)
        self.send_commands(&[0xC0])?; // Set common output scan direction (0xC0 / 0xC8)
        self.send_commands(&[0xA4])?; // Set entire display on (0xA4 = false / 0xA5 = true)
        self.send_commands(&[0xA6])?; // Set normal or reverse display on (0xA6 = Normal / 0xA7 = Reverse)
        self.send_commands(&[0xA8, 0x3F])?; // Set multiplex ratio (Display height - 1)
        self.send_commands(&[0xD3, 0x60])?; // Set display offset
        self.send_commands(&[0xD5, 0x50])?; // Clock divide ratio / oscillator frequency mode
        self.send_commands(&[0xD9, 0x22])?; // Set discharge / precharge period
        self.send_commands(&[0xDB, 0x35])?; // Set VCOM deselect level
        self.send_commands(&[0xAD, 0x81])?; // Set DC-DC control mode (0x81 = On / 0x80 = Off)
        self.on()?;
        delay.delay_ms(10);
        Ok(())
    }

    fn reset<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), DisplayError> {
        self.rst.set_high().map_err(|_| DisplayError::RSError)?;
        delay.delay_ms(1);
        self.rst.set_low().map_err(|_| DisplayError::RSError)?;
        delay.delay_ms(10);
        self.rst.set_high().map_err(|_| DisplayError::RSError)?;
        Ok(())
    }

    pub fn off(&mut self) -> Result<(), DisplayError> {
        self.send_commands(&[0xAE]) // Display OFF
    }

    pub fn on(&mut self) -> Result<(), DisplayError> {
        self.send_commands(&[0xAF]) // Display ON
    }

    fn send_commands(&mut self, commands: &[u8]) -> Result<(), DisplayError> {
        self.di.send_commands(DataFormat::U8(commands))
    }

    /// Pushes the frame buffer to the panel.
    pub fn flush(&mut self) -> Result<(), DisplayError> {
        self.send_commands(&[0xB0])?; // Set page address
        for row in 0..HEIGHT {
            // Vertical addressing: each buffer row lands in one panel column
            let column = (HEIGHT - 1) - row;
            self.send_commands(&[column & 0x0f])?;
            self.send_commands(&[0x10 + (column >> 4)])?;
            let start = row as usize * ROW_BYTES;
            self.di
                .send_data(DataFormat::U8(&self.buffer[start..start + ROW_BYTES]))?;
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.buffer.fill(0x00);
    }

    pub fn buffer(&self) -> &[u8; BUFFER_SIZE] {
        &self.buffer
    }

    fn present(&mut self, draw: impl FnOnce(&mut Self) -> Result<(), DisplayError>) {
        self.clear();
        if draw(self).and_then(|_| self.flush()).is_err() {
            warn!("display update failed");
        }
    }
}

impl<DI, RST> DrawTarget for Sh1107<DI, RST>
where
    DI: WriteOnlyDataCommand,
    RST: OutputPin,
{
    type Color = BinaryColor;
    type Error = DisplayError;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(coord, colour) in pixels {
            let (x, y) = (coord.x, coord.y);
            if x >= 0 && x < WIDTH as i32 && y >= 0 && y < HEIGHT as i32 {
                let index = (y as usize * WIDTH as usize + x as usize) / 8;
                if colour == BinaryColor::On {
                    self.buffer[index] |= 1 << (x % 8);
                } else {
                    self.buffer[index] &= !(1 << (x % 8));
                }
            }
        }
        Ok(())
    }
}

impl<DI, RST> OriginDimensions for Sh1107<DI, RST> {
    fn size(&self) -> Size {
        Size::new(WIDTH as u32, HEIGHT as u32)
    }
}

impl<DI, RST> Screen for Sh1107<DI, RST>
where
    DI: WriteOnlyDataCommand,
    RST: OutputPin,
{
    fn show_readout(&mut self, view: &ReadoutView) {
        self.present(|d| screen::draw_readout(d, view));
    }

    fn show_menu(&mut self, selected: MenuEntry) {
        self.present(|d| screen::draw_menu(d, selected));
    }

    fn show_target_editor(&mut self, target: f32, scale: Scale) {
        self.present(|d| screen::draw_target_editor(d, target, scale));
    }

    fn show_scale_editor(&mut self, scale: Scale) {
        self.present(|d| screen::draw_scale_editor(d, scale));
    }
}
