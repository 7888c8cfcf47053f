//! What the controller asks the display to show, and a text renderer for it.

use core::fmt::Write as _;

use embedded_graphics::mono_font::{ascii::FONT_8X13, MonoTextStyle};
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics::text::Text;
use heapless::String;

use crate::mode::MenuEntry;
use crate::settings::Scale;

/// Readout screen contents. Temperatures are Celsius; the renderer converts.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ReadoutView {
    pub current: Option<f32>,
    pub target: f32,
    pub scale: Scale,
    pub heater_on: bool,
}

/// Display collaborator. Called on every mode change and every readout tick.
pub trait Screen {
    fn show_readout(&mut self, view: &ReadoutView);
    fn show_menu(&mut self, selected: MenuEntry);
    fn show_target_editor(&mut self, target: f32, scale: Scale);
    fn show_scale_editor(&mut self, scale: Scale);
}

const LINE_Y: [i32; 4] = [12, 28, 44, 60];

type Line = String<24>;

fn draw_line<D>(target: &mut D, row: usize, text: &str) -> Result<(), D::Error>
where
    D: DrawTarget<Color = BinaryColor>,
{
    let style = MonoTextStyle::new(&FONT_8X13, BinaryColor::On);
    Text::new(text, Point::new(0, LINE_Y[row]), style).draw(target)?;
    Ok(())
}

pub fn draw_readout<D>(target: &mut D, view: &ReadoutView) -> Result<(), D::Error>
where
    D: DrawTarget<Color = BinaryColor>,
{
    let symbol = view.scale.symbol();
    let mut line = Line::new();

    match view.current {
        Some(c) => {
            let _ = write!(line, "Temp   {:.1} {}", view.scale.display(c), symbol);
        }
        None => {
            let _ = write!(line, "Temp   --.- {}", symbol);
        }
    }
    draw_line(target, 0, &line)?;

    line.clear();
    let _ = write!(line, "Target {:.0} {}", view.scale.display(view.target), symbol);
    draw_line(target, 1, &line)?;

    draw_line(target, 3, if view.heater_on { "Heater ON" } else { "Heater off" })
}

pub fn draw_menu<D>(target: &mut D, selected: MenuEntry) -> Result<(), D::Error>
where
    D: DrawTarget<Color = BinaryColor>,
{
    for entry in MenuEntry::ALL {
        let mut line = Line::new();
        let marker = if entry == selected { '>' } else { ' ' };
        let _ = write!(line, "{} {}", marker, entry.label());
        draw_line(target, entry.index(), &line)?;
    }
    Ok(())
}

pub fn draw_target_editor<D>(target: &mut D, setpoint: f32, scale: Scale) -> Result<(), D::Error>
where
    D: DrawTarget<Color = BinaryColor>,
{
    draw_line(target, 0, "Set target")?;
    let mut line = Line::new();
    let _ = write!(line, "  {:.0} {}", scale.display(setpoint), scale.symbol());
    draw_line(target, 1, &line)?;
    draw_line(target, 3, "+/- adjust")
}

pub fn draw_scale_editor<D>(target: &mut D, scale: Scale) -> Result<(), D::Error>
where
    D: DrawTarget<Color = BinaryColor>,
{
    draw_line(target, 0, "Set scale")?;
    let (c, f) = match scale {
        Scale::Celsius => ('>', ' '),
        Scale::Fahrenheit => (' ', '>'),
    };
    let mut line = Line::new();
    let _ = write!(line, "{} Celsius", c);
    draw_line(target, 1, &line)?;
    line.clear();
    let _ = write!(line, "{} Fahrenheit", f);
    draw_line(target, 2, &line)
}
