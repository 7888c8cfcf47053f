//! Line protocol on the serial port.
//!
//! Input, one command per line: `F`, `C`, or a Celsius target such as `21.5`.
//! Output, one status line per tick: `"<temp> \n"`, or `"<temp> <flag>\n"` on
//! the tick a button changed the scale.

use embedded_io::{Read, ReadReady, Write};
use heapless::{String, Vec};

use crate::fmt::{debug, warn};
use crate::settings::Scale;
use crate::SERIAL_LINE_MAX;

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    Scale(Scale),
    Target(f32),
}

/// The line is not `F`, `C`, or a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MalformedInput;

pub fn parse_number(text: &[u8]) -> Result<f32, MalformedInput> {
    core::str::from_utf8(text)
        .map_err(|_| MalformedInput)?
        .trim()
        .parse::<f32>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or(MalformedInput)
}

impl Command {
    /// Decodes one line. Anything that is neither a scale letter nor a number
    /// becomes a target of zero.
    pub fn parse(line: &[u8]) -> Self {
        match line.first() {
            Some(b'F') => Command::Scale(Scale::Fahrenheit),
            Some(b'C') => Command::Scale(Scale::Celsius),
            _ => Command::Target(parse_number(line).unwrap_or_else(|MalformedInput| {
                debug!("malformed line {=[u8]:a}, using 0", line);
                0.0
            })),
        }
    }
}

pub type Line = Vec<u8, SERIAL_LINE_MAX>;

/// Collects bytes into lines across ticks.
///
/// A line ends at `\n`; a trailing `\r` is dropped. Characters past
/// [`SERIAL_LINE_MAX`] are discarded until the newline arrives.
#[derive(Debug, Default)]
pub struct LineBuffer {
    line: Line,
    overflowed: bool,
}

impl LineBuffer {
    pub const fn new() -> Self {
        Self {
            line: Vec::new(),
            overflowed: false,
        }
    }

    pub fn push(&mut self, byte: u8) -> Option<Line> {
        match byte {
            b'\n' => {
                if self.overflowed {
                    warn!("serial line longer than {} chars, truncated", SERIAL_LINE_MAX);
                    self.overflowed = false;
                }
                let mut line = core::mem::take(&mut self.line);
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                Some(line)
            }
            _ => {
                if self.line.push(byte).is_err() {
                    self.overflowed = true;
                }
                None
            }
        }
    }
}

/// Status report in the form the desktop monitor reads.
///
/// The firmware fills `temperature` and sometimes `scale`; `target` is only
/// ever present in lines produced by other senders.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StatusLine {
    pub temperature: f32,
    pub scale: Option<Scale>,
    pub target: Option<f32>,
}

impl StatusLine {
    pub fn new(temperature: f32, scale: Option<Scale>) -> Self {
        Self {
            temperature,
            scale,
            target: None,
        }
    }

    pub fn write<W: core::fmt::Write>(&self, out: &mut W) -> core::fmt::Result {
        write!(out, "{:.2} ", self.temperature)?;
        if let Some(scale) = self.scale {
            write!(out, "{}", scale.flag())?;
            if let Some(target) = self.target {
                write!(out, " {:.2}", target)?;
            }
        }
        out.write_char('\n')
    }

    /// Accepts `temp`, `temp flag`, or `temp flag target`.
    pub fn parse(line: &str) -> Option<Self> {
        let mut fields = line.split_whitespace();
        let temperature = fields.next()?.parse::<f32>().ok()?;
        let scale = match fields.next() {
            Some(flag) => Some(Scale::from_flag(flag.parse::<u8>().ok()?)),
            None => None,
        };
        let target = match fields.next() {
            Some(target) => Some(target.parse::<f32>().ok()?),
            None => None,
        };
        if fields.next().is_some() {
            return None;
        }
        Some(Self {
            temperature,
            scale,
            target,
        })
    }
}

/// Serial port carrying the line protocol.
pub struct SerialLink<P> {
    port: P,
    line: LineBuffer,
}

impl<P: Read + ReadReady + Write> SerialLink<P> {
    pub fn new(port: P) -> Self {
        Self {
            port,
            line: LineBuffer::new(),
        }
    }

    /// Reads whatever is buffered, up to the end of the first complete line.
    pub fn poll_command(&mut self) -> Option<Command> {
        loop {
            match self.port.read_ready() {
                Ok(true) => {}
                Ok(false) => return None,
                Err(_) => {
                    warn!("serial read_ready failed");
                    return None;
                }
            }

            let mut byte = [0u8; 1];
            match self.port.read(&mut byte) {
                Ok(1) => {}
                Ok(_) => return None,
                Err(_) => {
                    warn!("serial read failed");
                    return None;
                }
            }

            if let Some(line) = self.line.push(byte[0]) {
                return Some(Command::parse(&line));
            }
        }
    }

    pub fn send_status(&mut self, status: &StatusLine) {
        let mut text: String<32> = String::new();
        if status.write(&mut text).is_err() {
            warn!("status line too long");
            return;
        }
        if self.port.write_all(text.as_bytes()).is_err() {
            warn!("serial write failed");
        }
    }

    pub fn port(&mut self) -> &mut P {
        &mut self.port
    }
}
