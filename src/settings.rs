//! Setpoint, display scale, and their two byte cells in non-volatile storage.

use crate::fmt::{debug, info, warn};
use crate::{DEFAULT_TARGET_C, SCALE_CELL, TARGET_CELL};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Scale {
    #[default]
    Celsius,
    Fahrenheit,
}

impl Scale {
    /// Storage and serial representation: 0 Celsius, 1 Fahrenheit.
    pub fn flag(self) -> u8 {
        match self {
            Scale::Celsius => 0,
            Scale::Fahrenheit => 1,
        }
    }

    /// Any nonzero flag means Fahrenheit.
    pub fn from_flag(flag: u8) -> Self {
        if flag == 0 {
            Scale::Celsius
        } else {
            Scale::Fahrenheit
        }
    }

    /// Converts a Celsius value for display in this scale.
    pub fn display(self, celsius: f32) -> f32 {
        match self {
            Scale::Celsius => celsius,
            Scale::Fahrenheit => to_fahrenheit(celsius),
        }
    }

    pub fn symbol(self) -> char {
        match self {
            Scale::Celsius => 'C',
            Scale::Fahrenheit => 'F',
        }
    }
}

pub fn to_fahrenheit(celsius: f32) -> f32 {
    celsius * 9.0 / 5.0 + 32.0
}

pub fn to_celsius(fahrenheit: f32) -> f32 {
    (fahrenheit - 32.0) * 5.0 / 9.0
}

/// Celsius increment for one button step: one whole degree in the displayed scale.
pub fn target_step(scale: Scale) -> f32 {
    match scale {
        Scale::Celsius => 1.0,
        Scale::Fahrenheit => 5.0 / 9.0,
    }
}

/// Operator setpoint. The target is always Celsius, whatever the display scale.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Setpoint {
    pub target: f32,
    pub scale: Scale,
}

impl Default for Setpoint {
    fn default() -> Self {
        Self {
            target: DEFAULT_TARGET_C,
            scale: Scale::Celsius,
        }
    }
}

impl Setpoint {
    pub fn raise(&mut self) {
        self.target += target_step(self.scale);
    }

    pub fn lower(&mut self) {
        self.target -= target_step(self.scale);
    }
}

/// Blank storage: the target cell reads zero (or erased `0xFF`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Uninitialized;

/// Interprets the raw target and scale cells.
pub fn decode_cells(target: u8, scale: u8) -> Result<Setpoint, Uninitialized> {
    match target {
        0x00 | 0xFF => Err(Uninitialized),
        t => Ok(Setpoint {
            target: t as f32,
            scale: Scale::from_flag(scale),
        }),
    }
}

/// Whole degrees kept in the target cell; the fraction is dropped and
/// values outside a byte wrap.
pub fn encode_target(target: f32) -> u8 {
    let whole = target as i32;
    if !(1..=254).contains(&whole) {
        warn!("target {} does not fit the cell, stored as {=u8}", target, whole as u8);
    }
    whole as u8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StorageError {
    Bus,
    Timeout,
    OutOfRange,
}

/// Byte-addressed non-volatile cells.
pub trait CellStorage {
    fn read_cell(&mut self, offset: u8) -> Result<u8, StorageError>;
    fn write_cell(&mut self, offset: u8, value: u8) -> Result<(), StorageError>;
}

impl<T: CellStorage + ?Sized> CellStorage for &mut T {
    fn read_cell(&mut self, offset: u8) -> Result<u8, StorageError> {
        (**self).read_cell(offset)
    }

    fn write_cell(&mut self, offset: u8, value: u8) -> Result<(), StorageError> {
        (**self).write_cell(offset, value)
    }
}

pub struct SettingsStore<S> {
    cells: S,
}

impl<S: CellStorage> SettingsStore<S> {
    pub fn new(cells: S) -> Self {
        Self { cells }
    }

    /// Reads the setpoint, substituting the defaults for blank or unreadable storage.
    pub fn load_settings(&mut self) -> Setpoint {
        let (target, scale) = match self.read_raw() {
            Ok(raw) => raw,
            Err(e) => {
                warn!("settings read failed: {}", e);
                return Setpoint::default();
            }
        };

        match decode_cells(target, scale) {
            Ok(setpoint) => {
                info!("loaded target {} scale {}", setpoint.target, setpoint.scale);
                setpoint
            }
            Err(Uninitialized) => {
                info!("settings blank, using defaults");
                Setpoint::default()
            }
        }
    }

    fn read_raw(&mut self) -> Result<(u8, u8), StorageError> {
        let target = self.cells.read_cell(TARGET_CELL)?;
        let scale = self.cells.read_cell(SCALE_CELL)?;
        Ok((target, scale))
    }

    pub fn save_target(&mut self, target: f32) {
        let cell = encode_target(target);
        debug!("saving target {} as {=u8}", target, cell);
        if let Err(e) = self.cells.write_cell(TARGET_CELL, cell) {
            warn!("saving target failed: {}", e);
        }
    }

    pub fn save_scale(&mut self, scale: Scale) {
        debug!("saving scale {}", scale);
        if let Err(e) = self.cells.write_cell(SCALE_CELL, scale.flag()) {
            warn!("saving scale failed: {}", e);
        }
    }

    pub fn save(&mut self, setpoint: &Setpoint) {
        self.save_target(setpoint.target);
        self.save_scale(setpoint.scale);
    }

    pub fn cells(&mut self) -> &mut S {
        &mut self.cells
    }
}
