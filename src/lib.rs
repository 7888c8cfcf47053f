#![cfg_attr(not(test), no_std)]

pub(crate) mod fmt;

pub mod buttons;
pub mod control;
pub mod controller;
pub mod eeprom;
pub mod mode;
pub mod screen;
pub mod sensor;
pub mod serial;
pub mod settings;
pub mod sh1107;

pub const TERM_KP: f32 = 1.0; // Proportional term - error against the target
pub const TERM_KD: f32 = 1.25; // Derivative term - applied to the improvement since the previous reading
pub const TERM_KI: f32 = 0.75; // Integral term - applied to the sum of the error history
pub const DEAD_BAND: f32 = 0.01; // Control signal band inside which the heater keeps its last state
pub const HISTORY_LEN: usize = 3; // Number of error samples summed by the integral term

pub const DEFAULT_TARGET_C: f32 = 30.0; // Target used when storage is blank
pub const DEBOUNCE_MS: u64 = 250; // Shared lockout after any accepted button press
pub const TICK_INTERVAL_MS: u64 = 50; // Pause between scheduler ticks

pub const CONVERSION_POLL_MS: u32 = 10; // Read-slot poll interval while the sensor converts
pub const CONVERSION_TIMEOUT_MS: u32 = 750; // Worst case 12-bit conversion time

pub const SERIAL_BAUD: u32 = 9600;
pub const SERIAL_LINE_MAX: usize = 7; // Data characters accepted per command line

pub const TARGET_CELL: u8 = 0; // Storage offset of the target temperature byte
pub const SCALE_CELL: u8 = 1; // Storage offset of the scale flag byte
