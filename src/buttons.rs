//! Button sampling and the shared press lockout.
//!
//! Buttons are active-high and level-sampled once per tick. Holding a
//! button therefore repeats it once per debounce window.

use embassy_time::{Duration, Instant};
use embedded_hal::digital::InputPin;

use crate::DEBOUNCE_MS;

/// Raw levels seen on one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ButtonLevels {
    pub primary: bool,
    pub increment: bool,
    pub decrement: bool,
}

impl ButtonLevels {
    pub const NONE: Self = Self {
        primary: false,
        increment: false,
        decrement: false,
    };
    pub const PRIMARY: Self = Self {
        primary: true,
        increment: false,
        decrement: false,
    };
    pub const INCREMENT: Self = Self {
        primary: false,
        increment: true,
        decrement: false,
    };
    pub const DECREMENT: Self = Self {
        primary: false,
        increment: false,
        decrement: true,
    };
}

/// The three input pins. A pin that fails to read counts as released.
pub struct Buttons<P, I, D> {
    primary: P,
    increment: I,
    decrement: D,
}

impl<P: InputPin, I: InputPin, D: InputPin> Buttons<P, I, D> {
    pub fn new(primary: P, increment: I, decrement: D) -> Self {
        Self {
            primary,
            increment,
            decrement,
        }
    }

    pub fn sample(&mut self) -> ButtonLevels {
        ButtonLevels {
            primary: self.primary.is_high().unwrap_or(false),
            increment: self.increment.is_high().unwrap_or(false),
            decrement: self.decrement.is_high().unwrap_or(false),
        }
    }
}

/// One lockout window shared by every button.
pub struct Debouncer {
    window: Duration,
    last_accepted: Option<Instant>,
}

impl Debouncer {
    pub const fn new() -> Self {
        Self::with_window(Duration::from_millis(DEBOUNCE_MS))
    }

    pub const fn with_window(window: Duration) -> Self {
        Self {
            window,
            last_accepted: None,
        }
    }

    /// Accepts a pressed level if the window since the last accepted press
    /// (of any button) has run out, and restarts the window.
    pub fn accept(&mut self, pressed: bool, now: Instant) -> bool {
        if !pressed {
            return false;
        }
        if let Some(last) = self.last_accepted {
            if now.saturating_duration_since(last) < self.window {
                return false;
            }
        }
        self.last_accepted = Some(now);
        true
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new()
    }
}
