//! Error-correcting heater control with a dead band.

use crate::fmt::trace;
use crate::{DEAD_BAND, HISTORY_LEN, TERM_KD, TERM_KI, TERM_KP};

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Gains {
    pub kp: f32,
    pub kd: f32,
    pub ki: f32,
}

impl Default for Gains {
    fn default() -> Self {
        Self {
            kp: TERM_KP,
            kd: TERM_KD,
            ki: TERM_KI,
        }
    }
}

/// Fixed ring of the most recent `target - current` samples.
///
/// The write slot is a run counter modulo the capacity, so the counter
/// advances once per push whether or not the slot held a sample before.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorHistory {
    samples: [f32; HISTORY_LEN],
    run: usize,
}

impl ErrorHistory {
    pub const fn new() -> Self {
        Self {
            samples: [0.0; HISTORY_LEN],
            run: 0,
        }
    }

    pub fn push(&mut self, error: f32) {
        self.samples[self.run] = error;
        self.run = (self.run + 1) % HISTORY_LEN;
    }

    pub fn sum(&self) -> f32 {
        self.samples.iter().sum()
    }

    pub fn samples(&self) -> &[f32; HISTORY_LEN] {
        &self.samples
    }
}

impl Default for ErrorHistory {
    fn default() -> Self {
        Self::new()
    }
}

/// Linear combination of the three terms.
pub fn control_signal(gains: &Gains, proportional: f32, derivative: f32, integral: f32) -> f32 {
    gains.kp * proportional + gains.kd * derivative + gains.ki * integral
}

/// Heater command for a control signal. Inside the dead band the previous level holds.
pub fn heater_command(signal: f32, previous: bool) -> bool {
    if signal > DEAD_BAND {
        true
    } else if signal < -DEAD_BAND {
        false
    } else {
        previous
    }
}

/// Everything one control step produced.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControlOutput {
    pub proportional: f32,
    pub derivative: f32,
    pub integral: f32,
    pub signal: f32,
    pub heater_on: bool,
}

#[derive(Debug, Clone)]
pub struct ControlLoop {
    gains: Gains,
    history: ErrorHistory,
    previous_reading: f32,
    heater_on: bool,
}

impl ControlLoop {
    pub fn new(gains: Gains) -> Self {
        Self {
            gains,
            history: ErrorHistory::new(),
            previous_reading: 0.0,
            heater_on: false,
        }
    }

    /// Feeds one successful reading through the loop and returns the new heater level.
    pub fn step(&mut self, target: f32, current: f32) -> ControlOutput {
        let proportional = target - current;
        // Positive when the temperature moved down since the last reading
        let derivative = self.previous_reading - current;
        self.previous_reading = current;

        self.history.push(proportional);
        let integral = self.history.sum();

        let signal = control_signal(&self.gains, proportional, derivative, integral);
        self.heater_on = heater_command(signal, self.heater_on);

        trace!(
            "p={} d={} i={} -> {} heater={}",
            proportional,
            derivative,
            integral,
            signal,
            self.heater_on
        );

        ControlOutput {
            proportional,
            derivative,
            integral,
            signal,
            heater_on: self.heater_on,
        }
    }

    pub fn heater_on(&self) -> bool {
        self.heater_on
    }

    pub fn history(&self) -> &ErrorHistory {
        &self.history
    }
}

impl Default for ControlLoop {
    fn default() -> Self {
        Self::new(Gains::default())
    }
}
