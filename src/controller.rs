//! The per-tick scheduler and the state it owns.
//!
//! One tick: dispatch the primary button (mode change, persisting on editor
//! exit), run the active mode's handler, apply at most one serial command,
//! then emit the status line.

use embassy_time::Instant;
use embedded_hal::digital::{OutputPin, PinState};
use embedded_io::{Read, ReadReady, Write};

use crate::buttons::{ButtonLevels, Debouncer};
use crate::control::{ControlLoop, ControlOutput};
use crate::fmt::{debug, info, warn};
use crate::mode::{Effect, Mode};
use crate::screen::{ReadoutView, Screen};
use crate::sensor::{ScratchpadBus, Sensor, SensorError};
use crate::serial::{Command, SerialLink, StatusLine};
use crate::settings::{CellStorage, Scale, SettingsStore, Setpoint};

/// Every device the controller drives.
pub struct Hardware<B, S, H, D, P> {
    pub sensor: Sensor<B>,
    pub store: SettingsStore<S>,
    pub heater: H,
    pub screen: D,
    pub serial: SerialLink<P>,
}

/// What happened during one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TickReport {
    pub mode: Mode,
    pub transitioned: bool,
    /// Only set on readout ticks.
    pub reading: Option<Result<f32, SensorError>>,
    pub control: Option<ControlOutput>,
    pub command: Option<Command>,
    pub status: StatusLine,
}

/// Adjustment button accepted on this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Adjust {
    Up,
    Down,
}

pub struct Controller {
    mode: Mode,
    setpoint: Setpoint,
    control: ControlLoop,
    debounce: Debouncer,
    current: Option<f32>,
    scale_echo: bool,
}

impl Controller {
    pub fn new(setpoint: Setpoint) -> Self {
        Self {
            mode: Mode::Readout,
            setpoint,
            control: ControlLoop::default(),
            debounce: Debouncer::new(),
            current: None,
            scale_echo: false,
        }
    }

    /// Restores the setpoint from storage and forces the heater off.
    pub fn boot<B, S, H, D, P>(hw: &mut Hardware<B, S, H, D, P>) -> Self
    where
        S: CellStorage,
        H: OutputPin,
    {
        let setpoint = hw.store.load_settings();
        if hw.heater.set_low().is_err() {
            warn!("heater pin write failed");
        }
        info!("boot: target {} scale {}", setpoint.target, setpoint.scale);
        Self::new(setpoint)
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn setpoint(&self) -> &Setpoint {
        &self.setpoint
    }

    /// Last good temperature in °C.
    pub fn current(&self) -> Option<f32> {
        self.current
    }

    pub fn heater_on(&self) -> bool {
        self.control.heater_on()
    }

    pub fn tick<B, S, H, D, P>(
        &mut self,
        hw: &mut Hardware<B, S, H, D, P>,
        buttons: ButtonLevels,
        now: Instant,
    ) -> TickReport
    where
        B: ScratchpadBus,
        S: CellStorage,
        H: OutputPin,
        D: Screen,
        P: Read + ReadReady + Write,
    {
        let transitioned = self.debounce.accept(buttons.primary, now);
        if transitioned {
            self.on_primary(hw);
        }

        let adjust = if self.debounce.accept(buttons.increment, now) {
            Some(Adjust::Up)
        } else if self.debounce.accept(buttons.decrement, now) {
            Some(Adjust::Down)
        } else {
            None
        };

        let mut reading = None;
        let mut control = None;
        match self.mode {
            Mode::Readout => {
                let result = self.readout(hw, adjust);
                reading = Some(result.map(|(current, _)| current));
                control = result.ok().map(|(_, output)| output);
            }
            Mode::Menu(_) => self.menu(hw, adjust),
            Mode::SetTarget => self.set_target(hw, adjust),
            Mode::SetScale => self.set_scale(hw, adjust),
        }

        let command = hw.serial.poll_command();
        if let Some(command) = command {
            self.apply(hw, command);
        }

        let echo = if self.scale_echo {
            Some(self.setpoint.scale)
        } else {
            None
        };
        self.scale_echo = false;
        let status = StatusLine::new(self.current.unwrap_or(0.0), echo);
        hw.serial.send_status(&status);

        TickReport {
            mode: self.mode,
            transitioned,
            reading,
            control,
            command,
            status,
        }
    }

    fn on_primary<B, S, H, D, P>(&mut self, hw: &mut Hardware<B, S, H, D, P>)
    where
        S: CellStorage,
        D: Screen,
    {
        let (next, effect) = self.mode.on_primary();
        match effect {
            Effect::None => {}
            Effect::PersistTarget => hw.store.save_target(self.setpoint.target),
            Effect::PersistScale => hw.store.save_scale(self.setpoint.scale),
        }
        info!("mode {} -> {}", self.mode, next);
        self.mode = next;

        match next {
            Mode::Readout => {}
            Mode::Menu(selected) => hw.screen.show_menu(selected),
            Mode::SetTarget => hw
                .screen
                .show_target_editor(self.setpoint.target, self.setpoint.scale),
            Mode::SetScale => hw.screen.show_scale_editor(self.setpoint.scale),
        }
    }

    /// Adjusts and persists the target, then reads the sensor and drives the heater.
    fn readout<B, S, H, D, P>(
        &mut self,
        hw: &mut Hardware<B, S, H, D, P>,
        adjust: Option<Adjust>,
    ) -> Result<(f32, ControlOutput), SensorError>
    where
        B: ScratchpadBus,
        S: CellStorage,
        H: OutputPin,
        D: Screen,
    {
        if let Some(adjust) = adjust {
            self.adjust_target(adjust);
            hw.store.save_target(self.setpoint.target);
        }

        let result = hw.sensor.decode().map(|reading| {
            let current = reading.celsius();
            self.current = Some(current);
            let output = self.control.step(self.setpoint.target, current);
            if hw
                .heater
                .set_state(PinState::from(output.heater_on))
                .is_err()
            {
                warn!("heater pin write failed");
            }
            (current, output)
        });

        if let Err(e) = result {
            warn!("no reading this tick: {}", e);
        }

        hw.screen.show_readout(&ReadoutView {
            current: self.current,
            target: self.setpoint.target,
            scale: self.setpoint.scale,
            heater_on: self.control.heater_on(),
        });

        result
    }

    fn menu<B, S, H, D, P>(&mut self, hw: &mut Hardware<B, S, H, D, P>, adjust: Option<Adjust>)
    where
        D: Screen,
    {
        let Mode::Menu(selected) = self.mode else {
            return;
        };
        let selected = match adjust {
            Some(Adjust::Up) => selected.next(),
            Some(Adjust::Down) => selected.previous(),
            None => return,
        };
        self.mode = Mode::Menu(selected);
        hw.screen.show_menu(selected);
    }

    /// Edits the target in memory; it is persisted when the editor is left.
    fn set_target<B, S, H, D, P>(
        &mut self,
        hw: &mut Hardware<B, S, H, D, P>,
        adjust: Option<Adjust>,
    ) where
        D: Screen,
    {
        if let Some(adjust) = adjust {
            self.adjust_target(adjust);
            hw.screen
                .show_target_editor(self.setpoint.target, self.setpoint.scale);
        }
    }

    /// Sets the scale and persists it on every press.
    fn set_scale<B, S, H, D, P>(&mut self, hw: &mut Hardware<B, S, H, D, P>, adjust: Option<Adjust>)
    where
        S: CellStorage,
        D: Screen,
    {
        let scale = match adjust {
            Some(Adjust::Up) => Scale::Fahrenheit,
            Some(Adjust::Down) => Scale::Celsius,
            None => return,
        };
        self.setpoint.scale = scale;
        hw.store.save_scale(scale);
        self.scale_echo = true;
        hw.screen.show_scale_editor(scale);
    }

    fn adjust_target(&mut self, adjust: Adjust) {
        match adjust {
            Adjust::Up => self.setpoint.raise(),
            Adjust::Down => self.setpoint.lower(),
        }
        debug!("target now {}", self.setpoint.target);
    }

    fn apply<B, S, H, D, P>(&mut self, hw: &mut Hardware<B, S, H, D, P>, command: Command)
    where
        S: CellStorage,
    {
        match command {
            Command::Scale(scale) => self.setpoint.scale = scale,
            Command::Target(target) => self.setpoint.target = target,
        }
        info!("serial set {}", command);
        hw.store.save(&self.setpoint);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mode::MenuEntry;
    use crate::sensor::{crc8, Scratchpad};
    use crate::serial::test::FakePort;
    use crate::settings::test::MemoryCells;
    use crate::{SCALE_CELL, TARGET_CELL};
    use core::convert::Infallible;
    use one_wire_bus::Address;

    #[derive(Default)]
    struct FakeBus {
        scratchpad: Option<Scratchpad>,
    }

    impl FakeBus {
        fn set_raw(&mut self, raw: i16) {
            let [lo, hi] = raw.to_le_bytes();
            let mut data = [lo, hi, 0x4B, 0x46, 0x7F, 0xFF, 0x0C, 0x10, 0];
            data[8] = crc8(&data[..8]);
            self.scratchpad = Some(data);
        }
    }

    impl ScratchpadBus for FakeBus {
        type Error = Infallible;

        fn search(&mut self) -> Result<Option<Address>, Infallible> {
            Ok(self.scratchpad.map(|_| Address(0x28)))
        }

        fn start_conversion(&mut self, _: &Address) -> Result<(), Infallible> {
            Ok(())
        }

        fn wait_conversion(&mut self) -> Result<bool, Infallible> {
            Ok(true)
        }

        fn read_scratchpad(&mut self, _: &Address) -> Result<Scratchpad, Infallible> {
            Ok(self.scratchpad.unwrap_or_default())
        }
    }

    #[derive(Default)]
    struct Heater {
        on: bool,
    }

    impl embedded_hal::digital::ErrorType for Heater {
        type Error = Infallible;
    }

    impl OutputPin for Heater {
        fn set_low(&mut self) -> Result<(), Infallible> {
            self.on = false;
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            self.on = true;
            Ok(())
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Shown {
        Readout(ReadoutView),
        Menu(MenuEntry),
        TargetEditor(f32),
        ScaleEditor(Scale),
    }

    #[derive(Default)]
    struct Panel {
        shown: std::vec::Vec<Shown>,
    }

    impl Screen for Panel {
        fn show_readout(&mut self, view: &ReadoutView) {
            self.shown.push(Shown::Readout(*view));
        }

        fn show_menu(&mut self, selected: MenuEntry) {
            self.shown.push(Shown::Menu(selected));
        }

        fn show_target_editor(&mut self, target: f32, _scale: Scale) {
            self.shown.push(Shown::TargetEditor(target));
        }

        fn show_scale_editor(&mut self, scale: Scale) {
            self.shown.push(Shown::ScaleEditor(scale));
        }
    }

    type Rig = Hardware<FakeBus, MemoryCells, Heater, Panel, FakePort>;

    fn rig() -> Rig {
        Hardware {
            sensor: Sensor::new(FakeBus::default()),
            store: SettingsStore::new(MemoryCells::default()),
            heater: Heater::default(),
            screen: Panel::default(),
            serial: SerialLink::new(FakePort::default()),
        }
    }

    fn cell(hw: &mut Rig, offset: u8) -> u8 {
        hw.store.cells().cells[offset as usize]
    }

    struct Clock(u64);

    impl Clock {
        /// Advances past the debounce window.
        fn later(&mut self) -> Instant {
            self.0 += 300;
            Instant::from_millis(self.0)
        }

        fn plus(&mut self, ms: u64) -> Instant {
            self.0 += ms;
            Instant::from_millis(self.0)
        }
    }

    #[test]
    fn blank_storage_boots_with_defaults() {
        let mut hw = rig();
        let controller = Controller::boot(&mut hw);
        assert_eq!(controller.setpoint().target, 30.0);
        assert_eq!(controller.setpoint().scale, Scale::Celsius);
        assert_eq!(controller.mode(), Mode::Readout);
    }

    #[test]
    fn stored_settings_are_restored() {
        let mut hw = rig();
        hw.store.cells().cells[TARGET_CELL as usize] = 42;
        hw.store.cells().cells[SCALE_CELL as usize] = 1;
        let controller = Controller::boot(&mut hw);
        assert_eq!(controller.setpoint().target, 42.0);
        assert_eq!(controller.setpoint().scale, Scale::Fahrenheit);
    }

    #[test]
    fn presses_inside_debounce_window_transition_once() {
        let mut hw = rig();
        let mut c = Controller::boot(&mut hw);
        let mut clock = Clock(0);

        let first = c.tick(&mut hw, ButtonLevels::PRIMARY, clock.later());
        let second = c.tick(&mut hw, ButtonLevels::PRIMARY, clock.plus(100));
        assert!(first.transitioned);
        assert!(!second.transitioned);
        assert_eq!(c.mode(), Mode::Menu(MenuEntry::Scale));

        // Window restarts from the accepted press, not the rejected one
        let third = c.tick(&mut hw, ButtonLevels::PRIMARY, clock.plus(150));
        assert!(third.transitioned);
        assert_eq!(c.mode(), Mode::SetScale);
    }

    #[test]
    fn target_editor_persists_on_exit_only() {
        let mut hw = rig();
        let mut c = Controller::boot(&mut hw);
        let mut clock = Clock(0);

        c.tick(&mut hw, ButtonLevels::PRIMARY, clock.later());
        c.tick(&mut hw, ButtonLevels::INCREMENT, clock.later());
        assert_eq!(c.mode(), Mode::Menu(MenuEntry::Target));
        c.tick(&mut hw, ButtonLevels::PRIMARY, clock.later());
        assert_eq!(c.mode(), Mode::SetTarget);

        c.tick(&mut hw, ButtonLevels::INCREMENT, clock.later());
        c.tick(&mut hw, ButtonLevels::INCREMENT, clock.later());
        c.tick(&mut hw, ButtonLevels::DECREMENT, clock.later());
        assert_eq!(c.setpoint().target, 31.0);
        assert_eq!(hw.store.cells().writes, 0);

        c.tick(&mut hw, ButtonLevels::PRIMARY, clock.later());
        assert_eq!(c.mode(), Mode::Menu(MenuEntry::Target));
        assert_eq!(cell(&mut hw, TARGET_CELL), 31);
        assert_eq!(hw.store.cells().writes, 1);

        assert_eq!(
            hw.screen.shown,
            [
                Shown::Menu(MenuEntry::Scale),
                Shown::Menu(MenuEntry::Target),
                Shown::TargetEditor(30.0),
                Shown::TargetEditor(31.0),
                Shown::TargetEditor(32.0),
                Shown::TargetEditor(31.0),
                Shown::Menu(MenuEntry::Target),
            ]
        );
    }

    #[test]
    fn scale_editor_persists_and_echoes_each_press() {
        let mut hw = rig();
        let mut c = Controller::boot(&mut hw);
        let mut clock = Clock(0);

        c.tick(&mut hw, ButtonLevels::PRIMARY, clock.later());
        c.tick(&mut hw, ButtonLevels::PRIMARY, clock.later());
        assert_eq!(c.mode(), Mode::SetScale);
        hw.serial.port().take_output();

        let report = c.tick(&mut hw, ButtonLevels::INCREMENT, clock.later());
        assert_eq!(report.status.scale, Some(Scale::Fahrenheit));
        assert_eq!(cell(&mut hw, SCALE_CELL), 1);
        assert_eq!(hw.serial.port().take_output(), "0.00 1\n");

        c.tick(&mut hw, ButtonLevels::NONE, clock.later());
        assert_eq!(hw.serial.port().take_output(), "0.00 \n");

        c.tick(&mut hw, ButtonLevels::DECREMENT, clock.later());
        assert_eq!(cell(&mut hw, SCALE_CELL), 0);
        assert_eq!(hw.serial.port().take_output(), "0.00 0\n");

        c.tick(&mut hw, ButtonLevels::PRIMARY, clock.later());
        assert_eq!(c.mode(), Mode::Menu(MenuEntry::Scale));
    }

    #[test]
    fn menu_exit_returns_to_readout() {
        let mut hw = rig();
        let mut c = Controller::boot(&mut hw);
        let mut clock = Clock(0);

        c.tick(&mut hw, ButtonLevels::PRIMARY, clock.later());
        for _ in 0..4 {
            c.tick(&mut hw, ButtonLevels::INCREMENT, clock.later());
        }
        assert_eq!(c.mode(), Mode::Menu(MenuEntry::Exit));
        c.tick(&mut hw, ButtonLevels::PRIMARY, clock.later());
        assert_eq!(c.mode(), Mode::Readout);
        // Menu navigation never touches the setpoint
        assert_eq!(c.setpoint().target, 30.0);
    }

    #[test]
    fn readout_buttons_persist_immediately() {
        let mut hw = rig();
        let mut c = Controller::boot(&mut hw);
        let mut clock = Clock(0);

        c.tick(&mut hw, ButtonLevels::DECREMENT, clock.later());
        assert_eq!(c.setpoint().target, 29.0);
        assert_eq!(cell(&mut hw, TARGET_CELL), 29);

        // Held button repeats once per window
        c.tick(&mut hw, ButtonLevels::INCREMENT, clock.plus(10));
        assert_eq!(c.setpoint().target, 29.0);
        c.tick(&mut hw, ButtonLevels::INCREMENT, clock.later());
        assert_eq!(c.setpoint().target, 30.0);
    }

    #[test]
    fn readout_drives_heater_from_reading() {
        let mut hw = rig();
        let mut c = Controller::boot(&mut hw);
        let mut clock = Clock(0);

        // 25.0625 C, well below the 30 C default. The first step sees the
        // whole reading as a drop from zero, so the heater comes on from the second.
        hw.sensor.bus().set_raw(0x0191);
        let first = c.tick(&mut hw, ButtonLevels::NONE, clock.later());
        assert!(!first.control.unwrap().heater_on);
        hw.serial.port().take_output();

        let report = c.tick(&mut hw, ButtonLevels::NONE, clock.later());
        let current = report.reading.unwrap().unwrap();
        assert!((current - 25.06).abs() < 1e-4);
        assert!(report.control.unwrap().heater_on);
        assert!(hw.heater.on);
        assert_eq!(hw.serial.port().take_output(), "25.06 \n");

        // 40 C: overshoot
        hw.sensor.bus().set_raw(40 * 16);
        c.tick(&mut hw, ButtonLevels::NONE, clock.later());
        assert!(!hw.heater.on);
        assert_eq!(hw.serial.port().take_output(), "40.00 \n");
    }

    #[test]
    fn missing_sensor_holds_heater_and_last_reading() {
        let mut hw = rig();
        let mut c = Controller::boot(&mut hw);
        let mut clock = Clock(0);

        hw.sensor.bus().set_raw(20 * 16);
        c.tick(&mut hw, ButtonLevels::NONE, clock.later());
        c.tick(&mut hw, ButtonLevels::NONE, clock.later());
        assert!(hw.heater.on);
        hw.serial.port().take_output();

        hw.sensor.bus().scratchpad = None;
        let report = c.tick(&mut hw, ButtonLevels::NONE, clock.later());
        assert_eq!(report.reading, Some(Err(SensorError::NoDevice)));
        assert_eq!(report.control, None);
        assert!(hw.heater.on);
        assert!(c.heater_on());
        assert_eq!(c.current(), Some(20.0));
        assert_eq!(hw.serial.port().take_output(), "20.00 \n");
    }

    #[test]
    fn serial_scale_change_is_persisted_but_not_echoed() {
        let mut hw = rig();
        let mut c = Controller::boot(&mut hw);
        let mut clock = Clock(0);

        hw.serial.port().feed("F\n");
        let report = c.tick(&mut hw, ButtonLevels::NONE, clock.later());
        assert_eq!(report.command, Some(Command::Scale(Scale::Fahrenheit)));
        assert_eq!(c.setpoint().scale, Scale::Fahrenheit);
        assert_eq!(cell(&mut hw, SCALE_CELL), 1);
        assert_eq!(cell(&mut hw, TARGET_CELL), 30);
        assert_eq!(hw.serial.port().take_output(), "0.00 \n");
    }

    #[test]
    fn serial_target_is_stored_truncated() {
        let mut hw = rig();
        let mut c = Controller::boot(&mut hw);
        let mut clock = Clock(0);

        hw.serial.port().feed("25.5\n");
        c.tick(&mut hw, ButtonLevels::NONE, clock.later());
        assert_eq!(c.setpoint().target, 25.5);
        assert_eq!(cell(&mut hw, TARGET_CELL), 25);

        hw.serial.port().feed("oops\n");
        c.tick(&mut hw, ButtonLevels::NONE, clock.later());
        assert_eq!(c.setpoint().target, 0.0);
        assert_eq!(cell(&mut hw, TARGET_CELL), 0);
    }

    #[test]
    fn one_serial_command_per_tick() {
        let mut hw = rig();
        let mut c = Controller::boot(&mut hw);
        let mut clock = Clock(0);

        hw.serial.port().feed("22\n23\n");
        c.tick(&mut hw, ButtonLevels::NONE, clock.later());
        assert_eq!(c.setpoint().target, 22.0);
        c.tick(&mut hw, ButtonLevels::NONE, clock.later());
        assert_eq!(c.setpoint().target, 23.0);
    }

    #[test]
    fn fahrenheit_editor_steps_whole_displayed_degrees() {
        let mut hw = rig();
        let mut c = Controller::new(Setpoint {
            target: 20.0,
            scale: Scale::Fahrenheit,
        });
        let mut clock = Clock(0);

        c.tick(&mut hw, ButtonLevels::PRIMARY, clock.later());
        c.tick(&mut hw, ButtonLevels::INCREMENT, clock.later());
        c.tick(&mut hw, ButtonLevels::PRIMARY, clock.later());
        assert_eq!(c.mode(), Mode::SetTarget);

        c.tick(&mut hw, ButtonLevels::INCREMENT, clock.later());
        let shown = Scale::Fahrenheit.display(c.setpoint().target);
        assert!((shown - 69.0).abs() < 1e-3);
    }
}
