//! Operating modes and the primary-button transition table.

/// Highlighted line of the menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MenuEntry {
    #[default]
    Scale = 0,
    Target = 1,
    Exit = 2,
}

impl MenuEntry {
    pub const ALL: [MenuEntry; 3] = [MenuEntry::Scale, MenuEntry::Target, MenuEntry::Exit];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Moves the highlight down, stopping at the last entry.
    pub fn next(self) -> Self {
        Self::from_index(self.index() + 1).unwrap_or(self)
    }

    /// Moves the highlight up, stopping at the first entry.
    pub fn previous(self) -> Self {
        match self.index() {
            0 => self,
            i => Self::from_index(i - 1).unwrap_or(self),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MenuEntry::Scale => "Scale",
            MenuEntry::Target => "Target",
            MenuEntry::Exit => "Exit",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    #[default]
    Readout,
    Menu(MenuEntry),
    SetTarget,
    SetScale,
}

/// Side effect owed by a primary-button transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Effect {
    None,
    PersistTarget,
    PersistScale,
}

impl Mode {
    /// Numeric mode code: Readout 0, Menu 1, SetTarget 2, SetScale 3.
    pub fn code(self) -> u8 {
        match self {
            Mode::Readout => 0,
            Mode::Menu(_) => 1,
            Mode::SetTarget => 2,
            Mode::SetScale => 3,
        }
    }

    /// Next mode after an accepted primary press.
    ///
    /// Entering the menu from the readout highlights the first entry;
    /// leaving an editor returns to the menu with that editor's entry highlighted.
    pub fn on_primary(self) -> (Mode, Effect) {
        match self {
            Mode::Readout => (Mode::Menu(MenuEntry::Scale), Effect::None),
            Mode::Menu(MenuEntry::Scale) => (Mode::SetScale, Effect::None),
            Mode::Menu(MenuEntry::Target) => (Mode::SetTarget, Effect::None),
            Mode::Menu(MenuEntry::Exit) => (Mode::Readout, Effect::None),
            Mode::SetTarget => (Mode::Menu(MenuEntry::Target), Effect::PersistTarget),
            Mode::SetScale => (Mode::Menu(MenuEntry::Scale), Effect::PersistScale),
        }
    }
}
