//! Theme preference values and the seams the synchronizer drives.
//!
//! Responsibilities:
//! - Define the persisted preference (`ThemeMode`) and the effective scheme (`Scheme`).
//! - Resolve a preference against the system scheme.
//! - Define the system-scheme observer and the UI applier.
//!
//! Invariants:
//! - `ThemeMode` is what gets persisted; `Scheme` is never persisted.
//! - The icon always offers the opposite of the effective scheme.

use std::{cell::RefCell, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// User preference, persisted by its tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    Light,
    Dark,
    #[default]
    Auto,
}

impl ThemeMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
            Self::Auto => "auto",
        }
    }
}

impl fmt::Display for ThemeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown theme mode {0:?}. Expected one of: light, dark or auto")]
pub struct UnknownThemeMode(pub String);

impl FromStr for ThemeMode {
    type Err = UnknownThemeMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(Self::Light),
            "dark" => Ok(Self::Dark),
            "auto" => Ok(Self::Auto),
            _ => Err(UnknownThemeMode(s.to_string())),
        }
    }
}

/// The scheme actually shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    #[default]
    Light,
    Dark,
}

impl Scheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Self::Light => Self::Dark,
            Self::Dark => Self::Light,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `Auto` defers to the system; explicit modes ignore it.
pub fn resolve(mode: ThemeMode, system: Scheme) -> Scheme {
    match mode {
        ThemeMode::Light => Scheme::Light,
        ThemeMode::Dark => Scheme::Dark,
        ThemeMode::Auto => system,
    }
}

const SUN_PATH: &str = "M12 17a5 5 0 1 0 0-10 5 5 0 0 0 0 10zM12 1v2M12 21v2M4.22 4.22l1.42 1.42\
M18.36 18.36l1.42 1.42M1 12h2M21 12h2M4.22 19.78l1.42-1.42M18.36 5.64l1.42-1.42";
const MOON_PATH: &str = "M21 12.79A9 9 0 1 1 11.21 3 7 7 0 0 0 21 12.79z";

/// Toggle glyph. The sun is shown while dark (click for light) and the moon
/// while light (click for dark).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThemeIcon {
    Sun,
    Moon,
}

impl ThemeIcon {
    pub fn for_scheme(scheme: Scheme) -> Self {
        match scheme {
            Scheme::Dark => Self::Sun,
            Scheme::Light => Self::Moon,
        }
    }

    /// SVG path data on a 24x24 view box.
    pub fn path(self) -> &'static str {
        match self {
            Self::Sun => SUN_PATH,
            Self::Moon => MOON_PATH,
        }
    }
}

/// Everything a UI needs to reflect the current theme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedTheme {
    /// Marks the active option in a mode menu.
    pub mode: ThemeMode,
    pub scheme: Scheme,
    pub icon: ThemeIcon,
}

impl AppliedTheme {
    pub fn new(mode: ThemeMode, system: Scheme) -> Self {
        let scheme = resolve(mode, system);
        Self {
            mode,
            scheme,
            icon: ThemeIcon::for_scheme(scheme),
        }
    }
}

pub trait ThemeApplier {
    fn apply(&self, theme: &AppliedTheme);
}

/// The host environment's color-scheme preference.
pub trait SchemeObserver {
    fn current(&self) -> Scheme;
    fn on_change(&self, callback: Box<dyn Fn(Scheme)>);
}

/// A scheme value set by the host, notifying subscribers on change.
pub struct ManualScheme {
    current: RefCell<Scheme>,
    subscribers: RefCell<Vec<Box<dyn Fn(Scheme)>>>,
}

impl ManualScheme {
    pub fn new(initial: Scheme) -> Self {
        Self {
            current: RefCell::new(initial),
            subscribers: RefCell::new(Vec::new()),
        }
    }

    /// Subscribers run only when the value actually changes.
    pub fn set(&self, scheme: Scheme) {
        if self.current.replace(scheme) == scheme {
            return;
        }

        tracing::debug!(%scheme, "System scheme changed");
        for subscriber in self.subscribers.borrow().iter() {
            subscriber(scheme);
        }
    }
}

impl SchemeObserver for ManualScheme {
    fn current(&self) -> Scheme {
        *self.current.borrow()
    }

    fn on_change(&self, callback: Box<dyn Fn(Scheme)>) {
        self.subscribers.borrow_mut().push(callback);
    }
}
