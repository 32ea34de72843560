use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use x11rb::protocol::xproto::Window;

/// Opaque OS identifier for a top-level window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle(Window);

impl WindowHandle {
    pub fn new(window: Window) -> Self {
        Self(window)
    }

    pub fn id(self) -> Window {
        self.0
    }
}

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// One tracked game window: who is logged in, which class, and where it lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacterEntry {
    pub display_name: String,
    pub class_name: String,
    pub handle: WindowHandle,
}

impl CharacterEntry {
    pub fn new(display_name: impl Into<String>, class_name: impl Into<String>, handle: WindowHandle) -> Self {
        Self {
            display_name: display_name.into(),
            class_name: class_name.into(),
            handle,
        }
    }

    /// Uppercase first character of the display name
    pub fn initial(&self) -> Option<char> {
        self.display_name
            .chars()
            .next()
            .and_then(|c| c.to_uppercase().next())
    }
}

/// Overlay screen position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// `"X,Y"` as given on the command line
impl FromStr for Position {
    type Err = String;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let (x, y) = text
            .split_once(',')
            .ok_or_else(|| format!("expected X,Y, got '{text}'"))?;
        let coordinate = |part: &str| {
            part.trim()
                .parse::<i32>()
                .map_err(|e| format!("invalid coordinate '{}': {e}", part.trim()))
        };
        Ok(Self::new(coordinate(x)?, coordinate(y)?))
    }
}

/// Cycle direction through the carousel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Backward,
    Forward,
}

impl Direction {
    pub fn offset(self) -> isize {
        match self {
            Direction::Backward => -1,
            Direction::Forward => 1,
        }
    }
}
