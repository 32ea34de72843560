//! Canonical binding text: `"alt+ctrl+1"` (modifiers sorted, key last) or `"middle mouse"`

use clap::ValueEnum;
use std::fmt;

use crate::constants::defaults;

/// Canonical modifier names, sorted
pub const MODIFIERS: &[&str] = &["alt", "alt gr", "ctrl", "shift", "windows"];

/// Suffix marking a mouse-button descriptor
const MOUSE_SUFFIX: &str = " mouse";

/// The three logical carousel actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum Action {
    Previous,
    Next,
    Pause,
}

impl Action {
    pub const ALL: [Action; 3] = [Action::Previous, Action::Next, Action::Pause];

    pub fn name(self) -> &'static str {
        match self {
            Action::Previous => "previous",
            Action::Next => "next",
            Action::Pause => "pause",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Mouse buttons a descriptor can name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    X,
    X2,
}

const MOUSE_BUTTONS: [(MouseButton, &str); 5] = [
    (MouseButton::Left, "left"),
    (MouseButton::Right, "right"),
    (MouseButton::Middle, "middle"),
    (MouseButton::X, "x"),
    (MouseButton::X2, "x2"),
];

impl MouseButton {
    pub fn name(self) -> &'static str {
        MOUSE_BUTTONS
            .iter()
            .find(|(button, _)| *button == self)
            .map_or("", |(_, name)| *name)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        MOUSE_BUTTONS
            .iter()
            .find(|(_, known)| *known == name)
            .map(|(button, _)| *button)
    }
}

pub fn is_modifier(name: &str) -> bool {
    MODIFIERS.contains(&name)
}

/// Map common spellings onto the canonical key names
fn canonical_name(name: &str) -> &str {
    match name {
        "control" | "ctl" => "ctrl",
        "altgr" | "right alt" => "alt gr",
        "win" | "super" | "meta" | "cmd" | "left windows" | "right windows" => "windows",
        "left ctrl" | "right ctrl" => "ctrl",
        "left shift" | "right shift" => "shift",
        "left alt" => "alt",
        "escape" => "esc",
        "return" => "enter",
        other => other,
    }
}

/// Canonical text form of one gesture
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BindingDescriptor(String);

impl BindingDescriptor {
    /// Build a key-combination descriptor; modifiers are sorted and deduplicated
    pub fn keys<'a>(modifiers: impl IntoIterator<Item = &'a str>, key: &str) -> Self {
        let mut parts: Vec<&str> = modifiers.into_iter().collect();
        parts.sort_unstable();
        parts.dedup();
        parts.push(key);
        Self(parts.join("+"))
    }

    pub fn mouse(button: MouseButton) -> Self {
        Self(format!("{}{MOUSE_SUFFIX}", button.name()))
    }

    /// Parse user-facing text into canonical form
    ///
    /// Returns `None` for the unbound sentinel (empty text) and for text
    /// with no key part such as `"ctrl+"`.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim().to_lowercase();
        if text.is_empty() {
            return None;
        }

        if let Some(button) = text.strip_suffix(MOUSE_SUFFIX) {
            return Some(Self(format!("{}{MOUSE_SUFFIX}", button.trim())));
        }

        let parts: Vec<&str> = text.split('+').map(|part| canonical_name(part.trim())).collect();
        let (key, modifiers) = parts.split_last()?;
        if key.is_empty() || modifiers.iter().any(|m| m.is_empty()) {
            return None;
        }
        Some(Self::keys(modifiers.iter().copied(), key))
    }

    pub fn is_mouse(&self) -> bool {
        self.0.ends_with(MOUSE_SUFFIX)
    }

    /// Button name of a mouse descriptor (`"middle"` for `"middle mouse"`)
    pub fn mouse_button_name(&self) -> Option<&str> {
        self.0.strip_suffix(MOUSE_SUFFIX)
    }

    /// Key and modifiers of a key-combination descriptor
    pub fn split_keys(&self) -> Option<(&str, Vec<&str>)> {
        if self.is_mouse() {
            return None;
        }
        let mut parts: Vec<&str> = self.0.split('+').collect();
        let key = parts.pop()?;
        Some((key, parts))
    }
}

impl fmt::Display for BindingDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Bindings for the three actions; `None` means unbound
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingSet {
    pub previous: Option<BindingDescriptor>,
    pub next: Option<BindingDescriptor>,
    pub pause: Option<BindingDescriptor>,
}

impl Default for BindingSet {
    fn default() -> Self {
        Self {
            previous: BindingDescriptor::parse(defaults::PREVIOUS),
            next: BindingDescriptor::parse(defaults::NEXT),
            pause: BindingDescriptor::parse(defaults::PAUSE),
        }
    }
}

impl BindingSet {
    pub fn unbound() -> Self {
        Self {
            previous: None,
            next: None,
            pause: None,
        }
    }

    pub fn get(&self, action: Action) -> Option<&BindingDescriptor> {
        match action {
            Action::Previous => self.previous.as_ref(),
            Action::Next => self.next.as_ref(),
            Action::Pause => self.pause.as_ref(),
        }
    }

    pub fn set(&mut self, action: Action, binding: Option<BindingDescriptor>) {
        match action {
            Action::Previous => self.previous = binding,
            Action::Next => self.next = binding,
            Action::Pause => self.pause = binding,
        }
    }

    /// Bound actions in registration order (previous, next, pause)
    pub fn iter(&self) -> impl Iterator<Item = (Action, &BindingDescriptor)> {
        Action::ALL
            .into_iter()
            .filter_map(|action| self.get(action).map(|binding| (action, binding)))
    }
}
