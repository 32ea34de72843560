use anyhow::{Context, Result};
use evdev::{Device, EventType, InputEvent, KeyCode};
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags};
use std::collections::BTreeSet;
use std::os::fd::AsFd;
use tracing::{debug, error, info, warn};

use crate::binding::{is_modifier, BindingDescriptor, MouseButton};
use crate::constants::{input, paths, permissions};

/// evdev key code → canonical key name
#[rustfmt::skip]
const KEY_NAMES: &[(KeyCode, &str)] = &[
    (KeyCode::KEY_LEFTCTRL, "ctrl"), (KeyCode::KEY_RIGHTCTRL, "ctrl"),
    (KeyCode::KEY_LEFTSHIFT, "shift"), (KeyCode::KEY_RIGHTSHIFT, "shift"),
    (KeyCode::KEY_LEFTALT, "alt"), (KeyCode::KEY_RIGHTALT, "alt gr"),
    (KeyCode::KEY_LEFTMETA, "windows"), (KeyCode::KEY_RIGHTMETA, "windows"),
    (KeyCode::KEY_A, "a"), (KeyCode::KEY_B, "b"), (KeyCode::KEY_C, "c"), (KeyCode::KEY_D, "d"),
    (KeyCode::KEY_E, "e"), (KeyCode::KEY_F, "f"), (KeyCode::KEY_G, "g"), (KeyCode::KEY_H, "h"),
    (KeyCode::KEY_I, "i"), (KeyCode::KEY_J, "j"), (KeyCode::KEY_K, "k"), (KeyCode::KEY_L, "l"),
    (KeyCode::KEY_M, "m"), (KeyCode::KEY_N, "n"), (KeyCode::KEY_O, "o"), (KeyCode::KEY_P, "p"),
    (KeyCode::KEY_Q, "q"), (KeyCode::KEY_R, "r"), (KeyCode::KEY_S, "s"), (KeyCode::KEY_T, "t"),
    (KeyCode::KEY_U, "u"), (KeyCode::KEY_V, "v"), (KeyCode::KEY_W, "w"), (KeyCode::KEY_X, "x"),
    (KeyCode::KEY_Y, "y"), (KeyCode::KEY_Z, "z"),
    (KeyCode::KEY_1, "1"), (KeyCode::KEY_2, "2"), (KeyCode::KEY_3, "3"), (KeyCode::KEY_4, "4"),
    (KeyCode::KEY_5, "5"), (KeyCode::KEY_6, "6"), (KeyCode::KEY_7, "7"), (KeyCode::KEY_8, "8"),
    (KeyCode::KEY_9, "9"), (KeyCode::KEY_0, "0"),
    (KeyCode::KEY_F1, "f1"), (KeyCode::KEY_F2, "f2"), (KeyCode::KEY_F3, "f3"), (KeyCode::KEY_F4, "f4"),
    (KeyCode::KEY_F5, "f5"), (KeyCode::KEY_F6, "f6"), (KeyCode::KEY_F7, "f7"), (KeyCode::KEY_F8, "f8"),
    (KeyCode::KEY_F9, "f9"), (KeyCode::KEY_F10, "f10"), (KeyCode::KEY_F11, "f11"), (KeyCode::KEY_F12, "f12"),
    (KeyCode::KEY_ESC, "esc"), (KeyCode::KEY_TAB, "tab"), (KeyCode::KEY_SPACE, "space"),
    (KeyCode::KEY_ENTER, "enter"), (KeyCode::KEY_BACKSPACE, "backspace"), (KeyCode::KEY_CAPSLOCK, "caps lock"),
    (KeyCode::KEY_INSERT, "insert"), (KeyCode::KEY_DELETE, "delete"),
    (KeyCode::KEY_HOME, "home"), (KeyCode::KEY_END, "end"),
    (KeyCode::KEY_PAGEUP, "page up"), (KeyCode::KEY_PAGEDOWN, "page down"),
    (KeyCode::KEY_UP, "up"), (KeyCode::KEY_DOWN, "down"), (KeyCode::KEY_LEFT, "left"), (KeyCode::KEY_RIGHT, "right"),
    (KeyCode::KEY_SYSRQ, "print screen"), (KeyCode::KEY_SCROLLLOCK, "scroll lock"), (KeyCode::KEY_PAUSE, "pause"),
    (KeyCode::KEY_MINUS, "-"), (KeyCode::KEY_EQUAL, "="), (KeyCode::KEY_LEFTBRACE, "["), (KeyCode::KEY_RIGHTBRACE, "]"),
    (KeyCode::KEY_SEMICOLON, ";"), (KeyCode::KEY_APOSTROPHE, "'"), (KeyCode::KEY_GRAVE, "`"),
    (KeyCode::KEY_BACKSLASH, "\\"), (KeyCode::KEY_COMMA, ","), (KeyCode::KEY_DOT, "."), (KeyCode::KEY_SLASH, "/"),
];

/// Name of the key that clears a binding during capture
pub const ESCAPE: &str = "esc";

pub fn key_name(key: KeyCode) -> Option<&'static str> {
    KEY_NAMES
        .iter()
        .find(|(code, _)| *code == key)
        .map(|(_, name)| *name)
}

/// True for names that can end a key-combination descriptor
pub fn is_bindable_key(name: &str) -> bool {
    !is_modifier(name) && KEY_NAMES.iter().any(|(_, known)| *known == name)
}

pub fn mouse_button(key: KeyCode) -> Option<MouseButton> {
    match key {
        KeyCode::BTN_LEFT => Some(MouseButton::Left),
        KeyCode::BTN_RIGHT => Some(MouseButton::Right),
        KeyCode::BTN_MIDDLE => Some(MouseButton::Middle),
        KeyCode::BTN_SIDE => Some(MouseButton::X),
        KeyCode::BTN_EXTRA => Some(MouseButton::X2),
        _ => None,
    }
}

/// One decoded input gesture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gesture {
    KeyDown(&'static str),
    KeyUp(&'static str),
    ButtonDown(MouseButton),
}

/// Decode a raw evdev event; only key events carry gestures
pub fn translate(event: &InputEvent) -> Option<Gesture> {
    if event.event_type() != EventType::KEY {
        return None;
    }
    translate_key(KeyCode::new(event.code()), event.value())
}

/// Decode a key event; repeats, button releases and unknown keys are dropped
pub fn translate_key(key: KeyCode, value: i32) -> Option<Gesture> {
    if let Some(button) = mouse_button(key) {
        return (value == input::KEY_PRESS).then_some(Gesture::ButtonDown(button));
    }

    let name = key_name(key)?;
    match value {
        input::KEY_PRESS => Some(Gesture::KeyDown(name)),
        input::KEY_RELEASE => Some(Gesture::KeyUp(name)),
        input::KEY_REPEAT => None,
        other => {
            debug!(key = name, value = other, "Unknown key event value");
            None
        }
    }
}

/// Modifier keys currently held, kept sorted
#[derive(Debug, Default)]
pub struct HeldModifiers {
    held: BTreeSet<&'static str>,
}

impl HeldModifiers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a key press; returns false if the key is not a modifier
    pub fn press(&mut self, name: &'static str) -> bool {
        if is_modifier(name) {
            self.held.insert(name);
            true
        } else {
            false
        }
    }

    pub fn release(&mut self, name: &str) {
        self.held.remove(name);
    }

    /// Descriptor for `key` pressed with the currently held modifiers
    pub fn combine(&self, key: &str) -> BindingDescriptor {
        BindingDescriptor::keys(self.held.iter().copied(), key)
    }
}

struct InputDevice {
    device: Device,
    keyboard: bool,
    grabbed: bool,
}

/// The set of readable keyboards and pointers under `/dev/input`
pub struct InputDevices {
    devices: Vec<InputDevice>,
}

impl InputDevices {
    /// Open every device that looks like a keyboard (has Tab) or a pointer (has a middle button)
    pub fn open() -> Result<Self> {
        info!(path = %paths::DEV_INPUT, "Scanning for input devices...");

        let mut devices = Vec::new();
        for entry in std::fs::read_dir(paths::DEV_INPUT)
            .context(format!("Failed to read {} - are you in the '{}' group?", paths::DEV_INPUT, permissions::INPUT_GROUP))?
        {
            let path = entry?.path();
            let Ok(device) = Device::open(&path) else {
                continue;
            };
            let Some(keys) = device.supported_keys() else {
                continue;
            };

            let keyboard = keys.contains(KeyCode::KEY_TAB);
            let pointer = keys.contains(KeyCode::BTN_MIDDLE) || keys.contains(KeyCode::BTN_LEFT);
            if keyboard || pointer {
                info!(device_path = %path.display(), name = ?device.name(), keyboard, pointer, "Found input device");
                devices.push(InputDevice {
                    device,
                    keyboard,
                    grabbed: false,
                });
            }
        }

        if devices.is_empty() {
            anyhow::bail!(
                "No input device found. Ensure you're in '{}' group:\n\
                 {}\n\
                 Then log out and back in.",
                permissions::INPUT_GROUP,
                permissions::ADD_TO_INPUT_GROUP
            )
        }

        info!(count = devices.len(), "Listening on input device(s)");
        Ok(Self { devices })
    }

    /// Take exclusive access to keyboards so keystrokes don't reach other applications
    pub fn grab_keyboards(&mut self) {
        for input in self.devices.iter_mut().filter(|input| input.keyboard) {
            match input.device.grab() {
                Ok(()) => input.grabbed = true,
                Err(e) => warn!(name = ?input.device.name(), error = %e, "Failed to grab keyboard, keystrokes will leak"),
            }
        }
    }

    /// Give back every grabbed device
    pub fn release(&mut self) {
        for input in self.devices.iter_mut().filter(|input| input.grabbed) {
            if let Err(e) = input.device.ungrab() {
                warn!(name = ?input.device.name(), error = %e, "Failed to release keyboard grab");
            }
            input.grabbed = false;
        }
    }

    /// Wait up to `timeout_ms` for input and decode whatever arrived
    pub fn poll(&mut self, timeout_ms: u16) -> Result<Vec<Gesture>> {
        let ready: Vec<usize> = {
            let mut fds: Vec<PollFd> = self
                .devices
                .iter()
                .map(|input| PollFd::new(input.device.as_fd(), PollFlags::POLLIN))
                .collect();

            match poll(&mut fds, timeout_ms) {
                Ok(0) | Err(Errno::EINTR) => return Ok(Vec::new()),
                Ok(_) => {}
                Err(e) => return Err(e).context("Failed to poll input devices"),
            }

            fds.iter()
                .enumerate()
                .filter(|(_, fd)| {
                    fd.revents()
                        .is_some_and(|events| events.intersects(PollFlags::POLLIN | PollFlags::POLLERR | PollFlags::POLLHUP))
                })
                .map(|(index, _)| index)
                .collect()
        };

        let mut gestures = Vec::new();
        let mut lost = Vec::new();
        for index in ready {
            let input = &mut self.devices[index];
            let fetched = input
                .device
                .fetch_events()
                .map(|events| events.filter_map(|event| translate(&event)).collect::<Vec<_>>());
            match fetched {
                Ok(batch) => gestures.extend(batch),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(e) => {
                    warn!(name = ?input.device.name(), error = %e, "Input device lost");
                    lost.push(index);
                }
            }
        }

        // Drop unplugged devices, highest index first
        for index in lost.into_iter().rev() {
            self.devices.remove(index);
        }
        if self.devices.is_empty() {
            anyhow::bail!("All input devices disappeared");
        }

        Ok(gestures)
    }
}

impl Drop for InputDevices {
    fn drop(&mut self) {
        self.release();
    }
}

/// Check if input devices are readable (user has input group permissions)
pub fn check_permissions() -> bool {
    std::fs::read_dir(paths::DEV_INPUT).is_ok()
}

/// Print helpful error message if permissions missing
pub fn print_permission_error() {
    error!(path = %paths::DEV_INPUT, "Cannot access input devices");
    error!(group = %permissions::INPUT_GROUP, "Hotkeys and binding capture require group membership");
    error!(command = %permissions::ADD_TO_INPUT_GROUP, "Add user to input group");
    error!("  Then log out and back in");
    warn!(continuing = true, "Continuing without hotkey support...");
}
