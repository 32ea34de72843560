//! Application-wide constants, grouped by the subsystem that uses them

/// Settings file location
pub mod config {
    /// Directory under the user's config dir
    pub const APP_DIR: &str = "win-carousel";

    /// Settings file name
    pub const FILENAME: &str = "settings.json";
}

/// Bindings used when the settings file is absent or unreadable
pub mod defaults {
    pub const PREVIOUS: &str = "alt+1";
    pub const NEXT: &str = "alt+2";
    pub const PAUSE: &str = "middle mouse";
}

/// Input event constants (from evdev)
pub mod input {
    /// Key press event value
    pub const KEY_PRESS: i32 = 1;

    /// Key release event value
    pub const KEY_RELEASE: i32 = 0;

    /// Key repeat event value
    pub const KEY_REPEAT: i32 = 2;

    /// Upper bound for one poll over the input devices; also bounds how long
    /// a stop request waits for a listener thread
    pub const POLL_TIMEOUT_MS: u16 = 100;

    /// Name of the hotkey listener thread
    pub const LISTENER_THREAD_NAME: &str = "hotkey-listener";
}

/// Filesystem paths
pub mod paths {
    /// Input device directory
    pub const DEV_INPUT: &str = "/dev/input";
}

/// Permission hints for evdev access
pub mod permissions {
    /// Group owning the input devices
    pub const INPUT_GROUP: &str = "input";

    /// Command that grants access
    pub const ADD_TO_INPUT_GROUP: &str = "sudo usermod -aG input $USER";
}

/// Foreground tracking
pub mod tracker {
    /// Default interval between foreground window polls
    pub const POLL_INTERVAL_MS: u64 = 250;

    /// Name of the polling thread
    pub const THREAD_NAME: &str = "foreground-tracker";
}

/// Overlay feedback for the pause state
pub mod overlay {
    pub const ACTIVE_OPACITY: f32 = 1.0;
    pub const PAUSED_OPACITY: f32 = 0.5;
}

/// Window discovery
pub mod discovery {
    /// Title fragment identifying game client windows
    pub const TITLE_PATTERN: &str = "- Release";

    /// Separator between character name, class and the rest of the title
    pub const TITLE_SEPARATOR: &str = " - ";
}

/// X11 protocol constants
pub mod x11 {
    /// Source indication for _NET_ACTIVE_WINDOW (2 = pager/direct user action)
    pub const ACTIVE_WINDOW_SOURCE_PAGER: u32 = 2;

    /// Keysym of the left Alt key, tapped before requesting focus
    pub const XK_ALT_L: u32 = 0xffe9;

    /// Longest window title read, in 32-bit units
    pub const MAX_TITLE_LENGTH: u32 = 1024;
}
