use anyhow::{Context, Result};
use tracing::{debug, info, warn};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::*;
use x11rb::protocol::xtest::ConnectionExt as XTestExt;
use x11rb::rust_connection::RustConnection;

use crate::constants::x11;
use crate::discovery;
use crate::tracker::WindowSystem;
use crate::types::{CharacterEntry, WindowHandle};

/// Pre-cached X11 atoms to avoid repeated roundtrips
pub struct CachedAtoms {
    pub wm_name: Atom,
    pub net_wm_name: Atom,
    pub utf8_string: Atom,
    pub net_active_window: Atom,
    pub net_client_list: Atom,
}

fn intern(conn: &RustConnection, name: &str) -> Result<Atom> {
    Ok(conn
        .intern_atom(false, name.as_bytes())
        .context(format!("Failed to intern {} atom", name))?
        .reply()
        .context(format!("Failed to get reply for {} atom", name))?
        .atom)
}

impl CachedAtoms {
    pub fn new(conn: &RustConnection) -> Result<Self> {
        // Do all intern_atom roundtrips once at startup
        Ok(Self {
            wm_name: intern(conn, "WM_NAME")?,
            net_wm_name: intern(conn, "_NET_WM_NAME")?,
            utf8_string: intern(conn, "UTF8_STRING")?,
            net_active_window: intern(conn, "_NET_ACTIVE_WINDOW")?,
            net_client_list: intern(conn, "_NET_CLIENT_LIST")?,
        })
    }
}

/// Window manager access over an EWMH-compliant X11 session
pub struct X11WindowSystem {
    conn: RustConnection,
    root: Window,
    atoms: CachedAtoms,
    alt_keycode: Option<Keycode>,
}

impl X11WindowSystem {
    pub fn connect() -> Result<Self> {
        let (conn, screen_num) = x11rb::connect(None).context("Failed to connect to X11 server. Is DISPLAY set?")?;
        let root = conn
            .setup()
            .roots
            .get(screen_num)
            .context(format!("X11 screen {} not found", screen_num))?
            .root;
        let atoms = CachedAtoms::new(&conn).context("Failed to cache X11 atoms at startup")?;

        let alt_keycode = match find_keycode(&conn, x11::XK_ALT_L) {
            Ok(keycode) => keycode,
            Err(e) => {
                warn!(error = %e, "Failed to read keyboard mapping");
                None
            }
        };
        if alt_keycode.is_none() {
            warn!("No keycode for Alt_L, focus requests go out without a neutral key");
        }

        info!(screen = screen_num, root = root, "Connected to X11 server");
        Ok(Self {
            conn,
            root,
            atoms,
            alt_keycode,
        })
    }

    /// Visible top-level windows whose title matches `pattern`, in window manager order
    pub fn discover(&self, pattern: &str) -> Result<Vec<CharacterEntry>> {
        let clients = self
            .conn
            .get_property(false, self.root, self.atoms.net_client_list, AtomEnum::WINDOW, 0, u32::MAX)
            .context("Failed to query _NET_CLIENT_LIST property")?
            .reply()
            .context("Failed to get reply for _NET_CLIENT_LIST query")?;
        let windows: Vec<Window> = clients
            .value32()
            .context("Invalid _NET_CLIENT_LIST property format")?
            .collect();

        let mut titled = Vec::new();
        for window in windows {
            if !self.is_viewable(window) {
                continue;
            }
            match self.window_title(window) {
                Ok(title) => titled.push((WindowHandle::new(window), title)),
                Err(e) => debug!(window = window, error = %e, "Failed to read window title"),
            }
        }

        let entries = discovery::entries_from_titles(titled, pattern);
        info!(count = entries.len(), pattern = %pattern, "Discovered game windows");
        Ok(entries)
    }

    fn is_viewable(&self, window: Window) -> bool {
        self.conn
            .get_window_attributes(window)
            .ok()
            .and_then(|cookie| cookie.reply().ok())
            .is_some_and(|attrs| attrs.map_state == MapState::VIEWABLE)
    }

    /// `_NET_WM_NAME` if set, `WM_NAME` otherwise
    pub fn window_title(&self, window: Window) -> Result<String> {
        let utf8 = self
            .conn
            .get_property(false, window, self.atoms.net_wm_name, self.atoms.utf8_string, 0, x11::MAX_TITLE_LENGTH)
            .context(format!("Failed to query _NET_WM_NAME property for window {}", window))?
            .reply()
            .context(format!("Failed to get _NET_WM_NAME reply for window {}", window))?;
        if !utf8.value.is_empty() {
            return Ok(String::from_utf8_lossy(&utf8.value).into_owned());
        }

        let name_prop = self
            .conn
            .get_property(false, window, self.atoms.wm_name, AtomEnum::STRING, 0, x11::MAX_TITLE_LENGTH)
            .context(format!("Failed to query WM_NAME property for window {}", window))?
            .reply()
            .context(format!("Failed to get WM_NAME reply for window {}", window))?;
        Ok(String::from_utf8_lossy(&name_prop.value).into_owned())
    }
}

/// Keycode producing `keysym` in the current keyboard mapping
fn find_keycode(conn: &RustConnection, keysym: Keysym) -> Result<Option<Keycode>> {
    let setup = conn.setup();
    let min = setup.min_keycode;
    let count = setup.max_keycode.saturating_sub(min).saturating_add(1);
    let mapping = conn
        .get_keyboard_mapping(min, count)
        .context("Failed to query keyboard mapping")?
        .reply()
        .context("Failed to get keyboard mapping reply")?;

    let per_keycode = usize::from(mapping.keysyms_per_keycode.max(1));
    Ok(mapping
        .keysyms
        .chunks(per_keycode)
        .position(|syms| syms.contains(&keysym))
        .and_then(|offset| u8::try_from(offset).ok())
        .map(|offset| min.saturating_add(offset)))
}

impl WindowSystem for X11WindowSystem {
    fn foreground_window(&self) -> Result<Option<WindowHandle>> {
        let active_window_prop = self
            .conn
            .get_property(false, self.root, self.atoms.net_active_window, AtomEnum::WINDOW, 0, 1)
            .context("Failed to query _NET_ACTIVE_WINDOW property")?
            .reply()
            .context("Failed to get reply for _NET_ACTIVE_WINDOW query")?;

        let active = active_window_prop
            .value32()
            .and_then(|mut values| values.next())
            .filter(|&window| window != x11rb::NONE);
        Ok(active.map(WindowHandle::new))
    }

    /// Tap Alt_L through XTEST so the window manager treats the next focus request as user-driven
    fn send_neutral_key(&self) -> Result<()> {
        let Some(keycode) = self.alt_keycode else {
            return Ok(());
        };
        for event_type in [KEY_PRESS_EVENT, KEY_RELEASE_EVENT] {
            self.conn
                .xtest_fake_input(event_type, keycode, x11rb::CURRENT_TIME, self.root, 0, 0, 0)
                .context("Failed to send XTEST key event")?;
        }
        self.conn.flush().context("Failed to flush X11 connection after neutral key")?;
        Ok(())
    }

    /// Raise the window and request focus via _NET_ACTIVE_WINDOW
    fn activate_window(&self, handle: WindowHandle) -> Result<()> {
        let window = handle.id();

        // Checked so a window that has since closed surfaces as BadWindow
        self.conn
            .configure_window(window, &ConfigureWindowAux::new().stack_mode(StackMode::ABOVE))
            .context(format!("Failed to raise window {} to top of stack", window))?
            .check()
            .context(format!("Window {} is gone", window))?;

        let event = ClientMessageEvent {
            response_type: CLIENT_MESSAGE_EVENT,
            format: 32,
            sequence: 0,
            window,
            type_: self.atoms.net_active_window,
            data: ClientMessageData::from([
                x11::ACTIVE_WINDOW_SOURCE_PAGER, // Source indication: 2 = pager/direct user action
                x11rb::CURRENT_TIME,
                0, // Requestor's currently active window (0 = none)
                0,
                0,
            ]),
        };

        self.conn
            .send_event(
                false,
                self.root,
                EventMask::SUBSTRUCTURE_NOTIFY | EventMask::SUBSTRUCTURE_REDIRECT,
                &event,
            )
            .context(format!("Failed to send _NET_ACTIVE_WINDOW event for window {}", window))?;

        self.conn
            .flush()
            .context("Failed to flush X11 connection after window activation")?;
        Ok(())
    }
}
