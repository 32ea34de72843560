use std::sync::mpsc::Receiver;
use tracing::{debug, info};

use crate::cycle_state::DisplaySnapshot;
use crate::persistence::{PersistedSettings, SettingsStore};
use crate::types::{CharacterEntry, Position};

/// Events delivered to the main thread
#[derive(Debug, Clone)]
pub enum UiEvent {
    /// Carousel state changed
    Display(DisplaySnapshot),
    /// Overlay was dragged and released at a new position
    Repositioned(Position),
    /// User asked to go back to configuration
    ReturnToConfig,
    /// Process is shutting down
    Shutdown,
}

/// Why the UI loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionExit {
    ReturnToConfig,
    Shutdown,
}

/// Something that draws the previous / current / next strip
pub trait Overlay {
    fn render(&mut self, view: &OverlayView);
    fn show(&mut self);
    fn hide(&mut self);
    fn move_to(&mut self, position: Position);
    fn position(&self) -> Option<Position>;
}

/// One slot of the strip
#[derive(Debug, Clone, PartialEq)]
pub struct Slot {
    pub name: String,
    pub class_name: String,
    pub badge: Option<char>,
}

impl Slot {
    fn from_entry(snapshot: &DisplaySnapshot, entry: &CharacterEntry) -> Self {
        Self {
            name: entry.display_name.clone(),
            class_name: entry.class_name.clone(),
            badge: snapshot.badge(entry),
        }
    }

    fn label(&self) -> String {
        match self.badge {
            Some(badge) => format!("{} ({badge})", self.class_name),
            None => self.class_name.clone(),
        }
    }
}

/// Everything a renderer needs for one frame
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayView {
    pub previous: Slot,
    pub current: Slot,
    pub next: Slot,
    pub opacity: f32,
}

impl OverlayView {
    /// `None` when the snapshot holds no entries
    pub fn from_snapshot(snapshot: &DisplaySnapshot) -> Option<Self> {
        if snapshot.entries.is_empty() {
            return None;
        }
        Some(Self {
            previous: Slot::from_entry(snapshot, snapshot.previous()),
            current: Slot::from_entry(snapshot, snapshot.current()),
            next: Slot::from_entry(snapshot, snapshot.next()),
            opacity: snapshot.opacity(),
        })
    }

    /// Single-line rendering: `prev [current] next`
    pub fn line(&self) -> String {
        format!("{}  [{}]  {}", self.previous.label(), self.current.label(), self.next.label())
    }
}

/// Overlay that writes each frame to the log
#[derive(Debug, Default)]
pub struct LogOverlay {
    visible: bool,
    position: Option<Position>,
    last_frame: Option<String>,
}

impl LogOverlay {
    pub fn new(position: Option<Position>) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    #[cfg(test)]
    pub fn last_frame(&self) -> Option<&str> {
        self.last_frame.as_deref()
    }
}

impl Overlay for LogOverlay {
    fn render(&mut self, view: &OverlayView) {
        let line = view.line();
        if self.visible {
            info!(current = %view.current.name, opacity = view.opacity, "{line}");
        }
        self.last_frame = Some(line);
    }

    fn show(&mut self) {
        self.visible = true;
        debug!(position = ?self.position, "Overlay shown");
    }

    fn hide(&mut self) {
        self.visible = false;
        debug!("Overlay hidden");
    }

    fn move_to(&mut self, position: Position) {
        self.position = Some(position);
    }

    fn position(&self) -> Option<Position> {
        self.position
    }
}

/// Apply UI events on the calling (main) thread until the session should end
///
/// Repositioning is persisted immediately. A closed channel counts as shutdown.
pub fn run_ui_loop(
    events: &Receiver<UiEvent>,
    overlay: &mut dyn Overlay,
    store: &SettingsStore,
    settings: &mut PersistedSettings,
) -> SessionExit {
    while let Ok(event) = events.recv() {
        match event {
            UiEvent::Display(snapshot) => {
                if let Some(view) = OverlayView::from_snapshot(&snapshot) {
                    overlay.render(&view);
                }
            }
            UiEvent::Repositioned(position) => {
                info!(x = position.x, y = position.y, "Overlay moved");
                overlay.move_to(position);
                settings.overlay_position = Some(position);
                store.save(settings);
            }
            UiEvent::ReturnToConfig => return SessionExit::ReturnToConfig,
            UiEvent::Shutdown => return SessionExit::Shutdown,
        }
    }
    SessionExit::Shutdown
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::BindingSet;
    use crate::constants::overlay;
    use crate::cycle_state::CarouselState;
    use crate::types::{Direction, WindowHandle};
    use std::sync::mpsc;

    fn snapshot() -> DisplaySnapshot {
        let mut state = CarouselState::new();
        state
            .activate(
                vec![
                    CharacterEntry::new("Alice", "Iop", WindowHandle::new(1)),
                    CharacterEntry::new("Bob", "Cra", WindowHandle::new(2)),
                    CharacterEntry::new("Carol", "Iop", WindowHandle::new(3)),
                ],
                BindingSet::default(),
            )
            .unwrap()
    }

    #[test]
    fn test_view_slots_and_badges() {
        let view = OverlayView::from_snapshot(&snapshot()).unwrap();
        assert_eq!(view.previous.name, "Carol");
        assert_eq!(view.previous.badge, Some('C'));
        assert_eq!(view.current.name, "Alice");
        assert_eq!(view.current.badge, Some('A'));
        assert_eq!(view.next.name, "Bob");
        assert_eq!(view.next.badge, None);
        assert_eq!(view.line(), "Iop (C)  [Iop (A)]  Cra");
        assert_eq!(view.opacity, overlay::ACTIVE_OPACITY);
    }

    #[test]
    fn test_view_of_empty_snapshot() {
        let empty = CarouselState::new().snapshot();
        assert!(OverlayView::from_snapshot(&empty).is_none());
    }

    #[test]
    fn test_paused_view_is_dimmed() {
        let mut state = CarouselState::new();
        state
            .activate(vec![CharacterEntry::new("Alice", "Iop", WindowHandle::new(1))], BindingSet::default())
            .unwrap();
        state.toggle_pause();
        let view = OverlayView::from_snapshot(&state.snapshot()).unwrap();
        assert_eq!(view.opacity, overlay::PAUSED_OPACITY);
    }

    #[test]
    fn test_ui_loop_renders_and_returns_to_config() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json"));
        let mut settings = PersistedSettings::default();
        let mut overlay = LogOverlay::new(None);
        overlay.show();

        let (tx, rx) = mpsc::channel();
        let mut state = CarouselState::new();
        state.activate(snapshot().entries.to_vec(), BindingSet::default()).unwrap();
        tx.send(UiEvent::Display(state.step(Direction::Forward).unwrap())).unwrap();
        tx.send(UiEvent::ReturnToConfig).unwrap();

        let exit = run_ui_loop(&rx, &mut overlay, &store, &mut settings);
        assert_eq!(exit, SessionExit::ReturnToConfig);
        assert_eq!(overlay.last_frame(), Some("Iop (A)  [Cra]  Iop (C)"));
    }

    #[test]
    fn test_ui_loop_persists_reposition() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json"));
        let mut settings = PersistedSettings::default();
        let mut overlay = LogOverlay::new(None);

        let (tx, rx) = mpsc::channel();
        tx.send(UiEvent::Repositioned(Position::new(300, 40))).unwrap();
        tx.send(UiEvent::Shutdown).unwrap();

        let exit = run_ui_loop(&rx, &mut overlay, &store, &mut settings);
        assert_eq!(exit, SessionExit::Shutdown);
        assert_eq!(overlay.position(), Some(Position::new(300, 40)));
        assert_eq!(settings.overlay_position, Some(Position::new(300, 40)));
        assert_eq!(store.load().overlay_position, Some(Position::new(300, 40)));
    }

    #[test]
    fn test_ui_loop_ends_when_senders_drop() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json"));
        let mut settings = PersistedSettings::default();
        let mut overlay = LogOverlay::new(None);

        let (tx, rx) = mpsc::channel::<UiEvent>();
        drop(tx);
        assert_eq!(run_ui_loop(&rx, &mut overlay, &store, &mut settings), SessionExit::Shutdown);
    }
}
