use parking_lot::Mutex;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::binding::{Action, BindingSet};
use crate::cycle_state::{CarouselState, DisplaySnapshot};
use crate::error::Result;
use crate::hotkeys::{ActionHandler, InputRouter};
use crate::overlay::UiEvent;
use crate::tracker::{apply_focus, ForegroundTracker, WindowSystem};
use crate::types::{CharacterEntry, Direction};

/// Polls skipped after a switch we requested, while the window manager catches up
const SETTLE_POLLS: u8 = 1;

struct Guarded {
    state: CarouselState,
    settle_polls: u8,
}

/// Serializes every mutation from hotkey threads and the tracker; each change
/// goes to the main thread as a [`UiEvent`]
pub struct Carousel {
    inner: Mutex<Guarded>,
    windows: Arc<dyn WindowSystem>,
    ui: Sender<UiEvent>,
}

impl Carousel {
    pub fn new(windows: Arc<dyn WindowSystem>, ui: Sender<UiEvent>) -> Self {
        Self {
            inner: Mutex::new(Guarded {
                state: CarouselState::new(),
                settle_polls: 0,
            }),
            windows,
            ui,
        }
    }

    fn publish(&self, snapshot: DisplaySnapshot) {
        if self.ui.send(UiEvent::Display(snapshot)).is_err() {
            debug!("UI channel closed, dropping display update");
        }
    }

    pub fn activate(&self, entries: Vec<CharacterEntry>, bindings: BindingSet) -> Result<()> {
        let snapshot = self.inner.lock().state.activate(entries, bindings)?;
        self.publish(snapshot);
        Ok(())
    }

    pub fn deactivate(&self) {
        let mut inner = self.inner.lock();
        inner.state.deactivate();
        inner.settle_polls = 0;
    }

    /// Move one window along and focus it; a refused focus request puts the index back
    pub fn step(&self, direction: Direction) {
        let mut inner = self.inner.lock();
        let previous_index = inner.state.current_index();
        let Some(snapshot) = inner.state.step(direction) else {
            return;
        };

        let target = snapshot.current().clone();
        match apply_focus(self.windows.as_ref(), target.handle) {
            Ok(()) => {
                info!(character = %target.display_name, handle = %target.handle, "Switched window");
                inner.settle_polls = SETTLE_POLLS;
                drop(inner);
                self.publish(snapshot);
            }
            Err(e) => {
                error!(character = %target.display_name, error = %e, "Failed to switch window");
                inner.state.rewind(previous_index);
            }
        }
    }

    pub fn toggle_pause(&self) -> bool {
        let snapshot = {
            let mut inner = self.inner.lock();
            inner.state.toggle_pause();
            inner.state.snapshot()
        };
        info!(paused = snapshot.paused, "{}", if snapshot.paused { "Carousel paused" } else { "Carousel resumed" });
        let paused = snapshot.paused;
        self.publish(snapshot);
        paused
    }

    /// One tracker poll: follow the foreground window when it is a carousel
    /// entry other than the current one
    pub fn sync_foreground(&self) {
        let mut inner = self.inner.lock();
        if inner.settle_polls > 0 {
            inner.settle_polls -= 1;
            return;
        }
        let foreground = match self.windows.foreground_window() {
            Ok(Some(foreground)) => foreground,
            Ok(None) => return,
            Err(e) => {
                debug!(error = %e, "Failed to query foreground window");
                return;
            }
        };
        if inner.state.current().is_some_and(|entry| entry.handle == foreground) {
            return;
        }
        if let Some(snapshot) = inner.state.set_current_by_handle(foreground) {
            info!(character = %snapshot.current().display_name, "Following external focus change");
            drop(inner);
            self.publish(snapshot);
        }
    }

    #[cfg(test)]
    pub fn snapshot(&self) -> DisplaySnapshot {
        self.inner.lock().state.snapshot()
    }

    pub fn bindings(&self) -> BindingSet {
        self.inner.lock().state.bindings().clone()
    }
}

impl ActionHandler for Carousel {
    fn on_action(&self, action: Action) {
        debug!(action = %action, "Hotkey action");
        match action {
            Action::Previous => self.step(Direction::Backward),
            Action::Next => self.step(Direction::Forward),
            Action::Pause => {
                self.toggle_pause();
            }
        }
    }
}

/// A running carousel session: bindings registered and tracker polling
pub struct Session {
    carousel: Arc<Carousel>,
    router: InputRouter,
    tracker: ForegroundTracker,
}

impl Session {
    /// Activate the carousel, then register bindings and start tracking
    ///
    /// Only an empty selection fails; binding and tracker failures are logged
    /// and the session runs with whatever did start.
    pub fn start(
        carousel: Arc<Carousel>,
        entries: Vec<CharacterEntry>,
        bindings: BindingSet,
        poll_interval: Duration,
    ) -> Result<Self> {
        carousel.activate(entries, bindings.clone())?;

        let mut router = InputRouter::new();
        let handler: Arc<dyn ActionHandler> = carousel.clone();
        for failure in router.bind(&bindings, handler) {
            warn!(error = %failure, "Binding not registered");
        }

        let tracker = match ForegroundTracker::spawn(Arc::clone(&carousel), poll_interval) {
            Ok(tracker) => tracker,
            Err(e) => {
                error!(error = %e, "Failed to start foreground tracking");
                ForegroundTracker::idle()
            }
        };

        for (action, binding) in bindings.iter() {
            info!(action = %action, binding = %binding, "Binding active");
        }
        Ok(Self {
            carousel,
            router,
            tracker,
        })
    }

    /// Stop tracking, unregister bindings and discard the carousel state
    ///
    /// Returns the session's bindings for persisting.
    pub fn end(mut self) -> BindingSet {
        self.tracker.stop();
        self.router.unbind_all();
        let bindings = self.carousel.bindings();
        self.carousel.deactivate();
        info!("Session ended");
        bindings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CarouselError;
    use crate::tracker::tests::{entries, FakeWindows};
    use crate::types::WindowHandle;
    use std::sync::mpsc::{self, Receiver};
    use std::thread;

    fn setup() -> (Arc<FakeWindows>, Arc<Carousel>, Receiver<UiEvent>) {
        let windows = Arc::new(FakeWindows::default());
        let (tx, rx) = mpsc::channel();
        let carousel = Arc::new(Carousel::new(windows.clone(), tx));
        carousel.activate(entries(), BindingSet::default()).unwrap();
        (windows, carousel, rx)
    }

    fn drain(rx: &Receiver<UiEvent>) -> Vec<DisplaySnapshot> {
        rx.try_iter()
            .filter_map(|event| match event {
                UiEvent::Display(snapshot) => Some(snapshot),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_activate_publishes_initial_frame() {
        let (_, _, rx) = setup();
        let frames = drain(&rx);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].current_index, 0);
    }

    #[test]
    fn test_activate_empty_is_rejected() {
        let (_, carousel, rx) = setup();
        drain(&rx);
        assert!(matches!(
            carousel.activate(Vec::new(), BindingSet::default()),
            Err(CarouselError::EmptySelection)
        ));
        assert!(drain(&rx).is_empty());
        assert_eq!(carousel.snapshot().entries.len(), 3);
    }

    #[test]
    fn test_next_focuses_and_publishes() {
        let (windows, carousel, rx) = setup();
        drain(&rx);

        carousel.on_action(Action::Next);
        assert_eq!(*windows.activated.lock(), vec![WindowHandle::new(2)]);
        let frames = drain(&rx);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].current_index, 1);

        carousel.on_action(Action::Previous);
        carousel.on_action(Action::Previous);
        assert_eq!(carousel.snapshot().current_index, 2);
        assert_eq!(windows.activated.lock().last(), Some(&WindowHandle::new(3)));
    }

    #[test]
    fn test_pause_blocks_focus_changes() {
        let (windows, carousel, rx) = setup();
        drain(&rx);

        carousel.on_action(Action::Pause);
        let frames = drain(&rx);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].paused);

        carousel.on_action(Action::Next);
        assert!(windows.activated.lock().is_empty());
        assert_eq!(carousel.snapshot().current_index, 0);
        assert!(drain(&rx).is_empty());

        assert!(!carousel.toggle_pause());
        carousel.on_action(Action::Next);
        assert_eq!(carousel.snapshot().current_index, 1);
    }

    #[test]
    fn test_focus_failure_keeps_index() {
        let (windows, carousel, rx) = setup();
        drain(&rx);
        windows.close(WindowHandle::new(2));

        carousel.step(Direction::Forward);
        assert_eq!(carousel.snapshot().current_index, 0);
        assert!(drain(&rx).is_empty());

        // Retry on the next gesture goes the other way and succeeds
        carousel.step(Direction::Backward);
        assert_eq!(carousel.snapshot().current_index, 2);
    }

    #[test]
    fn test_sync_follows_foreign_focus_and_ignores_strangers() {
        let (windows, carousel, rx) = setup();
        drain(&rx);

        windows.set_foreground(Some(WindowHandle::new(999)));
        carousel.sync_foreground();
        assert_eq!(carousel.snapshot().current_index, 0);

        windows.set_foreground(Some(WindowHandle::new(2)));
        carousel.sync_foreground();
        assert_eq!(carousel.snapshot().current_index, 1);
        assert_eq!(drain(&rx).len(), 1);

        // Foreground already current: no further frames
        carousel.sync_foreground();
        assert!(drain(&rx).is_empty());
    }

    #[test]
    fn test_sync_skips_one_poll_after_own_switch() {
        let (windows, carousel, rx) = setup();
        windows.set_foreground(Some(WindowHandle::new(1)));
        carousel.sync_foreground();
        drain(&rx);

        // The carousel switches to Bob, but the window manager still reports Alice
        carousel.step(Direction::Forward);
        windows.set_foreground(Some(WindowHandle::new(1)));
        carousel.sync_foreground();
        assert_eq!(carousel.snapshot().current_index, 1);

        // Then the window manager catches up
        windows.set_foreground(Some(WindowHandle::new(2)));
        carousel.sync_foreground();
        carousel.sync_foreground();
        assert_eq!(carousel.snapshot().current_index, 1);
        assert_eq!(drain(&rx).len(), 1);
    }

    #[test]
    fn test_sync_reconciles_when_foreground_returns() {
        let (windows, carousel, rx) = setup();
        windows.set_foreground(Some(WindowHandle::new(1)));
        carousel.sync_foreground();
        drain(&rx);

        // The switch to Bob lands, then focus goes back to Alice before the next poll
        carousel.step(Direction::Forward);
        assert_eq!(windows.foreground_window().unwrap(), Some(WindowHandle::new(2)));
        windows.set_foreground(Some(WindowHandle::new(1)));

        carousel.sync_foreground();
        assert_eq!(carousel.snapshot().current_index, 1);

        carousel.sync_foreground();
        assert_eq!(carousel.snapshot().current_index, 0);
        let frames = drain(&rx);
        assert_eq!(frames.last().map(|frame| frame.current_index), Some(0));

        // Stays in sync on later polls
        carousel.sync_foreground();
        assert_eq!(carousel.snapshot().current_index, 0);
        assert!(drain(&rx).is_empty());
    }

    #[test]
    fn test_concurrent_steps_and_polls_keep_index_valid() {
        let (windows, carousel, _rx) = setup();
        let mut workers = Vec::new();
        for worker in 0..4 {
            let carousel = Arc::clone(&carousel);
            let windows = Arc::clone(&windows);
            workers.push(thread::spawn(move || {
                for i in 0..200u32 {
                    match (worker + i) % 3 {
                        0 => carousel.on_action(Action::Next),
                        1 => carousel.on_action(Action::Previous),
                        _ => {
                            windows.set_foreground(Some(WindowHandle::new(i % 4)));
                            carousel.sync_foreground();
                        }
                    }
                }
            }));
        }
        for worker in workers {
            worker.join().unwrap();
        }
        let snapshot = carousel.snapshot();
        assert!(snapshot.current_index < snapshot.entries.len());
    }

    #[test]
    fn test_deactivate_then_actions_are_noops() {
        let (windows, carousel, rx) = setup();
        carousel.deactivate();
        drain(&rx);

        carousel.on_action(Action::Next);
        windows.set_foreground(Some(WindowHandle::new(2)));
        carousel.sync_foreground();

        assert!(windows.activated.lock().is_empty());
        assert!(drain(&rx).is_empty());
    }
}
