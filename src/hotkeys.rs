use anyhow::Result;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, info, warn};

use crate::binding::{is_modifier, Action, BindingDescriptor, BindingSet, MouseButton};
use crate::constants::input;
use crate::error::CarouselError;
use crate::input::{is_bindable_key, Gesture, HeldModifiers, InputDevices};

/// Receives actions from the listener thread
pub trait ActionHandler: Send + Sync {
    fn on_action(&self, action: Action);
}

/// Descriptor → action lookup built from a [`BindingSet`]
#[derive(Debug, Default)]
pub struct BindingTable {
    keys: HashMap<BindingDescriptor, Action>,
    buttons: HashMap<MouseButton, Action>,
}

impl BindingTable {
    /// Register one binding; a descriptor already in the table is taken over
    pub fn register(&mut self, action: Action, binding: &BindingDescriptor) -> Result<(), CarouselError> {
        if let Some(name) = binding.mouse_button_name() {
            let Some(button) = MouseButton::from_name(name) else {
                return Err(CarouselError::binding_registration(action, binding, "unknown mouse button"));
            };
            if button != MouseButton::Middle {
                // Accepted for round-tripping, but only the middle button is wired
                warn!(action = %action, binding = %binding, "Only the middle mouse button triggers actions");
                return Ok(());
            }
            self.buttons.insert(button, action);
            return Ok(());
        }

        let Some((key, modifiers)) = binding.split_keys() else {
            return Err(CarouselError::binding_registration(action, binding, "malformed binding"));
        };
        if is_modifier(key) {
            return Err(CarouselError::binding_registration(action, binding, "a binding needs a non-modifier key"));
        }
        if !is_bindable_key(key) {
            return Err(CarouselError::binding_registration(action, binding, format!("unknown key '{key}'")));
        }
        if let Some(unknown) = modifiers.iter().find(|m| !is_modifier(m)) {
            return Err(CarouselError::binding_registration(action, binding, format!("unknown modifier '{unknown}'")));
        }

        if let Some(previous) = self.keys.insert(binding.clone(), action) {
            warn!(binding = %binding, replaced = %previous, action = %action, "Binding shared by two actions, last one wins");
        }
        Ok(())
    }

    /// Build a table from every bound action, collecting failures
    pub fn from_bindings(bindings: &BindingSet) -> (Self, Vec<CarouselError>) {
        let mut table = Self::default();
        let mut failures = Vec::new();
        for (action, binding) in bindings.iter() {
            if let Err(e) = table.register(action, binding) {
                failures.push(e);
            }
        }
        (table, failures)
    }

    pub fn resolve_key(&self, binding: &BindingDescriptor) -> Option<Action> {
        self.keys.get(binding).copied()
    }

    pub fn resolve_button(&self, button: MouseButton) -> Option<Action> {
        self.buttons.get(&button).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty() && self.buttons.is_empty()
    }

    /// Actions reachable through the table, in registration order
    pub fn actions(&self) -> Vec<Action> {
        Action::ALL
            .into_iter()
            .filter(|action| self.keys.values().chain(self.buttons.values()).any(|a| a == action))
            .collect()
    }
}

/// Tracks held modifiers and turns gestures into actions
#[derive(Debug)]
pub struct HotkeyMatcher {
    table: BindingTable,
    modifiers: HeldModifiers,
}

impl HotkeyMatcher {
    pub fn new(table: BindingTable) -> Self {
        Self {
            table,
            modifiers: HeldModifiers::new(),
        }
    }

    /// Feed one gesture; a key matches only with exactly its modifiers held
    pub fn feed(&mut self, gesture: Gesture) -> Option<Action> {
        match gesture {
            Gesture::KeyDown(name) => {
                if self.modifiers.press(name) {
                    return None;
                }
                self.table.resolve_key(&self.modifiers.combine(name))
            }
            Gesture::KeyUp(name) => {
                self.modifiers.release(name);
                None
            }
            Gesture::ButtonDown(button) => self.table.resolve_button(button),
        }
    }
}

struct Listener {
    active: Arc<AtomicBool>,
    handle: thread::JoinHandle<()>,
}

/// Owns the hotkey listener thread for one session
#[derive(Default)]
pub struct InputRouter {
    listener: Option<Listener>,
}

impl InputRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every bound action, replacing any earlier registration
    ///
    /// Returns one error per binding that could not be registered; the rest
    /// stay active.
    pub fn bind(&mut self, bindings: &BindingSet, handler: Arc<dyn ActionHandler>) -> Vec<CarouselError> {
        self.unbind_all();

        let (table, mut failures) = BindingTable::from_bindings(bindings);
        if table.is_empty() {
            info!("No bindings to listen for");
            return failures;
        }

        let actions = table.actions();
        let devices = match InputDevices::open() {
            Ok(devices) => devices,
            Err(e) => {
                failures.extend(registration_failures(bindings, &actions, &format!("{e:#}")));
                return failures;
            }
        };

        let active = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&active);
        let matcher = HotkeyMatcher::new(table);
        let spawned = thread::Builder::new()
            .name(input::LISTENER_THREAD_NAME.to_string())
            .spawn(move || {
                if let Err(e) = listen(devices, matcher, handler, &flag) {
                    error!(error = %e, "Hotkey listener error");
                }
            });

        match spawned {
            Ok(handle) => {
                info!(actions = ?actions, "Hotkey listener started");
                self.listener = Some(Listener { active, handle });
            }
            Err(e) => failures.extend(registration_failures(bindings, &actions, &e.to_string())),
        }
        failures
    }

    /// Stop dispatching and wait for the listener to exit; safe to repeat
    pub fn unbind_all(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        listener.active.store(false, Ordering::Release);
        if listener.handle.join().is_err() {
            error!("Hotkey listener thread panicked");
        }
        info!("Hotkeys unregistered");
    }

    #[cfg(test)]
    pub fn is_bound(&self) -> bool {
        self.listener.is_some()
    }
}

impl Drop for InputRouter {
    fn drop(&mut self) {
        self.unbind_all();
    }
}

fn registration_failures(bindings: &BindingSet, actions: &[Action], reason: &str) -> Vec<CarouselError> {
    actions
        .iter()
        .map(|&action| {
            let binding = bindings.get(action).map(|b| b.to_string()).unwrap_or_default();
            CarouselError::binding_registration(action, binding, reason)
        })
        .collect()
}

fn listen(
    mut devices: InputDevices,
    mut matcher: HotkeyMatcher,
    handler: Arc<dyn ActionHandler>,
    active: &AtomicBool,
) -> Result<()> {
    while active.load(Ordering::Acquire) {
        for gesture in devices.poll(input::POLL_TIMEOUT_MS)? {
            let Some(action) = matcher.feed(gesture) else {
                continue;
            };
            // No dispatch once unbinding has started
            if !active.load(Ordering::Acquire) {
                break;
            }
            debug!(gesture = ?gesture, action = %action, "Hotkey matched");
            handler.on_action(action);
        }
    }
    debug!("Hotkey listener loop exited");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(text: &str) -> BindingDescriptor {
        BindingDescriptor::parse(text).unwrap()
    }

    fn matcher(bindings: &BindingSet) -> HotkeyMatcher {
        let (table, failures) = BindingTable::from_bindings(bindings);
        assert!(failures.is_empty(), "unexpected failures: {failures:?}");
        HotkeyMatcher::new(table)
    }

    #[test]
    fn test_default_bindings_register() {
        let (table, failures) = BindingTable::from_bindings(&BindingSet::default());
        assert!(failures.is_empty());
        assert_eq!(table.actions(), vec![Action::Previous, Action::Next, Action::Pause]);
        assert_eq!(table.resolve_key(&binding("alt+1")), Some(Action::Previous));
        assert_eq!(table.resolve_button(MouseButton::Middle), Some(Action::Pause));
    }

    #[test]
    fn test_matcher_requires_modifiers() {
        let mut matcher = matcher(&BindingSet::default());
        assert_eq!(matcher.feed(Gesture::KeyDown("2")), None);
        assert_eq!(matcher.feed(Gesture::KeyUp("2")), None);

        assert_eq!(matcher.feed(Gesture::KeyDown("alt")), None);
        assert_eq!(matcher.feed(Gesture::KeyDown("2")), Some(Action::Next));
        assert_eq!(matcher.feed(Gesture::KeyUp("2")), None);
        assert_eq!(matcher.feed(Gesture::KeyDown("1")), Some(Action::Previous));
    }

    #[test]
    fn test_matcher_rejects_extra_modifiers() {
        let mut matcher = matcher(&BindingSet::default());
        matcher.feed(Gesture::KeyDown("alt"));
        matcher.feed(Gesture::KeyDown("shift"));
        assert_eq!(matcher.feed(Gesture::KeyDown("1")), None);

        matcher.feed(Gesture::KeyUp("shift"));
        assert_eq!(matcher.feed(Gesture::KeyDown("1")), Some(Action::Previous));
    }

    #[test]
    fn test_released_modifier_stops_matching() {
        let mut matcher = matcher(&BindingSet::default());
        matcher.feed(Gesture::KeyDown("alt"));
        matcher.feed(Gesture::KeyUp("alt"));
        assert_eq!(matcher.feed(Gesture::KeyDown("1")), None);
    }

    #[test]
    fn test_middle_mouse_toggles_pause() {
        let mut matcher = matcher(&BindingSet::default());
        assert_eq!(matcher.feed(Gesture::ButtonDown(MouseButton::Middle)), Some(Action::Pause));
        assert_eq!(matcher.feed(Gesture::ButtonDown(MouseButton::Left)), None);
    }

    #[test]
    fn test_middle_mouse_on_any_action() {
        let mut bindings = BindingSet::unbound();
        bindings.set(Action::Next, Some(BindingDescriptor::mouse(MouseButton::Middle)));
        let mut matcher = matcher(&bindings);
        assert_eq!(matcher.feed(Gesture::ButtonDown(MouseButton::Middle)), Some(Action::Next));
    }

    #[test]
    fn test_other_mouse_buttons_are_inert() {
        let mut bindings = BindingSet::unbound();
        bindings.set(Action::Pause, Some(BindingDescriptor::mouse(MouseButton::X2)));
        let (table, failures) = BindingTable::from_bindings(&bindings);
        assert!(failures.is_empty());
        assert!(table.is_empty());
        assert_eq!(table.resolve_button(MouseButton::X2), None);
    }

    #[test]
    fn test_collision_last_registration_wins() {
        let mut bindings = BindingSet::unbound();
        bindings.set(Action::Previous, Some(binding("f5")));
        bindings.set(Action::Next, Some(binding("f5")));
        let (table, failures) = BindingTable::from_bindings(&bindings);
        assert!(failures.is_empty());
        assert_eq!(table.resolve_key(&binding("f5")), Some(Action::Next));
        assert_eq!(table.actions(), vec![Action::Next]);
    }

    #[test]
    fn test_unknown_key_fails_but_others_register() {
        let mut bindings = BindingSet::default();
        bindings.set(Action::Previous, Some(binding("alt+hyper")));
        let (table, failures) = BindingTable::from_bindings(&bindings);

        assert_eq!(failures.len(), 1);
        assert!(matches!(
            &failures[0],
            CarouselError::BindingRegistration { action: Action::Previous, .. }
        ));
        assert_eq!(table.resolve_key(&binding("alt+2")), Some(Action::Next));
        assert_eq!(table.resolve_button(MouseButton::Middle), Some(Action::Pause));
    }

    #[test]
    fn test_modifier_only_binding_fails() {
        let mut table = BindingTable::default();
        let err = table.register(Action::Next, &binding("ctrl")).unwrap_err();
        assert!(err.to_string().contains("non-modifier"));
        assert!(table.is_empty());
    }

    #[test]
    fn test_unknown_modifier_fails() {
        let mut table = BindingTable::default();
        assert!(table.register(Action::Next, &binding("hyper+1")).is_err());
    }

    #[test]
    fn test_unknown_mouse_button_fails() {
        let mut table = BindingTable::default();
        assert!(table.register(Action::Pause, &binding("wheel mouse")).is_err());
    }

    struct Recorder;

    impl ActionHandler for Recorder {
        fn on_action(&self, _action: Action) {}
    }

    #[test]
    fn test_unbound_router_is_idle() {
        let mut router = InputRouter::new();
        let failures = router.bind(&BindingSet::unbound(), Arc::new(Recorder));
        assert!(failures.is_empty());
        assert!(!router.is_bound());
        router.unbind_all();
        router.unbind_all();
    }
}
