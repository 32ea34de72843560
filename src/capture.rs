use anyhow::{anyhow, Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, info};

use crate::binding::BindingDescriptor;
use crate::constants::input;
use crate::input::{Gesture, HeldModifiers, InputDevices, ESCAPE};

/// Result of one captured gesture
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    Bound(BindingDescriptor),
    /// Escape was pressed: the binding should be cleared
    Cleared,
}

impl CaptureOutcome {
    pub fn into_binding(self) -> Option<BindingDescriptor> {
        match self {
            CaptureOutcome::Bound(binding) => Some(binding),
            CaptureOutcome::Cleared => None,
        }
    }
}

/// Turns a stream of gestures into exactly one outcome
#[derive(Debug, Default)]
pub struct CaptureResolver {
    modifiers: HeldModifiers,
}

impl CaptureResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one gesture; returns the outcome once the gesture resolves
    pub fn feed(&mut self, gesture: Gesture) -> Option<CaptureOutcome> {
        match gesture {
            Gesture::KeyDown(ESCAPE) => Some(CaptureOutcome::Cleared),
            Gesture::KeyDown(name) => {
                if self.modifiers.press(name) {
                    None
                } else {
                    Some(CaptureOutcome::Bound(self.modifiers.combine(name)))
                }
            }
            Gesture::KeyUp(name) => {
                self.modifiers.release(name);
                None
            }
            Gesture::ButtonDown(button) => Some(CaptureOutcome::Bound(BindingDescriptor::mouse(button))),
        }
    }
}

/// Block until the user performs one gesture, with keyboards grabbed until it returns
pub fn capture() -> Result<CaptureOutcome> {
    let mut devices = InputDevices::open().context("Failed to open input devices for capture")?;
    devices.grab_keyboards();
    let outcome = resolve_from(&mut devices);
    devices.release();
    outcome
}

fn resolve_from(devices: &mut InputDevices) -> Result<CaptureOutcome> {
    let mut resolver = CaptureResolver::new();
    loop {
        for gesture in devices.poll(input::POLL_TIMEOUT_MS)? {
            debug!(gesture = ?gesture, "Capture saw gesture");
            if let Some(outcome) = resolver.feed(gesture) {
                return Ok(outcome);
            }
        }
    }
}

/// Runs [`capture`] on a background thread, one capture at a time
#[derive(Debug, Clone, Default)]
pub struct BindingCapture {
    capturing: Arc<AtomicBool>,
}

impl BindingCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start capturing off the calling thread; `None` if a capture is already running
    pub fn start(&self) -> Option<thread::JoinHandle<Result<CaptureOutcome>>> {
        if self.capturing.swap(true, Ordering::AcqRel) {
            debug!("Capture already in progress");
            return None;
        }

        let capturing = Arc::clone(&self.capturing);
        let spawned = thread::Builder::new()
            .name("binding-capture".to_string())
            .spawn(move || {
                info!("Listening for a binding gesture (Esc clears)");
                let outcome = capture();
                capturing.store(false, Ordering::Release);
                outcome
            });

        match spawned {
            Ok(handle) => Some(handle),
            Err(e) => {
                self.capturing.store(false, Ordering::Release);
                tracing::error!(error = %e, "Failed to spawn capture thread");
                None
            }
        }
    }
}

/// Wait for a capture started with [`BindingCapture::start`]
pub fn join(handle: thread::JoinHandle<Result<CaptureOutcome>>) -> Result<CaptureOutcome> {
    handle.join().map_err(|_| anyhow!("Capture thread panicked"))?
}
