use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::carousel::Carousel;
use crate::constants::tracker;
use crate::error::CarouselError;
use crate::types::WindowHandle;

/// Window manager operations the carousel depends on
pub trait WindowSystem: Send + Sync {
    /// Currently focused top-level window, if any
    fn foreground_window(&self) -> Result<Option<WindowHandle>>;

    /// Synthetic input so the window manager accepts the next focus request
    fn send_neutral_key(&self) -> Result<()>;

    /// Ask the window manager to raise and focus `handle`
    fn activate_window(&self, handle: WindowHandle) -> Result<()>;
}

/// Bring `handle` to the foreground
///
/// A failing neutral key is only logged; a failing activation is returned.
pub fn apply_focus(windows: &dyn WindowSystem, handle: WindowHandle) -> Result<(), CarouselError> {
    if let Err(e) = windows.send_neutral_key() {
        warn!(error = %e, "Failed to send neutral key before focus request");
    }
    windows
        .activate_window(handle)
        .map_err(|e| CarouselError::focus_apply(handle, &e))
}

/// Background poll loop over the foreground window
pub struct ForegroundTracker {
    active: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ForegroundTracker {
    /// Start polling every `interval` until [`stop`](Self::stop)
    pub fn spawn(carousel: Arc<Carousel>, interval: Duration) -> Result<Self> {
        let active = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&active);
        let handle = thread::Builder::new()
            .name(tracker::THREAD_NAME.to_string())
            .spawn(move || run(carousel, flag, interval))?;

        info!(interval_ms = interval.as_millis() as u64, "Foreground tracking started");
        Ok(Self {
            active,
            handle: Some(handle),
        })
    }

    /// A tracker with no thread, used when spawning failed
    pub fn idle() -> Self {
        Self {
            active: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Clear the active flag, wake the thread and wait for it to exit
    pub fn stop(&mut self) {
        self.active.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            if handle.join().is_err() {
                error!("Foreground tracker thread panicked");
            }
            info!("Foreground tracking stopped");
        }
    }
}

impl Drop for ForegroundTracker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(carousel: Arc<Carousel>, active: Arc<AtomicBool>, interval: Duration) {
    while active.load(Ordering::Acquire) {
        carousel.sync_foreground();
        // Woken early by stop()
        thread::park_timeout(interval);
    }
    debug!("Foreground tracker loop exited");
}
