use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::binding::BindingSet;
use crate::constants::overlay;
use crate::error::{CarouselError, Result};
use crate::types::{CharacterEntry, Direction, WindowHandle};

/// What the overlay needs to draw one frame
#[derive(Debug, Clone, PartialEq)]
pub struct DisplaySnapshot {
    pub entries: Arc<[CharacterEntry]>,
    pub current_index: usize,
    pub class_counts: Arc<HashMap<String, usize>>,
    pub paused: bool,
}

impl DisplaySnapshot {
    fn at(&self, offset: isize) -> &CharacterEntry {
        let len = self.entries.len() as isize;
        let index = (self.current_index as isize + offset).rem_euclid(len) as usize;
        &self.entries[index]
    }

    pub fn current(&self) -> &CharacterEntry {
        self.at(0)
    }

    pub fn previous(&self) -> &CharacterEntry {
        self.at(-1)
    }

    pub fn next(&self) -> &CharacterEntry {
        self.at(1)
    }

    /// Distinguishing initial, shown only when another entry shares the class
    pub fn badge(&self, entry: &CharacterEntry) -> Option<char> {
        let count = self.class_counts.get(&entry.class_name).copied().unwrap_or(0);
        if count > 1 { entry.initial() } else { None }
    }

    pub fn opacity(&self) -> f32 {
        if self.paused {
            overlay::PAUSED_OPACITY
        } else {
            overlay::ACTIVE_OPACITY
        }
    }
}

/// Ordered window list plus the cycle position
#[derive(Debug)]
pub struct CarouselState {
    entries: Arc<[CharacterEntry]>,
    current_index: usize,
    paused: bool,
    class_counts: Arc<HashMap<String, usize>>,
    bindings: BindingSet,
}

impl Default for CarouselState {
    fn default() -> Self {
        Self {
            entries: Arc::from(Vec::new()),
            current_index: 0,
            paused: false,
            class_counts: Arc::new(HashMap::new()),
            bindings: BindingSet::unbound(),
        }
    }
}

fn count_classes(entries: &[CharacterEntry]) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for entry in entries {
        *counts.entry(entry.class_name.clone()).or_insert(0) += 1;
    }
    counts
}

impl CarouselState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a session over `entries`
    ///
    /// Rejects an empty list without touching the current state. Entries
    /// repeating an earlier handle are dropped.
    pub fn activate(&mut self, entries: Vec<CharacterEntry>, bindings: BindingSet) -> Result<DisplaySnapshot> {
        if entries.is_empty() {
            return Err(CarouselError::EmptySelection);
        }

        let mut seen = HashSet::new();
        let unique: Vec<CharacterEntry> = entries
            .into_iter()
            .filter(|entry| {
                let fresh = seen.insert(entry.handle);
                if !fresh {
                    warn!(character = %entry.display_name, handle = %entry.handle, "Dropping duplicate window");
                }
                fresh
            })
            .collect();

        self.class_counts = Arc::new(count_classes(&unique));
        self.entries = Arc::from(unique);
        self.current_index = 0;
        self.paused = false;
        self.bindings = bindings;
        info!(count = self.entries.len(), "Carousel activated");
        Ok(self.snapshot())
    }

    /// Drop the session's entries
    pub fn deactivate(&mut self) {
        *self = Self::default();
    }

    /// Move one position; no-op while paused or empty
    pub fn step(&mut self, direction: Direction) -> Option<DisplaySnapshot> {
        if self.paused || self.entries.is_empty() {
            debug!(paused = self.paused, "Ignoring step");
            return None;
        }
        let len = self.entries.len() as isize;
        self.current_index = (self.current_index as isize + direction.offset()).rem_euclid(len) as usize;
        Some(self.snapshot())
    }

    /// Follow a window that became current outside the carousel
    ///
    /// Unknown handles (windows outside the carousel) are ignored.
    pub fn set_current_by_handle(&mut self, handle: WindowHandle) -> Option<DisplaySnapshot> {
        let index = self.entries.iter().position(|entry| entry.handle == handle)?;
        if index == self.current_index {
            return None;
        }
        self.current_index = index;
        Some(self.snapshot())
    }

    /// Flip the pause flag and return the new value
    pub fn toggle_pause(&mut self) -> bool {
        self.paused = !self.paused;
        self.paused
    }

    /// Put the index back after a focus request failed
    pub(crate) fn rewind(&mut self, index: usize) {
        if index < self.entries.len() {
            self.current_index = index;
        }
    }

    pub fn snapshot(&self) -> DisplaySnapshot {
        DisplaySnapshot {
            entries: Arc::clone(&self.entries),
            current_index: self.current_index,
            class_counts: Arc::clone(&self.class_counts),
            paused: self.paused,
        }
    }

    #[cfg(test)]
    pub fn is_active(&self) -> bool {
        !self.entries.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn current(&self) -> Option<&CharacterEntry> {
        self.entries.get(self.current_index)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn bindings(&self) -> &BindingSet {
        &self.bindings
    }

    #[cfg(test)]
    pub fn class_count(&self, class_name: &str) -> usize {
        self.class_counts.get(class_name).copied().unwrap_or(0)
    }
}
