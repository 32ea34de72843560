//! Picking game windows out of the window list and ordering them

use tracing::debug;

use crate::constants::discovery;
use crate::types::{CharacterEntry, WindowHandle};

/// Split a client title (`"Name - Class - 2.70 - Release"`) into name and class
///
/// Titles without `pattern` or with fewer than two parts are not game windows.
pub fn parse_title(title: &str, pattern: &str) -> Option<(String, String)> {
    if !title.contains(pattern) {
        return None;
    }
    let mut parts = title.split(discovery::TITLE_SEPARATOR).map(str::trim);
    let name = parts.next().filter(|name| !name.is_empty())?;
    let class = parts.next().filter(|class| !class.is_empty())?;
    Some((name.to_string(), class.to_string()))
}

/// Build entries from `(handle, title)` pairs, skipping foreign windows
pub fn entries_from_titles<I>(windows: I, pattern: &str) -> Vec<CharacterEntry>
where
    I: IntoIterator<Item = (WindowHandle, String)>,
{
    windows
        .into_iter()
        .filter_map(|(handle, title)| match parse_title(&title, pattern) {
            Some((name, class)) => Some(CharacterEntry::new(name, class, handle)),
            None => {
                debug!(handle = %handle, title = %title, "Skipping window");
                None
            }
        })
        .collect()
}

/// Put the names in `order` first (case-insensitive, in that order), then the rest as discovered
pub fn order_entries(discovered: Vec<CharacterEntry>, order: &[String]) -> Vec<CharacterEntry> {
    let mut remaining = discovered;
    let mut ordered = Vec::with_capacity(remaining.len());
    for name in order {
        if let Some(index) = remaining
            .iter()
            .position(|entry| entry.display_name.eq_ignore_ascii_case(name.trim()))
        {
            ordered.push(remaining.remove(index));
        } else {
            debug!(name = %name, "Ordered character not found");
        }
    }
    ordered.extend(remaining);
    ordered
}
