//! Single-letter habit shortcuts
//!
//! Letters are assigned once, when a habit is created or when an older
//! document is migrated, and then persisted. Nothing here recomputes the whole
//! map, so existing letters never move.

use crate::document::HabitDocument;
use std::collections::BTreeMap;

/// Letters the dispatcher reads as `help` and `list` before any shortcut
pub const RESERVED: [char; 2] = ['h', 'l'];

/// Pick a free letter for `habit`.
///
/// Tries the first letter of each hyphen-separated segment in order, then every
/// character of the name with hyphens removed. Returns `None` when all of them
/// are taken or reserved.
pub fn assign(habit: &str, existing: &BTreeMap<char, String>) -> Option<char> {
    let is_free = |c: &char| !RESERVED.contains(c) && !existing.contains_key(c);

    let segment_initials = habit.split('-').filter_map(|segment| segment.chars().next());
    let all_chars = habit.chars().filter(|c| *c != '-');

    segment_initials.chain(all_chars).find(is_free)
}

/// Give `habit` a shortcut in `doc` if it has none and a letter is free
pub fn assign_into(doc: &mut HabitDocument, habit: &str) -> Option<char> {
    if let Some(letter) = doc.shortcut_for(habit) {
        return Some(letter);
    }
    let letter = assign(habit, &doc.shortcuts)?;
    doc.set_shortcut(letter, habit);
    Some(letter)
}

/// Backfill shortcuts for every active habit without one, in ascending name
/// order. Returns the newly assigned `(letter, habit)` pairs.
pub fn backfill(doc: &mut HabitDocument) -> Vec<(char, String)> {
    let pending: Vec<String> = doc
        .active_habits()
        .into_iter()
        .filter(|habit| doc.shortcut_for(habit).is_none())
        .map(str::to_string)
        .collect();

    let mut assigned = Vec::new();
    for habit in pending {
        if let Some(letter) = assign(&habit, &doc.shortcuts) {
            doc.set_shortcut(letter, &habit);
            assigned.push((letter, habit));
        }
    }
    assigned
}
