//! Yearly habit document
//!
//! One `HabitDocument` holds a calendar year of tracking state: the dates each
//! habit was completed, which habits are hidden, and the single-letter shortcuts.

use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};

lazy_static! {
    static ref HABIT_NAME: Regex = Regex::new(r"^[a-z][a-z0-9-]*$").unwrap();
}

/// Check a habit name against `[a-z][a-z0-9-]*`
pub fn is_valid_habit_name(name: &str) -> bool {
    HABIT_NAME.is_match(name)
}

/// Normalize user input into a habit name: trim, lowercase, and collapse
/// whitespace runs into single hyphens. The result is not validated.
pub fn normalize_habit_name(raw: &str) -> String {
    raw.split_whitespace()
        .map(|part| part.to_lowercase())
        .collect::<Vec<_>>()
        .join("-")
}

/// Tracking state for one calendar year
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HabitDocument {
    /// Completion dates per habit, ascending and unique
    pub habits: BTreeMap<String, BTreeSet<NaiveDate>>,
    /// Soft-deleted habits; their history stays in `habits`
    pub hidden: BTreeSet<String>,
    /// Shortcut letter to habit name
    pub shortcuts: BTreeMap<char, String>,
}

impl HabitDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Habits present in `habits` and not hidden, in ascending name order
    pub fn active_habits(&self) -> Vec<&str> {
        self.habits
            .keys()
            .filter(|name| !self.hidden.contains(*name))
            .map(String::as_str)
            .collect()
    }

    pub fn contains(&self, habit: &str) -> bool {
        self.habits.contains_key(habit)
    }

    pub fn is_active(&self, habit: &str) -> bool {
        self.contains(habit) && !self.is_hidden(habit)
    }

    pub fn is_hidden(&self, habit: &str) -> bool {
        self.hidden.contains(habit)
    }

    /// Letter currently assigned to `habit`, if any
    pub fn shortcut_for(&self, habit: &str) -> Option<char> {
        self.shortcuts
            .iter()
            .find(|(_, name)| name.as_str() == habit)
            .map(|(letter, _)| *letter)
    }

    /// Habit a shortcut letter points at
    pub fn resolve_shortcut(&self, letter: char) -> Option<&str> {
        self.shortcuts.get(&letter).map(String::as_str)
    }

    /// True when `habit` has `date` recorded
    pub fn is_tracked_on(&self, habit: &str, date: NaiveDate) -> bool {
        self.habits
            .get(habit)
            .is_some_and(|dates| dates.contains(&date))
    }

    /// Create a habit with no dates. Returns false if it already existed.
    pub fn insert_habit(&mut self, habit: &str) -> bool {
        if self.habits.contains_key(habit) {
            return false;
        }
        self.habits.insert(habit.to_string(), BTreeSet::new());
        true
    }

    /// Record `date` for `habit`. Returns false if the date was already there.
    pub fn track(&mut self, habit: &str, date: NaiveDate) -> bool {
        self.habits.entry(habit.to_string()).or_default().insert(date)
    }

    pub fn hide(&mut self, habit: &str) -> bool {
        self.hidden.insert(habit.to_string())
    }

    pub fn unhide(&mut self, habit: &str) -> bool {
        self.hidden.remove(habit)
    }

    /// Persist a shortcut. Existing letters are never reassigned.
    pub fn set_shortcut(&mut self, letter: char, habit: &str) -> bool {
        if self.shortcuts.contains_key(&letter) || self.shortcut_for(habit).is_some() {
            return false;
        }
        self.shortcuts.insert(letter, habit.to_string());
        true
    }

    /// Drop shortcuts whose habit is missing from `habits`
    pub fn prune_dangling_shortcuts(&mut self) -> Vec<char> {
        let dangling: Vec<char> = self
            .shortcuts
            .iter()
            .filter(|(_, habit)| !self.habits.contains_key(*habit))
            .map(|(letter, _)| *letter)
            .collect();
        for letter in &dangling {
            self.shortcuts.remove(letter);
        }
        dangling
    }

    /// A document written before shortcuts existed: no shortcut block, but
    /// active habits that would need one
    pub fn needs_shortcut_migration(&self) -> bool {
        self.shortcuts.is_empty() && !self.active_habits().is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.habits.is_empty() && self.hidden.is_empty() && self.shortcuts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_habit_name_validation() {
        assert!(is_valid_habit_name("meditation"));
        assert!(is_valid_habit_name("read-20-pages"));
        assert!(is_valid_habit_name("x"));
        assert!(!is_valid_habit_name(""));
        assert!(!is_valid_habit_name("1x"));
        assert!(!is_valid_habit_name("-run"));
        assert!(!is_valid_habit_name("Run"));
        assert!(!is_valid_habit_name("cold_shower"));
    }

    #[test]
    fn test_normalize_habit_name() {
        assert_eq!(normalize_habit_name("  Cold   Shower "), "cold-shower");
        assert_eq!(normalize_habit_name("Meditation"), "meditation");
        assert_eq!(normalize_habit_name("a\tb\nc"), "a-b-c");
        assert_eq!(normalize_habit_name("   "), "");
    }

    #[test]
    fn test_active_habits_exclude_hidden() {
        let mut doc = HabitDocument::new();
        doc.insert_habit("writing");
        doc.insert_habit("meditation");
        doc.insert_habit("reading");
        doc.hide("reading");

        assert_eq!(doc.active_habits(), vec!["meditation", "writing"]);
        assert!(doc.is_active("writing"));
        assert!(!doc.is_active("reading"));
        assert!(doc.contains("reading"));
    }

    #[test]
    fn test_track_is_idempotent() {
        let mut doc = HabitDocument::new();
        doc.insert_habit("reading");
        assert!(doc.track("reading", date("2025-03-02")));
        assert!(!doc.track("reading", date("2025-03-02")));
        assert!(doc.track("reading", date("2025-03-01")));

        let dates: Vec<_> = doc.habits["reading"].iter().copied().collect();
        assert_eq!(dates, vec![date("2025-03-01"), date("2025-03-02")]);
        assert!(doc.is_tracked_on("reading", date("2025-03-01")));
        assert!(!doc.is_tracked_on("reading", date("2025-03-03")));
    }

    #[test]
    fn test_shortcut_letters_are_never_reassigned() {
        let mut doc = HabitDocument::new();
        doc.insert_habit("meditation");
        doc.insert_habit("music");
        assert!(doc.set_shortcut('m', "meditation"));
        assert!(!doc.set_shortcut('m', "music"));
        assert!(!doc.set_shortcut('e', "meditation"));
        assert_eq!(doc.shortcut_for("meditation"), Some('m'));
        assert_eq!(doc.resolve_shortcut('m'), Some("meditation"));
        assert_eq!(doc.shortcut_for("music"), None);
    }

    #[test]
    fn test_prune_dangling_shortcuts() {
        let mut doc = HabitDocument::new();
        doc.insert_habit("reading");
        doc.shortcuts.insert('r', "reading".to_string());
        doc.shortcuts.insert('g', "ghost".to_string());

        assert_eq!(doc.prune_dangling_shortcuts(), vec!['g']);
        assert_eq!(doc.shortcuts.len(), 1);
    }

    #[test]
    fn test_needs_shortcut_migration() {
        let mut doc = HabitDocument::new();
        assert!(!doc.needs_shortcut_migration());

        doc.insert_habit("reading");
        assert!(doc.needs_shortcut_migration());

        doc.hide("reading");
        assert!(!doc.needs_shortcut_migration());

        doc.unhide("reading");
        doc.set_shortcut('r', "reading");
        assert!(!doc.needs_shortcut_migration());
    }
}
