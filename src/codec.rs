//! Habit document text format
//!
//! A narrow, YAML-looking line format:
//!
//! ```text
//! _hidden:
//!   - "reading"
//!
//! _shortcuts:
//!   m: "meditation"
//!
//! meditation:
//!   - "2025-01-04"
//!
//! reading:
//! ```
//!
//! Decoding is a line state machine over named blocks. Lines that do not fit
//! the current block are skipped, so older and hand-edited files still load.

use crate::document::{is_valid_habit_name, HabitDocument};
use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;

const HIDDEN_KEY: &str = "_hidden";
const SHORTCUTS_KEY: &str = "_shortcuts";
const DATE_FORMAT: &str = "%Y-%m-%d";

lazy_static! {
    static ref BLOCK_HEADER: Regex = Regex::new(r"^([a-z_][a-z0-9_-]*):$").unwrap();
    static ref LIST_ENTRY: Regex = Regex::new(r#"^\s+-\s+"?([^"\s]+)"?\s*$"#).unwrap();
    static ref SHORTCUT_ENTRY: Regex =
        Regex::new(r#"^\s+([a-z0-9]):\s+"?([a-z][a-z0-9-]*)"?\s*$"#).unwrap();
    static ref DATE: Regex = Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap();
}

/// Block the decoder is currently inside
#[derive(Debug, Clone, PartialEq, Eq)]
enum Block {
    None,
    Hidden,
    Shortcuts,
    Habit(String),
    /// An unknown `_key:` block; its entries are skipped
    Unknown,
}

impl Block {
    fn from_header(key: &str) -> Self {
        match key {
            HIDDEN_KEY => Block::Hidden,
            SHORTCUTS_KEY => Block::Shortcuts,
            name if is_valid_habit_name(name) => Block::Habit(name.to_string()),
            _ => Block::Unknown,
        }
    }
}

/// Parse document text. Never fails; unrecognized lines are ignored.
pub fn decode(text: &str) -> HabitDocument {
    let mut doc = HabitDocument::new();
    let mut block = Block::None;

    for raw in text.lines() {
        let line = raw.trim_end_matches('\r');

        if let Some(caps) = BLOCK_HEADER.captures(line) {
            block = Block::from_header(&caps[1]);
            if let Block::Habit(name) = &block {
                doc.insert_habit(name);
            }
            continue;
        }

        match &block {
            Block::Habit(name) => {
                if let Some(date) = list_entry(line).and_then(parse_date) {
                    doc.track(name, date);
                }
            }
            Block::Hidden => {
                if let Some(name) = list_entry(line).filter(|n| is_valid_habit_name(n)) {
                    doc.hide(name);
                }
            }
            Block::Shortcuts => {
                if let Some(caps) = SHORTCUT_ENTRY.captures(line) {
                    if let Some(letter) = caps[1].chars().next() {
                        doc.set_shortcut(letter, &caps[2]);
                    }
                }
            }
            Block::None | Block::Unknown => {}
        }
    }

    let dangling = doc.prune_dangling_shortcuts();
    if !dangling.is_empty() {
        log::warn!("Dropped shortcuts for missing habits: {:?}", dangling);
    }

    doc
}

fn list_entry(line: &str) -> Option<&str> {
    LIST_ENTRY
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    if !DATE.is_match(value) {
        return None;
    }
    NaiveDate::parse_from_str(value, DATE_FORMAT).ok()
}

/// Render a document. `_hidden` and `_shortcuts` come first when non-empty,
/// then habits in name order. Each non-empty block is followed by a blank line.
pub fn encode(doc: &HabitDocument) -> String {
    let mut lines: Vec<String> = Vec::new();

    if !doc.hidden.is_empty() {
        lines.push(format!("{}:", HIDDEN_KEY));
        for habit in &doc.hidden {
            lines.push(format!("  - \"{}\"", habit));
        }
        lines.push(String::new());
    }

    if !doc.shortcuts.is_empty() {
        lines.push(format!("{}:", SHORTCUTS_KEY));
        for (letter, habit) in &doc.shortcuts {
            lines.push(format!("  {}: \"{}\"", letter, habit));
        }
        lines.push(String::new());
    }

    for (habit, dates) in &doc.habits {
        lines.push(format!("{}:", habit));
        for date in dates {
            lines.push(format!("  - \"{}\"", date.format(DATE_FORMAT)));
        }
        if !dates.is_empty() {
            lines.push(String::new());
        }
    }

    lines.join("\n") + "\n"
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::{BTreeMap, BTreeSet};

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    const CURRENT: &str = r#"_hidden:
  - "reading"

_shortcuts:
  m: "meditation"
  r: "reading"
  w: "writing"

meditation:
  - "2025-01-01"
  - "2025-01-02"

reading:
  - "2025-01-01"

writing:
"#;

    #[test]
    fn test_decode_current_format() {
        let doc = decode(CURRENT);

        assert_eq!(doc.habits.len(), 3);
        assert_eq!(doc.habits["meditation"].len(), 2);
        assert!(doc.habits["writing"].is_empty());
        assert!(doc.is_hidden("reading"));
        assert_eq!(doc.resolve_shortcut('w'), Some("writing"));
        assert_eq!(doc.shortcut_for("reading"), Some('r'));
    }

    #[test]
    fn test_encode_is_stable() {
        assert_eq!(encode(&decode(CURRENT)), CURRENT);
    }

    #[test]
    fn test_decode_legacy_format_without_shortcuts() {
        let legacy = "_hidden:\n  - \"old\"\n\nexercise:\n  - \"2024-12-30\"\n\nold:\n";
        let doc = decode(legacy);

        assert!(doc.shortcuts.is_empty());
        assert_eq!(doc.active_habits(), vec!["exercise"]);
        assert!(doc.needs_shortcut_migration());
    }

    #[test]
    fn test_decode_empty_text() {
        assert!(decode("").is_empty());
        assert!(decode("\n\n").is_empty());
    }

    #[test]
    fn test_decode_ignores_junk() {
        let text = "# comment\nexercise:\n  - \"2025-02-30\"\n  - \"not-a-date\"\n  - 2025-02-01\n\
                    _future:\n  - \"x\"\ncold_shower:\n  - \"2025-02-03\"\n";
        let doc = decode(text);

        assert_eq!(doc.habits.len(), 1);
        let dates: Vec<_> = doc.habits["exercise"].iter().copied().collect();
        assert_eq!(dates, vec![date("2025-02-01")]);
    }

    #[test]
    fn test_decode_sorts_and_dedupes_dates() {
        let text = "run:\n  - \"2025-01-03\"\n  - \"2025-01-01\"\n  - \"2025-01-03\"\n";
        let doc = decode(text);
        let dates: Vec<_> = doc.habits["run"].iter().copied().collect();
        assert_eq!(dates, vec![date("2025-01-01"), date("2025-01-03")]);
    }

    #[test]
    fn test_decode_handles_crlf() {
        let doc = decode("run:\r\n  - \"2025-01-01\"\r\n");
        assert_eq!(doc.habits["run"].len(), 1);
    }

    #[test]
    fn test_decode_drops_dangling_shortcuts() {
        let doc = decode("_shortcuts:\n  g: \"ghost\"\n  r: \"run\"\n\nrun:\n");
        assert_eq!(doc.shortcuts.len(), 1);
        assert_eq!(doc.resolve_shortcut('r'), Some("run"));
    }

    #[test]
    fn test_encode_orders_blocks() {
        let mut doc = HabitDocument::new();
        doc.insert_habit("zen");
        doc.track("alpha", date("2025-05-05"));
        doc.hide("zen");
        doc.set_shortcut('a', "alpha");

        let text = encode(&doc);
        let hidden_at = text.find("_hidden:").unwrap();
        let shortcuts_at = text.find("_shortcuts:").unwrap();
        let alpha_at = text.find("alpha:").unwrap();
        let zen_at = text.find("\nzen:").unwrap();
        assert!(hidden_at < shortcuts_at);
        assert!(shortcuts_at < alpha_at);
        assert!(alpha_at < zen_at);
    }

    #[test]
    fn test_encode_empty_document() {
        assert_eq!(encode(&HabitDocument::new()), "\n");
    }

    fn arb_document() -> impl Strategy<Value = HabitDocument> {
        let name = "[a-z][a-z0-9-]{0,8}";
        let dates = prop::collection::btree_set(0u32..365, 0..6);
        prop::collection::btree_map(name, dates, 0..6).prop_flat_map(|habits| {
            let names: Vec<String> = habits.keys().cloned().collect();
            let count = names.len();
            (
                Just(habits),
                Just(names),
                prop::collection::vec(any::<bool>(), count),
                prop::collection::vec(prop::option::of(0u8..26), count),
            )
        })
        .prop_map(|(habits, names, hidden_flags, letters)| {
            let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
            let mut doc = HabitDocument {
                habits: habits
                    .into_iter()
                    .map(|(name, days)| {
                        let dates: BTreeSet<NaiveDate> = days
                            .into_iter()
                            .map(|d| start + chrono::Duration::days(i64::from(d)))
                            .collect();
                        (name, dates)
                    })
                    .collect::<BTreeMap<_, _>>(),
                ..HabitDocument::default()
            };
            for (name, hidden) in names.iter().zip(hidden_flags) {
                if hidden {
                    doc.hide(name);
                }
            }
            for (name, letter) in names.iter().zip(letters) {
                if let Some(offset) = letter {
                    doc.set_shortcut(char::from(b'a' + offset), name);
                }
            }
            doc
        })
    }

    proptest! {
        #[test]
        fn prop_decode_inverts_encode(doc in arb_document()) {
            prop_assert_eq!(decode(&encode(&doc)), doc);
        }
    }
}
