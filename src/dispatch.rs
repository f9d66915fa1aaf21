//! Chat command dispatcher
//!
//! Turns one message into one reply. Every call loads the current year's
//! document, and commands that change it write it back exactly once, conditioned
//! on the version token from that load.
//!
//! | Input | Effect |
//! |-------|--------|
//! | `help`, `h` | habits with shortcuts plus command summary |
//! | `list`, `l` | today's checklist |
//! | `/add <name>` | create, or restore if hidden |
//! | `/delete <name>` | hide, keeping history |
//! | `/restore <name>` | un-hide |
//! | anything else | track a habit by shortcut or name |

use crate::clock::Clock;
use crate::document::{is_valid_habit_name, normalize_habit_name, HabitDocument};
use crate::shortcuts;
use crate::store::{FileStore, HabitStore, StoreError, VersionedDocument};
use chrono::{Datelike, NaiveDate};
use std::borrow::Cow;
use thiserror::Error;

const INVALID_NAME: &str = "Invalid habit name. Use lowercase letters, numbers, and hyphens.";
const NO_FILE: &str = "No habits file found.";
const CONFLICT: &str = "Habits changed while saving, so nothing was recorded. Send the command again.";

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, DispatchError>;

/// A parsed chat message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    List,
    Add(String),
    Delete(String),
    Restore(String),
    /// Shortcut letter or habit name, lowercased
    Track(String),
}

impl Command {
    /// Parse a message. Matching is case-insensitive on the trimmed text.
    pub fn parse(text: &str) -> Self {
        let lower = text.trim().to_lowercase();

        match lower.as_str() {
            "help" | "h" | "/help" | "/start" => return Command::Help,
            "list" | "l" | "/list" => return Command::List,
            _ => {}
        }

        let (head, rest) = lower
            .split_once(char::is_whitespace)
            .unwrap_or((lower.as_str(), ""));
        // Telegram appends the bot name in groups: /add@habitbot
        let verb = head.split('@').next().unwrap_or(head);

        match verb {
            "/add" => Command::Add(normalize_habit_name(rest)),
            "/delete" => Command::Delete(normalize_habit_name(rest)),
            "/restore" => Command::Restore(normalize_habit_name(rest)),
            _ => Command::Track(lower.clone()),
        }
    }
}

/// Executes commands against the yearly document for the clock's today
pub struct Dispatcher<S, C> {
    store: HabitStore<S>,
    clock: C,
}

impl<S: FileStore, C: Clock> Dispatcher<S, C> {
    pub fn new(store: HabitStore<S>, clock: C) -> Self {
        Self { store, clock }
    }

    pub fn store(&self) -> &HabitStore<S> {
        &self.store
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Handle one message and produce the reply text.
    ///
    /// A version conflict on a user write becomes a "send again" reply; other
    /// store failures are returned as errors.
    pub fn handle(&self, text: &str) -> Result<String> {
        let command = Command::parse(text);
        log::debug!("Dispatching {:?}", command);

        match self.execute(&command) {
            Err(DispatchError::Store(StoreError::Conflict { path })) => {
                log::warn!("Write to {} lost a race for {:?}", path, command);
                Ok(CONFLICT.to_string())
            }
            other => other,
        }
    }

    pub fn execute(&self, command: &Command) -> Result<String> {
        let today = self.clock.today();
        let loaded = self.store.load(today.year())?;

        match command {
            Command::Help => Ok(help_reply(&document_or_empty(&loaded))),
            Command::List => Ok(list_reply(&document_or_empty(&loaded), today)),
            Command::Add(name) => self.add(name, loaded, today),
            Command::Delete(name) => self.delete(name, loaded, today),
            Command::Restore(name) => self.restore(name, loaded, today),
            Command::Track(input) => self.track(input, loaded, today),
        }
    }

    fn add(&self, habit: &str, loaded: Option<VersionedDocument>, today: NaiveDate) -> Result<String> {
        if !is_valid_habit_name(habit) {
            return Ok(INVALID_NAME.to_string());
        }

        let (mut doc, token) = match loaded {
            Some(v) => (v.document, Some(v.token)),
            None => (HabitDocument::new(), None),
        };

        if doc.is_active(habit) {
            return Ok(format!("Habit \"{}\" already exists.", habit));
        }

        if doc.is_hidden(habit) {
            doc.unhide(habit);
            doc.insert_habit(habit);
            self.persist(today, &doc, token.as_deref(), &format!("Restore habit {}", habit))?;
            return Ok(format!("✓ Restored \"{}\"{}", habit, annotation(doc.shortcut_for(habit))));
        }

        doc.insert_habit(habit);
        let letter = shortcuts::assign_into(&mut doc, habit);
        self.persist(today, &doc, token.as_deref(), &format!("Add habit {}", habit))?;
        Ok(format!("✓ Added \"{}\"{}", habit, annotation(letter)))
    }

    fn delete(&self, habit: &str, loaded: Option<VersionedDocument>, today: NaiveDate) -> Result<String> {
        let Some(VersionedDocument { mut document, token }) = loaded else {
            return Ok(NO_FILE.to_string());
        };

        if !document.is_active(habit) {
            return Ok(format!("Habit \"{}\" not found.", habit));
        }

        document.hide(habit);
        self.persist(today, &document, Some(&token), &format!("Hide habit {}", habit))?;
        Ok(format!(
            "✓ Hidden \"{}\" (use /restore {} to bring it back)",
            habit, habit
        ))
    }

    fn restore(&self, habit: &str, loaded: Option<VersionedDocument>, today: NaiveDate) -> Result<String> {
        let Some(VersionedDocument { mut document, token }) = loaded else {
            return Ok(NO_FILE.to_string());
        };

        if !document.is_hidden(habit) {
            return Ok(format!("Habit \"{}\" is not hidden.", habit));
        }

        document.unhide(habit);
        document.insert_habit(habit);
        self.persist(today, &document, Some(&token), &format!("Restore habit {}", habit))?;
        Ok(format!(
            "✓ Restored \"{}\"{}",
            habit,
            annotation(document.shortcut_for(habit))
        ))
    }

    fn track(&self, input: &str, loaded: Option<VersionedDocument>, today: NaiveDate) -> Result<String> {
        let Some(VersionedDocument { mut document, token }) = loaded else {
            return Ok(format!(
                "No habits file for {}. Use /add {} first.",
                today.year(),
                input
            ));
        };

        let habit = resolve(&document, input);

        if !document.is_active(&habit) {
            return Ok(format!(
                "Unknown habit: \"{}\". Use /add {} to create it.",
                habit, habit
            ));
        }

        if document.is_tracked_on(&habit, today) {
            return Ok(format!("{} already tracked today", habit));
        }

        document.track(&habit, today);
        self.persist(
            today,
            &document,
            Some(&token),
            &format!("Track {} for {}", habit, today.format("%Y-%m-%d")),
        )?;
        Ok(format!("✓ {}", habit))
    }

    fn persist(
        &self,
        today: NaiveDate,
        doc: &HabitDocument,
        token: Option<&str>,
        message: &str,
    ) -> Result<()> {
        self.store.save(today.year(), doc, token, message)?;
        log::info!("{}", message);
        Ok(())
    }
}

/// A single character resolves through the shortcut map when it points at an
/// active habit; anything else is taken as the habit name itself
fn resolve(doc: &HabitDocument, input: &str) -> String {
    let mut chars = input.chars();
    if let (Some(letter), None) = (chars.next(), chars.next()) {
        if let Some(habit) = doc.resolve_shortcut(letter).filter(|h| doc.is_active(h)) {
            return habit.to_string();
        }
    }
    input.to_string()
}

fn document_or_empty(loaded: &Option<VersionedDocument>) -> Cow<'_, HabitDocument> {
    match loaded {
        Some(v) => Cow::Borrowed(&v.document),
        None => Cow::Owned(HabitDocument::new()),
    }
}

fn annotation(letter: Option<char>) -> String {
    letter.map(|l| format!(" ({})", l)).unwrap_or_default()
}

fn help_reply(doc: &HabitDocument) -> String {
    let habits: Vec<String> = doc
        .active_habits()
        .into_iter()
        .map(|habit| format!("{}{}", habit, annotation(doc.shortcut_for(habit))))
        .collect();

    let habit_lines = if habits.is_empty() {
        "(no habits yet)".to_string()
    } else {
        habits.join("\n")
    };

    let lines = [
        habit_lines.as_str(),
        "",
        "/add <name> - add habit",
        "/delete <name> - hide habit",
        "/restore <name> - restore hidden",
        "list (l)",
        "help (h)",
    ];
    format!("Commands:\n{}", lines.join("\n"))
}

fn list_reply(doc: &HabitDocument, today: NaiveDate) -> String {
    let date = today.format("%Y-%m-%d");
    let habits = doc.active_habits();

    if habits.is_empty() {
        return format!("{}\n\nNo habits yet. Use /add <habit> to create one.", date);
    }

    let lines: Vec<String> = habits
        .into_iter()
        .map(|habit| {
            let mark = if doc.is_tracked_on(habit, today) { '✓' } else { '○' };
            format!("{} {}", mark, habit)
        })
        .collect();
    format!("{}\n\n{}", date, lines.join("\n"))
}
