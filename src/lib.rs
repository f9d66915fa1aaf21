//! Habitbot - habit tracking from a chat bot
//!
//! Send short messages to a Telegram bot, keep a yearly habit file in a GitHub
//! repository, and draw the history as a calendar heatmap.
//!
//! # Commands
//!
//! | Message | Purpose |
//! |---------|---------|
//! | `help` / `h` | Habits with their shortcuts, plus this list |
//! | `list` / `l` | Today's checklist |
//! | `/add <name>` | Create a habit (or bring back a hidden one) |
//! | `/delete <name>` | Hide a habit, keeping its history |
//! | `/restore <name>` | Un-hide a habit |
//! | `<letter>` or `<name>` | Mark a habit done for today |
//!
//! # Quick Start
//!
//! ```
//! use habitbot::{Dispatcher, FixedClock, HabitStore, MemoryStore};
//!
//! let files = MemoryStore::new();
//! let bot = Dispatcher::new(HabitStore::new(&files), FixedClock::ymd(2025, 1, 1).unwrap());
//!
//! assert_eq!(bot.handle("/add meditation").unwrap(), "✓ Added \"meditation\" (m)");
//! assert_eq!(bot.handle("m").unwrap(), "✓ meditation");
//! assert_eq!(bot.handle("l").unwrap(), "2025-01-01\n\n✓ meditation");
//! ```

pub mod clock;
pub mod codec;
pub mod config;
pub mod dispatch;
pub mod document;
pub mod gate;
pub mod github;
pub mod heatmap;
pub mod serve;
pub mod shortcuts;
pub mod store;
pub mod telegram;

pub use clock::{Clock, FixedClock, SystemClock};
pub use codec::{decode, encode};
pub use config::Config;
pub use dispatch::{Command, DispatchError, Dispatcher};
pub use document::HabitDocument;
pub use gate::{Gate, GateDecision};
pub use github::GitHubClient;
pub use serve::{Webhook, WebhookResponse};
pub use store::{FileStore, HabitStore, LocalStore, MemoryStore, StoreError, VersionedDocument};
pub use telegram::{LogNotifier, Notifier, RecordingNotifier, TelegramClient};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_exports() {
        // Verify core types are re-exported from crate root
        let doc = decode(&encode(&HabitDocument::new()));
        assert!(doc.is_empty());
    }
}
