//! Reply delivery
//!
//! Replies go out through the Telegram Bot API `sendMessage` method. Delivery
//! failures are reported to the caller but never change the webhook response.

use crate::config::TelegramConfig;
use reqwest::blocking::Client;
use serde::Serialize;
use std::cell::RefCell;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("sendMessage failed with HTTP {status}: {description}")]
    Rejected { status: u16, description: String },
}

pub type Result<T> = std::result::Result<T, NotifyError>;

/// Push channel for reply text
pub trait Notifier {
    fn send(&self, chat_id: i64, text: &str) -> Result<()>;
}

impl<N: Notifier + ?Sized> Notifier for &N {
    fn send(&self, chat_id: i64, text: &str) -> Result<()> {
        (**self).send(chat_id, text)
    }
}

impl<N: Notifier + ?Sized> Notifier for Box<N> {
    fn send(&self, chat_id: i64, text: &str) -> Result<()> {
        (**self).send(chat_id, text)
    }
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
}

/// Telegram Bot API client
pub struct TelegramClient {
    http: Client,
    api_url: String,
    bot_token: String,
}

impl TelegramClient {
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        Ok(Self {
            http: Client::builder().build()?,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.clone().unwrap_or_default(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_url, self.bot_token, method)
    }
}

impl Notifier for TelegramClient {
    fn send(&self, chat_id: i64, text: &str) -> Result<()> {
        let response = self
            .http
            .post(self.method_url("sendMessage"))
            .json(&SendMessage { chat_id, text })
            .send()
            // The URL carries the bot token
            .map_err(|e| e.without_url())?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        Err(NotifyError::Rejected {
            status: status.as_u16(),
            description: response.text().unwrap_or_default(),
        })
    }
}

/// Writes replies to the log instead of a chat. Used when no bot token is
/// configured, e.g. against a local store.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, chat_id: i64, text: &str) -> Result<()> {
        log::info!("Reply to {}: {}", chat_id, text);
        Ok(())
    }
}

/// Keeps every message in memory
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: RefCell<Vec<(i64, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(i64, String)> {
        self.sent.borrow().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn send(&self, chat_id: i64, text: &str) -> Result<()> {
        self.sent.borrow_mut().push((chat_id, text.to_string()));
        Ok(())
    }
}
