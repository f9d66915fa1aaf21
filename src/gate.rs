//! Webhook admission
//!
//! Decides whether an inbound request reaches the dispatcher: POST only, the
//! shared secret must match, and only text messages from the allow-listed chat
//! are admitted. Everything else that is well-formed is acknowledged silently
//! so Telegram does not retry it.

use serde::Deserialize;

/// Header Telegram uses to echo the webhook secret
pub const SECRET_HEADER: &str = "X-Telegram-Bot-Api-Secret-Token";

/// Telegram `Update`, reduced to the fields the bot reads
#[derive(Debug, Deserialize)]
pub struct Update {
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

/// Why an admitted-looking request was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    MalformedPayload,
    NoText,
    ChatNotAllowed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// 405
    MethodNotAllowed,
    /// 401
    Unauthorized,
    /// 200 without dispatching
    Ignore(IgnoreReason),
    Admit { chat_id: i64, text: String },
}

/// Shared secret plus the single allowed chat
#[derive(Debug, Clone)]
pub struct Gate {
    secret: String,
    allowed_chat_id: String,
}

impl Gate {
    pub fn new(secret: impl Into<String>, allowed_chat_id: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            allowed_chat_id: allowed_chat_id.into().trim().to_string(),
        }
    }

    pub fn check(&self, method: &str, secret: Option<&str>, body: &[u8]) -> GateDecision {
        match self.check_headers(method, secret) {
            Some(rejection) => rejection,
            None => self.check_payload(body),
        }
    }

    /// Method and secret only, so a request can be turned away before its
    /// body is read. `None` means the payload still needs checking.
    pub fn check_headers(&self, method: &str, secret: Option<&str>) -> Option<GateDecision> {
        if !method.eq_ignore_ascii_case("POST") {
            return Some(GateDecision::MethodNotAllowed);
        }

        if secret.map(str::as_bytes) != Some(self.secret.as_bytes()) {
            return Some(GateDecision::Unauthorized);
        }
        None
    }

    /// Text and chat checks on a request that passed `check_headers`
    pub fn check_payload(&self, body: &[u8]) -> GateDecision {
        let update: Update = match serde_json::from_slice(body) {
            Ok(update) => update,
            Err(e) => {
                log::debug!("Ignoring unparseable update: {}", e);
                return GateDecision::Ignore(IgnoreReason::MalformedPayload);
            }
        };

        let Some(message) = update.message else {
            return GateDecision::Ignore(IgnoreReason::NoText);
        };
        let text = match message.text {
            Some(text) if !text.trim().is_empty() => text,
            _ => return GateDecision::Ignore(IgnoreReason::NoText),
        };

        if message.chat.id.to_string() != self.allowed_chat_id {
            log::warn!("Ignoring message from chat {}", message.chat.id);
            return GateDecision::Ignore(IgnoreReason::ChatNotAllowed);
        }

        GateDecision::Admit {
            chat_id: message.chat.id,
            text,
        }
    }
}
