//! HTTP server for the chat webhook
//!
//! `habitbot serve` → listens for Telegram updates, answers each one with a
//! reply through the notifier, and serves heatmap data for the habits page.
//!
//! Requests are handled one at a time, in arrival order.

use crate::clock::Clock;
use crate::dispatch::Dispatcher;
use crate::gate::{Gate, GateDecision, SECRET_HEADER};
use crate::heatmap;
use crate::store::FileStore;
use crate::telegram::Notifier;
use serde::Serialize;
use std::io::Read;
use tiny_http::{Header, Method, Request, Response, Server};

/// Telegram updates are a few KiB; anything larger is not a chat message
const MAX_BODY_BYTES: usize = 64 * 1024;

#[derive(Serialize)]
struct ApiResponse<T> {
    ok: bool,
    data: Option<T>,
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    fn failure(error: String) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(error),
        }
    }
}

/// Status and plain-text body for a webhook call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WebhookResponse {
    pub status: u16,
    pub body: &'static str,
}

impl WebhookResponse {
    const OK: Self = Self { status: 200, body: "OK" };
    const METHOD_NOT_ALLOWED: Self = Self {
        status: 405,
        body: "Method not allowed",
    };
    const UNAUTHORIZED: Self = Self {
        status: 401,
        body: "Unauthorized",
    };
    const FAILED: Self = Self {
        status: 500,
        body: "Internal error",
    };
}

/// Gate, dispatcher and notifier wired together
pub struct Webhook<S, C, N> {
    gate: Gate,
    dispatcher: Dispatcher<S, C>,
    notifier: N,
}

impl<S: FileStore, C: Clock, N: Notifier> Webhook<S, C, N> {
    pub fn new(gate: Gate, dispatcher: Dispatcher<S, C>, notifier: N) -> Self {
        Self {
            gate,
            dispatcher,
            notifier,
        }
    }

    /// Run one inbound update through the gate and, if admitted, the
    /// dispatcher. Admitted and ignored requests both answer 200; a failed
    /// reply delivery does not change that.
    pub fn handle(&self, method: &str, secret: Option<&str>, body: &[u8]) -> WebhookResponse {
        match self.reject(method, secret) {
            Some(response) => response,
            None => self.handle_update(body),
        }
    }

    /// Answer for a request turned away on its method or secret, checked
    /// before the body is read
    pub fn reject(&self, method: &str, secret: Option<&str>) -> Option<WebhookResponse> {
        match self.gate.check_headers(method, secret)? {
            GateDecision::MethodNotAllowed => Some(WebhookResponse::METHOD_NOT_ALLOWED),
            GateDecision::Unauthorized => {
                log::warn!("Rejected webhook call with a bad secret");
                Some(WebhookResponse::UNAUTHORIZED)
            }
            _ => None,
        }
    }

    /// Handle the body of a request that already passed `reject`
    pub fn handle_update(&self, body: &[u8]) -> WebhookResponse {
        let (chat_id, text) = match self.gate.check_payload(body) {
            GateDecision::Admit { chat_id, text } => (chat_id, text),
            GateDecision::Ignore(reason) => {
                log::debug!("Ignored update: {:?}", reason);
                return WebhookResponse::OK;
            }
            GateDecision::MethodNotAllowed | GateDecision::Unauthorized => {
                return WebhookResponse::OK
            }
        };

        let reply = match self.dispatcher.handle(&text) {
            Ok(reply) => reply,
            Err(e) => {
                log::error!("Command failed: {}", e);
                return WebhookResponse::FAILED;
            }
        };

        if let Err(e) = self.notifier.send(chat_id, &reply) {
            log::warn!("Reply not delivered: {}", e);
        }
        WebhookResponse::OK
    }

    /// Heatmap data for `year`, read without migrating the document
    pub fn heatmap_json(&self, year: i32) -> (u16, String) {
        let today = self.dispatcher.clock().today();
        let result = self.dispatcher.store().peek(year).map(|loaded| {
            let doc = loaded.map(|v| v.document).unwrap_or_default();
            heatmap::year_view(year, &doc, today)
        });

        let (status, json) = match result {
            Ok(view) => (200, serde_json::to_string(&ApiResponse::success(view))),
            Err(e) => (
                500,
                serde_json::to_string(&ApiResponse::<()>::failure(format!("Store error: {}", e))),
            ),
        };
        match json {
            Ok(json) => (status, json),
            Err(e) => (500, format!(r#"{{"ok":false,"data":null,"error":"{}"}}"#, e)),
        }
    }
}

/// Start the webhook server and block serving requests
pub fn start_server<S, C, N>(bind: &str, port: u16, webhook: Webhook<S, C, N>) -> std::io::Result<()>
where
    S: FileStore,
    C: Clock,
    N: Notifier,
{
    let addr = format!("{}:{}", bind, port);
    let server = Server::http(&addr).map_err(|e| std::io::Error::other(e.to_string()))?;

    log::info!("Listening on http://{}", addr);

    for request in server.incoming_requests() {
        if let Err(e) = handle_request(request, &webhook) {
            log::error!("Error: {}", e);
        }
    }

    Ok(())
}

fn handle_request<S, C, N>(mut request: Request, webhook: &Webhook<S, C, N>) -> std::io::Result<()>
where
    S: FileStore,
    C: Clock,
    N: Notifier,
{
    let url = request.url().to_string();
    let path = url.split('?').next().unwrap_or("/");

    if request.method() == &Method::Get {
        if let Some(year) = path.strip_prefix("/api/heatmap/") {
            let Ok(year) = year.trim_end_matches('/').parse::<i32>() else {
                return request.respond(Response::from_string("Not found").with_status_code(404));
            };
            let (status, json) = webhook.heatmap_json(year);
            let mut response = Response::from_string(json).with_status_code(status);
            if let Ok(header) = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]) {
                response.add_header(header);
            }
            return request.respond(response);
        }
    }

    let secret = request
        .headers()
        .iter()
        .find(|h| h.field.equiv(SECRET_HEADER))
        .map(|h| h.value.as_str().to_string());
    let method = request.method().as_str().to_string();

    let result = match webhook.reject(&method, secret.as_deref()) {
        Some(rejection) => rejection,
        None => match read_limited(request.as_reader(), MAX_BODY_BYTES)? {
            Some(body) => webhook.handle_update(&body),
            None => {
                log::warn!("Ignored update larger than {} bytes", MAX_BODY_BYTES);
                WebhookResponse::OK
            }
        },
    };

    request.respond(Response::from_string(result.body).with_status_code(result.status))
}

/// Read at most `limit` bytes. `None` when the body is longer.
fn read_limited<R: Read>(reader: R, limit: usize) -> std::io::Result<Option<Vec<u8>>> {
    let mut body = Vec::new();
    reader.take(limit as u64 + 1).read_to_end(&mut body)?;
    Ok((body.len() <= limit).then_some(body))
}
