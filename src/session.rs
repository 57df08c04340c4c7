use crate::history::{History, HistoryEntry};
use crate::http::{invoke, HttpTransport, ResponseRecord, TransportError};
use crate::render::{render_outcome, Rendered};
use crate::request::{Method, RequestSpec};
use crate::store::{KeyValueStore, KEY_HISTORY, KEY_TOKEN};

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, warn};

const TOKEN_PREVIEW_CHARS: usize = 20;

/// Process-wide state: the current token, the request history and the store
/// both are persisted to. Only this type mutates either of them, and `send`
/// borrows it mutably, so one request is in flight at a time.
#[derive(Debug)]
pub struct Session<S: KeyValueStore> {
    store: S,
    token: String,
    history: History,
}

impl<S: KeyValueStore> Session<S> {
    pub fn load(store: S) -> Result<Self> {
        let token = store.get(KEY_TOKEN)?.unwrap_or_default();
        let history = match store.get(KEY_HISTORY)? {
            Some(s) => History::from_json(&s).unwrap_or_else(|e| {
                warn!("Discarding unreadable request history: {e}");
                History::default()
            }),
            None => History::default(),
        };
        debug!(entries = history.len(), has_token = !token.is_empty(), "session loaded");

        Ok(Self {
            store,
            token,
            history,
        })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn set_token(&mut self, token: &str) -> Result<()> {
        self.token = token.to_string();
        self.store.set(KEY_TOKEN, &self.token)
    }

    /// `Token: <first 20 chars>...`, or `None` when no token is set.
    pub fn token_preview(&self) -> Option<String> {
        if self.token.is_empty() {
            return None;
        }
        let head = self.token.chars().take(TOKEN_PREVIEW_CHARS).collect::<String>();
        Some(format!("Token: {head}..."))
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    fn record(&mut self, entry: HistoryEntry) -> Result<()> {
        self.history.record(entry);
        self.store.set(KEY_HISTORY, &self.history.to_json()?)
    }

    fn finish(
        &mut self,
        method: Method,
        url: &str,
        outcome: &std::result::Result<ResponseRecord, TransportError>,
    ) -> Rendered {
        let (rendered, entry) = render_outcome(method, url, outcome, Utc::now());
        if let Some(entry) = entry {
            if let Err(e) = self.record(entry) {
                warn!("Failed to save request history: {e}");
            }
        }
        rendered
    }

    pub async fn send<T: HttpTransport>(&mut self, transport: &T, spec: &RequestSpec) -> Rendered {
        let req = spec.prepare();
        let outcome = invoke(transport, &req).await;
        self.finish(spec.method, &req.url, &outcome)
    }
}
