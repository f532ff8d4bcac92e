//! Chat session state machine
//!
//! [`ChatStore`] owns the [`Session`] and is the only thing that mutates it.
//! Every transition that changes the transcript writes it back to storage
//! synchronously; storage failures are logged and otherwise ignored so the
//! session keeps working in memory.
//!
//! Sending is split in two halves so a UI can keep drawing while the request
//! is pending: [`ChatStore::begin_send`] hands out the request to run and
//! [`ChatStore::complete_send`] folds the outcome back in. [`ChatStore::send`]
//! and [`ChatStore::submit`] run both halves inline.

use tracing::{debug, info, warn};

use crate::api::{ChatBackend, ChatReply, ChatRequest, HISTORY_LIMIT};
use crate::error::RequestError;
use crate::state::{ChatMessage, HistoryTurn, Level, Session, Theme};
use crate::storage::{KeyValueStore, CHAT_STORAGE_KEY, THEME_STORAGE_KEY};

/// Appended to the transcript whenever a request fails.
pub const BACKEND_ERROR_MESSAGE: &str = "Error contacting AstroGuide backend.";

pub struct ChatStore<C, S> {
    client: C,
    storage: S,
    session: Session,
    in_flight: bool,
    clear_pending: bool,
}

impl<C: ChatBackend, S: KeyValueStore> ChatStore<C, S> {
    /// Create the store and rehydrate history and theme from `storage`.
    ///
    /// A missing theme entry (or one that isn't `light`/`dark`) falls back to
    /// `system_theme`.
    pub fn open(client: C, storage: S, system_theme: Theme) -> Self {
        let messages = load_messages(&storage);
        let theme = load_theme(&storage).unwrap_or(system_theme);

        debug!(
            messages = messages.len(),
            theme = theme.as_str(),
            "session rehydrated"
        );

        Self {
            client,
            storage,
            session: Session {
                messages,
                level: Level::default(),
                loading: false,
                theme,
            },
            in_flight: false,
            clear_pending: false,
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.session.messages
    }

    pub fn is_loading(&self) -> bool {
        self.session.loading
    }

    pub fn level(&self) -> Level {
        self.session.level
    }

    pub fn theme(&self) -> Theme {
        self.session.theme
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Optimistic append of the user's message.
    ///
    /// Returns `false` without touching the session when `text` is blank.
    pub fn append_user_message(&mut self, text: &str) -> bool {
        if text.trim().is_empty() {
            return false;
        }

        self.session.messages.push(ChatMessage::user(text));
        self.session.loading = true;
        self.persist_messages();
        true
    }

    /// The last [`HISTORY_LIMIT`] messages in wire form.
    pub fn recent_history(&self) -> Vec<HistoryTurn> {
        let messages = &self.session.messages;
        let start = messages.len().saturating_sub(HISTORY_LIMIT);
        messages[start..].iter().map(ChatMessage::to_turn).collect()
    }

    /// First half of a send. Returns `None` if a request is already in flight.
    pub fn begin_send(
        &mut self,
        text: &str,
        level: Level,
        history: Vec<HistoryTurn>,
    ) -> Option<ChatRequest> {
        if self.in_flight {
            debug!("send rejected: a request is already in flight");
            return None;
        }

        self.in_flight = true;
        self.session.loading = true;
        Some(ChatRequest::new(text, level, &history))
    }

    /// Second half of a send: append the answer or the fixed error message.
    pub fn complete_send(&mut self, result: Result<ChatReply, RequestError>) {
        let message = match result {
            Ok(reply) => ChatMessage::assistant(reply.answer, Some(reply.sources)),
            Err(err) => {
                warn!("chat request failed: {}", err);
                ChatMessage::assistant(BACKEND_ERROR_MESSAGE, None)
            }
        };

        self.session.messages.push(message);
        self.session.loading = false;
        self.in_flight = false;
        self.persist_messages();
    }

    /// Ask the backend and fold the outcome into the transcript.
    ///
    /// Returns `false` if the send was rejected because another is pending.
    pub async fn send(&mut self, text: &str, level: Level, history: Vec<HistoryTurn>) -> bool {
        match self.begin_send(text, level, history) {
            Some(request) => {
                self.execute(request).await;
                true
            }
            None => false,
        }
    }

    /// The user's send action, up to handing out the request.
    ///
    /// History is captured before the optimistic append, so it never contains
    /// the question being asked.
    pub fn prepare_submit(&mut self, text: &str) -> Option<ChatRequest> {
        if self.in_flight {
            debug!("submit rejected: a request is already in flight");
            return None;
        }

        let history = self.recent_history();
        if !self.append_user_message(text) {
            return None;
        }

        let level = self.session.level;
        self.begin_send(text, level, history)
    }

    /// The user's send action, run to completion.
    pub async fn submit(&mut self, text: &str) -> bool {
        match self.prepare_submit(text) {
            Some(request) => {
                self.execute(request).await;
                true
            }
            None => false,
        }
    }

    async fn execute(&mut self, request: ChatRequest) {
        let result = self
            .client
            .send_chat_message(&request.message, request.level, &request.history)
            .await;
        self.complete_send(result);
    }

    /// Mark a clear as awaiting the user's confirmation.
    pub fn request_clear(&mut self) {
        self.clear_pending = true;
    }

    pub fn is_clear_pending(&self) -> bool {
        self.clear_pending
    }

    pub fn cancel_clear(&mut self) {
        self.clear_pending = false;
    }

    /// Clear if one was requested. Returns whether anything was cleared.
    pub fn confirm_clear(&mut self) -> bool {
        if !self.clear_pending {
            return false;
        }
        self.clear();
        true
    }

    /// Empty the transcript and drop the persisted history entry.
    pub fn clear(&mut self) {
        self.clear_pending = false;
        self.session.messages.clear();

        if let Err(err) = self.storage.remove(CHAT_STORAGE_KEY) {
            warn!("failed to clear chat history: {}", err);
        }
        info!("chat history cleared");
    }

    pub fn set_level(&mut self, level: Level) {
        self.session.level = level;
    }

    pub fn set_theme(&mut self, theme: Theme) {
        self.session.theme = theme;

        if let Err(err) = self.storage.set(THEME_STORAGE_KEY, theme.as_str()) {
            warn!("failed to save theme: {}", err);
        }
        info!(theme = theme.as_str(), "theme changed");
    }

    pub fn toggle_theme(&mut self) {
        self.set_theme(self.session.theme.toggled());
    }

    fn persist_messages(&mut self) {
        let json = match serde_json::to_string(&self.session.messages) {
            Ok(json) => json,
            Err(err) => {
                warn!("failed to serialize chat history: {}", err);
                return;
            }
        };

        if let Err(err) = self.storage.set(CHAT_STORAGE_KEY, &json) {
            warn!("failed to save chat history: {}", err);
        }
    }
}

fn load_messages<S: KeyValueStore>(storage: &S) -> Vec<ChatMessage> {
    let saved = match storage.get(CHAT_STORAGE_KEY) {
        Ok(Some(saved)) => saved,
        Ok(None) => return Vec::new(),
        Err(err) => {
            warn!("failed to load chat history: {}", err);
            return Vec::new();
        }
    };

    match serde_json::from_str(&saved) {
        Ok(messages) => messages,
        Err(err) => {
            warn!("ignoring malformed chat history: {}", err);
            Vec::new()
        }
    }
}

fn load_theme<S: KeyValueStore>(storage: &S) -> Option<Theme> {
    match storage.get(THEME_STORAGE_KEY) {
        Ok(saved) => saved.as_deref().and_then(Theme::parse),
        Err(err) => {
            warn!("failed to load theme: {}", err);
            None
        }
    }
}
