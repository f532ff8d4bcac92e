//! UI-agnostic session state types
//!
//! These types are shared by every front end (the TUI and the headless
//! subcommands) and don't depend on any specific UI framework. The serde
//! forms double as the persisted and wire formats.

use serde::{Deserialize, Serialize};

/// The role of a chat message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// A chat message in the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    /// Reference links returned with an answer. Only set on assistant messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<String>>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            sources: None,
        }
    }

    pub fn assistant(content: impl Into<String>, sources: Option<Vec<String>>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            sources,
        }
    }

    /// Sources worth rendering: assistant messages with at least one link.
    pub fn visible_sources(&self) -> &[String] {
        match (&self.role, &self.sources) {
            (ChatRole::Assistant, Some(sources)) => sources,
            _ => &[],
        }
    }

    /// Reduce to the form sent to the backend as conversation history.
    pub fn to_turn(&self) -> HistoryTurn {
        HistoryTurn {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

/// A prior message as sent to the backend (sources stripped)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: ChatRole,
    pub content: String,
}

/// Learning level sent with each question to steer the answer style
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    #[default]
    Beginner,
    Advanced,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Beginner => "beginner",
            Level::Advanced => "advanced",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "beginner" => Some(Level::Beginner),
            "advanced" => Some(Level::Advanced),
            _ => None,
        }
    }

    pub fn all() -> Vec<Level> {
        vec![Level::Beginner, Level::Advanced]
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Level::Beginner => "Beginner",
            Level::Advanced => "Advanced",
        }
    }
}

/// Color scheme preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }

    /// Strict parse of a stored value. Anything but `light`/`dark` is rejected.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "light" => Some(Theme::Light),
            "dark" => Some(Theme::Dark),
            _ => None,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

/// In-memory conversation state for the current run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub messages: Vec<ChatMessage>,
    pub level: Level,
    pub loading: bool,
    pub theme: Theme,
}
