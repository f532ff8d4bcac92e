use astroguide_core::{
    ChatClient, ChatReply, ChatRequest, ChatRole, ChatStore, KeyValueStore, Level, RequestError,
    Theme,
};
use ratatui::widgets::ListState;

/// The store as the binary uses it: real client, storage picked at startup.
pub type Store = ChatStore<ChatClient, Box<dyn KeyValueStore + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

/// A source link as listed in the picker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    /// 1-based position of the answer among assistant messages
    pub answer_number: usize,
    pub url: String,
}

pub struct App {
    pub should_quit: bool,
    pub input_mode: InputMode,

    // Input line
    pub input: String,
    pub cursor: usize, // cursor position in input, in chars

    // Transcript viewport
    pub chat_scroll: u16,
    pub follow_tail: bool,
    pub chat_height: u16,

    // Popups
    pub show_source_picker: bool,
    pub source_picker_state: ListState,

    pub animation_frame: u8, // 0-2 for ellipsis animation
    pub status_line: Option<String>,

    pub store: Store,
}

impl App {
    pub fn new(store: Store) -> Self {
        Self {
            should_quit: false,
            input_mode: InputMode::Editing,

            input: String::new(),
            cursor: 0,

            chat_scroll: 0,
            follow_tail: true,
            chat_height: 0,

            show_source_picker: false,
            source_picker_state: ListState::default(),

            animation_frame: 0,
            status_line: None,

            store,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.store.is_loading()
    }

    /// Submit the input line. Returns the request to run in the background.
    ///
    /// The input is only cleared when the store accepted the message.
    pub fn submit_input(&mut self) -> Option<ChatRequest> {
        let request = self.store.prepare_submit(&self.input)?;

        self.input.clear();
        self.cursor = 0;
        self.follow_tail = true;
        self.status_line = None;
        Some(request)
    }

    pub fn finish_request(&mut self, result: Result<ChatReply, RequestError>) {
        self.store.complete_send(result);
        self.animation_frame = 0;
        self.follow_tail = true;
    }

    pub fn set_level(&mut self, level: Level) {
        self.store.set_level(level);
    }

    pub fn toggle_theme(&mut self) {
        self.store.toggle_theme();
    }

    // Clear confirmation
    pub fn request_clear(&mut self) {
        if !self.store.messages().is_empty() {
            self.store.request_clear();
        }
    }

    pub fn confirm_clear(&mut self) {
        if self.store.confirm_clear() {
            self.chat_scroll = 0;
            self.follow_tail = true;
            self.source_picker_state.select(None);
            self.status_line = Some("Chat cleared".to_string());
        }
    }

    pub fn cancel_clear(&mut self) {
        self.store.cancel_clear();
    }

    /// Every source in the transcript, oldest answer first.
    pub fn sources(&self) -> Vec<SourceEntry> {
        self.store
            .messages()
            .iter()
            .filter(|m| m.role == ChatRole::Assistant)
            .enumerate()
            .flat_map(|(i, m)| {
                m.visible_sources().iter().map(move |url| SourceEntry {
                    answer_number: i + 1,
                    url: url.clone(),
                })
            })
            .collect()
    }

    // Source picker
    pub fn open_source_picker(&mut self) {
        let len = self.sources().len();
        if len == 0 {
            self.status_line = Some("No sources yet".to_string());
            return;
        }
        // Most recent answer's links are at the end
        self.source_picker_state.select(Some(len - 1));
        self.show_source_picker = true;
    }

    pub fn source_picker_nav_down(&mut self) {
        let len = self.sources().len();
        if len > 0 {
            let i = self.source_picker_state.selected().unwrap_or(0);
            self.source_picker_state.select(Some((i + 1).min(len - 1)));
        }
    }

    pub fn source_picker_nav_up(&mut self) {
        let i = self.source_picker_state.selected().unwrap_or(0);
        self.source_picker_state.select(Some(i.saturating_sub(1)));
    }

    pub fn selected_source(&self) -> Option<SourceEntry> {
        let i = self.source_picker_state.selected()?;
        self.sources().into_iter().nth(i)
    }

    // Transcript scrolling
    pub fn scroll_down(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_add(lines);
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
        self.follow_tail = false;
    }

    pub fn scroll_half_page_down(&mut self) {
        self.scroll_down((self.chat_height / 2).max(1));
    }

    pub fn scroll_half_page_up(&mut self) {
        self.scroll_up((self.chat_height / 2).max(1));
    }

    pub fn scroll_to_bottom(&mut self) {
        self.follow_tail = true;
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.is_loading() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }
}

/// Terminal background guess from `COLORFGBG` (`"<fg>;<bg>"`), light when unknown.
pub fn system_theme() -> Theme {
    theme_from_colorfgbg(std::env::var("COLORFGBG").ok().as_deref())
}

fn theme_from_colorfgbg(value: Option<&str>) -> Theme {
    let background = value
        .and_then(|v| v.rsplit(';').next())
        .and_then(|bg| bg.trim().parse::<u8>().ok());

    match background {
        Some(0..=6) | Some(8) => Theme::Dark,
        _ => Theme::Light,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use astroguide_core::{MemoryStore, BACKEND_ERROR_MESSAGE};

    fn test_app() -> App {
        let client = ChatClient::new("http://127.0.0.1:1");
        let storage: Box<dyn KeyValueStore + Send> = Box::new(MemoryStore::new());
        App::new(ChatStore::open(client, storage, Theme::Light))
    }

    fn reply(answer: &str, sources: &[&str]) -> ChatReply {
        ChatReply {
            answer: answer.to_string(),
            sources: sources.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_blank_input_is_kept_and_not_sent() {
        let mut app = test_app();
        app.input = "   ".to_string();
        app.cursor = 3;

        assert!(app.submit_input().is_none());
        assert_eq!(app.input, "   ");
        assert!(app.store.messages().is_empty());
    }

    #[test]
    fn test_submit_clears_input_and_sets_loading() {
        let mut app = test_app();
        app.input = "What is a black hole?".to_string();
        app.cursor = app.input.chars().count();

        let request = app.submit_input().unwrap();
        assert_eq!(request.message, "What is a black hole?");
        assert!(app.input.is_empty());
        assert_eq!(app.cursor, 0);
        assert!(app.is_loading());

        // Input is locked until the reply arrives
        app.input = "follow-up".to_string();
        assert!(app.submit_input().is_none());
        assert_eq!(app.store.messages().len(), 1);
    }

    #[test]
    fn test_finish_request_appends_reply() {
        let mut app = test_app();
        app.input = "Hi".to_string();
        app.submit_input().unwrap();
        app.tick_animation();
        assert_eq!(app.animation_frame, 1);

        app.finish_request(Ok(reply("Hello, stargazer.", &[])));

        assert!(!app.is_loading());
        assert_eq!(app.animation_frame, 0);
        assert_eq!(app.store.messages()[1].role, ChatRole::Assistant);
    }

    #[test]
    fn test_sources_are_numbered_by_answer() {
        let mut app = test_app();

        app.input = "one".to_string();
        app.submit_input().unwrap();
        app.finish_request(Ok(reply("a", &["https://nasa.gov/a", "https://esa.int/b"])));

        app.input = "two".to_string();
        app.submit_input().unwrap();
        let err = serde_json::from_str::<ChatReply>("nope").unwrap_err();
        app.finish_request(Err(err.into()));
        assert_eq!(app.store.messages()[3].content, BACKEND_ERROR_MESSAGE);

        app.input = "three".to_string();
        app.submit_input().unwrap();
        app.finish_request(Ok(reply("c", &["https://hubblesite.org"])));

        let sources = app.sources();
        assert_eq!(sources.len(), 3);
        assert_eq!(sources[0].answer_number, 1);
        assert_eq!(sources[2].answer_number, 3);
        assert_eq!(sources[2].url, "https://hubblesite.org");

        app.open_source_picker();
        assert!(app.show_source_picker);
        assert_eq!(app.selected_source().unwrap().url, "https://hubblesite.org");
        app.source_picker_nav_up();
        assert_eq!(app.selected_source().unwrap().url, "https://esa.int/b");
    }

    #[test]
    fn test_source_picker_needs_sources() {
        let mut app = test_app();
        app.open_source_picker();
        assert!(!app.show_source_picker);
        assert_eq!(app.status_line.as_deref(), Some("No sources yet"));
    }

    #[test]
    fn test_clear_requires_confirmation() {
        let mut app = test_app();
        app.input = "Hi".to_string();
        app.submit_input().unwrap();
        app.finish_request(Ok(reply("Hello.", &[])));

        app.request_clear();
        app.cancel_clear();
        app.confirm_clear();
        assert_eq!(app.store.messages().len(), 2);

        app.request_clear();
        app.confirm_clear();
        assert!(app.store.messages().is_empty());
    }

    #[test]
    fn test_theme_from_colorfgbg() {
        assert_eq!(theme_from_colorfgbg(Some("15;0")), Theme::Dark);
        assert_eq!(theme_from_colorfgbg(Some("0;default;15")), Theme::Light);
        assert_eq!(theme_from_colorfgbg(Some("garbage")), Theme::Light);
        assert_eq!(theme_from_colorfgbg(None), Theme::Light);
    }
}
