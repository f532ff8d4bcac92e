use anyhow::Result;
use astroguide_core::{display_domain, ChatClient, ChatRequest, Level};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use tokio::sync::mpsc::UnboundedSender;
use crate::app::{App, InputMode};
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub fn handle_event(app: &mut App, event: AppEvent, tx: &UnboundedSender<AppEvent>) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key, tx),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => app.tick_animation(),
        AppEvent::Reply(result) => app.finish_request(result),
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent, tx: &UnboundedSender<AppEvent>) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    // Popups take every key while open
    if app.store.is_clear_pending() {
        handle_clear_confirm(app, key);
        return;
    }
    if app.show_source_picker {
        handle_source_picker(app, key);
        return;
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Editing => handle_editing_mode(app, key, tx),
    }
}

fn handle_clear_confirm(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => app.confirm_clear(),
        KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => app.cancel_clear(),
        _ => {}
    }
}

fn handle_source_picker(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('s') => {
            app.show_source_picker = false;
        }
        KeyCode::Char('j') | KeyCode::Down => app.source_picker_nav_down(),
        KeyCode::Char('k') | KeyCode::Up => app.source_picker_nav_up(),
        KeyCode::Enter | KeyCode::Char('o') => {
            if let Some(source) = app.selected_source() {
                let domain = display_domain(&source.url);
                app.status_line = Some(match open_in_browser(&source.url) {
                    Ok(()) => format!("Opened {}", domain),
                    Err(err) => {
                        tracing::warn!(url = %source.url, "failed to open link: {}", err);
                        format!("Could not open {}", domain)
                    }
                });
                app.show_source_picker = false;
            }
        }
        _ => {}
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,

        // Back to the input line; locked while a request is pending
        KeyCode::Char('i') | KeyCode::Enter => {
            if !app.is_loading() {
                app.input_mode = InputMode::Editing;
            }
        }

        // Learning level
        KeyCode::Char('b') => app.set_level(Level::Beginner),
        KeyCode::Char('a') => app.set_level(Level::Advanced),
        KeyCode::Char('l') | KeyCode::Tab => {
            let next = match app.store.level() {
                Level::Beginner => Level::Advanced,
                Level::Advanced => Level::Beginner,
            };
            app.set_level(next);
        }

        KeyCode::Char('t') => app.toggle_theme(),
        KeyCode::Char('C') => app.request_clear(),
        KeyCode::Char('s') => app.open_source_picker(),

        // Transcript scrolling
        KeyCode::Char('j') | KeyCode::Down => app.scroll_down(1),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_up(1),
        KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.scroll_half_page_down();
        }
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.scroll_half_page_up();
        }
        KeyCode::Char('g') => app.scroll_up(u16::MAX),
        KeyCode::Char('G') => app.scroll_to_bottom(),

        _ => {}
    }
}

fn handle_editing_mode(app: &mut App, key: KeyEvent, tx: &UnboundedSender<AppEvent>) {
    if key.code == KeyCode::Esc {
        app.input_mode = InputMode::Normal;
        return;
    }

    // The input line is read-only while a request is pending
    if app.is_loading() {
        return;
    }

    match key.code {
        KeyCode::Enter => {
            if let Some(request) = app.submit_input() {
                spawn_request(app.store.client().clone(), request, tx.clone());
            }
        }
        KeyCode::Backspace => {
            if app.cursor > 0 {
                app.cursor -= 1;
                let byte_pos = char_to_byte_index(&app.input, app.cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = app.input.chars().count();
            if app.cursor < char_count {
                let byte_pos = char_to_byte_index(&app.input, app.cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.cursor = app.cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.input.chars().count();
            app.cursor = (app.cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.cursor = 0;
        }
        KeyCode::End => {
            app.cursor = app.input.chars().count();
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.input, app.cursor);
            app.input.insert(byte_pos, c);
            app.cursor += 1;
        }
        _ => {}
    }
}

/// Run the request off the event loop; the outcome comes back as [`AppEvent::Reply`].
fn spawn_request(client: ChatClient, request: ChatRequest, tx: UnboundedSender<AppEvent>) {
    tokio::spawn(async move {
        let result = client
            .send_chat_message(&request.message, request.level, &request.history)
            .await;
        if tx.send(AppEvent::Reply(result)).is_err() {
            tracing::debug!("reply dropped: event loop has shut down");
        }
    });
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    match mouse.kind {
        MouseEventKind::ScrollDown => app.scroll_down(3),
        MouseEventKind::ScrollUp => app.scroll_up(3),
        _ => {}
    }
}

/// Hand a link to the platform's default URL handler.
fn open_in_browser(url: &str) -> std::io::Result<()> {
    use std::process::{Command, Stdio};

    let mut command = if cfg!(target_os = "macos") {
        Command::new("open")
    } else if cfg!(target_os = "windows") {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", "start", ""]);
        cmd
    } else {
        Command::new("xdg-open")
    };

    command
        .arg(url)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map(|_| ())
}
