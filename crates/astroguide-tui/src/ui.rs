use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
};
use astroguide_core::{display_domain, ChatMessage, ChatRole, Level, Theme};
use crate::app::{App, InputMode};

const SOURCES_DISCLAIMER: &str = "Links are provided for reference and may change over time.";
const INPUT_PLACEHOLDER: &str = "Ask a space question...";

/// Colors for one theme
#[derive(Debug, Clone, Copy)]
struct Palette {
    background: Color,
    text: Color,
    muted: Color,
    user_bubble: Color,
    assistant_bubble: Color,
    accent: Color,
    danger: Color,
}

fn palette(theme: Theme) -> Palette {
    match theme {
        Theme::Light => Palette {
            background: Color::Rgb(0xf8, 0xf8, 0xf8),
            text: Color::Black,
            muted: Color::Rgb(0x66, 0x66, 0x66),
            user_bubble: Color::Rgb(0xdc, 0xf8, 0xc6),
            assistant_bubble: Color::Rgb(0xe5, 0xe5, 0xea),
            accent: Color::Rgb(0x00, 0x7a, 0xff),
            danger: Color::Rgb(0xff, 0x3b, 0x30),
        },
        Theme::Dark => Palette {
            background: Color::Rgb(0x12, 0x12, 0x12),
            text: Color::White,
            muted: Color::Rgb(0x88, 0x88, 0x88),
            user_bubble: Color::Rgb(0x2e, 0x7d, 0x32),
            assistant_bubble: Color::Rgb(0x2a, 0x2a, 0x2a),
            accent: Color::Rgb(0x4d, 0xa3, 0xff),
            danger: Color::Rgb(0xff, 0x45, 0x3a),
        },
    }
}

/// Parse a line of text and convert **bold** markdown to styled spans
fn parse_markdown_line(text: &str, base: Style) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut rest = text;

    while let Some(open) = rest.find("**") {
        let after_open = &rest[open + 2..];
        let Some(close) = after_open.find("**") else {
            break;
        };

        if open > 0 {
            spans.push(Span::styled(rest[..open].to_string(), base));
        }
        let bold = &after_open[..close];
        if bold.is_empty() {
            spans.push(Span::styled("****", base));
        } else {
            spans.push(Span::styled(bold.to_string(), base.add_modifier(Modifier::BOLD)));
        }
        rest = &after_open[close + 2..];
    }

    if !rest.is_empty() {
        spans.push(Span::styled(rest.to_string(), base));
    }

    Line::from(spans)
}

/// Rows `text` takes once word-wrapped to `width` columns.
fn wrapped_height(text: &Text, width: u16) -> u16 {
    let rows = Paragraph::new(text.clone())
        .wrap(Wrap { trim: false })
        .line_count(width.max(1));
    rows.min(u16::MAX as usize) as u16
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();
    let colors = palette(app.store.theme());

    frame.render_widget(
        Block::default().style(Style::default().bg(colors.background).fg(colors.text)),
        area,
    );

    let [header_area, level_area, chat_area, input_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area, &colors);
    render_level_toggle(app, frame, level_area, &colors);
    render_chat(app, frame, chat_area, &colors);
    render_input(app, frame, input_area, &colors);
    render_footer(app, frame, footer_area);

    if app.store.is_clear_pending() {
        render_clear_confirm(frame, area, &colors);
    } else if app.show_source_picker {
        render_source_picker(app, frame, area, &colors);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect, colors: &Palette) {
    let title = Line::from(vec![
        Span::styled(" AstroGuide ", Style::default().fg(colors.accent).bold()),
        Span::raw("🌌"),
    ]);
    frame.render_widget(Paragraph::new(title), area);

    let theme_label = match app.store.theme() {
        Theme::Light => "☀ light",
        Theme::Dark => "☾ dark",
    };
    let right = Line::from(vec![
        Span::styled(theme_label, Style::default().fg(colors.text)),
        Span::raw("  "),
        Span::styled(
            format!("v{} ", env!("CARGO_PKG_VERSION")),
            Style::default().fg(colors.muted),
        ),
    ]);
    frame.render_widget(Paragraph::new(right).alignment(Alignment::Right), area);
}

fn render_level_toggle(app: &App, frame: &mut Frame, area: Rect, colors: &Palette) {
    let current = app.store.level();

    let mut spans = vec![Span::styled(" Learning level: ", Style::default().fg(colors.text))];
    for level in Level::all() {
        let style = if level == current {
            Style::default()
                .bg(colors.accent)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(colors.accent)
        };
        spans.push(Span::styled(format!(" {} ", level.display_name()), style));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn message_lines(msg: &ChatMessage, colors: &Palette, lines: &mut Vec<Line<'static>>) {
    match msg.role {
        ChatRole::User => {
            lines.push(Line::from(Span::styled(
                "You:",
                Style::default().fg(colors.accent).add_modifier(Modifier::BOLD),
            )));
            let bubble = Style::default().bg(colors.user_bubble).fg(colors.text);
            for line in msg.content.lines() {
                lines.push(Line::styled(line.to_string(), bubble));
            }
        }
        ChatRole::Assistant => {
            lines.push(Line::from(Span::styled(
                "AstroGuide:",
                Style::default().fg(colors.text).add_modifier(Modifier::BOLD),
            )));
            let bubble = Style::default().bg(colors.assistant_bubble).fg(colors.text);
            for line in msg.content.lines() {
                lines.push(parse_markdown_line(line, bubble));
            }

            let sources = msg.visible_sources();
            if !sources.is_empty() {
                lines.push(Line::from(Span::styled(
                    "Sources:",
                    Style::default().fg(colors.text).add_modifier(Modifier::BOLD),
                )));
                lines.push(Line::from(Span::styled(
                    SOURCES_DISCLAIMER,
                    Style::default().fg(colors.muted).add_modifier(Modifier::ITALIC),
                )));
                for url in sources {
                    lines.push(Line::from(Span::styled(
                        format!("• {}", display_domain(url)),
                        Style::default().fg(colors.accent).add_modifier(Modifier::UNDERLINED),
                    )));
                }
            }
        }
    }
    lines.push(Line::default());
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect, colors: &Palette) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(colors.muted));

    let lines: Vec<Line> = if app.store.messages().is_empty() && !app.is_loading() {
        vec![Line::from(Span::styled(
            "Ask anything about planets, stars, galaxies and space missions.",
            Style::default().fg(colors.muted),
        ))]
    } else {
        let mut lines = Vec::new();
        for msg in app.store.messages() {
            message_lines(msg, colors, &mut lines);
        }

        if app.is_loading() {
            lines.push(Line::from(Span::styled(
                "AstroGuide:",
                Style::default().fg(colors.text).add_modifier(Modifier::BOLD),
            )));
            // Animated ellipsis: cycles through ".", "..", "..."
            let dots = ".".repeat((app.animation_frame as usize) + 1);
            lines.push(Line::from(Span::styled(
                format!("Thinking{}", dots),
                Style::default().fg(colors.muted).add_modifier(Modifier::ITALIC),
            )));
        }
        lines
    };

    // Inner size minus borders
    let inner_height = area.height.saturating_sub(2);
    let inner_width = area.width.saturating_sub(2);
    app.chat_height = inner_height;

    let text = Text::from(lines);
    let max_scroll = wrapped_height(&text, inner_width).saturating_sub(inner_height);
    if app.follow_tail || app.chat_scroll >= max_scroll {
        app.chat_scroll = max_scroll;
        app.follow_tail = true;
    }

    let chat = Paragraph::new(text)
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((app.chat_scroll, 0));

    frame.render_widget(chat, area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect, colors: &Palette) {
    let editing = app.input_mode == InputMode::Editing;
    let border_color = if editing && !app.is_loading() {
        colors.accent
    } else {
        colors.muted
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" Ask ");

    // Calculate visible portion of input with horizontal scrolling
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = app.cursor;
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let content = if app.is_loading() {
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        Line::from(Span::styled(
            format!("Thinking{}", dots),
            Style::default().fg(colors.muted).add_modifier(Modifier::ITALIC),
        ))
    } else if app.input.is_empty() {
        Line::from(Span::styled(INPUT_PLACEHOLDER, Style::default().fg(colors.muted)))
    } else {
        let visible_text: String = app
            .input
            .chars()
            .skip(scroll_offset)
            .take(inner_width)
            .collect();
        Line::from(Span::styled(visible_text, Style::default().fg(colors.text)))
    };

    frame.render_widget(Paragraph::new(content).block(block), area);

    if editing && !app.is_loading() {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let mode_style = match app.input_mode {
        InputMode::Normal => Style::default().bg(Color::Blue).fg(Color::White),
        InputMode::Editing => Style::default().bg(Color::Yellow).fg(Color::Black),
    };
    let mode_text = match app.input_mode {
        InputMode::Normal => " CHAT ",
        InputMode::Editing => " ASK ",
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let hints = if app.store.is_clear_pending() {
        vec![
            Span::styled(" y ", key_style),
            Span::styled(" clear ", label_style),
            Span::styled(" n ", key_style),
            Span::styled(" cancel ", label_style),
        ]
    } else if app.show_source_picker {
        vec![
            Span::styled(" j/k ", key_style),
            Span::styled(" nav ", label_style),
            Span::styled(" Enter ", key_style),
            Span::styled(" open ", label_style),
            Span::styled(" Esc ", key_style),
            Span::styled(" close ", label_style),
        ]
    } else {
        match app.input_mode {
            InputMode::Editing => vec![
                Span::styled(" Enter ", key_style),
                Span::styled(" send ", label_style),
                Span::styled(" Esc ", key_style),
                Span::styled(" stop typing ", label_style),
            ],
            InputMode::Normal => vec![
                Span::styled(" i ", key_style),
                Span::styled(" ask ", label_style),
                Span::styled(" j/k ", key_style),
                Span::styled(" scroll ", label_style),
                Span::styled(" b/a ", key_style),
                Span::styled(" level ", label_style),
                Span::styled(" s ", key_style),
                Span::styled(" sources ", label_style),
                Span::styled(" t ", key_style),
                Span::styled(" theme ", label_style),
                Span::styled(" C ", key_style),
                Span::styled(" clear ", label_style),
                Span::styled(" q ", key_style),
                Span::styled(" quit ", label_style),
            ],
        }
    };

    let mut spans = vec![
        Span::styled(mode_text, mode_style),
        Span::styled(" ", label_style),
    ];
    spans.extend(hints);
    if let Some(status) = &app.status_line {
        spans.push(Span::styled(format!("  {}", status), Style::default().fg(Color::Gray)));
    }

    let footer = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
    frame.render_widget(footer, area);
}

/// Centered popup rectangle, shrunk to fit small terminals
fn popup_area(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width.saturating_sub(4));
    let height = height.min(area.height.saturating_sub(4));
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width, height)
}

fn render_clear_confirm(frame: &mut Frame, area: Rect, colors: &Palette) {
    let popup = popup_area(area, 52, 7);
    frame.render_widget(Clear, popup);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(colors.danger))
        .title(" Clear chat? ")
        .style(Style::default().bg(colors.background).fg(colors.text));

    let body = Text::from(vec![
        Line::from("This will permanently delete the conversation."),
        Line::default(),
        Line::from(vec![
            Span::styled(" y ", Style::default().bg(colors.danger).fg(Color::White).bold()),
            Span::raw(" Clear    "),
            Span::styled(" n ", Style::default().bg(colors.muted).fg(Color::White).bold()),
            Span::raw(" Cancel"),
        ]),
    ]);

    let paragraph = Paragraph::new(body)
        .block(block)
        .wrap(Wrap { trim: true });
    frame.render_widget(paragraph, popup);
}

fn render_source_picker(app: &mut App, frame: &mut Frame, area: Rect, colors: &Palette) {
    let sources = app.sources();

    let popup_height = (sources.len() as u16).saturating_add(2);
    let popup = popup_area(area, 72, popup_height);
    frame.render_widget(Clear, popup);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(colors.accent))
        .title(" Sources (Enter to open, Esc to close) ")
        .title_bottom(Line::styled(
            format!(" {} ", SOURCES_DISCLAIMER),
            Style::default().fg(colors.muted),
        ))
        .style(Style::default().bg(colors.background).fg(colors.text));

    let items: Vec<ListItem> = sources
        .iter()
        .map(|entry| {
            ListItem::new(Line::from(vec![
                Span::styled(format!("#{} ", entry.answer_number), Style::default().fg(colors.muted)),
                Span::raw(format!("• {}", display_domain(&entry.url))),
                Span::styled(format!("  {}", entry.url), Style::default().fg(colors.muted)),
            ]))
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(colors.accent)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, popup, &mut app.source_picker_state);
}

#[cfg(test)]
mod tests {
    use super::*;
    use astroguide_core::{ChatClient, ChatReply, ChatStore, KeyValueStore, MemoryStore};
    use ratatui::{backend::TestBackend, Terminal};

    fn plain(line: &Line) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    #[test]
    fn test_markdown_bold_spans() {
        let base = Style::default();
        let line = parse_markdown_line("A **neutron star** is dense.", base);
        assert_eq!(line.spans.len(), 3);
        assert_eq!(line.spans[1].content, "neutron star");
        assert!(line.spans[1].style.add_modifier.contains(Modifier::BOLD));
        assert_eq!(plain(&line), "A neutron star is dense.");
    }

    #[test]
    fn test_markdown_unclosed_bold_is_literal() {
        let line = parse_markdown_line("2 ** 10 is big", Style::default());
        assert_eq!(plain(&line), "2 ** 10 is big");
    }

    #[test]
    fn test_sources_block_uses_display_domains() {
        let colors = palette(Theme::Light);
        let msg = ChatMessage::assistant(
            "Jupiter is the largest planet.",
            Some(vec![
                "https://www.nasa.gov/jupiter".to_string(),
                "https://science.nasa.gov/jupiter/".to_string(),
            ]),
        );

        let mut lines = Vec::new();
        message_lines(&msg, &colors, &mut lines);
        let text: Vec<String> = lines.iter().map(plain).collect();

        assert_eq!(text[0], "AstroGuide:");
        assert!(text.contains(&"Sources:".to_string()));
        assert!(text.contains(&SOURCES_DISCLAIMER.to_string()));
        assert!(text.contains(&"• nasa.gov".to_string()));
        assert!(text.contains(&"• science.nasa.gov".to_string()));
    }

    #[test]
    fn test_empty_sources_render_no_block() {
        let colors = palette(Theme::Dark);
        let msg = ChatMessage::assistant("No links this time.", Some(Vec::new()));

        let mut lines = Vec::new();
        message_lines(&msg, &colors, &mut lines);
        assert!(!lines.iter().any(|l| plain(l) == "Sources:"));
    }

    #[test]
    fn test_wrapped_height_counts_word_wrapped_rows() {
        let text = Text::from(vec![Line::from("abcdefghij"), Line::from("abc")]);
        assert_eq!(wrapped_height(&text, 4), 3 + 1);

        // 14 columns would fit in two rows of 7, but no word can be split
        let text = Text::from(Line::from("abcd efgh ijkl"));
        assert_eq!(wrapped_height(&text, 7), 3);
    }

    fn test_app() -> App {
        let client = ChatClient::new("http://127.0.0.1:1");
        let storage: Box<dyn KeyValueStore + Send> = Box::new(MemoryStore::new());
        App::new(ChatStore::open(client, storage, Theme::Light))
    }

    fn screen(terminal: &Terminal<TestBackend>) -> String {
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    #[test]
    fn test_last_source_reachable_in_narrow_terminal() {
        let mut app = test_app();
        app.input = "q".to_string();
        app.submit_input().unwrap();
        app.finish_request(Ok(ChatReply {
            answer: "Jupiter ".repeat(60).trim_end().to_string(),
            sources: vec!["https://www.nasa.gov/zzlast".to_string()],
        }));

        let mut terminal = Terminal::new(TestBackend::new(30, 16)).unwrap();
        terminal.draw(|frame| render(&mut app, frame)).unwrap();
        assert!(screen(&terminal).contains("nasa.gov"));

        // Scroll away and back down again
        app.scroll_up(u16::MAX);
        terminal.draw(|frame| render(&mut app, frame)).unwrap();
        assert!(!screen(&terminal).contains("nasa.gov"));

        app.scroll_down(u16::MAX);
        terminal.draw(|frame| render(&mut app, frame)).unwrap();
        assert!(screen(&terminal).contains("nasa.gov"));
        assert!(app.follow_tail);
    }
}
