use colored::{ColoredString, Colorize};
use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};

pub const WRAP_WIDTH: usize = 76;

/// A rendered line: the visible text (for measuring) and its styled form.
pub struct Line {
    pub plain: String,
    pub styled: String,
}

impl Line {
    pub fn new(plain: String, styled: String) -> Self {
        Self { plain, styled }
    }

    fn blank() -> Self {
        Self::new(String::new(), String::new())
    }

    pub fn width(&self) -> usize {
        self.plain.chars().count()
    }
}

#[derive(Clone, Copy, Default)]
struct Style {
    strong: bool,
    emphasis: bool,
    strike: bool,
    code: bool,
    link: bool,
    heading: bool,
}

impl Style {
    fn paint(self, text: &str) -> String {
        let mut s = ColoredString::from(text);
        if self.heading || self.strong {
            s = s.bold();
        }
        if self.heading {
            s = s.underline();
        }
        if self.emphasis {
            s = s.italic();
        }
        if self.strike {
            s = s.strikethrough();
        }
        if self.code {
            s = s.yellow();
        }
        if self.link {
            s = s.blue().underline();
        }
        s.to_string()
    }
}

#[derive(Default)]
struct Word {
    plain: String,
    styled: String,
}

/// Lays markdown events out as wrapped terminal lines.
#[derive(Default)]
struct Renderer {
    width: usize,
    lines: Vec<Line>,
    words: Vec<Word>,
    word: Word,
    style: Style,
    lists: Vec<Option<u64>>,
    first_prefix: String,
    rest_prefix: String,
    quote_depth: usize,
    code_block: bool,
    links: Vec<String>,
}

impl Renderer {
    fn append(&mut self, piece: &str) {
        if !piece.is_empty() {
            self.word.plain.push_str(piece);
            self.word.styled.push_str(&self.style.paint(piece));
        }
    }

    fn end_word(&mut self) {
        if !self.word.plain.is_empty() {
            self.words.push(std::mem::take(&mut self.word));
        }
    }

    fn push_text(&mut self, text: &str) {
        let mut pieces = text.split(char::is_whitespace);
        if let Some(first) = pieces.next() {
            self.append(first);
        }
        for piece in pieces {
            self.end_word();
            self.append(piece);
        }
    }

    fn emit(&mut self, list_prefix: &str, plain: &str, styled: &str) {
        let quote = "│ ".repeat(self.quote_depth);
        self.lines.push(Line::new(
            format!("{}{}{}", quote, list_prefix, plain),
            format!("{}{}{}", quote.dimmed(), list_prefix, styled),
        ));
    }

    /// Wraps the pending words into lines under the current prefixes.
    fn flush(&mut self) {
        self.end_word();
        if self.words.is_empty() {
            return;
        }

        let quote_width = 2 * self.quote_depth;
        let mut prefix = self.first_prefix.clone();
        let mut plain = String::new();
        let mut styled = String::new();
        for word in std::mem::take(&mut self.words) {
            let used = quote_width + prefix.chars().count() + plain.chars().count();
            if !plain.is_empty() && used + 1 + word.plain.chars().count() > self.width {
                self.emit(&prefix, &plain, &styled);
                prefix = self.rest_prefix.clone();
                plain.clear();
                styled.clear();
            }
            if !plain.is_empty() {
                plain.push(' ');
                styled.push(' ');
            }
            plain.push_str(&word.plain);
            styled.push_str(&word.styled);
        }
        self.emit(&prefix, &plain, &styled);
        self.first_prefix = self.rest_prefix.clone();
    }

    fn separate(&mut self) {
        if self.lines.last().is_some_and(|line| !line.plain.is_empty()) {
            self.lines.push(Line::blank());
        }
    }

    fn code_lines(&mut self, text: &str) {
        for line in text.lines() {
            let plain = format!("    {}", line);
            let styled = format!("    {}", line.yellow());
            self.lines.push(Line::new(plain, styled));
        }
    }

    fn start(&mut self, tag: Tag) {
        match tag {
            Tag::Paragraph => {
                if self.lists.is_empty() {
                    self.separate();
                }
            }
            Tag::Heading { .. } => {
                self.flush();
                self.separate();
                self.style.heading = true;
            }
            Tag::BlockQuote { .. } => {
                self.flush();
                if self.lists.is_empty() {
                    self.separate();
                }
                self.quote_depth += 1;
            }
            Tag::CodeBlock(_) => {
                self.flush();
                self.separate();
                self.code_block = true;
            }
            Tag::List(start) => {
                self.flush();
                if self.lists.is_empty() {
                    self.separate();
                }
                self.lists.push(start);
            }
            Tag::Item => {
                self.flush();
                let indent = "  ".repeat(self.lists.len().saturating_sub(1));
                let marker = match self.lists.last_mut() {
                    Some(Some(n)) => {
                        let marker = format!("{}. ", n);
                        *n += 1;
                        marker
                    }
                    _ => "• ".to_string(),
                };
                self.rest_prefix = format!("{}{}", indent, " ".repeat(marker.chars().count()));
                self.first_prefix = format!("{}{}", indent, marker);
            }
            Tag::Emphasis => self.style.emphasis = true,
            Tag::Strong => self.style.strong = true,
            Tag::Strikethrough => self.style.strike = true,
            Tag::Link { dest_url, .. } => {
                self.style.link = true;
                self.links.push(dest_url.to_string());
            }
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph | TagEnd::Item => self.flush(),
            TagEnd::Heading { .. } => {
                self.flush();
                self.style.heading = false;
            }
            TagEnd::BlockQuote { .. } => {
                self.flush();
                self.quote_depth = self.quote_depth.saturating_sub(1);
            }
            TagEnd::CodeBlock => self.code_block = false,
            TagEnd::List { .. } => {
                self.flush();
                self.lists.pop();
                self.rest_prefix = "  ".repeat(self.lists.len());
                self.first_prefix = self.rest_prefix.clone();
            }
            TagEnd::Emphasis => self.style.emphasis = false,
            TagEnd::Strong => self.style.strong = false,
            TagEnd::Strikethrough => self.style.strike = false,
            TagEnd::Link => {
                self.style.link = false;
                if let Some(dest) = self.links.pop() {
                    // autolinks already show the address
                    if !self.word.plain.ends_with(dest.as_str()) {
                        self.push_text(&format!(" ({})", dest));
                    }
                }
            }
            _ => {}
        }
    }
}

/// Renders markdown into terminal lines no wider than `width` (words longer
/// than the width get a line of their own).
pub fn render(markdown: &str, width: usize) -> Vec<Line> {
    let mut renderer = Renderer {
        width,
        ..Renderer::default()
    };

    let options = Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS;
    for event in Parser::new_ext(markdown, options) {
        match event {
            Event::Start(tag) => renderer.start(tag),
            Event::End(tag) => renderer.end(tag),
            Event::Text(text) if renderer.code_block => renderer.code_lines(&text),
            Event::Text(text) => renderer.push_text(&text),
            Event::Code(code) => {
                let saved = renderer.style;
                renderer.style.code = true;
                renderer.push_text(&code);
                renderer.style = saved;
            }
            Event::Html(html) | Event::InlineHtml(html) => renderer.push_text(&html),
            Event::SoftBreak => renderer.end_word(),
            Event::HardBreak => renderer.flush(),
            Event::TaskListMarker(done) => renderer.push_text(if done { "[x] " } else { "[ ] " }),
            Event::Rule => {
                renderer.flush();
                renderer.separate();
                let rule = "─".repeat(20);
                renderer.lines.push(Line::new(rule.clone(), rule.dimmed().to_string()));
            }
            _ => {}
        }
    }
    renderer.flush();

    while renderer.lines.last().is_some_and(|line| line.plain.is_empty()) {
        renderer.lines.pop();
    }
    renderer.lines
}
