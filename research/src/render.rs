use crate::markdown::{self, Line, WRAP_WIDTH};
use crate::schema::ResearchResponse;
use colored::{ColoredString, Colorize};
use spinners::{Spinner, Spinners};
use std::io::{self, IsTerminal, Write};

/// What gets drawn for an answer, before any styling.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Panel {
    pub title: String,
    pub body: String,
    pub footer: String,
}

impl Panel {
    pub fn from_response(response: &ResearchResponse) -> Self {
        Self {
            title: response.topic.clone(),
            body: response.summary.clone(),
            footer: format!(
                "Sources: {} | Tools: {}",
                join_or_none(&response.sources),
                join_or_none(&response.tools_used)
            ),
        }
    }
}

fn join_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "None".to_string()
    } else {
        items.join(", ")
    }
}

fn border(s: &str) -> ColoredString {
    s.green()
}

/// User-facing output. Everything the driver reports goes through here.
///
/// While a status is active an interactive console animates a spinner; any
/// write stops it and clears its line first.
pub struct Console<W: Write> {
    out: W,
    interactive: bool,
    status: Option<String>,
    spinner: Option<Spinner>,
}

impl Console<io::Stdout> {
    pub fn stdout() -> Self {
        let out = io::stdout();
        let interactive = out.is_terminal();
        Self {
            interactive,
            ..Self::new(out)
        }
    }
}

impl<W: Write> Console<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            interactive: false,
            status: None,
            spinner: None,
        }
    }

    #[cfg(test)]
    pub fn writer(&self) -> &W {
        &self.out
    }

    #[cfg(test)]
    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn start_status(&mut self, message: &str) -> io::Result<()> {
        self.stop_status()?;
        if self.interactive {
            let label = message.yellow().bold().to_string();
            self.spinner = Some(Spinner::new(Spinners::Dots, label));
        }
        self.status = Some(message.to_string());
        Ok(())
    }

    pub fn stop_status(&mut self) -> io::Result<()> {
        self.status = None;
        if let Some(mut spinner) = self.spinner.take() {
            spinner.stop();
            write!(self.out, "\r\x1B[K")?;
            self.out.flush()?;
        }
        Ok(())
    }

    pub fn banner(&mut self, model: &str) -> io::Result<()> {
        self.stop_status()?;
        let title = "AI Research Assistant";
        let subtitle = format!("Powered by {}", model);
        let title_width = title.chars().count();
        let subtitle_width = subtitle.chars().count();
        let inner = (title_width + 2).max(subtitle_width + 4);

        let fill = inner - subtitle_width - 2;
        let lead = fill / 2;
        writeln!(self.out, "{}", border(&format!("╭{}╮", "─".repeat(inner))))?;
        writeln!(
            self.out,
            "{} {}{}{}",
            border("│"),
            title.blue().bold(),
            " ".repeat(inner - 1 - title_width),
            border("│")
        )?;
        writeln!(
            self.out,
            "{} {} {}",
            border(&format!("╰{}", "─".repeat(lead))),
            subtitle.dimmed(),
            border(&format!("{}╯", "─".repeat(fill - lead)))
        )
    }

    pub fn warn(&mut self, message: &str) -> io::Result<()> {
        self.stop_status()?;
        writeln!(self.out, "{}", message.red())
    }

    pub fn failure(&mut self, message: &str) -> io::Result<()> {
        self.stop_status()?;
        writeln!(self.out, "{}", message.red().bold())
    }

    pub fn failure_with_detail(&mut self, label: &str, detail: &str) -> io::Result<()> {
        self.stop_status()?;
        writeln!(self.out, "{} {}", label.red().bold(), detail)
    }

    pub fn line(&mut self, message: &str) -> io::Result<()> {
        self.stop_status()?;
        writeln!(self.out, "{}", message)
    }

    pub fn panel(&mut self, panel: &Panel) -> io::Result<()> {
        self.stop_status()?;
        let body = markdown::render(&panel.body, WRAP_WIDTH);
        let title = Line::new(panel.title.clone(), panel.title.cyan().bold().to_string());
        let footer = Line::new(panel.footer.clone(), panel.footer.dimmed().to_string());

        let inner = body
            .iter()
            .chain([&title, &footer])
            .map(Line::width)
            .max()
            .unwrap_or(0)
            + 2;

        let rule = |edge: &Line, left: &str, right: &str| {
            let fill = inner.saturating_sub(edge.width() + 2);
            let lead = fill / 2;
            format!(
                "{}{} {} {}{}",
                border(left),
                border(&"─".repeat(lead)),
                edge.styled,
                border(&"─".repeat(fill - lead)),
                border(right)
            )
        };

        writeln!(self.out, "{}", rule(&title, "╭", "╮"))?;
        for line in &body {
            let pad = " ".repeat(inner - 1 - line.width());
            writeln!(self.out, "{} {}{}{}", border("│"), line.styled, pad, border("│"))?;
        }
        writeln!(self.out, "{}", rule(&footer, "╰", "╯"))?;
        self.out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::{Console, Panel};
    use crate::schema::ResearchResponse;

    fn response(sources: &[&str], tools: &[&str]) -> ResearchResponse {
        ResearchResponse {
            topic: "Boiling point of water".to_string(),
            summary: "100°C at sea level.".to_string(),
            sources: sources.iter().map(|s| s.to_string()).collect(),
            tools_used: tools.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_panel_footer() {
        let panel = Panel::from_response(&response(&["physics-reference"], &["search"]));
        assert_eq!(panel.title, "Boiling point of water");
        assert_eq!(panel.body, "100°C at sea level.");
        assert_eq!(panel.footer, "Sources: physics-reference | Tools: search");

        let panel = Panel::from_response(&response(&["a", "b"], &[]));
        assert_eq!(panel.footer, "Sources: a, b | Tools: None");
    }

    #[test]
    fn test_panel_contains_every_part() {
        let mut console = Console::new(Vec::new());
        let panel = Panel::from_response(&response(&["physics-reference"], &["search"]));
        console.panel(&panel).unwrap();

        let out = String::from_utf8(console.writer().clone()).unwrap();
        assert!(out.contains("Boiling point of water"));
        assert!(out.contains("100°C at sea level."));
        assert!(out.contains("Sources: physics-reference | Tools: search"));
        assert_eq!(out.lines().count(), 3);
    }

    #[test]
    fn test_panel_body_is_rendered_markdown() {
        let mut console = Console::new(Vec::new());
        let panel = Panel {
            title: "Water".to_string(),
            body: "Water *boils* at `100°C`.\n\n- sea level\n- **standard** pressure".to_string(),
            footer: "Sources: None | Tools: None".to_string(),
        };
        console.panel(&panel).unwrap();

        let out = String::from_utf8(console.writer().clone()).unwrap();
        assert!(out.contains("• sea level"));
        assert!(!out.contains('*'));
        assert!(!out.contains('`'));
        assert!(!out.contains("- sea level"));
    }

    #[test]
    fn test_banner_names_the_model() {
        let mut console = Console::new(Vec::new());
        console.banner("gemini-2.0-flash").unwrap();

        let out = String::from_utf8(console.writer().clone()).unwrap();
        assert!(out.contains("AI Research Assistant"));
        assert!(out.contains("Powered by gemini-2.0-flash"));
        assert_eq!(out.lines().count(), 3);
    }

    #[test]
    fn test_output_ends_the_status() {
        let mut console = Console::new(Vec::new());
        console.start_status("Researching...").unwrap();
        assert_eq!(console.status(), Some("Researching..."));

        console.warn("Hit rate limit.").unwrap();
        assert_eq!(console.status(), None);

        console.start_status("Researching...").unwrap();
        let panel = Panel::from_response(&response(&[], &[]));
        console.panel(&panel).unwrap();
        assert_eq!(console.status(), None);

        // a non-terminal console never draws the spinner
        let out = String::from_utf8(console.writer().clone()).unwrap();
        assert!(!out.contains("Researching..."));
    }
}
