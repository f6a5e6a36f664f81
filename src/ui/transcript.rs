//! Terminal rendering of one chat turn.
//!
//! Elements of the current turn form a live region at the bottom of the
//! terminal. On a TTY the region is erased and redrawn after every change;
//! otherwise nothing is written until [`TerminalSink::commit`], so piped
//! output only ever contains final content.

use crossterm::cursor::MoveToPreviousLine;
use crossterm::queue;
use crossterm::terminal::{Clear, ClearType};
use std::io::{self, IsTerminal, Write};

use super::text_metrics::{truncate_to_display_width, visual_rows};
use crate::presentation::{ElementHandle, ElementKind, PresentationSink, Severity};
use crate::util::parse_bool_flag;

const DEFAULT_WIDTH: usize = 80;
const COLLAPSED_MARKER: &str = "▶ ";
const EXPANDED_MARKER: &str = "▼ ";
const USER_PREFIX: &str = "› ";

#[derive(Debug, Clone, Copy)]
pub struct TerminalOptions {
    pub live_redraw: bool,
    pub color: bool,
    pub expand_tool_details: bool,
    /// Print user messages. Off when the terminal already echoed the input.
    pub echo_user: bool,
    pub width: usize,
}

impl TerminalOptions {
    pub fn detect(expand_tool_details: bool) -> Self {
        let live_redraw = io::stdout().is_terminal();
        let width = crossterm::terminal::size()
            .map(|(columns, _)| usize::from(columns))
            .unwrap_or(DEFAULT_WIDTH);
        Self {
            live_redraw,
            color: detect_color_support(),
            expand_tool_details,
            echo_user: !io::stdin().is_terminal(),
            width,
        }
    }
}

fn detect_color_support() -> bool {
    if std::env::var("MCPCHAT_FORCE_COLOR")
        .ok()
        .and_then(parse_bool_flag)
        .unwrap_or(false)
    {
        return true;
    }

    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }

    io::stdout().is_terminal()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineStyle {
    Normal,
    User,
    Info,
    Hint,
    Error,
    Tool,
}

impl LineStyle {
    fn for_kind(kind: ElementKind) -> Self {
        match kind {
            ElementKind::User => Self::User,
            ElementKind::Assistant => Self::Normal,
            ElementKind::System(Severity::Info) => Self::Info,
            ElementKind::System(Severity::Hint) => Self::Hint,
            ElementKind::System(Severity::Error) => Self::Error,
            ElementKind::ToolStatus | ElementKind::ToolResult => Self::Tool,
        }
    }

    fn ansi(self) -> Option<&'static str> {
        match self {
            Self::Normal => None,
            Self::User => Some("\x1b[1m"),
            Self::Info => Some("\x1b[2;90m"),
            Self::Hint => Some("\x1b[36m"),
            Self::Error => Some("\x1b[31m"),
            Self::Tool => Some("\x1b[33m"),
        }
    }
}

#[derive(Debug)]
struct Element {
    handle: ElementHandle,
    kind: ElementKind,
    content: String,
}

pub struct TerminalSink<W: Write> {
    out: W,
    options: TerminalOptions,
    elements: Vec<Element>,
    next_id: u64,
    drawn_rows: usize,
}

impl TerminalSink<io::Stdout> {
    pub fn stdout(expand_tool_details: bool) -> Self {
        Self::new(io::stdout(), TerminalOptions::detect(expand_tool_details))
    }
}

impl<W: Write> TerminalSink<W> {
    pub fn new(out: W, options: TerminalOptions) -> Self {
        Self {
            out,
            options,
            elements: Vec::new(),
            next_id: 0,
            drawn_rows: 0,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Close the current turn. Surviving elements become permanent output
    /// and the next turn starts a fresh live region.
    pub fn commit(&mut self) -> io::Result<()> {
        if !self.options.live_redraw {
            let lines = self.region_lines();
            for (style, line) in &lines {
                self.write_line(*style, line)?;
            }
        }
        if !self.elements.is_empty() {
            writeln!(self.out)?;
        }
        self.elements.clear();
        self.drawn_rows = 0;
        self.out.flush()
    }

    fn region_lines(&self) -> Vec<(LineStyle, String)> {
        let mut lines = Vec::new();
        let visible = self
            .elements
            .iter()
            .filter(|element| self.options.echo_user || element.kind != ElementKind::User);
        for (index, element) in visible.enumerate() {
            if index > 0 {
                lines.push((LineStyle::Normal, String::new()));
            }
            lines.extend(self.element_lines(element));
        }
        lines
    }

    fn element_lines(&self, element: &Element) -> Vec<(LineStyle, String)> {
        let style = LineStyle::for_kind(element.kind);
        let content = element.content.trim_end();

        match element.kind {
            ElementKind::ToolResult if !self.options.expand_tool_details => {
                let summary = content.lines().next().unwrap_or_default();
                let line = format!("{COLLAPSED_MARKER}{summary}");
                vec![(
                    style,
                    truncate_to_display_width(&line, self.options.width.max(1)),
                )]
            }
            ElementKind::ToolResult => {
                let mut lines = content.lines();
                let mut out = vec![(
                    style,
                    format!("{EXPANDED_MARKER}{}", lines.next().unwrap_or_default()),
                )];
                out.extend(lines.map(|line| (LineStyle::Normal, line.to_string())));
                out
            }
            ElementKind::User => content
                .lines()
                .enumerate()
                .map(|(index, line)| {
                    let prefix = if index == 0 { USER_PREFIX } else { "  " };
                    (style, format!("{prefix}{line}"))
                })
                .collect(),
            _ => content
                .lines()
                .map(|line| (style, line.to_string()))
                .collect(),
        }
    }

    fn write_line(&mut self, style: LineStyle, line: &str) -> io::Result<()> {
        match style.ansi().filter(|_| self.options.color) {
            Some(code) => writeln!(self.out, "{code}{line}\x1b[0m"),
            None => writeln!(self.out, "{line}"),
        }
    }

    fn redraw(&mut self) -> io::Result<()> {
        if !self.options.live_redraw {
            return Ok(());
        }

        if self.drawn_rows > 0 {
            let rows = u16::try_from(self.drawn_rows).unwrap_or(u16::MAX);
            queue!(
                self.out,
                MoveToPreviousLine(rows),
                Clear(ClearType::FromCursorDown)
            )?;
        }

        let lines = self.region_lines();
        let width = self.options.width;
        let mut rows = 0;
        for (style, line) in &lines {
            rows += visual_rows(line, width);
            self.write_line(*style, line)?;
        }
        self.drawn_rows = rows;
        self.out.flush()
    }

    fn refresh(&mut self) {
        if let Err(error) = self.redraw() {
            tracing::warn!(%error, "terminal redraw failed");
        }
    }
}

impl<W: Write> PresentationSink for TerminalSink<W> {
    fn create_element(&mut self, kind: ElementKind) -> ElementHandle {
        let handle = ElementHandle(self.next_id);
        self.next_id += 1;
        self.elements.push(Element {
            handle,
            kind,
            content: String::new(),
        });
        handle
    }

    fn set_content(&mut self, handle: ElementHandle, markup: &str) {
        let Some(element) = self.elements.iter_mut().find(|e| e.handle == handle) else {
            tracing::debug!(?handle, "content for an element outside the live turn");
            return;
        };
        if element.content != markup {
            element.content = markup.to_string();
            self.refresh();
        }
    }

    fn remove_element(&mut self, handle: ElementHandle) {
        let before = self.elements.len();
        self.elements.retain(|element| element.handle != handle);
        if self.elements.len() != before {
            self.refresh();
        }
    }

    fn scroll_to_latest(&mut self) {
        if self.options.live_redraw {
            if let Err(error) = self.out.flush() {
                tracing::warn!(%error, "terminal flush failed");
            }
        }
    }
}
