//! Markdown rendering for assistant messages and notices.
//!
//! Renderers are pure: the same text always produces the same markup, which
//! lets the stream machine re-render a whole message on every delta.

use pulldown_cmark::{html, CodeBlockKind, CowStr, Event, Options, Parser, Tag, TagEnd};

pub trait MarkdownRenderer {
    fn render(&self, text: &str) -> String;

    /// Markup for text that must be shown verbatim, such as user input.
    fn render_plain(&self, text: &str) -> String {
        text.to_string()
    }
}

fn markdown_options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options
}

/// Renders Markdown to HTML, for embedders whose sink displays markup.
/// The terminal client always uses [`TextMarkdown`].
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlMarkdown;

impl MarkdownRenderer for HtmlMarkdown {
    fn render(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len() * 3 / 2);
        html::push_html(&mut out, Parser::new_ext(text, markdown_options()));
        out
    }

    fn render_plain(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        html::push_html(&mut out, std::iter::once(Event::Text(CowStr::from(text))));
        out
    }
}

/// Renders Markdown to plain terminal text: markers dropped, code blocks
/// indented, list items bulleted, link targets appended in parentheses.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextMarkdown;

impl MarkdownRenderer for TextMarkdown {
    fn render(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut list_counters: Vec<Option<u64>> = Vec::new();
        let mut link_targets: Vec<String> = Vec::new();
        let mut in_code_block = false;

        for event in Parser::new_ext(text, markdown_options()) {
            match event {
                Event::Start(Tag::Item) => {
                    start_line(&mut out);
                    let depth = list_counters.len().saturating_sub(1);
                    out.push_str(&"  ".repeat(depth));
                    match list_counters.last_mut() {
                        Some(Some(n)) => {
                            out.push_str(&format!("{n}. "));
                            *n += 1;
                        }
                        _ => out.push_str("- "),
                    }
                }
                Event::Start(Tag::List(first)) => {
                    start_line(&mut out);
                    list_counters.push(first);
                }
                Event::End(TagEnd::List(_)) => {
                    list_counters.pop();
                    if list_counters.is_empty() {
                        end_block(&mut out);
                    }
                }
                Event::Start(Tag::CodeBlock(kind)) => {
                    start_line(&mut out);
                    if let CodeBlockKind::Fenced(lang) = kind {
                        if !lang.is_empty() {
                            out.push_str(&format!("    [{lang}]\n"));
                        }
                    }
                    in_code_block = true;
                }
                Event::End(TagEnd::CodeBlock) => {
                    in_code_block = false;
                    end_block(&mut out);
                }
                Event::Start(Tag::Link { dest_url, .. }) => {
                    link_targets.push(dest_url.to_string());
                }
                Event::End(TagEnd::Link) => {
                    if let Some(url) = link_targets.pop() {
                        out.push_str(&format!(" ({url})"));
                    }
                }
                Event::Start(Tag::Heading { .. }) | Event::Start(Tag::Paragraph) => {
                    if list_counters.is_empty() {
                        start_line(&mut out);
                    }
                }
                Event::End(TagEnd::Heading(_)) | Event::End(TagEnd::Paragraph) => {
                    if list_counters.is_empty() {
                        end_block(&mut out);
                    }
                }
                Event::Text(content) if in_code_block => {
                    for line in content.split_inclusive('\n') {
                        out.push_str("    ");
                        out.push_str(line);
                    }
                }
                Event::Text(content) | Event::Html(content) | Event::InlineHtml(content) => {
                    out.push_str(&content);
                }
                Event::Code(code) => {
                    out.push('`');
                    out.push_str(&code);
                    out.push('`');
                }
                Event::SoftBreak | Event::HardBreak => out.push('\n'),
                Event::Rule => {
                    start_line(&mut out);
                    out.push_str("---");
                    end_block(&mut out);
                }
                Event::TaskListMarker(done) => out.push_str(if done { "[x] " } else { "[ ] " }),
                _ => {}
            }
        }

        out.trim_end().to_string()
    }
}

fn start_line(out: &mut String) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

fn end_block(out: &mut String) {
    start_line(out);
    if !out.ends_with("\n\n") {
        out.push('\n');
    }
}
