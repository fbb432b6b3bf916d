//! Lightweight markup to HTML conversion for provider output.
//!
//! Providers answer in a small markdown subset: `#`/`##`/`###` headings,
//! `**bold**`, `- ` bullets and `N. ` numbered items. Everything else is
//! passed through untouched and line breaks become `<br />`.
//!
//! No sanitization happens here. Output is trusted raw HTML and must be
//! produced exactly once per itinerary: feeding HTML back in is not safe.

use once_cell::sync::Lazy;
use regex::Regex;

static BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*(.+?)\*\*").expect("valid bold regex"));

static NUMBERED_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+\. (.*)$").expect("valid numbered item regex"));

const LINE_BREAK: &str = "<br />";

#[derive(Debug, Clone, Copy, PartialEq)]
enum ListKind {
    Bullet,
    Numbered,
}

impl ListKind {
    fn open(&self) -> &'static str {
        match self {
            ListKind::Bullet => "<ul>",
            ListKind::Numbered => "<ol>",
        }
    }

    fn close(&self) -> &'static str {
        match self {
            ListKind::Bullet => "</ul>",
            ListKind::Numbered => "</ol>",
        }
    }
}

/// One converted source line
enum Line {
    Heading(String),
    Item(ListKind, String),
    Text(String),
}

fn classify(line: &str) -> Line {
    // Longest heading marker first so "### " never reads as "# "
    if let Some(rest) = line.strip_prefix("### ") {
        return Line::Heading(format!("<h3>{}</h3>", bold(rest)));
    }
    if let Some(rest) = line.strip_prefix("## ") {
        return Line::Heading(format!("<h2>{}</h2>", bold(rest)));
    }
    if let Some(rest) = line.strip_prefix("# ") {
        return Line::Heading(format!("<h1>{}</h1>", bold(rest)));
    }
    if let Some(rest) = line.strip_prefix("- ") {
        return Line::Item(ListKind::Bullet, bold(rest));
    }
    if let Some(caps) = NUMBERED_ITEM.captures(line) {
        return Line::Item(ListKind::Numbered, bold(&caps[1]));
    }
    Line::Text(bold(line))
}

fn bold(text: &str) -> String {
    BOLD.replace_all(text, "<strong>$1</strong>").into_owned()
}

/// Convert provider markup into display HTML.
///
/// Consecutive list items of the same kind share one `<ul>`/`<ol>`. Lines
/// that are not list items are joined with `<br />`, so the visible text
/// of the output equals the source text minus its markup tokens.
pub fn format_itinerary(raw_text: &str) -> String {
    let normalized = raw_text.replace("\r\n", "\n");
    let mut html = String::with_capacity(normalized.len() + normalized.len() / 4);
    let mut open_list: Option<ListKind> = None;
    let mut first = true;

    for source_line in normalized.split('\n') {
        let line = classify(source_line.trim_end());

        match line {
            Line::Item(kind, content) => {
                if open_list != Some(kind) {
                    if let Some(previous) = open_list.take() {
                        html.push_str(previous.close());
                    } else if !first {
                        html.push_str(LINE_BREAK);
                    }
                    html.push_str(kind.open());
                    open_list = Some(kind);
                }
                html.push_str("<li>");
                html.push_str(&content);
                html.push_str("</li>");
            }
            Line::Heading(content) | Line::Text(content) => {
                if let Some(previous) = open_list.take() {
                    html.push_str(previous.close());
                } else if !first {
                    html.push_str(LINE_BREAK);
                }
                html.push_str(&content);
            }
        }
        first = false;
    }

    if let Some(list) = open_list {
        html.push_str(list.close());
    }

    html
}
