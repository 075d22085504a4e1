//! Wiki links: `[[Target]]` and `[[Target|Alias]]`.
//!
//! Extraction, existence resolution against a list of notes, cursor-aware
//! detection while typing, and title completion. Every function here is pure
//! and infallible: text that is not well-formed link syntax is simply not a
//! link. Offsets are byte offsets into the original text.
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::Titled;

/// `[[`, title (no `]` or `|`), optional `|alias` (no `]`), `]]`
static WIKILINK_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[\[([^\]|]*)(?:\|([^\]]*))?\]\]").expect("wikilink regex")
});

const OPEN: &str = "[[";
const CLOSE: &str = "]]";

/// A link found in note content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WikiLink {
    /// The matched text, brackets included
    pub original_text: String,
    /// Link target, trimmed
    pub note_title: String,
    /// Alias after the pipe, trimmed; `None` when there is no pipe
    pub display_text: Option<String>,
    pub start_index: usize,
    /// Exclusive
    pub end_index: usize,
    /// Whether a note with this title existed when the text was parsed
    pub exists: bool,
}

impl WikiLink {
    /// Text to show for the link: the alias unless it is missing or blank,
    /// else the title
    pub fn label(&self) -> &str {
        self.display_text
            .as_deref()
            .filter(|alias| !alias.is_empty())
            .unwrap_or(&self.note_title)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedContent<'a> {
    pub text: &'a str,
    pub links: Vec<WikiLink>,
}

/// Where the cursor sits relative to wiki-link syntax.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CursorLink {
    Outside,
    /// Between `[[` and `]]`. `link_text` is everything between the brackets,
    /// alias included; the span covers the brackets.
    Complete {
        link_text: String,
        start_pos: usize,
        end_pos: usize,
    },
    /// After an unclosed `[[`. `link_text` runs from the brackets to the
    /// cursor, which is also `end_pos`.
    Incomplete {
        link_text: String,
        start_pos: usize,
        end_pos: usize,
    },
}

impl CursorLink {
    pub fn is_in_wiki_link(&self) -> bool {
        !matches!(self, CursorLink::Outside)
    }

    pub fn link_text(&self) -> Option<&str> {
        match self {
            CursorLink::Outside => None,
            CursorLink::Complete { link_text, .. } | CursorLink::Incomplete { link_text, .. } => {
                Some(link_text)
            }
        }
    }

    /// `(start_pos, end_pos)` of the link span
    pub fn span(&self) -> Option<(usize, usize)> {
        match self {
            CursorLink::Outside => None,
            CursorLink::Complete {
                start_pos, end_pos, ..
            }
            | CursorLink::Incomplete {
                start_pos, end_pos, ..
            } => Some((*start_pos, *end_pos)),
        }
    }
}

fn title_exists<T: Titled>(title: &str, notes: &[T]) -> bool {
    let wanted = title.to_lowercase();
    notes.iter().any(|note| note.title().to_lowercase() == wanted)
}

/// Extracts every wiki link in `text`, left to right, resolving each against `notes`.
pub fn parse_wiki_links<'a, T: Titled>(text: &'a str, notes: &[T]) -> ParsedContent<'a> {
    let links = WIKILINK_REGEX
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let note_title = caps.get(1).map_or("", |m| m.as_str()).trim().to_string();
            let display_text = caps.get(2).map(|m| m.as_str().trim().to_string());
            let exists = title_exists(&note_title, notes);

            Some(WikiLink {
                original_text: whole.as_str().to_string(),
                note_title,
                display_text,
                start_index: whole.start(),
                end_index: whole.end(),
                exists,
            })
        })
        .collect();

    ParsedContent { text, links }
}

/// Finds the note a link points at, matching titles case-insensitively.
pub fn resolve_wiki_link<'n, T: Titled>(note_title: &str, notes: &'n [T]) -> Option<&'n T> {
    let wanted = note_title.trim().to_lowercase();
    notes
        .iter()
        .find(|note| note.title().to_lowercase() == wanted)
}

/// Largest char boundary of `text` at or below `position`
fn floor_char_boundary(text: &str, position: usize) -> usize {
    let mut position = position.min(text.len());
    while !text.is_char_boundary(position) {
        position -= 1;
    }
    position
}

/// Works out whether `cursor` is inside a wiki link, complete or still being typed.
///
/// The cursor is inside a link when the last `[[` before it comes after the
/// last `]]` before it.
pub fn find_wiki_link_at_cursor(text: &str, cursor: usize) -> CursorLink {
    let cursor = floor_char_boundary(text, cursor);
    let (before, after) = text.split_at(cursor);

    let open = match before.rfind(OPEN) {
        Some(open) => open,
        None => return CursorLink::Outside,
    };
    if before.rfind(CLOSE).is_some_and(|close| close >= open) {
        return CursorLink::Outside;
    }

    match after.find(CLOSE) {
        Some(close) => {
            let end_pos = cursor + close + CLOSE.len();
            CursorLink::Complete {
                link_text: text[open + OPEN.len()..end_pos - CLOSE.len()].to_string(),
                start_pos: open,
                end_pos,
            }
        }
        None => CursorLink::Incomplete {
            link_text: before[open + OPEN.len()..].to_string(),
            start_pos: open,
            end_pos: cursor,
        },
    }
}

/// Titles to offer while typing a link target.
///
/// Exact case-insensitive matches come first, then titles containing the
/// input, both in list order. Blank input returns the head of the list.
pub fn autocomplete_matches<'n, T: Titled>(
    input: &str,
    notes: &'n [T],
    max_results: usize,
) -> Vec<&'n T> {
    if input.trim().is_empty() {
        return notes.iter().take(max_results).collect();
    }

    let query = input.to_lowercase();
    let titles: Vec<String> = notes.iter().map(|n| n.title().to_lowercase()).collect();

    let exact = notes
        .iter()
        .zip(&titles)
        .filter(|(_, title)| **title == query);
    let partial = notes
        .iter()
        .zip(&titles)
        .filter(|(_, title)| **title != query && title.contains(&query));

    exact
        .chain(partial)
        .map(|(note, _)| note)
        .take(max_results)
        .collect()
}

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Replaces every link with a `<span>` flagged as existing or missing.
///
/// Only the links are substituted; the rest of the text is left as is.
pub fn render_with_wiki_links<T: Titled>(text: &str, notes: &[T]) -> String {
    let parsed = parse_wiki_links(text, notes);
    if parsed.links.is_empty() {
        return text.to_string();
    }

    let mut result = text.to_string();
    // right to left so earlier offsets stay valid
    for link in parsed.links.iter().rev() {
        let class = if link.exists {
            "wikilink-exists"
        } else {
            "wikilink-missing"
        };
        let element = format!(
            r#"<span class="{}" data-note-title="{}" data-exists="{}">{}</span>"#,
            class,
            escape_html(&link.note_title),
            link.exists,
            escape_html(link.label())
        );
        result.replace_range(link.start_index..link.end_index, &element);
    }
    result
}
