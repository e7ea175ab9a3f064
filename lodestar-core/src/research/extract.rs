//! Reference extraction from unstructured research output.
//!
//! Research models are asked to end their answer with a numbered citation
//! list, but the formatting varies wildly in practice. Extraction applies
//! three layered heuristics, first non-empty layer wins:
//!
//! 1. a "References"/"Sources"/"Citations" section with numbered
//!    `N. Title - snippet - URL` lines,
//! 2. bracketed `[N]` citation markers paired with a trailing URL,
//! 3. bare URLs anywhere, synthesizing title and snippet from the text
//!    immediately preceding each URL.
//!
//! Pure functions, no I/O; always returns a (possibly empty) list.

use crate::types::Reference;
use regex::Regex;
use std::sync::OnceLock;

/// Characters preceding a bare URL considered for title/snippet synthesis.
const CONTEXT_WINDOW: usize = 150;

fn heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?im)^\s*(?:#{1,6}\s*)?\*{0,2}(?:references|sources|citations)\*{0,2}\s*:?\s*$")
            .expect("heading regex is valid")
    })
}

fn numbered_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\d+\.\s+(.+?)\s+-\s+(.+?)\s+-\s+(https?://\S+)")
            .expect("numbered line regex is valid")
    })
}

fn bracket_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\[(\d+)\]\s*([^\n\[]*?)\s*(https?://\S+)")
            .expect("bracket marker regex is valid")
    })
}

fn url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"https?://\S+").expect("url regex is valid"))
}

/// Trim trailing punctuation that sentence context glues onto a URL.
fn clean_url(url: &str) -> &str {
    url.trim_end_matches(['.', ',', ';', ')', ']', '>', '"', '\''])
}

/// Extract an ordered list of references from research output text.
pub fn extract_references(text: &str) -> Vec<Reference> {
    let mut references = section_references(text);
    if references.is_empty() {
        references = bracket_references(text);
    }
    if references.is_empty() {
        references = bare_url_references(text);
    }
    references
}

/// Strip a trailing references section from the answer text.
///
/// Cuts at the first references/sources/citations heading line; returns
/// the text unchanged when no heading is present.
pub fn strip_references_section(text: &str) -> String {
    match heading_re().find(text) {
        Some(m) => text[..m.start()].trim_end().to_string(),
        None => text.trim_end().to_string(),
    }
}

/// Layer 1: numbered lines under a references-style heading.
fn section_references(text: &str) -> Vec<Reference> {
    let Some(heading) = heading_re().find(text) else {
        return Vec::new();
    };

    let mut references = Vec::new();
    for line in text[heading.end()..].lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(caps) = numbered_line_re().captures(line) {
            references.push(Reference {
                title: caps[1].trim().to_string(),
                snippet: caps[2].trim().to_string(),
                url: clean_url(&caps[3]).to_string(),
            });
            continue;
        }

        // Dash separators missing: take the URL and halve the text before
        // it into a naive title/snippet boundary.
        if let Some(url) = url_re().find(line) {
            let leading = line[..url.start()]
                .trim()
                .trim_start_matches(|c: char| c.is_ascii_digit() || c == '.')
                .trim();
            let (title, snippet) = halve(leading);
            references.push(Reference {
                title,
                snippet,
                url: clean_url(url.as_str()).to_string(),
            });
        }
    }
    references
}

/// Layer 2: bracketed `[N]` citation markers paired with a trailing URL.
fn bracket_references(text: &str) -> Vec<Reference> {
    bracket_marker_re()
        .captures_iter(text)
        .map(|caps| {
            let number = &caps[1];
            let body = caps[2].trim().trim_end_matches(['-', ':']).trim();
            let title = if body.is_empty() {
                format!("Reference {number}")
            } else {
                body.to_string()
            };
            let snippet = if body.is_empty() {
                "No snippet available".to_string()
            } else {
                body.to_string()
            };
            Reference {
                title,
                snippet,
                url: clean_url(&caps[3]).to_string(),
            }
        })
        .collect()
}

/// Layer 3: bare URLs with synthesized context.
fn bare_url_references(text: &str) -> Vec<Reference> {
    url_re()
        .find_iter(text)
        .map(|url| {
            let preceding_start = text[..url.start()]
                .char_indices()
                .rev()
                .take(CONTEXT_WINDOW)
                .last()
                .map(|(i, _)| i)
                .unwrap_or(url.start());
            let surrounding = text[preceding_start..url.start()].trim();
            let (title, snippet) = halve(surrounding);
            Reference {
                title,
                snippet,
                url: clean_url(url.as_str()).to_string(),
            }
        })
        .collect()
}

/// Split a span in half as a naive title/snippet boundary, with fixed
/// fallback strings for empty halves.
fn halve(span: &str) -> (String, String) {
    let mid = span
        .char_indices()
        .nth(span.chars().count() / 2)
        .map(|(i, _)| i)
        .unwrap_or(0);
    let title = span[..mid].trim();
    let snippet = span[mid..].trim();
    (
        if title.is_empty() {
            "Reference".to_string()
        } else {
            title.to_string()
        },
        if snippet.is_empty() {
            "No snippet available".to_string()
        } else {
            snippet.to_string()
        },
    )
}
