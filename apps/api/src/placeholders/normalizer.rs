//! Text Normalizer: turns WordprocessingML markup into a linear plain-text view.
//!
//! Tabs and line breaks become `\t` / `\n`, every paragraph end becomes `\n`,
//! all other tags are stripped and XML entities are decoded. Whitespace inside
//! runs is left untouched: the extractor records raw token text from this view
//! and the pattern builder relies on it verbatim.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

pub(crate) static TAB_STOPS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<w:tabs\b[^>]*>.*?</w:tabs>").expect("tab stop regex"));
pub(crate) static TAB: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<w:tab\b[^>]*/>").expect("tab regex"));
pub(crate) static LINE_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<w:(?:br|cr)\b[^>]*/>").expect("line break regex"));
pub(crate) static PARAGRAPH_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"</w:p>").expect("paragraph regex"));
static ANY_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("tag regex"));
static ENTITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(amp|lt|gt|quot|apos|#[0-9]+|#x[0-9a-fA-F]+);").expect("entity regex")
});

/// Converts a packaged XML part into plain text. Total over any input.
pub fn normalize_xml_text(xml: &str) -> String {
    let text = TAB_STOPS.replace_all(xml, "");
    let text = TAB.replace_all(&text, "\t");
    let text = LINE_BREAK.replace_all(&text, "\n");
    let text = PARAGRAPH_END.replace_all(&text, "\n");
    let text = ANY_TAG.replace_all(&text, "");
    decode_entities(&text)
}

/// Decodes the five predefined XML entities plus numeric character references
/// in a single pass, so `&amp;lt;` decodes to `&lt;` and not `<`.
pub fn decode_entities(text: &str) -> String {
    ENTITY
        .replace_all(text, |caps: &Captures| {
            let name = &caps[1];
            match name {
                "amp" => "&".to_string(),
                "lt" => "<".to_string(),
                "gt" => ">".to_string(),
                "quot" => "\"".to_string(),
                "apos" => "'".to_string(),
                _ => decode_char_ref(name).unwrap_or_else(|| caps[0].to_string()),
            }
        })
        .into_owned()
}

fn decode_char_ref(reference: &str) -> Option<String> {
    let code = if let Some(hex) = reference.strip_prefix("#x") {
        u32::from_str_radix(hex, 16).ok()?
    } else {
        reference.strip_prefix('#')?.parse::<u32>().ok()?
    };
    char::from_u32(code).map(String::from)
}

/// Collapses every whitespace run to one space and trims the ends.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Excerpt of up to `radius` characters either side of the byte span
/// `start..end`, whitespace-collapsed.
pub fn context_snippet(text: &str, start: usize, end: usize, radius: usize) -> String {
    let before_start = text[..start]
        .char_indices()
        .rev()
        .nth(radius.saturating_sub(1))
        .map(|(idx, _)| idx)
        .unwrap_or(0);
    let after_end = text[end..]
        .char_indices()
        .nth(radius)
        .map(|(idx, _)| end + idx)
        .unwrap_or(text.len());
    collapse_whitespace(&text[before_start..after_end])
}
