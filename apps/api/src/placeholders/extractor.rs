//! Placeholder Extractor: the deterministic regex discovery path.
//!
//! Recognises two token shapes in normalized text:
//! - `{{ inner }}`: one placeholder per distinct trimmed inner name, however
//!   many times it occurs. `{{ }}` with blank inner text is ignored.
//! - `$[ inner ]`: one placeholder per occurrence, with the occurrence's 1-based
//!   index among tokens of identical raw text. Inner text that sanitizes to
//!   nothing (`$[]`, `$[_____]`) gets an anonymous `placeholder_N` id.
//!
//! Inner text may not contain a newline, so a token broken by a paragraph or
//! line break is not a token.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::placeholder::{
    DiscoveredPlaceholder, Discovery, Placeholder, PlaceholderKind, PlaceholderMetadata,
    PlaceholderSource,
};
use crate::placeholders::ids::IdAllocator;
use crate::placeholders::normalizer::context_snippet;
use crate::placeholders::xml_pattern::build_xml_pattern;

/// Characters of context captured either side of a token.
pub const CONTEXT_RADIUS: usize = 400;

pub static CURLY_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{([^{}\n]*)\}\}").expect("curly token regex"));
pub static DOLLAR_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\[([^\[\]\n]*)\]").expect("dollar token regex"));

/// Finds every placeholder in `normalized`, in document order.
///
/// Ids are allocated curly tokens first, then dollar tokens, so a named dollar
/// token that collides with a curly name is the one that gets the suffix.
pub fn extract_placeholders(normalized: &str) -> Discovery {
    let mut ids = IdAllocator::new();
    let mut found: Vec<(usize, DiscoveredPlaceholder)> = Vec::new();

    let mut seen_curly: HashSet<String> = HashSet::new();
    for caps in CURLY_TOKEN.captures_iter(normalized) {
        let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let inner_trimmed = inner.as_str().trim();
        if inner_trimmed.is_empty() || !seen_curly.insert(inner_trimmed.to_string()) {
            continue;
        }

        let (id, label) = ids.allocate(inner_trimmed, "");
        found.push((
            whole.start(),
            build_entry(
                normalized,
                whole,
                id,
                label,
                PlaceholderKind::Curly,
                inner_trimmed,
                None,
            ),
        ));
    }

    let mut dollar_counts: HashMap<&str, usize> = HashMap::new();
    for caps in DOLLAR_TOKEN.captures_iter(normalized) {
        let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let count = dollar_counts.entry(whole.as_str()).or_insert(0);
        *count += 1;
        let occurrence = *count;

        let inner_trimmed = inner.as_str().trim();
        let (id, label) = if inner_trimmed.is_empty() {
            ids.allocate_anonymous()
        } else {
            ids.allocate(inner_trimmed, "")
        };
        found.push((
            whole.start(),
            build_entry(
                normalized,
                whole,
                id,
                label,
                PlaceholderKind::Dollar,
                inner_trimmed,
                Some(occurrence),
            ),
        ));
    }

    found.sort_by_key(|(position, _)| *position);
    Discovery {
        entries: found.into_iter().map(|(_, entry)| entry).collect(),
    }
}

fn build_entry(
    normalized: &str,
    whole: regex::Match<'_>,
    id: String,
    label: String,
    kind: PlaceholderKind,
    inner_trimmed: &str,
    occurrence: Option<usize>,
) -> DiscoveredPlaceholder {
    let raw = whole.as_str();
    let context = context_snippet(normalized, whole.start(), whole.end(), CONTEXT_RADIUS);
    DiscoveredPlaceholder {
        placeholder: Placeholder {
            id,
            label,
            context: (!context.is_empty()).then_some(context),
        },
        metadata: PlaceholderMetadata {
            kind,
            raw: raw.to_string(),
            inner_trimmed: inner_trimmed.to_string(),
            occurrence,
            xml_pattern: build_xml_pattern(kind, raw),
            source: PlaceholderSource::Fallback,
        },
    }
}
