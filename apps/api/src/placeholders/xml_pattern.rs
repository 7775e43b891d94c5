//! XML Pattern Builder / Matcher.
//!
//! Word splits a token such as `{{ name }}` across several formatting runs, so
//! in the packaged markup the characters of one logical token are interleaved
//! with tags:
//!
//! ```text
//! <w:r><w:t>{{</w:t></w:r><w:r><w:rPr><w:b/></w:rPr><w:t>name</w:t></w:r><w:r><w:t>}}</w:t></w:r>
//! ```
//!
//! `build_xml_pattern` joins the token's characters with a gap expression that
//! swallows tags. Patterns run against a `MarkupView`, where paragraph ends and
//! line breaks are masked so no gap can cross them, and tab elements are masked
//! so they only match a tab character of the token. A pattern therefore
//! matches exactly the spans the normalized text shows as that token, and
//! occurrence indices agree between the two.
//!
//! Substitution puts the escaped value where the token started and keeps every
//! tag the match spanned, so run structure and formatting survive.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::{debug, warn};

use crate::models::placeholder::{DiscoveredPlaceholder, PlaceholderKind, PlaceholderMetadata};
use crate::placeholders::normalizer::{LINE_BREAK, PARAGRAPH_END, TAB, TAB_STOPS};

/// Zero or more markup tags.
const GAP: &str = r"(?:<[^>]*>)*";

/// Masked paragraph end, line break or tab-stop block. No pattern matches it.
const BREAK_MARK: char = '\x01';
/// Masked `<w:tab/>`: one head byte followed by tail bytes.
const TAB_HEAD: char = '\x02';
const TAB_TAIL: char = '\x03';
const TAB_MARK: &str = r"\x02\x03*";

/// Optional whitespace padding inside `{{ … }}`.
const PADDING: &str = r"(?:(?:[^\S\n]|\x02\x03*)(?:<[^>]*>)*)*";

static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("tag regex"));

/// A markup part prepared for token matching. Byte offsets in the masked text
/// are offsets in the original.
pub struct MarkupView<'a> {
    xml: &'a str,
    masked: String,
}

impl<'a> MarkupView<'a> {
    pub fn new(xml: &'a str) -> Self {
        let masked = mask(xml, &TAB_STOPS, BREAK_MARK, BREAK_MARK);
        let masked = mask(&masked, &LINE_BREAK, BREAK_MARK, BREAK_MARK);
        let masked = mask(&masked, &PARAGRAPH_END, BREAK_MARK, BREAK_MARK);
        let masked = mask(&masked, &TAB, TAB_HEAD, TAB_TAIL);
        Self { xml, masked }
    }
}

/// Replaces every match with an ASCII run of the same byte length.
fn mask(text: &str, element: &Regex, head: char, tail: char) -> String {
    element
        .replace_all(text, |caps: &Captures<'_>| {
            let len = caps[0].len();
            let mut run = String::with_capacity(len);
            run.push(head);
            run.extend(std::iter::repeat(tail).take(len.saturating_sub(1)));
            run
        })
        .into_owned()
}

/// Builds a regex source matching `raw` with arbitrary tags between its
/// characters. Every character of `raw`, whitespace included, is required.
/// Curly tokens are the exception at their edges: padding around the inner
/// name is optional, since all spellings of one name are one placeholder.
pub fn build_xml_pattern(kind: PlaceholderKind, raw: &str) -> String {
    let raw = raw.trim();
    let curly_inner = raw
        .strip_prefix("{{")
        .and_then(|rest| rest.strip_suffix("}}"))
        .map(str::trim)
        .filter(|inner| !inner.is_empty());

    match (kind, curly_inner) {
        (PlaceholderKind::Curly, Some(inner)) => {
            let mut elements = vec![char_pattern('{'), char_pattern('{'), PADDING.to_string()];
            elements.extend(inner.chars().map(char_pattern));
            elements.push(PADDING.to_string());
            elements.push(char_pattern('}'));
            elements.push(char_pattern('}'));
            elements.join(GAP)
        }
        _ => raw.chars().map(char_pattern).collect::<Vec<_>>().join(GAP),
    }
}

/// One text character as it may be serialized inside markup: literally (or as
/// its predefined entity), or as a numeric character reference.
fn char_pattern(c: char) -> String {
    let literal = match c {
        '&' => "&amp;".to_string(),
        '<' => "&lt;".to_string(),
        '>' => ">|&gt;".to_string(),
        '"' => "\"|&quot;".to_string(),
        '\'' => "'|&apos;".to_string(),
        '\t' => format!(r"\t|{TAB_MARK}"),
        other => regex::escape(other.encode_utf8(&mut [0u8; 4])),
    };
    let code = c as u32;
    format!("(?:{literal}|&#0*{code};|&#x0*(?i:{code:x});)")
}

/// Escapes text for use as XML character content or attribute value.
pub fn escape_xml(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

/// A pending replacement of `xml[start..end]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Edit {
    pub start: usize,
    pub end: usize,
    pub replacement: String,
}

/// Computes the edits replacing one placeholder with `value`.
///
/// Curly tokens, and dollar tokens without an occurrence, replace every match.
/// Dollar tokens with an occurrence replace only the Nth match (1-based),
/// counted from the start of the markup. Zero matches yields no edits.
pub fn plan_edits(
    view: &MarkupView<'_>,
    metadata: &PlaceholderMetadata,
    value: &str,
) -> Vec<Edit> {
    if metadata.xml_pattern.is_empty() {
        return Vec::new();
    }
    let regex = match Regex::new(&metadata.xml_pattern) {
        Ok(regex) => regex,
        Err(e) => {
            warn!("Skipping placeholder {:?}: bad pattern: {e}", metadata.raw);
            return Vec::new();
        }
    };

    let escaped = escape_xml(value);
    let to_edit = |m: regex::Match<'_>| Edit {
        start: m.start(),
        end: m.end(),
        replacement: replacement_for(&view.xml[m.start()..m.end()], &escaped),
    };

    match (metadata.kind, metadata.occurrence) {
        (PlaceholderKind::Dollar, Some(n)) if n > 0 => regex
            .find_iter(&view.masked)
            .nth(n - 1)
            .map(to_edit)
            .into_iter()
            .collect(),
        _ => regex.find_iter(&view.masked).map(to_edit).collect(),
    }
}

/// The escaped value followed by every tag inside the matched span, except
/// tab elements, which were part of the token's text.
fn replacement_for(matched: &str, escaped_value: &str) -> String {
    let mut replacement = escaped_value.to_string();
    for tag in TAG.find_iter(matched).filter(|t| !TAB.is_match(t.as_str())) {
        replacement.push_str(tag.as_str());
    }
    replacement
}

/// Applies edits in one left-to-right pass. Overlapping edits keep the one
/// that starts first.
pub fn apply_edits(xml: &str, mut edits: Vec<Edit>) -> String {
    edits.sort_by_key(|e| (e.start, e.end));

    let mut out = String::with_capacity(xml.len());
    let mut cursor = 0;
    for edit in edits {
        if edit.start < cursor {
            warn!(
                "Dropping overlapping replacement at {}..{} (already replaced up to {})",
                edit.start, edit.end, cursor
            );
            continue;
        }
        out.push_str(&xml[cursor..edit.start]);
        out.push_str(&edit.replacement);
        cursor = edit.end;
    }
    out.push_str(&xml[cursor..]);
    out
}

/// Result of substituting a whole value set.
#[derive(Debug, Clone)]
pub struct FillResult {
    pub xml: String,
    /// Matches replaced per placeholder id.
    pub replaced: HashMap<String, usize>,
}

/// Substitutes every placeholder that has a value. All edits are planned
/// against the untouched `xml`, so occurrence indices refer to the original
/// markup and inserted values are never matched again.
pub fn fill_xml(
    xml: &str,
    entries: &[DiscoveredPlaceholder],
    values: &HashMap<String, String>,
) -> FillResult {
    let view = MarkupView::new(xml);
    let mut edits = Vec::new();
    let mut replaced = HashMap::new();

    for entry in entries {
        let id = &entry.placeholder.id;
        let Some(value) = values.get(id) else {
            continue;
        };
        let planned = plan_edits(&view, &entry.metadata, value);
        debug!("Placeholder {id}: {} match(es)", planned.len());
        replaced.insert(id.clone(), planned.len());
        edits.extend(planned);
    }

    FillResult {
        xml: apply_edits(xml, edits),
        replaced,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::placeholder::{Placeholder, PlaceholderSource};

    fn replace_placeholder(xml: &str, metadata: &PlaceholderMetadata, value: &str) -> String {
        apply_edits(xml, plan_edits(&MarkupView::new(xml), metadata, value))
    }

    fn match_count(kind: PlaceholderKind, raw: &str, xml: &str) -> usize {
        let re = Regex::new(&build_xml_pattern(kind, raw)).unwrap();
        re.find_iter(&MarkupView::new(xml).masked).count()
    }

    fn meta(kind: PlaceholderKind, raw: &str, occurrence: Option<usize>) -> PlaceholderMetadata {
        PlaceholderMetadata {
            kind,
            raw: raw.to_string(),
            inner_trimmed: String::new(),
            occurrence,
            xml_pattern: build_xml_pattern(kind, raw),
            source: PlaceholderSource::Fallback,
        }
    }

    fn entry(id: &str, metadata: PlaceholderMetadata) -> DiscoveredPlaceholder {
        DiscoveredPlaceholder {
            placeholder: Placeholder {
                id: id.to_string(),
                label: id.to_string(),
                context: None,
            },
            metadata,
        }
    }

    #[test]
    fn test_pattern_matches_token_split_across_runs() {
        let xml = r#"<w:r><w:t>{{</w:t></w:r><w:r><w:rPr><w:b/></w:rPr><w:t>na</w:t></w:r><w:r><w:t>me}}</w:t></w:r>"#;
        let re = Regex::new(&build_xml_pattern(PlaceholderKind::Curly, "{{name}}")).unwrap();
        let m = re.find(xml).unwrap();
        assert!(m.as_str().starts_with("{{"));
        assert!(m.as_str().ends_with("}}"));
    }

    #[test]
    fn test_split_token_keeps_run_structure() {
        let xml = r#"<w:r><w:t>{{</w:t></w:r><w:r><w:rPr><w:b/></w:rPr><w:t>name}}</w:t></w:r>"#;
        let out = replace_placeholder(xml, &meta(PlaceholderKind::Curly, "{{name}}", None), "Acme");
        assert_eq!(
            out,
            r#"<w:r><w:t>Acme</w:t></w:r><w:r><w:rPr><w:b/></w:rPr><w:t></w:t></w:r>"#
        );
    }

    #[test]
    fn test_pattern_escapes_regex_metacharacters() {
        let pattern = build_xml_pattern(PlaceholderKind::Dollar, "$[a.b]");
        let re = Regex::new(&pattern).unwrap();
        assert!(re.is_match("$[a.b]"));
        assert!(!re.is_match("$[axb]"));
    }

    #[test]
    fn test_pattern_matches_entity_encoded_characters() {
        let re = Regex::new(&build_xml_pattern(PlaceholderKind::Curly, "{{R&D \"lead\"}}")).unwrap();
        assert!(re.is_match("{{R&amp;D &quot;lead&quot;}}"));
        assert!(re.is_match("{{R&amp;D \"lead\"}}"));
    }

    #[test]
    fn test_tab_in_raw_matches_tab_element() {
        let xml = "<w:r><w:t>$[</w:t><w:tab/><w:t>]</w:t></w:r>";
        assert_eq!(match_count(PlaceholderKind::Dollar, "$[\t]", xml), 1);
        assert_eq!(match_count(PlaceholderKind::Dollar, "$[]", xml), 0);
        assert_eq!(
            replace_placeholder(xml, &meta(PlaceholderKind::Dollar, "$[\t]", None), "X"),
            "<w:r><w:t>X</w:t><w:t></w:t></w:r>"
        );
    }

    #[test]
    fn test_whitespace_is_required_in_dollar_tokens() {
        let xml = "<w:t>Buyer $[] and seller $[ ]</w:t>";
        assert_eq!(match_count(PlaceholderKind::Dollar, "$[]", xml), 1);
        assert_eq!(match_count(PlaceholderKind::Dollar, "$[ ]", xml), 1);

        let entries = vec![
            entry("placeholder_1", meta(PlaceholderKind::Dollar, "$[]", Some(1))),
            entry("placeholder_2", meta(PlaceholderKind::Dollar, "$[ ]", Some(1))),
        ];
        let values = HashMap::from([
            ("placeholder_1".to_string(), "A".to_string()),
            ("placeholder_2".to_string(), "B".to_string()),
        ]);
        assert_eq!(
            fill_xml(xml, &entries, &values).xml,
            "<w:t>Buyer A and seller B</w:t>"
        );
    }

    #[test]
    fn test_named_dollar_tokens_differing_by_space_stay_distinct() {
        let xml = "<w:t>From $[start date] to $[startdate]</w:t>";
        let entries = vec![
            entry("start_date", meta(PlaceholderKind::Dollar, "$[start date]", Some(1))),
            entry("startdate", meta(PlaceholderKind::Dollar, "$[startdate]", Some(1))),
        ];
        let values = HashMap::from([
            ("start_date".to_string(), "May 1".to_string()),
            ("startdate".to_string(), "June 1".to_string()),
        ]);
        assert_eq!(
            fill_xml(xml, &entries, &values).xml,
            "<w:t>From May 1 to June 1</w:t>"
        );
    }

    #[test]
    fn test_split_whitespace_still_matches_across_runs() {
        let xml = "<w:r><w:t>$[start </w:t></w:r><w:r><w:t>date]</w:t></w:r>";
        assert_eq!(match_count(PlaceholderKind::Dollar, "$[start date]", xml), 1);
    }

    #[test]
    fn test_paragraph_and_line_breaks_are_not_crossed() {
        let across_paragraph =
            "<w:p><w:r><w:t>$[</w:t></w:r></w:p><w:p><w:r><w:t>]</w:t></w:r></w:p>";
        assert_eq!(match_count(PlaceholderKind::Dollar, "$[]", across_paragraph), 0);

        let across_break = "<w:r><w:t>{{na</w:t><w:br/><w:t>me}}</w:t></w:r>";
        assert_eq!(match_count(PlaceholderKind::Curly, "{{name}}", across_break), 0);
        let across_cr = "<w:r><w:t>$[a</w:t><w:cr/><w:t>]</w:t></w:r>";
        assert_eq!(match_count(PlaceholderKind::Dollar, "$[a]", across_cr), 0);
    }

    #[test]
    fn test_broken_token_does_not_shift_later_occurrences() {
        let xml = "<w:p><w:r><w:t>Note $[</w:t></w:r></w:p><w:p><w:r><w:t>] here. Sign: $[] Date: $[]</w:t></w:r></w:p>";
        let entries = vec![
            entry("placeholder_1", meta(PlaceholderKind::Dollar, "$[]", Some(1))),
            entry("placeholder_2", meta(PlaceholderKind::Dollar, "$[]", Some(2))),
        ];
        let values = HashMap::from([
            ("placeholder_1".to_string(), "SIG".to_string()),
            ("placeholder_2".to_string(), "DATE".to_string()),
        ]);
        assert_eq!(
            fill_xml(xml, &entries, &values).xml,
            "<w:p><w:r><w:t>Note $[</w:t></w:r></w:p><w:p><w:r><w:t>] here. Sign: SIG Date: DATE</w:t></w:r></w:p>"
        );
    }

    #[test]
    fn test_numeric_character_references_match() {
        assert_eq!(match_count(PlaceholderKind::Dollar, "$[fee]", "<w:t>&#36;[fee]</w:t>"), 1);
        assert_eq!(match_count(PlaceholderKind::Dollar, "$[fee]", "<w:t>&#x24;&#X5b;fee]</w:t>"), 0);
        assert_eq!(match_count(PlaceholderKind::Dollar, "$[fee]", "<w:t>&#x24;&#x5B;fee]</w:t>"), 1);
        assert_eq!(
            match_count(PlaceholderKind::Curly, "{{a b}}", "<w:t>&#123;{a&#160;b}}</w:t>"),
            0
        );
        assert_eq!(
            match_count(PlaceholderKind::Curly, "{{a b}}", "<w:t>&#123;{a&#32;b}}</w:t>"),
            1
        );

        let xml = "<w:t>Fee: &#36;[fee]</w:t>";
        let out = replace_placeholder(xml, &meta(PlaceholderKind::Dollar, "$[fee]", Some(1)), "10");
        assert_eq!(out, "<w:t>Fee: 10</w:t>");
    }

    #[test]
    fn test_view_preserves_byte_offsets() {
        let xml = "<w:p><w:r><w:t>é</w:t><w:tab/><w:br/></w:r></w:p>";
        let view = MarkupView::new(xml);
        assert_eq!(view.masked.len(), xml.len());
        assert!(view.masked.starts_with("<w:p><w:r><w:t>é</w:t>\x02"));
    }

    #[test]
    fn test_curly_replaces_every_occurrence() {
        let xml = "<w:t>{{name}} and {{ name }} and {{other}}</w:t>";
        let out = replace_placeholder(xml, &meta(PlaceholderKind::Curly, "{{name}}", None), "Bob");
        assert_eq!(out, "<w:t>Bob and Bob and {{other}}</w:t>");
    }

    #[test]
    fn test_dollar_with_occurrence_replaces_only_that_match() {
        let xml = "<w:t>$[___] $[___] $[___]</w:t>";
        let out = replace_placeholder(xml, &meta(PlaceholderKind::Dollar, "$[___]", Some(2)), "X");
        assert_eq!(out, "<w:t>$[___] X $[___]</w:t>");
    }

    #[test]
    fn test_dollar_occurrence_beyond_matches_is_noop() {
        let xml = "<w:t>$[___]</w:t>";
        let out = replace_placeholder(xml, &meta(PlaceholderKind::Dollar, "$[___]", Some(3)), "X");
        assert_eq!(out, xml);
    }

    #[test]
    fn test_dollar_without_occurrence_replaces_all() {
        let xml = "<w:t>$[x] $[x]</w:t>";
        let out = replace_placeholder(xml, &meta(PlaceholderKind::Dollar, "$[x]", None), "Y");
        assert_eq!(out, "<w:t>Y Y</w:t>");
    }

    #[test]
    fn test_value_is_xml_escaped() {
        let xml = "<w:t>{{co}}</w:t>";
        let out = replace_placeholder(
            xml,
            &meta(PlaceholderKind::Curly, "{{co}}", None),
            "Smith & Sons <\"Ltd\">",
        );
        assert_eq!(out, "<w:t>Smith &amp; Sons &lt;&quot;Ltd&quot;&gt;</w:t>");
    }

    #[test]
    fn test_fill_counts_dollar_occurrences_against_original_markup() {
        let xml = "<w:t>$[__] / $[__] / $[__]</w:t>";
        let entries = vec![
            entry("placeholder_1", meta(PlaceholderKind::Dollar, "$[__]", Some(1))),
            entry("placeholder_2", meta(PlaceholderKind::Dollar, "$[__]", Some(2))),
            entry("placeholder_3", meta(PlaceholderKind::Dollar, "$[__]", Some(3))),
        ];
        let values = HashMap::from([
            ("placeholder_1".to_string(), "A".to_string()),
            ("placeholder_3".to_string(), "C".to_string()),
        ]);
        let result = fill_xml(xml, &entries, &values);
        assert_eq!(result.xml, "<w:t>A / $[__] / C</w:t>");
        assert_eq!(result.replaced["placeholder_1"], 1);
        assert!(!result.replaced.contains_key("placeholder_2"));
    }

    #[test]
    fn test_inserted_values_are_not_resubstituted() {
        let xml = "<w:t>{{a}} {{b}}</w:t>";
        let entries = vec![
            entry("a", meta(PlaceholderKind::Curly, "{{a}}", None)),
            entry("b", meta(PlaceholderKind::Curly, "{{b}}", None)),
        ];
        let values = HashMap::from([
            ("a".to_string(), "{{b}}".to_string()),
            ("b".to_string(), "B".to_string()),
        ]);
        assert_eq!(fill_xml(xml, &entries, &values).xml, "<w:t>{{b}} B</w:t>");
    }

    #[test]
    fn test_overlapping_edits_keep_first() {
        let edits = vec![
            Edit {
                start: 2,
                end: 6,
                replacement: "Y".to_string(),
            },
            Edit {
                start: 0,
                end: 4,
                replacement: "X".to_string(),
            },
        ];
        assert_eq!(apply_edits("abcdefgh", edits), "Xefgh");
    }

    #[test]
    fn test_empty_pattern_never_matches() {
        let m = meta(PlaceholderKind::Curly, "   ", None);
        assert!(plan_edits(&MarkupView::new("<w:t>abc</w:t>"), &m, "v").is_empty());
    }
}
