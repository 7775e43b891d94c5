//! LLM-Assisted Classifier: asks the text-completion service which spans of
//! the document are placeholders, then reconciles its answer into the same
//! `Discovery` shape the regex path produces.
//!
//! The model's reply is free text. `parse_candidates` never fails: anything it
//! cannot read becomes an empty list, which the caller treats as "fall back".

use std::collections::{HashMap, HashSet};

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::llm_client::strip_json_fences;
use crate::models::placeholder::{
    DiscoveredPlaceholder, Discovery, Placeholder, PlaceholderKind, PlaceholderMetadata,
    PlaceholderSource,
};
use crate::placeholders::extractor::{CONTEXT_RADIUS, CURLY_TOKEN, DOLLAR_TOKEN};
use crate::placeholders::ids::IdAllocator;
use crate::placeholders::normalizer::{collapse_whitespace, context_snippet};
use crate::placeholders::prompts::CLASSIFIER_PROMPT;
use crate::placeholders::xml_pattern::build_xml_pattern;

const MODEL_CONTEXT_MAX_CHARS: usize = 200;

/// One entry of the model's placeholder list. Every field is optional on the
/// wire; `raw` is required by reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct LlmCandidate {
    pub id: Option<String>,
    pub label: Option<String>,
    pub raw: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub context: Option<String>,
    pub occurrence: Option<usize>,
}

/// Fills the classifier prompt with (already truncated) document text.
pub fn build_classifier_prompt(document_text: &str) -> String {
    CLASSIFIER_PROMPT.replace("{document_text}", document_text)
}

/// Reads a candidate list out of a model reply.
///
/// Tries, in order: the whole reply (code fences stripped) as a JSON array or
/// as an object with a `placeholders` array; then each `[` … last `]` slice.
/// Returns an empty list when nothing parses.
pub fn parse_candidates(reply: &str) -> Vec<LlmCandidate> {
    let text = strip_json_fences(reply);
    if let Some(list) = parse_list(text) {
        return list;
    }

    let Some(end) = text.rfind(']') else {
        return Vec::new();
    };
    text.match_indices('[')
        .map(|(start, _)| start)
        .take_while(|start| *start < end)
        .find_map(|start| parse_list(&text[start..=end]))
        .unwrap_or_default()
}

fn parse_list(text: &str) -> Option<Vec<LlmCandidate>> {
    let items = match serde_json::from_str::<Value>(text).ok()? {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("placeholders") {
            Some(Value::Array(items)) => items,
            _ => return None,
        },
        _ => return None,
    };
    Some(
        items
            .into_iter()
            .filter_map(|item| serde_json::from_value::<LlmCandidate>(item).ok())
            .collect(),
    )
}

/// Converts classifier candidates into placeholders plus replacement metadata,
/// with the same id allocation and curly de-duplication as the regex path.
pub fn reconcile(candidates: Vec<LlmCandidate>, normalized: &str) -> Discovery {
    let mut ids = IdAllocator::new();
    let mut seen_curly: HashSet<String> = HashSet::new();

    let mut dollar_totals: HashMap<String, usize> = HashMap::new();
    for candidate in &candidates {
        if let Some(raw) = usable_raw(candidate) {
            if infer_kind(candidate.kind.as_deref(), raw) == PlaceholderKind::Dollar {
                *dollar_totals.entry(raw.to_string()).or_insert(0) += 1;
            }
        }
    }
    let mut dollar_seen: HashMap<String, usize> = HashMap::new();

    let mut entries = Vec::new();
    for candidate in &candidates {
        let Some(raw) = usable_raw(candidate) else {
            continue;
        };
        let kind = infer_kind(candidate.kind.as_deref(), raw);
        let inner_trimmed = inner_text(raw, kind);

        let occurrence = match kind {
            PlaceholderKind::Curly => {
                if !seen_curly.insert(inner_trimmed.clone()) {
                    continue;
                }
                None
            }
            PlaceholderKind::Dollar => {
                let seen = dollar_seen.entry(raw.to_string()).or_insert(0);
                *seen += 1;
                match candidate.occurrence.filter(|n| *n > 0) {
                    Some(n) => Some(n),
                    None if dollar_totals.get(raw).copied().unwrap_or(0) > 1 => Some(*seen),
                    None => None,
                }
            }
        };

        let label = candidate.label.as_deref().unwrap_or("");
        let seed = [candidate.id.as_deref(), candidate.label.as_deref()]
            .into_iter()
            .flatten()
            .find(|s| !s.trim().is_empty())
            .unwrap_or(&inner_trimmed);
        let (id, label) = ids.allocate(seed, label);

        if !normalized.contains(raw) {
            warn!("Classifier returned token {raw:?} that does not occur in the document");
        }

        entries.push(DiscoveredPlaceholder {
            placeholder: Placeholder {
                id,
                label,
                context: candidate_context(candidate, raw, normalized),
            },
            metadata: PlaceholderMetadata {
                kind,
                raw: raw.to_string(),
                inner_trimmed,
                occurrence,
                xml_pattern: build_xml_pattern(kind, raw),
                source: PlaceholderSource::Llm,
            },
        });
    }

    Discovery { entries }
}

fn usable_raw(candidate: &LlmCandidate) -> Option<&str> {
    candidate
        .raw
        .as_deref()
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
}

/// Declared type when recognisable, else inferred from the token text.
fn infer_kind(declared: Option<&str>, raw: &str) -> PlaceholderKind {
    match declared.map(|k| k.trim().to_ascii_lowercase()).as_deref() {
        Some("curly") => PlaceholderKind::Curly,
        Some("dollar") => PlaceholderKind::Dollar,
        _ if raw.contains("{{") => PlaceholderKind::Curly,
        _ if raw.contains("$[") => PlaceholderKind::Dollar,
        _ => PlaceholderKind::Curly,
    }
}

fn inner_text(raw: &str, kind: PlaceholderKind) -> String {
    let token = match kind {
        PlaceholderKind::Curly => &CURLY_TOKEN,
        PlaceholderKind::Dollar => &DOLLAR_TOKEN,
    };
    token
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|inner| inner.as_str().trim().to_string())
        .unwrap_or_else(|| raw.trim().to_string())
}

fn candidate_context(candidate: &LlmCandidate, raw: &str, normalized: &str) -> Option<String> {
    let from_model = candidate
        .context
        .as_deref()
        .map(collapse_whitespace)
        .filter(|c| !c.is_empty())
        .map(|c| c.chars().take(MODEL_CONTEXT_MAX_CHARS).collect::<String>());
    from_model.or_else(|| {
        normalized
            .find(raw)
            .map(|start| context_snippet(normalized, start, start + raw.len(), CONTEXT_RADIUS))
            .filter(|c| !c.is_empty())
    })
}
