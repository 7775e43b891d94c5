use serde::{Deserialize, Serialize};

/// A detected dynamic slot, as exposed to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placeholder {
    /// Unique within a document; key of the values map.
    pub id: String,
    pub label: String,
    pub context: Option<String>,
}

/// Token shape of a placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceholderKind {
    /// `{{ name }}`: every occurrence of the same inner name is one placeholder.
    Curly,
    /// `$[ … ]`: each occurrence is its own placeholder, replaced positionally.
    Dollar,
}

/// Which discovery path produced a placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceholderSource {
    Fallback,
    Llm,
}

/// Replacement instructions for one placeholder. Never leaves the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceholderMetadata {
    pub kind: PlaceholderKind,
    /// Exact token text as it appeared in the normalized text.
    pub raw: String,
    pub inner_trimmed: String,
    /// 1-based index among matches of the same raw pattern (dollar tokens only).
    pub occurrence: Option<usize>,
    /// Regex source matching `raw` against the packaged markup.
    pub xml_pattern: String,
    pub source: PlaceholderSource,
}

/// One discovered placeholder together with its replacement instructions.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredPlaceholder {
    pub placeholder: Placeholder,
    pub metadata: PlaceholderMetadata,
}

/// Uniform result of any discovery strategy, in document order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Discovery {
    pub entries: Vec<DiscoveredPlaceholder>,
}

impl Discovery {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn placeholders(&self) -> Vec<Placeholder> {
        self.entries.iter().map(|e| e.placeholder.clone()).collect()
    }

    pub fn get(&self, id: &str) -> Option<&DiscoveredPlaceholder> {
        self.entries.iter().find(|e| e.placeholder.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&PlaceholderKind::Dollar).unwrap(),
            "\"dollar\""
        );
    }

    #[test]
    fn test_placeholder_context_is_optional_in_json() {
        let placeholder: Placeholder =
            serde_json::from_str(r#"{"id": "date", "label": "Date", "context": null}"#).unwrap();
        assert!(placeholder.context.is_none());
    }
}
