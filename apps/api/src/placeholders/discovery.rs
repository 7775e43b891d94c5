//! Discovery strategies: pluggable, trait-based placeholder discovery.
//!
//! `RegexDiscovery` is deterministic and always available. `LlmDiscovery` asks
//! the text-completion service and is tried first when enabled. The two never
//! share partial results: if the classifier errors or finds nothing, the regex
//! strategy runs from scratch.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use crate::llm_client::prompts::{truncate_chars, JSON_ONLY_SYSTEM};
use crate::llm_client::{CompletionService, LlmError};
use crate::models::placeholder::{Discovery, PlaceholderSource};
use crate::placeholders::classifier::{build_classifier_prompt, parse_candidates, reconcile};
use crate::placeholders::extractor::extract_placeholders;
use crate::placeholders::normalizer::normalize_xml_text;
use crate::placeholders::prompts::CLASSIFIER_SYSTEM;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("classifier call failed: {0}")]
    Completion(#[from] LlmError),
}

/// Both text views of the primary document part.
pub struct DocumentText<'a> {
    pub xml: &'a str,
    pub normalized: &'a str,
}

/// A placeholder discovery backend. Implement this to add a new path without
/// touching orchestration.
#[async_trait]
pub trait PlaceholderDiscovery: Send + Sync {
    fn source(&self) -> PlaceholderSource;

    async fn discover(&self, text: &DocumentText<'_>) -> Result<Discovery, DiscoveryError>;
}

// ────────────────────────────────────────────────────────────────────────────
// RegexDiscovery
// ────────────────────────────────────────────────────────────────────────────

/// Regex extraction over a fresh normalization of the raw XML.
pub struct RegexDiscovery;

#[async_trait]
impl PlaceholderDiscovery for RegexDiscovery {
    fn source(&self) -> PlaceholderSource {
        PlaceholderSource::Fallback
    }

    async fn discover(&self, text: &DocumentText<'_>) -> Result<Discovery, DiscoveryError> {
        Ok(extract_placeholders(&normalize_xml_text(text.xml)))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// LlmDiscovery
// ────────────────────────────────────────────────────────────────────────────

/// Classifier-backed discovery. Sends at most `char_budget` characters.
pub struct LlmDiscovery {
    pub llm: Arc<dyn CompletionService>,
    pub char_budget: usize,
}

#[async_trait]
impl PlaceholderDiscovery for LlmDiscovery {
    fn source(&self) -> PlaceholderSource {
        PlaceholderSource::Llm
    }

    async fn discover(&self, text: &DocumentText<'_>) -> Result<Discovery, DiscoveryError> {
        let excerpt = truncate_chars(text.normalized, self.char_budget);
        let prompt = build_classifier_prompt(excerpt);
        let system = format!("{CLASSIFIER_SYSTEM} {JSON_ONLY_SYSTEM}");
        let reply = self.llm.complete(&system, &prompt).await?;
        Ok(reconcile(parse_candidates(&reply), text.normalized))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Orchestration
// ────────────────────────────────────────────────────────────────────────────

/// Runs `primary` (if any) and falls back to `fallback` on error or an empty
/// result. Returns the discovery and the strategy that produced it.
pub async fn run_discovery(
    primary: Option<&dyn PlaceholderDiscovery>,
    fallback: &dyn PlaceholderDiscovery,
    text: &DocumentText<'_>,
) -> (Discovery, PlaceholderSource) {
    if let Some(primary) = primary {
        match primary.discover(text).await {
            Ok(discovery) if !discovery.is_empty() => {
                info!(
                    "Discovery via {:?} found {} placeholder(s)",
                    primary.source(),
                    discovery.len()
                );
                return (discovery, primary.source());
            }
            Ok(_) => warn!(
                "Discovery via {:?} found nothing; falling back",
                primary.source()
            ),
            Err(e) => warn!(
                "Discovery via {:?} failed: {e}; falling back",
                primary.source()
            ),
        }
    }

    let discovery = match fallback.discover(text).await {
        Ok(discovery) => discovery,
        Err(e) => {
            warn!("Fallback discovery failed: {e}");
            Discovery::default()
        }
    };
    info!(
        "Discovery via {:?} found {} placeholder(s)",
        fallback.source(),
        discovery.len()
    );
    (discovery, fallback.source())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::testing::ScriptedCompletion;

    const XML: &str = r#"<w:body><w:p><w:r><w:t xml:space="preserve">Dear {{client_name}}, sign here: $[_____]</w:t></w:r></w:p></w:body>"#;

    fn llm_discovery(llm: ScriptedCompletion) -> LlmDiscovery {
        LlmDiscovery {
            llm: Arc::new(llm),
            char_budget: 6000,
        }
    }

    #[tokio::test]
    async fn test_classifier_result_is_preferred() {
        let normalized = normalize_xml_text(XML);
        let text = DocumentText {
            xml: XML,
            normalized: &normalized,
        };
        let llm = llm_discovery(ScriptedCompletion::new().reply(
            r#"[{"id": "client", "label": "Client", "raw": "{{client_name}}", "type": "curly"},
                {"id": "signatory", "label": "Signatory", "raw": "$[_____]", "type": "dollar"}]"#,
        ));

        let (discovery, source) = run_discovery(Some(&llm), &RegexDiscovery, &text).await;
        assert_eq!(source, PlaceholderSource::Llm);
        let ids: Vec<_> = discovery.placeholders().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["client", "signatory"]);
    }

    #[tokio::test]
    async fn test_malformed_reply_falls_back_to_regex() {
        let normalized = normalize_xml_text(XML);
        let text = DocumentText {
            xml: XML,
            normalized: &normalized,
        };
        let llm = llm_discovery(ScriptedCompletion::new().reply("Sorry, I can't help with that."));

        let (discovery, source) = run_discovery(Some(&llm), &RegexDiscovery, &text).await;
        assert_eq!(source, PlaceholderSource::Fallback);
        let ids: Vec<_> = discovery.placeholders().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["client_name", "placeholder_1"]);
    }

    #[tokio::test]
    async fn test_service_failure_falls_back_to_regex() {
        let normalized = normalize_xml_text(XML);
        let text = DocumentText {
            xml: XML,
            normalized: &normalized,
        };
        let llm = llm_discovery(ScriptedCompletion::new().fail());

        let (discovery, source) = run_discovery(Some(&llm), &RegexDiscovery, &text).await;
        assert_eq!(source, PlaceholderSource::Fallback);
        assert_eq!(discovery.len(), 2);
    }

    #[tokio::test]
    async fn test_classifier_prompt_is_truncated_to_budget() {
        let normalized = "x".repeat(50);
        let text = DocumentText {
            xml: "",
            normalized: &normalized,
        };
        let scripted = Arc::new(ScriptedCompletion::new().reply("[]"));
        let llm = LlmDiscovery {
            llm: scripted.clone(),
            char_budget: 10,
        };
        let _ = llm.discover(&text).await;
        let prompts = scripted.prompts.lock().unwrap();
        assert!(prompts[0].contains(&"x".repeat(10)));
        assert!(!prompts[0].contains(&"x".repeat(11)));
    }

    #[tokio::test]
    async fn test_regex_only_mode() {
        let normalized = normalize_xml_text(XML);
        let text = DocumentText {
            xml: XML,
            normalized: &normalized,
        };
        let (discovery, source) = run_discovery(None, &RegexDiscovery, &text).await;
        assert_eq!(source, PlaceholderSource::Fallback);
        assert_eq!(discovery.len(), 2);
    }
}
