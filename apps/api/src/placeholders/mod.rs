// Placeholder discovery and substitution engine.
// Implements: text normalization, regex extraction, LLM classification,
// markup-tolerant patterns and positional replacement.
// All LLM calls go through llm_client: no direct Anthropic calls here.

pub mod classifier;
pub mod discovery;
pub mod extractor;
pub mod ids;
pub mod normalizer;
pub mod prompts;
pub mod xml_pattern;
