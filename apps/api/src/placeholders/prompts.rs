// Placeholder discovery LLM prompt templates.
// All prompts for the placeholders module are defined here.

pub const CLASSIFIER_SYSTEM: &str = "\
You are a meticulous legal document analyst. \
You identify the dynamic fields of contract templates: the spots a user must fill in before signing. \
You MUST respond with a valid JSON array only: no markdown fences, no explanations. \
Copy every token EXACTLY as it appears in the document, including brackets and spacing.";

pub const CLASSIFIER_PROMPT: &str = r#"Identify every placeholder in the contract template below.

Placeholders usually look like {{ field_name }} or $[ ... ] (the inner part of $[ ] may be blank or underscores).
List each {{ }} name once, no matter how often it repeats. List EVERY $[ ] token separately, in document order,
even when several are identical.

DOCUMENT TEXT:
{document_text}

OUTPUT SCHEMA (return exactly this structure):
[
  {
    "id": "snake_case_identifier",
    "label": "Human readable name of the value to collect",
    "raw": "the exact token text, e.g. {{ client_name }} or $[_____]",
    "type": "curly" | "dollar",
    "context": "a short phrase of surrounding text that explains what the field is"
  }
]

RULES:
1. "raw" is mandatory and must be copied verbatim from the document.
2. Infer a meaningful "id" and "label" for blank $[ ] tokens from the surrounding text
   (e.g. "Purchase price" for "for the sum of $[_____]").
3. Return [] if the document has no placeholders.
4. Return ONLY the JSON array: nothing else, no code fences."#;
