use std::collections::HashMap;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::llm_client::ChatRole;
use crate::models::placeholder::{Discovery, PlaceholderSource};

/// Lifecycle of one uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Uploaded,
    Discovering,
    Ready,
    Answering,
    Finalized,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub role: ChatRole,
    pub text: String,
    pub placeholder_id: Option<String>,
    pub at: DateTime<Utc>,
}

/// State of the sequential questionnaire flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionnaireState {
    /// Placeholder ids in the order they are asked.
    pub order: Vec<String>,
    pub current_index: usize,
    pub values: HashMap<String, String>,
    pub transcript: Vec<TranscriptEntry>,
    /// False once the index has moved past the end of `order`.
    pub active: bool,
}

impl QuestionnaireState {
    pub fn current_placeholder(&self) -> Option<&str> {
        self.order.get(self.current_index).map(String::as_str)
    }
}

/// Output of the most recent successful finalize.
#[derive(Debug, Clone)]
pub struct FilledOutput {
    pub bytes: Bytes,
    pub html: String,
    pub values: HashMap<String, String>,
}

/// One uploaded document and everything derived from it.
#[derive(Debug, Clone)]
pub struct DocumentSession {
    pub document_id: Uuid,
    pub file_name: String,
    pub phase: SessionPhase,
    /// Immutable source document as ingested.
    pub original_bytes: Bytes,
    /// Primary XML part of `original_bytes`, cached at upload.
    pub original_xml: String,
    pub preview_html: String,
    pub normalized_text: String,
    pub discovery: Discovery,
    pub discovery_source: Option<PlaceholderSource>,
    pub questionnaire: Option<QuestionnaireState>,
    pub filled: Option<FilledOutput>,
    pub created_at: DateTime<Utc>,
}

impl DocumentSession {
    pub fn new(file_name: String, original_bytes: Bytes, original_xml: String) -> Self {
        Self {
            document_id: Uuid::new_v4(),
            file_name,
            phase: SessionPhase::Uploaded,
            original_bytes,
            original_xml,
            preview_html: String::new(),
            normalized_text: String::new(),
            discovery: Discovery::default(),
            discovery_source: None,
            questionnaire: None,
            filled: None,
            created_at: Utc::now(),
        }
    }

    /// The value set last applied by finalize, or empty.
    pub fn last_values(&self) -> HashMap<String, String> {
        self.filled
            .as_ref()
            .map(|f| f.values.clone())
            .unwrap_or_default()
    }
}
