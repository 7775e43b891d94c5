//! Sequential questionnaire: asks for one placeholder at a time, in document
//! order, and finalizes automatically once every value is present.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::documents::prompts::{NO_CONTEXT, QUESTION_PROMPT, QUESTION_SYSTEM};
use crate::documents::service::{apply_values, has_value, load_session};
use crate::documents::store::SessionStore;
use crate::errors::AppError;
use crate::llm_client::prompts::{truncate_chars, PLAIN_TEXT_INSTRUCTION};
use crate::llm_client::{ChatRole, CompletionService};
use crate::models::placeholder::Placeholder;
use crate::models::session::{DocumentSession, QuestionnaireState, SessionPhase, TranscriptEntry};

/// Context characters sent with each question request.
const QUESTION_CONTEXT_CHARS: usize = 800;

const COMPLETION_MESSAGE: &str =
    "All placeholders are filled in. Your document is ready to download.";

#[derive(Debug, Deserialize)]
pub struct AnswerRequest {
    pub answer: String,
}

#[derive(Debug, Serialize)]
pub struct StepResponse {
    pub done: bool,
    pub message: String,
    /// The placeholder the message asks about. `None` once done.
    pub placeholder_id: Option<String>,
    /// Filled preview, present once done.
    pub preview_html: Option<String>,
}

/// Starts (or restarts) the questionnaire from the last applied value set.
pub async fn start_questionnaire(
    store: &dyn SessionStore,
    llm: &dyn CompletionService,
    id: Uuid,
) -> Result<StepResponse, AppError> {
    let handle = load_session(store, id).await?;
    let mut session = handle.lock().await;

    session.questionnaire = Some(QuestionnaireState {
        order: session
            .discovery
            .entries
            .iter()
            .map(|e| e.placeholder.id.clone())
            .collect(),
        current_index: 0,
        values: session.last_values(),
        transcript: Vec::new(),
        active: true,
    });
    session.phase = SessionPhase::Answering;
    debug!("Questionnaire started for document {id}");

    advance(&mut session, llm).await
}

/// Records the answer for the current placeholder and moves on.
pub async fn submit_answer(
    store: &dyn SessionStore,
    llm: &dyn CompletionService,
    id: Uuid,
    answer: &str,
) -> Result<StepResponse, AppError> {
    let handle = load_session(store, id).await?;
    let mut session = handle.lock().await;

    let questionnaire = session
        .questionnaire
        .as_mut()
        .filter(|q| q.active)
        .ok_or_else(|| {
            AppError::InvalidState(format!("Document {id} has no active questionnaire"))
        })?;

    let answer = answer.trim();
    if answer.is_empty() {
        return Err(AppError::Validation("Answer must not be empty".to_string()));
    }

    if let Some(current) = questionnaire.current_placeholder().map(String::from) {
        questionnaire.values.insert(current.clone(), answer.to_string());
        questionnaire.transcript.push(TranscriptEntry {
            role: ChatRole::User,
            text: answer.to_string(),
            placeholder_id: Some(current),
            at: Utc::now(),
        });
        questionnaire.current_index += 1;
    }

    advance(&mut session, llm).await
}

/// Skips placeholders that already have a value, then either asks the next
/// question or, past the end, fills the document and deactivates.
async fn advance(
    session: &mut DocumentSession,
    llm: &dyn CompletionService,
) -> Result<StepResponse, AppError> {
    let Some(questionnaire) = session.questionnaire.as_mut() else {
        return Err(AppError::InvalidState(
            "Questionnaire has not been started".to_string(),
        ));
    };

    while questionnaire
        .current_placeholder()
        .is_some_and(|pid| has_value(&questionnaire.values, pid))
    {
        questionnaire.current_index += 1;
    }

    let position = questionnaire.current_index + 1;
    let total = questionnaire.order.len();
    let Some(current) = questionnaire.current_placeholder().map(String::from) else {
        let values = questionnaire.values.clone();
        // Stays active if the fill fails, so the caller can retry.
        apply_values(session, values)?;

        let preview_html = session.filled.as_ref().map(|f| f.html.clone());
        if let Some(questionnaire) = session.questionnaire.as_mut() {
            questionnaire.active = false;
            questionnaire.transcript.push(TranscriptEntry {
                role: ChatRole::Assistant,
                text: COMPLETION_MESSAGE.to_string(),
                placeholder_id: None,
                at: Utc::now(),
            });
        }
        return Ok(StepResponse {
            done: true,
            message: COMPLETION_MESSAGE.to_string(),
            placeholder_id: None,
            preview_html,
        });
    };

    let placeholder = match session.discovery.get(&current) {
        Some(entry) => entry.placeholder.clone(),
        None => {
            return Err(AppError::InvalidState(format!(
                "Placeholder {current} is no longer part of this document"
            )))
        }
    };
    let question = generate_question(llm, &placeholder, position, total).await;

    if let Some(questionnaire) = session.questionnaire.as_mut() {
        questionnaire.transcript.push(TranscriptEntry {
            role: ChatRole::Assistant,
            text: question.clone(),
            placeholder_id: Some(current.clone()),
            at: Utc::now(),
        });
    }

    Ok(StepResponse {
        done: false,
        message: question,
        placeholder_id: Some(current),
        preview_html: None,
    })
}

async fn generate_question(
    llm: &dyn CompletionService,
    placeholder: &Placeholder,
    position: usize,
    total: usize,
) -> String {
    let context = placeholder
        .context
        .as_deref()
        .map(|c| truncate_chars(c, QUESTION_CONTEXT_CHARS))
        .unwrap_or(NO_CONTEXT);
    let prompt = QUESTION_PROMPT
        .replace("{label}", &placeholder.label)
        .replace("{context}", context)
        .replace("{position}", &position.to_string())
        .replace("{total}", &total.to_string())
        .replace("{plain_text_instruction}", PLAIN_TEXT_INSTRUCTION);

    match llm.complete(QUESTION_SYSTEM, &prompt).await {
        Ok(question) if !question.trim().is_empty() => question.trim().to_string(),
        Ok(_) => fallback_question(&placeholder.label),
        Err(e) => {
            warn!(
                "Question generation for {} failed: {e}; using static question",
                placeholder.id
            );
            fallback_question(&placeholder.label)
        }
    }
}

pub fn fallback_question(label: &str) -> String {
    format!("What should be filled in for \"{label}\"?")
}
