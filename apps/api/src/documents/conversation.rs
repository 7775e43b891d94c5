//! Free-form help for a single placeholder. Stateless: the client sends the
//! whole transcript each time and nothing is recorded on the session.

use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use uuid::Uuid;

use crate::documents::prompts::{CONVERSE_SYSTEM, NO_CONTEXT};
use crate::documents::service::load_session;
use crate::documents::store::SessionStore;
use crate::errors::AppError;
use crate::llm_client::prompts::PLAIN_TEXT_INSTRUCTION;
use crate::llm_client::{ChatMessage, CompletionService};

#[derive(Debug, Deserialize)]
pub struct ConverseRequest {
    pub placeholder_id: String,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
pub struct ConverseResponse {
    pub assistant_message: String,
}

pub async fn converse(
    store: &dyn SessionStore,
    llm: &dyn CompletionService,
    id: Uuid,
    request: ConverseRequest,
) -> Result<ConverseResponse, AppError> {
    if request.messages.is_empty() {
        return Err(AppError::Validation(
            "At least one message is required".to_string(),
        ));
    }

    let placeholder = {
        let handle = load_session(store, id).await?;
        let session = handle.lock().await;
        let found = session
            .discovery
            .get(&request.placeholder_id)
            .map(|entry| entry.placeholder.clone());
        found
    }
    .ok_or_else(|| {
        AppError::NotFound(format!(
            "Placeholder {} not found in document {id}",
            request.placeholder_id
        ))
    })?;

    let system = CONVERSE_SYSTEM
        .replace("{label}", &placeholder.label)
        .replace("{context}", placeholder.context.as_deref().unwrap_or(NO_CONTEXT))
        .replace("{plain_text_instruction}", PLAIN_TEXT_INSTRUCTION);

    debug!(
        "Conversing about {} ({} message(s))",
        placeholder.id,
        request.messages.len()
    );
    let reply = llm
        .converse(&system, &request.messages)
        .await
        .map_err(|e| {
            error!("Conversation about {} failed: {e}", placeholder.id);
            AppError::Upstream(e.to_string())
        })?;

    Ok(ConverseResponse {
        assistant_message: reply,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    use crate::docx::container::{build_test_docx, wrap_body};
    use crate::documents::service::upload_document;
    use crate::documents::store::InMemorySessionStore;
    use crate::llm_client::testing::ScriptedCompletion;
    use crate::llm_client::ChatRole;

    async fn uploaded(store: &InMemorySessionStore) -> Uuid {
        let body = r#"<w:p><w:r><w:t>This lease begins on {{start_date}}.</w:t></w:r></w:p>"#;
        let bytes = Bytes::from(build_test_docx(&wrap_body(body)));
        upload_document(store, None, 1 << 20, "Lease.docx", bytes)
            .await
            .unwrap()
            .document_id
    }

    fn request(placeholder_id: &str, text: &str) -> ConverseRequest {
        ConverseRequest {
            placeholder_id: placeholder_id.to_string(),
            messages: vec![ChatMessage {
                role: ChatRole::User,
                content: text.to_string(),
            }],
        }
    }

    #[tokio::test]
    async fn test_converse_returns_assistant_reply() {
        let store = InMemorySessionStore::new();
        let id = uploaded(&store).await;
        let llm = ScriptedCompletion::new().reply("Use the first day of occupancy.");

        let response = converse(&store, &llm, id, request("start_date", "Which date?"))
            .await
            .unwrap();
        assert_eq!(response.assistant_message, "Use the first day of occupancy.");
        assert_eq!(llm.prompts.lock().unwrap()[0], "Which date?");
    }

    #[tokio::test]
    async fn test_unknown_placeholder_is_not_found() {
        let store = InMemorySessionStore::new();
        let id = uploaded(&store).await;
        let err = converse(&store, &ScriptedCompletion::new(), id, request("nope", "hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_empty_messages_is_validation_error() {
        let store = InMemorySessionStore::new();
        let id = uploaded(&store).await;
        let mut req = request("start_date", "x");
        req.messages.clear();
        let err = converse(&store, &ScriptedCompletion::new(), id, req)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_backend_failure_is_upstream_error() {
        let store = InMemorySessionStore::new();
        let id = uploaded(&store).await;
        let llm = ScriptedCompletion::new().fail();
        let err = converse(&store, &llm, id, request("start_date", "hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Upstream(_)));
    }
}
