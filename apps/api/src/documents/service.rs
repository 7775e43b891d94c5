//! Document orchestration: upload, finalize, download and eviction.
//!
//! Flow at upload: validate → unpack → render preview → normalize →
//! discovery (classifier, then regex fallback) → store as `Ready`.
//!
//! Every fill is recomputed from the original package and the full value set;
//! a filled document is never the input to another fill.

use std::collections::HashMap;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::docx::{render_docx_html, DocxPackage, PRIMARY_PART};
use crate::documents::store::{SessionHandle, SessionStore};
use crate::errors::AppError;
use crate::models::placeholder::{Placeholder, PlaceholderSource};
use crate::models::session::{DocumentSession, FilledOutput, SessionPhase};
use crate::placeholders::discovery::{
    run_discovery, DocumentText, PlaceholderDiscovery, RegexDiscovery,
};
use crate::placeholders::normalizer::normalize_xml_text;
use crate::placeholders::xml_pattern::fill_xml;

// ────────────────────────────────────────────────────────────────────────────
// Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub document_id: Uuid,
    pub file_name: String,
    pub placeholders: Vec<Placeholder>,
    pub preview_html: String,
    pub discovery_source: PlaceholderSource,
}

#[derive(Debug, Serialize)]
pub struct QuestionnaireProgress {
    pub active: bool,
    pub current_placeholder_id: Option<String>,
    pub answered: usize,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct DocumentSummary {
    pub document_id: Uuid,
    pub file_name: String,
    pub phase: SessionPhase,
    pub placeholders: Vec<Placeholder>,
    pub discovery_source: Option<PlaceholderSource>,
    pub values: HashMap<String, String>,
    pub questionnaire: Option<QuestionnaireProgress>,
    pub finalized: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct FinalizeRequest {
    #[serde(default)]
    pub values: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct FinalizeResponse {
    pub preview_html: String,
}

/// A filled document ready to send.
pub struct Download {
    pub file_name: String,
    pub bytes: Bytes,
}

// ────────────────────────────────────────────────────────────────────────────
// Operations
// ────────────────────────────────────────────────────────────────────────────

/// Ingests a `.docx`, discovers its placeholders and stores a `Ready` session.
pub async fn upload_document(
    store: &dyn SessionStore,
    classifier: Option<&dyn PlaceholderDiscovery>,
    max_upload_bytes: usize,
    file_name: &str,
    bytes: Bytes,
) -> Result<UploadResponse, AppError> {
    if bytes.len() > max_upload_bytes {
        return Err(AppError::PayloadTooLarge {
            limit: max_upload_bytes,
        });
    }
    if bytes.is_empty() {
        return Err(AppError::Validation("Uploaded file is empty".to_string()));
    }
    if !file_name.to_ascii_lowercase().ends_with(".docx") {
        return Err(AppError::Validation(format!(
            "Only .docx files are supported, got '{file_name}'"
        )));
    }

    let package = DocxPackage::unpack(bytes.clone())?;
    let xml = package.read_part(PRIMARY_PART)?;

    let mut session = DocumentSession::new(file_name.to_string(), bytes, xml);
    session.preview_html = render_docx_html(&session.original_bytes);
    debug!("Document {} uploaded ({})", session.document_id, file_name);

    session.phase = SessionPhase::Discovering;
    session.normalized_text = normalize_xml_text(&session.original_xml);
    let text = DocumentText {
        xml: &session.original_xml,
        normalized: &session.normalized_text,
    };
    let (discovery, source) = run_discovery(classifier, &RegexDiscovery, &text).await;
    session.discovery = discovery;
    session.discovery_source = Some(source);
    session.phase = SessionPhase::Ready;

    info!(
        "Document {} ready with {} placeholder(s) via {:?}",
        session.document_id,
        session.discovery.len(),
        source
    );

    let response = UploadResponse {
        document_id: session.document_id,
        file_name: session.file_name.clone(),
        placeholders: session.discovery.placeholders(),
        preview_html: session.preview_html.clone(),
        discovery_source: source,
    };
    store.put(session).await;
    Ok(response)
}

pub async fn get_summary(store: &dyn SessionStore, id: Uuid) -> Result<DocumentSummary, AppError> {
    let handle = load_session(store, id).await?;
    let session = handle.lock().await;

    let questionnaire = session.questionnaire.as_ref().map(|q| QuestionnaireProgress {
        active: q.active,
        current_placeholder_id: q.current_placeholder().map(String::from),
        answered: q
            .order
            .iter()
            .filter(|pid| has_value(&q.values, pid))
            .count(),
        total: q.order.len(),
    });

    Ok(DocumentSummary {
        document_id: session.document_id,
        file_name: session.file_name.clone(),
        phase: session.phase,
        placeholders: session.discovery.placeholders(),
        discovery_source: session.discovery_source,
        values: session.last_values(),
        questionnaire,
        finalized: session.filled.is_some(),
        created_at: session.created_at,
    })
}

/// Fills the document with a complete value set (free-form flow).
pub async fn finalize_document(
    store: &dyn SessionStore,
    id: Uuid,
    values: HashMap<String, String>,
) -> Result<FinalizeResponse, AppError> {
    let handle = load_session(store, id).await?;
    let mut session = handle.lock().await;

    let missing: Vec<&str> = session
        .discovery
        .entries
        .iter()
        .filter(|e| !has_value(&values, &e.placeholder.id))
        .map(|e| e.placeholder.label.as_str())
        .collect();
    if !missing.is_empty() {
        return Err(AppError::Validation(format!(
            "Missing values for: {}",
            missing.join(", ")
        )));
    }

    let known: HashMap<String, String> = values
        .into_iter()
        .filter(|(key, _)| session.discovery.get(key).is_some())
        .collect();
    apply_values(&mut session, known)?;

    Ok(FinalizeResponse {
        preview_html: session
            .filled
            .as_ref()
            .map(|f| f.html.clone())
            .unwrap_or_default(),
    })
}

pub async fn download_document(store: &dyn SessionStore, id: Uuid) -> Result<Download, AppError> {
    let handle = load_session(store, id).await?;
    let session = handle.lock().await;
    let filled = session.filled.as_ref().ok_or_else(|| {
        AppError::InvalidState(format!("Document {id} has not been finalized yet"))
    })?;
    Ok(Download {
        file_name: filled_file_name(&session.file_name),
        bytes: filled.bytes.clone(),
    })
}

/// Filled preview when finalized, otherwise the original preview.
pub async fn preview_document(store: &dyn SessionStore, id: Uuid) -> Result<String, AppError> {
    let handle = load_session(store, id).await?;
    let session = handle.lock().await;
    Ok(session
        .filled
        .as_ref()
        .map(|f| f.html.clone())
        .unwrap_or_else(|| session.preview_html.clone()))
}

pub async fn delete_document(store: &dyn SessionStore, id: Uuid) -> Result<(), AppError> {
    if store.delete(id).await {
        info!("Document {id} evicted");
        Ok(())
    } else {
        Err(not_found(id))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Shared helpers
// ────────────────────────────────────────────────────────────────────────────

pub(crate) async fn load_session(
    store: &dyn SessionStore,
    id: Uuid,
) -> Result<SessionHandle, AppError> {
    store.get(id).await.ok_or_else(|| not_found(id))
}

fn not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("Document {id} not found"))
}

pub(crate) fn has_value(values: &HashMap<String, String>, id: &str) -> bool {
    values.get(id).is_some_and(|v| !v.trim().is_empty())
}

/// Substitutes `values` into the original package and caches the result.
/// On error the previous filled output is left untouched.
pub(crate) fn apply_values(
    session: &mut DocumentSession,
    values: HashMap<String, String>,
) -> Result<(), AppError> {
    let result = fill_xml(&session.original_xml, &session.discovery.entries, &values);

    let mut package = DocxPackage::unpack(session.original_bytes.clone())?;
    package.write_part(PRIMARY_PART, result.xml);
    let bytes = Bytes::from(package.pack()?);
    let html = render_docx_html(&bytes);

    info!(
        "Document {} finalized: {} value(s), {} replacement(s)",
        session.document_id,
        values.len(),
        result.replaced.values().sum::<usize>()
    );

    session.filled = Some(FilledOutput {
        bytes,
        html,
        values,
    });
    session.phase = SessionPhase::Finalized;
    Ok(())
}

/// `Lease Template.docx` → `Lease Template-filled.docx`, header-safe.
fn filled_file_name(original: &str) -> String {
    let stem = original
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(original);
    let safe: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ' ') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let safe = if safe.trim().is_empty() {
        "document".to_string()
    } else {
        safe
    };
    format!("{safe}-filled.docx")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docx::container::{build_test_docx, wrap_body};
    use crate::documents::store::InMemorySessionStore;
    use crate::placeholders::normalizer::normalize_xml_text;

    const GREETING: &str = r#"<w:p><w:r><w:t xml:space="preserve">Dear </w:t></w:r><w:r><w:rPr><w:b/></w:rPr><w:t>{{client_name}}</w:t></w:r><w:r><w:t xml:space="preserve">, sign here: $[_____]</w:t></w:r></w:p>"#;

    async fn upload(store: &InMemorySessionStore, body: &str) -> UploadResponse {
        let bytes = Bytes::from(build_test_docx(&wrap_body(body)));
        upload_document(store, None, 1 << 20, "Contract.docx", bytes)
            .await
            .unwrap()
    }

    async fn filled_text(store: &InMemorySessionStore, id: Uuid) -> String {
        let download = download_document(store, id).await.unwrap();
        let package = DocxPackage::unpack(download.bytes).unwrap();
        normalize_xml_text(&package.read_part(PRIMARY_PART).unwrap())
    }

    fn values(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_upload_then_finalize_greeting() {
        let store = InMemorySessionStore::new();
        let uploaded = upload(&store, GREETING).await;

        let ids: Vec<_> = uploaded.placeholders.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["client_name", "placeholder_1"]);
        assert_eq!(uploaded.discovery_source, PlaceholderSource::Fallback);
        assert!(uploaded.preview_html.contains("{{client_name}}"));

        let response = finalize_document(
            &store,
            uploaded.document_id,
            values(&[("client_name", "Acme Corp"), ("placeholder_1", "Jane Doe")]),
        )
        .await
        .unwrap();

        assert!(response.preview_html.contains("Acme Corp"));
        let text = filled_text(&store, uploaded.document_id).await;
        assert!(text.contains("Dear Acme Corp, sign here: Jane Doe"));
    }

    #[tokio::test]
    async fn test_finalize_unknown_document_is_not_found() {
        let store = InMemorySessionStore::new();
        let err = finalize_document(&store, Uuid::new_v4(), HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_incomplete_values_name_missing_labels() {
        let store = InMemorySessionStore::new();
        let uploaded = upload(&store, GREETING).await;

        let err = finalize_document(
            &store,
            uploaded.document_id,
            values(&[("client_name", "Acme"), ("placeholder_1", "   ")]),
        )
        .await
        .unwrap_err();
        match err {
            AppError::Validation(msg) => assert!(msg.contains("Placeholder 1")),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failed_finalize_keeps_previous_output() {
        let store = InMemorySessionStore::new();
        let uploaded = upload(&store, GREETING).await;
        let id = uploaded.document_id;
        finalize_document(
            &store,
            id,
            values(&[("client_name", "First"), ("placeholder_1", "Sig")]),
        )
        .await
        .unwrap();

        assert!(finalize_document(&store, id, values(&[("client_name", "Second")]))
            .await
            .is_err());
        assert!(filled_text(&store, id).await.contains("Dear First"));
    }

    #[tokio::test]
    async fn test_zero_placeholders_round_trip() {
        let store = InMemorySessionStore::new();
        let body = "<w:p><w:r><w:t>No fields here.</w:t></w:r></w:p>";
        let uploaded = upload(&store, body).await;
        assert!(uploaded.placeholders.is_empty());

        finalize_document(&store, uploaded.document_id, HashMap::new())
            .await
            .unwrap();
        let download = download_document(&store, uploaded.document_id).await.unwrap();
        let package = DocxPackage::unpack(download.bytes).unwrap();
        assert_eq!(package.read_part(PRIMARY_PART).unwrap(), wrap_body(body));
    }

    #[tokio::test]
    async fn test_finalize_is_idempotent_and_recomputed_from_original() {
        let store = InMemorySessionStore::new();
        let uploaded = upload(&store, GREETING).await;
        let id = uploaded.document_id;
        let first_values = values(&[("client_name", "Acme"), ("placeholder_1", "Jane")]);

        let first = finalize_document(&store, id, first_values.clone()).await.unwrap();
        let other = values(&[("client_name", "Globex"), ("placeholder_1", "Hank")]);
        finalize_document(&store, id, other).await.unwrap();
        assert!(filled_text(&store, id).await.contains("Dear Globex, sign here: Hank"));

        let again = finalize_document(&store, id, first_values).await.unwrap();
        assert_eq!(first.preview_html, again.preview_html);
    }

    #[tokio::test]
    async fn test_curly_occurrences_all_replaced_and_escaped() {
        let store = InMemorySessionStore::new();
        let body = r#"<w:p><w:r><w:t>{{party}} and {{ party }}</w:t></w:r></w:p><w:p><w:r><w:t>{{</w:t></w:r><w:r><w:t>party}}</w:t></w:r></w:p>"#;
        let uploaded = upload(&store, body).await;
        assert_eq!(uploaded.placeholders.len(), 1);

        finalize_document(&store, uploaded.document_id, values(&[("party", "R&D <Co>")]))
            .await
            .unwrap();
        let download = download_document(&store, uploaded.document_id).await.unwrap();
        let xml = DocxPackage::unpack(download.bytes)
            .unwrap()
            .read_part(PRIMARY_PART)
            .unwrap();
        assert_eq!(xml.matches("R&amp;D &lt;Co&gt;").count(), 3);
        assert!(!xml.contains("party"));
    }

    #[tokio::test]
    async fn test_dollar_placeholders_replace_their_own_occurrence() {
        let store = InMemorySessionStore::new();
        let body = r#"<w:p><w:r><w:t>Buyer: $[____] Seller: $[____] Witness: $[____]</w:t></w:r></w:p>"#;
        let uploaded = upload(&store, body).await;
        assert_eq!(uploaded.placeholders.len(), 3);

        finalize_document(
            &store,
            uploaded.document_id,
            values(&[
                ("placeholder_1", "Ann"),
                ("placeholder_2", "Bo"),
                ("placeholder_3", "Cy"),
            ]),
        )
        .await
        .unwrap();
        let text = filled_text(&store, uploaded.document_id).await;
        assert!(text.contains("Buyer: Ann Seller: Bo Witness: Cy"));
    }

    #[tokio::test]
    async fn test_upload_validation() {
        let store = InMemorySessionStore::new();
        let docx = Bytes::from(build_test_docx(&wrap_body("")));

        let err = upload_document(&store, None, 1 << 20, "notes.txt", docx.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = upload_document(&store, None, 10, "big.docx", docx)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PayloadTooLarge { limit: 10 }));

        let err = upload_document(&store, None, 1 << 20, "fake.docx", Bytes::from_static(b"hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_download_before_finalize_is_invalid_state() {
        let store = InMemorySessionStore::new();
        let uploaded = upload(&store, GREETING).await;
        let err = download_document(&store, uploaded.document_id)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AppError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_delete_evicts() {
        let store = InMemorySessionStore::new();
        let uploaded = upload(&store, GREETING).await;
        delete_document(&store, uploaded.document_id).await.unwrap();
        assert!(matches!(
            get_summary(&store, uploaded.document_id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(delete_document(&store, uploaded.document_id).await.is_err());
    }

    #[tokio::test]
    async fn test_summary_reports_phase_and_values() {
        let store = InMemorySessionStore::new();
        let uploaded = upload(&store, GREETING).await;
        let id = uploaded.document_id;
        assert_eq!(get_summary(&store, id).await.unwrap().phase, SessionPhase::Ready);

        finalize_document(
            &store,
            id,
            values(&[("client_name", "Acme"), ("placeholder_1", "Jane"), ("stray", "x")]),
        )
        .await
        .unwrap();
        let summary = get_summary(&store, id).await.unwrap();
        assert_eq!(summary.phase, SessionPhase::Finalized);
        assert!(summary.finalized);
        assert_eq!(summary.values.len(), 2);
    }

    #[test]
    fn test_filled_file_name() {
        assert_eq!(filled_file_name("Lease v2.docx"), "Lease v2-filled.docx");
        assert_eq!(filled_file_name("контракт.docx"), "________-filled.docx");
        assert_eq!(filled_file_name("\".docx"), "_-filled.docx");
    }
}
