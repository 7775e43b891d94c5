use axum::{
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse},
    Json,
};
use bytes::Bytes;
use uuid::Uuid;

use crate::documents::conversation::{converse, ConverseRequest, ConverseResponse};
use crate::documents::questionnaire::{
    start_questionnaire, submit_answer, AnswerRequest, StepResponse,
};
use crate::documents::service::{
    delete_document, download_document, finalize_document, get_summary, preview_document,
    upload_document, DocumentSummary, FinalizeRequest, FinalizeResponse, UploadResponse,
};
use crate::errors::AppError;
use crate::state::AppState;

const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Multipart field carrying the document.
const FILE_FIELD: &str = "file";

/// POST /api/v1/documents
pub async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), AppError> {
    let limit = state.config.max_upload_bytes;
    let mut upload: Option<(String, Bytes)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or("document.docx").to_string();
        let data = field.bytes().await.map_err(|e| multipart_error(e, limit))?;
        upload = Some((file_name, data));
        break;
    }

    let (file_name, data) = upload.ok_or_else(|| {
        AppError::Validation(format!("Missing multipart field '{FILE_FIELD}'"))
    })?;
    let file_name = base_name(&file_name);

    let response = upload_document(
        state.store.as_ref(),
        state.classifier.as_deref(),
        limit,
        &file_name,
        data,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /api/v1/documents/:id
pub async fn handle_get_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DocumentSummary>, AppError> {
    let id = parse_document_id(&id)?;
    Ok(Json(get_summary(state.store.as_ref(), id).await?))
}

/// DELETE /api/v1/documents/:id
pub async fn handle_delete_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id = parse_document_id(&id)?;
    delete_document(state.store.as_ref(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/documents/:id/preview
pub async fn handle_preview(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Html<String>, AppError> {
    let id = parse_document_id(&id)?;
    Ok(Html(preview_document(state.store.as_ref(), id).await?))
}

/// POST /api/v1/documents/:id/questionnaire
pub async fn handle_start_questionnaire(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StepResponse>, AppError> {
    let id = parse_document_id(&id)?;
    let step = start_questionnaire(state.store.as_ref(), state.llm.as_ref(), id).await?;
    Ok(Json(step))
}

/// POST /api/v1/documents/:id/questionnaire/answer
pub async fn handle_submit_answer(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<AnswerRequest>,
) -> Result<Json<StepResponse>, AppError> {
    let id = parse_document_id(&id)?;
    let step = submit_answer(state.store.as_ref(), state.llm.as_ref(), id, &req.answer).await?;
    Ok(Json(step))
}

/// POST /api/v1/documents/:id/converse
pub async fn handle_converse(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ConverseRequest>,
) -> Result<Json<ConverseResponse>, AppError> {
    let id = parse_document_id(&id)?;
    let reply = converse(state.store.as_ref(), state.llm.as_ref(), id, req).await?;
    Ok(Json(reply))
}

/// POST /api/v1/documents/:id/finalize
pub async fn handle_finalize(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<FinalizeRequest>,
) -> Result<Json<FinalizeResponse>, AppError> {
    let id = parse_document_id(&id)?;
    Ok(Json(
        finalize_document(state.store.as_ref(), id, req.values).await?,
    ))
}

/// GET /api/v1/documents/:id/download
pub async fn handle_download(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_document_id(&id)?;
    let download = download_document(state.store.as_ref(), id).await?;
    let headers = [
        (header::CONTENT_TYPE, DOCX_MIME.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", download.file_name),
        ),
    ];
    Ok((headers, download.bytes))
}

/// A malformed id can never name a stored document.
fn parse_document_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::NotFound(format!("Document {raw} not found")))
}

fn multipart_error(err: MultipartError, limit: usize) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge { limit }
    } else {
        AppError::Validation(format!("Multipart read error: {}", err.body_text()))
    }
}

/// Strips any client-supplied directory components.
fn base_name(raw: &str) -> String {
    raw.rsplit(['/', '\\'])
        .next()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or("document.docx")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_document_id_rejects_garbage_as_not_found() {
        assert!(matches!(
            parse_document_id("not-a-uuid"),
            Err(AppError::NotFound(_))
        ));
        let id = Uuid::new_v4();
        assert_eq!(parse_document_id(&id.to_string()).unwrap(), id);
    }

    #[test]
    fn test_base_name_drops_directories() {
        assert_eq!(base_name("C:\\Users\\me\\Lease.docx"), "Lease.docx");
        assert_eq!(base_name("../../etc/Lease.docx"), "Lease.docx");
        assert_eq!(base_name("dir/"), "document.docx");
    }
}
