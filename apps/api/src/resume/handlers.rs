use axum::{
    body::Bytes,
    extract::{Multipart, State},
    Json,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::access::extractor::PaidAccess;
use crate::errors::AppError;
use crate::resume::extract::{extract_text_blocking, is_docx_archive, DocumentKind};
use crate::resume::optimize::{optimize_resume, OptimizationReport};
use crate::resume::scoring::{score_resume, AtsReport};
use crate::state::AppState;

/// Multipart uploads (score, upload) are capped at this size.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

struct UploadedFile {
    bytes: Bytes,
    kind: DocumentKind,
}

#[derive(Serialize)]
pub struct ScoreResponse {
    pub ok: bool,
    #[serde(flatten)]
    pub report: AtsReport,
}

#[derive(Serialize)]
pub struct UploadResponse {
    pub key: String,
    pub url: String,
    pub content_type: &'static str,
    pub size: usize,
}

#[derive(Deserialize)]
pub struct OptimizeRequest {
    pub key: String,
    #[serde(default, alias = "jobDescription")]
    pub job_description: Option<String>,
}

#[derive(Serialize)]
pub struct OptimizeResponse {
    pub ok: bool,
    pub optimized: OptimizationReport,
}

/// Pulls the `file` field out of a multipart body and checks it is a PDF or DOCX.
async fn read_resume_file(mut multipart: Multipart) -> Result<UploadedFile, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let content_type = field.content_type().map(str::to_string);
        let file_name = field.file_name().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(e.body_text()))?;

        if bytes.is_empty() {
            return Err(AppError::Validation("Uploaded file is empty".to_string()));
        }
        let unsupported =
            || AppError::UnsupportedMediaType("Only PDF and DOCX resumes are supported".to_string());
        let kind = DocumentKind::sniff(&bytes, content_type.as_deref(), file_name.as_deref())
            .ok_or_else(unsupported)?;
        if kind == DocumentKind::Docx && !is_docx_archive(&bytes) {
            return Err(unsupported());
        }
        return Ok(UploadedFile { bytes, kind });
    }

    Err(AppError::Validation("Missing file".to_string()))
}

/// Storage prefix owned by one paid subject. Built from the verified token only.
/// The subject id is base64url-encoded, so distinct ids never share a prefix.
pub fn subject_prefix(subject_id: &str) -> String {
    format!("resumes/{}/", URL_SAFE_NO_PAD.encode(subject_id))
}

/// True when `key` names an object directly inside `prefix`.
fn key_in_scope(key: &str, prefix: &str) -> bool {
    key.strip_prefix(prefix)
        .is_some_and(|rest| !rest.is_empty() && !rest.contains('/') && !rest.contains(".."))
}

/// POST /api/resume/score
/// Free tier: no token required.
pub async fn handle_score(multipart: Multipart) -> Result<Json<ScoreResponse>, AppError> {
    let file = read_resume_file(multipart).await?;
    let text = extract_text_blocking(file.bytes, file.kind).await?;
    Ok(Json(ScoreResponse {
        ok: true,
        report: score_resume(&text),
    }))
}

/// POST /api/resume/upload
pub async fn handle_upload(
    State(state): State<AppState>,
    PaidAccess(access): PaidAccess,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let file = read_resume_file(multipart).await?;
    let size = file.bytes.len();
    let key = format!(
        "{}{}.{}",
        subject_prefix(&access.subject_id),
        Uuid::new_v4(),
        file.kind.extension()
    );

    let stored = state
        .blobs
        .put(&key, file.bytes, file.kind.content_type())
        .await
        .map_err(|e| AppError::S3(format!("{e:#}")))?;

    info!(key = %stored.key, size, "resume uploaded");
    Ok(Json(UploadResponse {
        key: stored.key,
        url: stored.url,
        content_type: file.kind.content_type(),
        size,
    }))
}

/// POST /api/resume/optimize
pub async fn handle_optimize(
    State(state): State<AppState>,
    PaidAccess(access): PaidAccess,
    Json(req): Json<OptimizeRequest>,
) -> Result<Json<OptimizeResponse>, AppError> {
    // Keys outside the caller's own prefix look exactly like missing ones.
    let not_found = || AppError::NotFound("Resume not found".to_string());
    if !key_in_scope(&req.key, &subject_prefix(&access.subject_id)) {
        return Err(not_found());
    }

    let blob = state
        .blobs
        .get(&req.key)
        .await
        .map_err(|e| AppError::S3(format!("{e:#}")))?
        .ok_or_else(not_found)?;

    let kind = DocumentKind::sniff(&blob.bytes, blob.content_type.as_deref(), Some(&req.key))
        .ok_or_else(|| {
            AppError::UnsupportedMediaType("Stored resume is not a PDF or DOCX".to_string())
        })?;
    let text = extract_text_blocking(blob.bytes, kind).await?;

    Ok(Json(OptimizeResponse {
        ok: true,
        optimized: optimize_resume(&text, req.job_description.as_deref()),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_prefix_is_one_to_one() {
        assert_eq!(subject_prefix("cs_1"), "resumes/Y3NfMQ/");
        // ids that differ only in punctuation keep separate prefixes
        assert_ne!(subject_prefix("cs.1"), subject_prefix("cs_1"));
        assert_ne!(subject_prefix("a/b"), subject_prefix("a_b"));

        let prefix = subject_prefix("a/../b");
        let encoded = prefix
            .strip_prefix("resumes/")
            .and_then(|p| p.strip_suffix('/'))
            .unwrap();
        assert!(encoded
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'));
    }

    #[test]
    fn test_key_scope() {
        let prefix = "resumes/cs_1/";
        assert!(key_in_scope("resumes/cs_1/abc.pdf", prefix));
        assert!(!key_in_scope("resumes/cs_2/abc.pdf", prefix));
        assert!(!key_in_scope("resumes/cs_1/", prefix));
        assert!(!key_in_scope("resumes/cs_1/../cs_2/abc.pdf", prefix));
        assert!(!key_in_scope("resumes/cs_1/nested/abc.pdf", prefix));
        assert!(!key_in_scope("resumes/cs_10/abc.pdf", prefix));
    }
}
