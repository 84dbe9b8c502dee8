use axum::{
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tokio_util::io::ReaderStream;

use crate::{
    error::{AppError, Result},
    handlers::AppState,
    middleware::auth::AuthenticatedAccount,
    models::{FileListResponse, FileResponse, ListFilesQuery},
};

/// Client filenames go back out inside a quoted Content-Disposition value;
/// anything outside visible ASCII (plus the quote and backslash) would make
/// the header invalid, so those characters are replaced.
fn sanitize_disposition_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if (' '..='~').contains(&c) => c,
            _ => '_',
        })
        .collect()
}

pub async fn upload(
    State(state): State<AppState>,
    AuthenticatedAccount(account): AuthenticatedAccount,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<FileResponse>)> {
    let mut file_data: Option<Vec<u8>> = None;
    let mut original_name: Option<String> = None;
    let mut declared_mime: Option<String> = None;
    let mut folder = "root".to_string();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Failed to parse multipart data: {}", e)))?
    {
        match field.name().unwrap_or("") {
            "file" => {
                original_name = field.file_name().map(|s| s.to_string());
                declared_mime = field.content_type().map(|s| s.to_string());
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("Failed to read file data: {}", e)))?;
                file_data = Some(data.to_vec());
            }
            "folder" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(format!("Failed to read folder: {}", e)))?;
                if !value.is_empty() {
                    folder = value;
                }
            }
            _ => {} // Ignore unknown fields
        }
    }

    let file_data = file_data.ok_or_else(|| AppError::Validation("No file uploaded".to_string()))?;
    let original_name =
        original_name.ok_or_else(|| AppError::Validation("Filename is required".to_string()))?;

    let response = state
        .file_store
        .upload(
            &account,
            file_data,
            &original_name,
            declared_mime.as_deref(),
            &folder,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn list(
    State(state): State<AppState>,
    AuthenticatedAccount(account): AuthenticatedAccount,
    Query(query): Query<ListFilesQuery>,
) -> Result<Json<FileListResponse>> {
    let response = state
        .file_store
        .list(&account, query.folder.as_deref(), query.limit, query.offset)
        .await?;

    Ok(Json(response))
}

pub async fn download(
    State(state): State<AppState>,
    AuthenticatedAccount(account): AuthenticatedAccount,
    Path(file_id): Path<i64>,
) -> Result<Response> {
    let (file, reader) = state.file_store.download(&account, file_id).await?;

    let stream = ReaderStream::new(reader);
    let disposition = format!(
        "attachment; filename=\"{}\"",
        sanitize_disposition_filename(&file.original_name)
    );

    let response = (
        [
            (header::CONTENT_TYPE, file.mime_type.clone()),
            (header::CONTENT_DISPOSITION, disposition),
            (header::CONTENT_LENGTH, file.size.to_string()),
        ],
        Body::from_stream(stream),
    )
        .into_response();

    Ok(response)
}

pub async fn delete(
    State(state): State<AppState>,
    AuthenticatedAccount(account): AuthenticatedAccount,
    Path(file_id): Path<i64>,
) -> Result<Json<serde_json::Value>> {
    state.file_store.delete(&account, file_id).await?;

    Ok(Json(json!({
        "message": "File deleted"
    })))
}
