//! HTTP handlers for the `/image` resource.
//!
//! Handlers are stateless: each one validates its input, calls the storage
//! gateway, maps what comes back into `Image`s and hands the result to the
//! response writer. Every failure becomes a 500 with a JSON error body.

use crate::{
    errors::AppError,
    handlers::response::{write_empty, write_json},
    models::{image::images_from_descriptors, message::Message},
    services::{mime_map::MimeMap, storage_gateway::ByteStream},
    state::AppState,
};
use axum::{
    extract::{Multipart, Path, State, multipart::MultipartRejection},
    http::StatusCode,
    response::Response,
};
use bytes::Bytes;
use futures::{StreamExt, stream};

/// Multipart field carrying the uploaded file.
pub const FILE_FIELD: &str = "myFile";

/// A file pulled out of a multipart form.
#[derive(Debug)]
struct Upload {
    file_name: String,
    content_type: String,
    content: Bytes,
}

/// Find the `myFile` part of the form and read it.
async fn read_upload(
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Upload, AppError> {
    let mut multipart = multipart.map_err(AppError::context("error retrieving file"))?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(AppError::context("error retrieving file"))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let file_name = field
            .file_name()
            .filter(|name| !name.is_empty())
            .map(str::to_owned)
            .ok_or_else(|| AppError::internal("error retrieving file: missing filename"))?;
        let content_type = field.content_type().unwrap_or_default().to_string();
        let content = field
            .bytes()
            .await
            .map_err(AppError::context("error retrieving file"))?;

        return Ok(Upload {
            file_name,
            content_type,
            content,
        });
    }

    Err(AppError::internal(format!(
        "error retrieving file: no `{}` field in form",
        FILE_FIELD
    )))
}

fn ensure_allowed(mime: &MimeMap, content_type: &str) -> Result<(), AppError> {
    if !mime.valid(content_type) {
        return Err(AppError::internal(format!(
            "invalid image type, want one of {} got : {}",
            mime.list(),
            content_type
        )));
    }
    Ok(())
}

fn body_stream(content: Bytes) -> ByteStream {
    stream::once(async move { Ok(content) }).boxed()
}

/// `GET /image`: every object in the bucket as a JSON array.
pub async fn list_images(State(state): State<AppState>) -> Result<Response, AppError> {
    let descriptors = state
        .gateway
        .list()
        .await
        .map_err(AppError::context("failed to list files"))?;

    let images = images_from_descriptors(descriptors)
        .map_err(AppError::context("failed to convert files to images"))?;

    Ok(write_json(StatusCode::OK, &images))
}

/// `POST /image`: upload a new image under its original filename.
pub async fn create_image(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, AppError> {
    let Upload {
        file_name,
        content_type,
        content,
    } = read_upload(multipart).await?;
    ensure_allowed(&state.mime, &content_type)?;

    state
        .gateway
        .create(&file_name, Some(&content_type), body_stream(content))
        .await
        .map_err(AppError::context("image couldn't be created"))?;

    tracing::info!("created image `{}` ({})", file_name, content_type);
    Ok(write_empty(StatusCode::CREATED))
}

/// `GET /image/{id}`: one image, or 204 when there is none.
pub async fn read_image(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let what = format!("failed to read files {}", id);
    let descriptors = state
        .gateway
        .read(&id)
        .await
        .map_err(AppError::context(&what))?;

    let images = images_from_descriptors(descriptors)
        .map_err(AppError::context("failed to convert files to images"))?;

    match images.into_iter().next() {
        Some(image) => Ok(write_json(StatusCode::OK, &image)),
        None => Ok(write_empty(StatusCode::NO_CONTENT)),
    }
}

/// `PUT|POST /image/{id}`: replace an image.
///
/// Deletes `id`, then writes the upload under its own filename. The two steps
/// are not atomic: if the write fails, `id` stays deleted.
pub async fn update_image(
    State(state): State<AppState>,
    Path(id): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, AppError> {
    let Upload {
        file_name,
        content_type,
        content,
    } = read_upload(multipart).await?;
    ensure_allowed(&state.mime, &content_type)?;

    state
        .gateway
        .delete(&id)
        .await
        .map_err(AppError::context("error replacing file"))?;

    if let Err(err) = state
        .gateway
        .create(&file_name, Some(&content_type), body_stream(content))
        .await
    {
        tracing::warn!(
            "image `{}` was deleted but its replacement `{}` was not written",
            id,
            file_name
        );
        return Err(AppError::context("image couldn't be created")(err));
    }

    tracing::info!("replaced image `{}` with `{}`", id, file_name);
    Ok(write_empty(StatusCode::OK))
}

/// `DELETE /image/{id}`: answers 204 with a `Message` body.
pub async fn delete_image(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    state
        .gateway
        .delete(&id)
        .await
        .map_err(|err| AppError::internal(err.to_string()))?;

    Ok(write_json(StatusCode::NO_CONTENT, &Message::image_deleted(&id)))
}
