//! Defines the HTTP surface of the image gateway.
//!
//! ## Structure
//! - **API endpoints** (under `/api/v1`)
//!   - `GET    /image`      list images
//!   - `POST   /image`      upload an image (multipart field `myFile`)
//!   - `GET    /image/{id}` read one image
//!   - `PUT    /image/{id}` replace an image (`POST` is accepted too)
//!   - `DELETE /image/{id}` delete an image
//!
//! - **Everything else** is served from the static directory.

use crate::{
    handlers::image_handlers::{create_image, delete_image, list_images, read_image, update_image},
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderName, Method},
    routing::get,
};
use std::path::PathBuf;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

/// Build the `/image` routes. Upload bodies are capped at `max_upload_bytes`.
pub fn routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/image", get(list_images).post(create_image))
        .route(
            "/image/{id}",
            get(read_image)
                .put(update_image)
                .post(update_image)
                .delete(delete_image),
        )
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}

/// Permissive CORS: any origin, `X-Requested-With`, and the verbs the API uses.
pub fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_headers([HeaderName::from_static("x-requested-with")])
        .allow_methods([
            Method::GET,
            Method::HEAD,
            Method::POST,
            Method::PUT,
            Method::OPTIONS,
            Method::DELETE,
        ])
}

/// The complete application: API under `/api/v1`, static files for any
/// other path, CORS and request tracing around both.
pub fn app(state: AppState, static_dir: PathBuf, max_upload_bytes: usize) -> Router {
    Router::new()
        .nest("/api/v1", routes(max_upload_bytes))
        .fallback_service(ServeDir::new(static_dir))
        .with_state(state)
        .layer(cors())
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        handlers::image_handlers::FILE_FIELD,
        models::image::Image,
        services::{disk_bucket::DiskBucket, mime_map::MimeMap},
    };
    use axum::http::StatusCode;
    use axum_test::{
        TestServer,
        multipart::{MultipartForm, Part},
    };
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn disk_server(dir: &TempDir) -> TestServer {
        let db_url = format!("sqlite://{}", dir.path().join("meta.db").display());
        let bucket = DiskBucket::open("images", dir.path().join("buckets"), &db_url)
            .await
            .unwrap();
        let state = AppState::new(Arc::new(bucket), MimeMap::new(["image/png"]));
        TestServer::new(app(state, dir.path().join("static"), 1 << 20)).unwrap()
    }

    #[tokio::test]
    async fn unmatched_paths_are_served_from_static_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("static")).unwrap();
        std::fs::write(dir.path().join("static/hello.txt"), "hello from disk").unwrap();
        let server = disk_server(&dir).await;

        let found = server.get("/hello.txt").await;
        found.assert_status(StatusCode::OK);
        assert_eq!(found.text(), "hello from disk");

        server
            .get("/missing.txt")
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn disk_bucket_round_trip() {
        let dir = TempDir::new().unwrap();
        let server = disk_server(&dir).await;
        let bytes = b"\x89PNG\r\n\x1a\ndisk".to_vec();

        server
            .post("/api/v1/image")
            .multipart(MultipartForm::new().add_part(
                FILE_FIELD,
                Part::bytes(bytes.clone())
                    .file_name("cat.png")
                    .mime_type("image/png"),
            ))
            .await
            .assert_status(StatusCode::CREATED);

        let images: Vec<Image> = server.get("/api/v1/image").await.json();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].id, "cat.png");
        assert_eq!(images[0].decode_content().unwrap(), bytes);

        server
            .delete("/api/v1/image/cat.png")
            .await
            .assert_status(StatusCode::NO_CONTENT);
        server
            .get("/api/v1/image/cat.png")
            .await
            .assert_status(StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn unsafe_id_is_a_server_error() {
        let dir = TempDir::new().unwrap();
        let server = disk_server(&dir).await;

        server
            .get("/api/v1/image/..%2Fsecret")
            .await
            .assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    }
}
