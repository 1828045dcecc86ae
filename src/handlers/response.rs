//! Single place where API responses are written.
//!
//! Sets the JSON content type and CORS header on every response and logs
//! every response that is not a plain 200.

use axum::{
    body::Body,
    http::{HeaderValue, StatusCode, header},
    response::Response,
};
use serde::Serialize;
use serde_json::json;

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";
const ALLOWED_HEADERS: &str =
    "Content-Type,access-control-allow-origin, access-control-allow-headers";

/// Serialize `body` and write it with `status`. A serialization failure is
/// written as an error instead.
pub fn write_json<T: Serialize>(status: StatusCode, body: &T) -> Response {
    match serde_json::to_string(body) {
        Ok(json) => write_response(status, json),
        Err(err) => write_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            &format!("could not marshal json for response: {}", err),
        ),
    }
}

pub fn write_empty(status: StatusCode) -> Response {
    write_response(status, String::new())
}

pub fn write_error(status: StatusCode, message: &str) -> Response {
    write_response(status, json!({ "error": message }).to_string())
}

fn write_response(status: StatusCode, body: String) -> Response {
    if status != StatusCode::OK {
        tracing::warn!(status = status.as_u16(), "Webserver : {}", body);
    }

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(JSON_CONTENT_TYPE),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOWED_HEADERS),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use std::{
        io,
        sync::{Arc, Mutex},
    };

    /// Log sink shared between a test and its subscriber.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Run `f` under an `info` subscriber and return what it logged.
    fn logs_of<R>(f: impl FnOnce() -> R) -> String {
        let sink = Captured::default();
        let writer = sink.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter("info")
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        let bytes = sink.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    async fn body_string(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn error_body_is_escaped_json() {
        let response = write_error(StatusCode::INTERNAL_SERVER_ERROR, r#"bad "quote""#);

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/json; charset=utf-8"
        );
        let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body, json!({ "error": "bad \"quote\"" }));
    }

    #[tokio::test]
    async fn empty_response_keeps_headers() {
        let response = write_empty(StatusCode::CREATED);

        assert_eq!(response.status(), StatusCode::CREATED);
        assert!(response.headers().contains_key(header::ACCESS_CONTROL_ALLOW_HEADERS));
        assert_eq!(body_string(response).await, "");
    }

    #[test]
    fn created_and_no_content_are_logged_at_warn() {
        let created = logs_of(|| write_empty(StatusCode::CREATED));
        assert!(created.contains("WARN"), "{created}");
        assert!(created.contains("status=201"), "{created}");

        let deleted = logs_of(|| write_json(StatusCode::NO_CONTENT, &json!({ "text": "gone" })));
        assert!(deleted.contains("WARN"), "{deleted}");
        assert!(deleted.contains("status=204"), "{deleted}");
        assert!(deleted.contains(r#"{"text":"gone"}"#), "{deleted}");
    }

    #[test]
    fn plain_ok_is_not_logged() {
        assert_eq!(logs_of(|| write_json(StatusCode::OK, &Vec::<u8>::new())), "");
    }
}
