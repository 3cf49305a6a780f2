//! Router assembly: request log → basic auth (optional) → file access.

use axum::extract::{DefaultBodyLimit, Extension};
use axum::{Router, middleware};
use std::sync::Arc;

use crate::auth::{self, Credentials};
use crate::files::{self, FileAccess};
use crate::http::{self, AccessLog};

pub fn build_router(
    files: FileAccess,
    credentials: Option<Credentials>,
    access_log: AccessLog,
) -> Router {
    let mut app = Router::new()
        .fallback(files::handle)
        .layer(DefaultBodyLimit::disable())
        .layer(Extension(Arc::new(files)));

    if let Some(credentials) = credentials {
        app = app.layer(middleware::from_fn_with_state(
            Arc::new(credentials),
            auth::basic_auth,
        ));
    }

    app.layer(middleware::from_fn_with_state(access_log, http::log_requests))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body as AxumBody, to_bytes};
    use axum::extract::Request;
    use axum::http::{Method, StatusCode, header};
    use axum_extra::headers::{Authorization, HeaderMapExt};
    use tempfile::tempdir;
    use tower::ServiceExt;

    use crate::storage::Storage;

    fn make_app(
        read_only: bool,
        credentials: Option<Credentials>,
    ) -> (tempfile::TempDir, std::path::PathBuf, Router) {
        let temp = tempdir().expect("tempdir");
        let root = temp.path().join("served");
        std::fs::create_dir_all(&root).expect("create served dir");
        let storage = Storage::open(&root).expect("open storage");
        let app = build_router(
            FileAccess::new(storage, read_only),
            credentials,
            AccessLog::default(),
        );
        (temp, root, app)
    }

    async fn send(app: &Router, method: Method, uri: &str, body: &'static str) -> (StatusCode, String) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(AxumBody::from(body))
            .expect("request");
        let response = app.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        (status, String::from_utf8_lossy(&body).into_owned())
    }

    #[tokio::test]
    async fn put_get_delete_get_lifecycle() {
        let (_temp, root, app) = make_app(false, None);

        assert_eq!(
            send(&app, Method::PUT, "/a/b/c.txt", "hello").await.0,
            StatusCode::CREATED
        );
        assert_eq!(
            send(&app, Method::GET, "/a/b/c.txt", "").await,
            (StatusCode::OK, "hello".to_string())
        );
        assert_eq!(
            send(&app, Method::DELETE, "/a/b/c.txt", "").await.0,
            StatusCode::NO_CONTENT
        );
        assert_eq!(
            send(&app, Method::GET, "/a/b/c.txt", "").await.0,
            StatusCode::NOT_FOUND
        );
        assert!(root.join("a/b").is_dir());
    }

    #[tokio::test]
    async fn escape_attempt_lands_inside_the_root() {
        let (temp, root, app) = make_app(false, None);

        let (status, _) = send(&app, Method::PUT, "/../escape.txt", "nope").await;
        assert!(
            status == StatusCode::CREATED || status == StatusCode::BAD_REQUEST,
            "{status}"
        );
        assert!(!temp.path().join("escape.txt").exists());
        if status == StatusCode::CREATED {
            assert!(root.join("escape.txt").exists());
        }
    }

    #[tokio::test]
    async fn multipart_post_then_get() {
        let (_temp, _root, app) = make_app(false, None);
        let body = "--XYZ\r\nContent-Disposition: form-data; name=\"file\"; filename=\"m.txt\"\r\n\r\ndata\r\n--XYZ--\r\n";
        let request = Request::builder()
            .method(Method::POST)
            .uri("/m.txt")
            .header(header::CONTENT_TYPE, "multipart/form-data; boundary=XYZ")
            .body(AxumBody::from(body))
            .expect("request");
        let response = app.clone().oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::CREATED);

        assert_eq!(
            send(&app, Method::GET, "/m.txt", "").await,
            (StatusCode::OK, "data".to_string())
        );
    }

    #[tokio::test]
    async fn large_raw_upload_is_not_limited() {
        let (_temp, root, app) = make_app(false, None);
        let payload = vec![b'z'; 4 * 1024 * 1024];
        let request = Request::builder()
            .method(Method::PUT)
            .uri("/big.bin")
            .body(AxumBody::from(payload.clone()))
            .expect("request");
        let response = app.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(std::fs::read(root.join("big.bin")).expect("read"), payload);
    }

    #[tokio::test]
    async fn read_only_app_rejects_writes() {
        let (_temp, root, app) = make_app(true, None);
        std::fs::write(root.join("keep.txt"), b"keep").expect("seed");

        for method in [Method::PUT, Method::POST, Method::DELETE] {
            let (status, _) = send(&app, method, "/keep.txt", "x").await;
            assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        }
        assert_eq!(
            send(&app, Method::GET, "/keep.txt", "").await,
            (StatusCode::OK, "keep".to_string())
        );
    }

    #[tokio::test]
    async fn auth_guards_the_file_tree() {
        let (_temp, root, app) = make_app(true, Some(Credentials::new("admin", "secret")));
        std::fs::write(root.join("private.txt"), b"private").expect("seed");

        let (status, body) = send(&app, Method::GET, "/private.txt", "").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(!body.contains("private"));

        let mut request = Request::builder()
            .uri("/private.txt")
            .body(AxumBody::empty())
            .expect("request");
        request
            .headers_mut()
            .typed_insert(Authorization::basic("admin", "secret"));
        let response = app.clone().oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        assert_eq!(&body[..], b"private");
    }
}
