//! 文件访问处理器：按请求方法分派读取、上传与删除。

use axum::body::Body as AxumBody;
use axum::extract::{Extension, FromRequest, Multipart, Request};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use futures_util::stream::StreamExt;
use http_body_util::BodyExt;
use std::convert::Infallible;
use std::fmt::Write as _;
use std::io;
use std::sync::Arc;
use tokio_util::io::StreamReader;
use tower::ServiceExt;
use tower_http::services::ServeDir;
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::path::RelativePath;
use crate::root::EntryKind;
use crate::storage::{Storage, StorageError};

const READ_ONLY_METHODS: &str = "GET, HEAD";
const WRITABLE_METHODS: &str = "GET, HEAD, POST, PUT, DELETE";
const UPLOAD_FIELD: &str = "file";
const INDEX_FILE: &str = "index.html";

/// Serves one rooted directory. Reads go through a static file responder;
/// writes and deletes go through [`Storage`].
#[derive(Clone, Debug)]
pub struct FileAccess {
    storage: Storage,
    static_files: ServeDir,
    read_only: bool,
}

impl FileAccess {
    pub fn new(storage: Storage, read_only: bool) -> Self {
        let static_files =
            ServeDir::new(storage.root_path()).append_index_html_on_directories(true);
        Self {
            storage,
            static_files,
            read_only,
        }
    }

    fn allowed_methods(&self) -> &'static str {
        if self.read_only {
            READ_ONLY_METHODS
        } else {
            WRITABLE_METHODS
        }
    }

    fn ensure_writable(&self) -> Result<(), ApiError> {
        if self.read_only {
            return Err(ApiError::MethodNotAllowed(READ_ONLY_METHODS));
        }
        Ok(())
    }
}

/// Entry point for every request that reaches the file tree.
pub async fn handle(
    Extension(files): Extension<Arc<FileAccess>>,
    request: Request,
) -> Result<Response, ApiError> {
    match *request.method() {
        Method::GET | Method::HEAD => read_entry(&files, request).await,
        Method::POST | Method::PUT => write_file(&files, request).await,
        Method::DELETE => delete_file(&files, request).await,
        _ => Err(ApiError::MethodNotAllowed(files.allowed_methods())),
    }
}

async fn read_entry(files: &FileAccess, request: Request) -> Result<Response, ApiError> {
    let raw_path = request.uri().path();
    let wants_directory = raw_path.ends_with('/');
    let Some(path) = decode_path(request.uri()).and_then(|decoded| RelativePath::parse(&decoded))
    else {
        return Err(ApiError::NotFound);
    };

    // Resolve through the root first so links out of the tree stay invisible.
    match files.storage.stat(&path).await {
        Ok(EntryKind::Directory) if wants_directory => {
            let has_index = matches!(
                files.storage.stat(&path.join(INDEX_FILE)).await,
                Ok(EntryKind::File)
            );
            if !has_index {
                let head_only = request.method() == Method::HEAD;
                return render_listing(&files.storage, &path, head_only).await;
            }
        }
        Ok(_) => {}
        Err(err) => {
            if err.is_not_found() {
                debug!(path = %path, "not found");
            } else {
                warn!(path = %path, error = ?err, "read lookup failed");
            }
            return Err(ApiError::NotFound);
        }
    }

    let response = files
        .static_files
        .clone()
        .oneshot(request)
        .await
        .unwrap_or_else(|never: Infallible| match never {});
    Ok(response.map(AxumBody::new))
}

async fn render_listing(
    storage: &Storage,
    path: &RelativePath,
    head_only: bool,
) -> Result<Response, ApiError> {
    let entries = storage.list_dir(path).await.map_err(|err| {
        warn!(path = %path, error = ?err, "failed to list directory");
        ApiError::Internal("failed to read directory".into())
    })?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    if head_only {
        return Ok((StatusCode::OK, headers).into_response());
    }

    let mut html = String::from(
        "<!doctype html>\n<meta name=\"viewport\" content=\"width=device-width\">\n<pre>\n",
    );
    for entry in &entries {
        let suffix = if entry.kind == EntryKind::Directory { "/" } else { "" };
        let _ = writeln!(
            html,
            "<a href=\"{}{suffix}\">{}{suffix}</a>",
            urlencoding::encode(&entry.name),
            escape_html(&entry.name),
        );
    }
    html.push_str("</pre>\n");
    Ok((StatusCode::OK, headers, html).into_response())
}

async fn write_file(files: &FileAccess, request: Request) -> Result<Response, ApiError> {
    files.ensure_writable()?;
    let path = target_path(request.uri())?;

    let written = if is_multipart(request.headers()) {
        upload_multipart(&files.storage, &path, request).await?
    } else {
        let body = BodyExt::into_data_stream(request.into_body())
            .map(|chunk| chunk.map_err(io::Error::other));
        files
            .storage
            .create_file(&path, StreamReader::new(body))
            .await
            .map_err(|err| write_failure(&path, err))?
    };

    info!(path = %path, bytes = written, "file written");
    Ok(StatusCode::CREATED.into_response())
}

/// Streams the first part named `file` into `path`.
async fn upload_multipart(
    storage: &Storage,
    path: &RelativePath,
    request: Request,
) -> Result<u64, ApiError> {
    let mut multipart = Multipart::from_request(request, &()).await.map_err(|err| {
        debug!(error = %err, "rejected multipart body");
        ApiError::BadRequest("invalid multipart body".into())
    })?;

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        debug!(error = %err, "failed to read multipart field");
        ApiError::BadRequest("invalid multipart body".into())
    })? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let content = StreamReader::new(field.map(|chunk| chunk.map_err(io::Error::other)));
        return storage
            .create_file(path, content)
            .await
            .map_err(|err| write_failure(path, err));
    }

    Err(ApiError::BadRequest(
        "file part not found in multipart form data".into(),
    ))
}

async fn delete_file(files: &FileAccess, request: Request) -> Result<Response, ApiError> {
    files.ensure_writable()?;
    let path = target_path(request.uri())?;

    files.storage.delete_path(&path).await.map_err(|err| match err {
        StorageError::InvalidPath => ApiError::from(err),
        StorageError::Io(err) => {
            warn!(path = %path, error = %err, "failed to delete file");
            ApiError::Internal("failed to delete file".into())
        }
    })?;

    info!(path = %path, "file deleted");
    Ok(StatusCode::NO_CONTENT.into_response())
}

fn write_failure(path: &RelativePath, err: StorageError) -> ApiError {
    match err {
        StorageError::InvalidPath => ApiError::from(err),
        StorageError::Io(err) => {
            warn!(path = %path, error = %err, "failed to write file");
            ApiError::Internal("failed to write file".into())
        }
    }
}

fn target_path(uri: &Uri) -> Result<RelativePath, ApiError> {
    let decoded =
        decode_path(uri).ok_or_else(|| ApiError::BadRequest("invalid file path".into()))?;
    Ok(Storage::normalize(&decoded)?)
}

fn decode_path(uri: &Uri) -> Option<String> {
    urlencoding::decode(uri.path())
        .ok()
        .map(|decoded| decoded.into_owned())
}

fn is_multipart(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.to_ascii_lowercase().contains("multipart/form-data"))
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&#34;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}
