use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path as AxumPath, Query, State};
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_MAX_AGE, ALLOW, CONTENT_LENGTH, CONTENT_TYPE,
};
use axum::http::{HeaderMap, HeaderValue, Method, Request, StatusCode, Uri};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tokio_util::io::ReaderStream;

use crate::content_type::content_type_for;
use crate::mac::{self, AuthQuery};
use crate::store::{StoreError, StorePath};
use crate::AppState;

/// Methods the gateway answers, in the form the `Allow` and CORS headers
/// carry.
const ALLOWED_METHODS: &str = "OPTIONS, HEAD, GET, PUT";

#[derive(Debug)]
pub(crate) enum ApiError {
    Forbidden,
    NotFound,
    Conflict,
    MethodNotAllowed,
    Internal,
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ForbiddenPath => Self::Forbidden,
            StoreError::AlreadyExists => Self::Conflict,
            StoreError::NotFound => Self::NotFound,
            StoreError::Io(err) => {
                tracing::error!(error = %err, "store I/O failure");
                Self::Internal
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, msg) = match self {
            Self::Forbidden => (StatusCode::FORBIDDEN, "forbidden"),
            Self::NotFound => (StatusCode::NOT_FOUND, "not found"),
            Self::Conflict => (StatusCode::CONFLICT, "file already exists"),
            Self::MethodNotAllowed => (StatusCode::METHOD_NOT_ALLOWED, "method not allowed"),
            Self::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "internal error"),
        };

        let mut resp = (status, msg).into_response();
        if status == StatusCode::METHOD_NOT_ALLOWED {
            resp.headers_mut()
                .insert(ALLOW, HeaderValue::from_static(ALLOWED_METHODS));
        }
        resp
    }
}

/// Single entry point for the whole namespace; upload paths are data, so
/// dispatch is on the method. `OPTIONS` and unknown methods never touch
/// the resolver or the filesystem.
pub(crate) async fn handle(
    State(state): State<Arc<AppState>>,
    path: Option<AxumPath<String>>,
    req: Request<Body>,
) -> Result<Response, ApiError> {
    let url_path = match &path {
        Some(AxumPath(rest)) => format!("/{rest}"),
        None => "/".to_string(),
    };
    tracing::debug!(method = %req.method(), path = %url_path, "incoming request");

    match req.method() {
        &Method::PUT => put_object(&state, &url_path, req).await,
        &Method::HEAD => serve_object(&state, &url_path, false).await,
        &Method::GET => serve_object(&state, &url_path, true).await,
        &Method::OPTIONS => Ok(options_response()),
        _ => Err(ApiError::MethodNotAllowed),
    }
}

async fn put_object(
    state: &AppState,
    url_path: &str,
    req: Request<Body>,
) -> Result<Response, ApiError> {
    let store_path = resolve_or_warn(state, url_path)?;

    // The digest binds the declared length, so a PUT without one cannot be
    // authenticated.
    let declared_len = content_length(req.headers()).ok_or_else(|| {
        tracing::warn!(path = %store_path.relative(), "upload without Content-Length");
        ApiError::Forbidden
    })?;
    let content_type = content_type_for(store_path.relative());

    let query = auth_query(req.uri())?;
    let scheme = mac::verify(
        state.cfg.secret.as_bytes(),
        store_path.relative(),
        declared_len,
        content_type,
        &query,
    )
    .map_err(|err| {
        tracing::warn!(path = %store_path.relative(), error = %err, "upload rejected");
        ApiError::Forbidden
    })?;

    let written = state
        .store
        .create(&store_path, req.into_body().into_data_stream())
        .await?;
    if written != declared_len {
        tracing::error!(
            path = %store_path.relative(),
            declared = declared_len,
            written,
            "upload body did not match its declared length"
        );
        return Err(ApiError::Internal);
    }

    tracing::info!(
        path = %store_path.relative(),
        bytes = written,
        scheme = scheme.query_key(),
        "stored upload"
    );
    Ok(StatusCode::CREATED.into_response())
}

async fn serve_object(
    state: &AppState,
    url_path: &str,
    with_body: bool,
) -> Result<Response, ApiError> {
    let store_path = resolve_or_warn(state, url_path)?;

    let meta = state.store.stat(&store_path).await?;
    if meta.is_dir {
        // Directories are not objects; no listings.
        return Err(ApiError::Forbidden);
    }

    let mut resp = if with_body {
        let file = state.store.open(&store_path).await?;
        Body::from_stream(ReaderStream::new(file)).into_response()
    } else {
        StatusCode::OK.into_response()
    };

    // Explicit length either way: a HEAD response has no body to size it.
    resp.headers_mut()
        .insert(CONTENT_LENGTH, HeaderValue::from(meta.len));
    resp.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static(content_type_for(store_path.relative())),
    );
    Ok(resp)
}

fn resolve_or_warn(state: &AppState, url_path: &str) -> Result<StorePath, ApiError> {
    state
        .store
        .resolve(&state.cfg.sub_path, url_path)
        .map_err(|err| {
            tracing::warn!(path = url_path, "rejected request path");
            ApiError::from(err)
        })
}

fn options_response() -> Response {
    let mut resp = StatusCode::OK.into_response();
    resp.headers_mut()
        .insert(ALLOW, HeaderValue::from_static(ALLOWED_METHODS));
    resp
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers.get(CONTENT_LENGTH)?.to_str().ok()?.parse().ok()
}

fn auth_query(uri: &Uri) -> Result<AuthQuery, ApiError> {
    // A query string the credential keys cannot be read from is as good as
    // no credential.
    let Query(query) = Query::try_from_uri(uri).map_err(|_| ApiError::Forbidden)?;
    Ok(query)
}

/// Header set the web chat clients expect on every response, error or not.
pub(crate) async fn cors_middleware(req: Request<Body>, next: Next) -> Response {
    let mut resp = next.run(req).await;
    let headers = resp.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOWED_METHODS),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Authorization, Content-Type"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
    headers.insert(ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("7200"));
    resp
}
