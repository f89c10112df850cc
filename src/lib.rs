#![forbid(unsafe_code)]

//! HTTP gateway for XMPP external file upload.
//!
//! A chat server (prosody `mod_http_upload_external`, ejabberd, metronome)
//! hands clients upload URLs whose query string carries an HMAC-SHA256
//! digest over the upload path and metadata, computed with a secret shared
//! with this gateway. The gateway verifies the digest, stores the bytes on
//! the local filesystem and serves them back to anyone holding the URL.

pub mod config;
pub mod content_type;
mod http;
pub mod mac;
pub mod store;

use std::sync::Arc;

use axum::routing::any;
use axum::Router;

pub use config::Config;

use store::FileStore;

pub(crate) struct AppState {
    pub(crate) cfg: Config,
    pub(crate) store: FileStore,
}

/// Build the gateway router for a config.
///
/// The whole URL namespace is a single catch-all: upload paths are data
/// chosen by the chat server, not a route table. Dispatch happens on the
/// method inside the handler.
pub fn app(mut cfg: Config) -> Router {
    cfg.sub_path = config::normalize_sub_path(&cfg.sub_path);

    let store = FileStore::new(cfg.store_root.clone());
    let state = Arc::new(AppState { cfg, store });

    Router::new()
        .route("/", any(http::handle))
        .route("/*path", any(http::handle))
        .layer(axum::middleware::from_fn(http::cors_middleware))
        .with_state(state)
}
