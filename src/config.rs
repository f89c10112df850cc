use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "upload-gateway", version, about)]
struct Args {
    /// Address the HTTP server listens on.
    ///
    /// Environment variable: `UPLOAD_GATEWAY_LISTEN_ADDR`.
    #[arg(long, env = "UPLOAD_GATEWAY_LISTEN_ADDR", default_value = "127.0.0.1:5050")]
    listen_addr: SocketAddr,

    /// Secret shared with the chat server that signs upload URLs.
    ///
    /// Environment variable: `UPLOAD_GATEWAY_SECRET`.
    #[arg(long, env = "UPLOAD_GATEWAY_SECRET", hide_env_values = true)]
    secret: String,

    /// Root directory uploaded files are stored under. Created at startup
    /// when missing.
    ///
    /// Environment variable: `UPLOAD_GATEWAY_STORE_ROOT`.
    #[arg(long, env = "UPLOAD_GATEWAY_STORE_ROOT", default_value = "./uploads")]
    store_root: PathBuf,

    /// URL prefix the gateway owns (surrounding slashes are ignored, empty
    /// serves at the root).
    ///
    /// Environment variable: `UPLOAD_GATEWAY_SUB_PATH`.
    #[arg(long, env = "UPLOAD_GATEWAY_SUB_PATH", default_value = "upload")]
    sub_path: String,

    /// Log filter (tracing-subscriber EnvFilter syntax); `RUST_LOG` wins
    /// when set.
    ///
    /// Environment variable: `UPLOAD_GATEWAY_LOG_LEVEL`.
    #[arg(long, env = "UPLOAD_GATEWAY_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub secret: String,
    pub store_root: PathBuf,
    pub sub_path: String,
    pub log_level: String,
}

impl Config {
    pub fn load() -> Self {
        let args = Args::parse();

        Self {
            listen_addr: args.listen_addr,
            secret: args.secret,
            store_root: args.store_root,
            sub_path: normalize_sub_path(&args.sub_path),
            log_level: args.log_level,
        }
    }
}

/// `upload`, `/upload` and `upload/` all name the same prefix.
pub(crate) fn normalize_sub_path(raw: &str) -> String {
    raw.trim_matches('/').to_string()
}
