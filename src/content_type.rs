/// Fallback for unknown or missing extensions.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// MIME type for a store-relative path, from its file extension.
///
/// Both the v2/token digest payload and the download `Content-Type` header
/// use this value, so it must stay deterministic for a given path.
pub fn content_type_for(path: &str) -> &'static str {
    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or(DEFAULT_CONTENT_TYPE)
}
