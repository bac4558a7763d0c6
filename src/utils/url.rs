//! Endpoint URL joining.
//!
//! Base URLs and route paths come from user configuration, so stray slashes
//! on either side must not produce `//` in the request URL.

/// Strip trailing slashes from a base URL.
///
/// ```
/// use parlance::utils::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url("http://localhost:3000/"), "http://localhost:3000");
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Join a base URL and a route path with exactly one slash between them.
///
/// ```
/// use parlance::utils::url::endpoint_url;
///
/// assert_eq!(
///     endpoint_url("http://localhost:3000/", "/api/chat"),
///     "http://localhost:3000/api/chat"
/// );
/// ```
pub fn endpoint_url(base_url: &str, path: &str) -> String {
    let normalized_base = normalize_base_url(base_url);
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        return normalized_base;
    }
    format!("{normalized_base}/{path}")
}
