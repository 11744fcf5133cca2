use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Resolve the service base URL, preferring the `API_BASE_URL` environment
/// variable over the built-in default. Read once at startup; the value is
/// treated as immutable afterwards.
pub fn base_url_from_env() -> String {
    std::env::var("API_BASE_URL")
        .ok()
        .map(|value| value.trim().trim_end_matches('/').to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
}
