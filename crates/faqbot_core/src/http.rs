use std::time::Duration;

use crate::error::{FaqError, Result};

pub(crate) fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| FaqError::Config(format!("failed to create HTTP client: {e}")))
}

/// Join an API base URL and a route without doubling slashes.
pub(crate) fn endpoint(base_url: &str, route: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        route.trim_start_matches('/')
    )
}
