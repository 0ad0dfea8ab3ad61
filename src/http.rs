// src/http.rs
use anyhow::{Context, Result};
use std::time::Duration;

const USER_AGENT: &str = concat!("feed-relay/", env!("CARGO_PKG_VERSION"));

/// Shared client for every upstream. An invalid proxy URL is logged and ignored.
pub fn build_client(timeout: Duration, proxy_url: Option<&str>) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .user_agent(USER_AGENT);

    if let Some(url) = proxy_url.map(str::trim).filter(|u| !u.is_empty()) {
        match reqwest::Proxy::all(url) {
            Ok(proxy) => {
                tracing::info!("routing outbound HTTP through proxy");
                builder = builder.proxy(proxy);
            }
            Err(e) => tracing::error!(error = %e, "invalid proxy URL, continuing without proxy"),
        }
    }

    builder.build().context("building HTTP client")
}
