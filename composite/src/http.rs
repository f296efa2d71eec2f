use crate::errors::Result;
use crate::normalizer::{normalize_status, normalize_transport};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::time::timeout;
use url::Url;

/// Fetches and decodes a JSON document from a downstream service.
///
/// # Timeout Behavior
///
/// `timeout_after` covers the whole exchange: connecting, sending the
/// request, receiving headers, and collecting the body. An elapsed timeout
/// is reported like any other transport failure.
pub async fn get_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: Url,
    timeout_after: Duration,
) -> Result<T> {
    tracing::debug!(%url, "Will call downstream API");

    let upstream_identifier = url.host_str().unwrap_or(url.as_str()).to_string();

    timeout(timeout_after, fetch(client, url))
        .await
        .map_err(|_| normalize_transport(format!("Upstream timeout for {upstream_identifier}")))?
}

async fn fetch<T: DeserializeOwned>(client: &reqwest::Client, url: Url) -> Result<T> {
    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|e| normalize_transport(format!("GET {url} failed: {e}")))?;

    let status = response.status();
    let body = response
        .bytes()
        .await
        .map_err(|e| normalize_transport(format!("Failed to read response body from {url}: {e}")))?;

    if !status.is_success() {
        return Err(normalize_status(
            status,
            &body,
            &format!("{status} from GET {url}"),
        ));
    }

    serde_json::from_slice(&body)
        .map_err(|e| normalize_transport(format!("Failed to decode response from {url}: {e}")))
}

/// Succeeds when the service answers with a 2xx within `timeout_after`.
pub async fn probe(client: &reqwest::Client, url: Url, timeout_after: Duration) -> Result<()> {
    let upstream_identifier = url.host_str().unwrap_or(url.as_str()).to_string();

    let response = timeout(timeout_after, client.get(url.clone()).send())
        .await
        .map_err(|_| normalize_transport(format!("Health probe timeout for {upstream_identifier}")))?
        .map_err(|e| normalize_transport(format!("Health probe {url} failed: {e}")))?;

    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(normalize_status(status, &[], &format!("{status} from GET {url}")))
    }
}
