//! JSON-over-HTTP helper for hosted providers (embeddings, rerank, search).

use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::llm::error::ProviderError;

/// Build the shared `reqwest` client with a request deadline.
///
/// # Errors
/// Returns a transport error if the TLS backend cannot be initialized.
pub fn build_client(service: &str, timeout: Duration) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|err| ProviderError::transport(service, err.to_string()))
}

/// Join a base URL and a path segment without doubling slashes.
#[must_use]
pub fn endpoint(base_url: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if base.ends_with(&format!("/{path}")) {
        base.to_string()
    } else {
        format!("{base}/{path}")
    }
}

/// POST `body` as JSON and decode the JSON response.
///
/// # Errors
/// Returns a classified [`ProviderError`] on transport failure, non-2xx
/// status, or undecodable body.
pub async fn post_json<B, R>(
    client: &reqwest::Client,
    service: &str,
    url: &str,
    api_key: Option<&str>,
    body: &B,
    timeout: Duration,
) -> Result<R, ProviderError>
where
    B: Serialize + Sync + ?Sized,
    R: DeserializeOwned,
{
    let mut request = client.post(url).json(body);
    if let Some(key) = api_key {
        request = request.bearer_auth(key);
    }

    let response = request
        .send()
        .await
        .map_err(|err| ProviderError::from_reqwest(service, &err, timeout))?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(ProviderError::status(service, status.as_u16(), &text));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|err| ProviderError::from_reqwest(service, &err, timeout))?;
    serde_json::from_slice(&bytes).map_err(|err| ProviderError::malformed(service, err.to_string()))
}
