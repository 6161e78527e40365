//! Authenticated JSON requests against identity provider endpoints

use anyhow::{Result, anyhow};
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

/// Longest slice of an error response body quoted in an error
const ERROR_BODY_EXCERPT_LEN: usize = 512;

/// Leading part of a response body, for error messages
pub(crate) fn body_excerpt(body: &[u8]) -> String {
    let excerpt = &body[..body.len().min(ERROR_BODY_EXCERPT_LEN)];
    let mut text = String::from_utf8_lossy(excerpt).into_owned();
    if body.len() > ERROR_BODY_EXCERPT_LEN {
        text.push_str("...");
    }
    text
}

fn authenticated_get(
    client: &reqwest::Client,
    url: &Url,
    bearer: &str,
    timeout: Option<Duration>,
) -> reqwest::RequestBuilder {
    let mut request = client
        .get(url.as_str())
        .header(CONTENT_TYPE, "application/json")
        .header(AUTHORIZATION, format!("Bearer {bearer}"));
    if let Some(timeout) = timeout {
        request = request.timeout(timeout);
    }
    request
}

/// GET `url` with a bearer token and decode the JSON body into `T`
///
/// Transport failures, non-2xx statuses and undecodable bodies are all errors.
pub async fn get_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &Url,
    bearer: &str,
    timeout: Option<Duration>,
) -> Result<T> {
    let response = authenticated_get(client, url, bearer, timeout)
        .send()
        .await
        .map_err(|e| anyhow!("request to {url} failed: {e}"))?;

    let status = response.status();
    let body = response
        .bytes()
        .await
        .map_err(|e| anyhow!("failed to read response from {url}: {e}"))?;
    if !status.is_success() {
        return Err(anyhow!(
            "unexpected status {status} from {url}: {}",
            body_excerpt(&body)
        ));
    }

    serde_json::from_slice(&body).map_err(|e| anyhow!("failed to decode response from {url}: {e}"))
}

/// GET `url` with a bearer token and report whether it answered with a 2xx
pub async fn check_status(
    client: &reqwest::Client,
    url: &Url,
    bearer: &str,
    timeout: Option<Duration>,
) -> bool {
    match authenticated_get(client, url, bearer, timeout).send().await {
        Ok(response) => response.status().is_success(),
        Err(e) => {
            log::warn!("request to {url} failed: {e}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_excerpt_short_body_is_kept() {
        assert_eq!(body_excerpt(b"internal error"), "internal error");
        assert_eq!(body_excerpt(b""), "");
    }

    #[test]
    fn test_body_excerpt_long_body_is_cut() {
        let body = vec![b'a'; 4096];
        let excerpt = body_excerpt(&body);
        assert_eq!(excerpt.len(), ERROR_BODY_EXCERPT_LEN + 3);
        assert!(excerpt.ends_with("..."));
    }

    #[test]
    fn test_body_excerpt_split_utf8() {
        // the cut lands inside a two-byte character
        let mut body = vec![b'a'; ERROR_BODY_EXCERPT_LEN - 1];
        body.extend("é and more".as_bytes());
        let excerpt = body_excerpt(&body);
        assert!(excerpt.starts_with(&"a".repeat(ERROR_BODY_EXCERPT_LEN - 1)));
        assert!(excerpt.ends_with("..."));
    }
}
