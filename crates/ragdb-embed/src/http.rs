//! Thin JSON-over-HTTP helpers that map transport and status failures onto
//! the shared error taxonomy.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

use ragdb_core::{Error, Result};

const BODY_PREVIEW: usize = 200;

pub(crate) fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::Configuration(format!("http client: {e}")))
}

/// POSTs `body` and returns the raw response bytes of a 2xx reply.
pub(crate) async fn post_json<B>(
    client: &reqwest::Client,
    url: &str,
    token: Option<&str>,
    body: &B,
) -> Result<Vec<u8>>
where
    B: Serialize + ?Sized,
{
    let mut req = client.post(url).json(body);
    if let Some(token) = token {
        req = req.bearer_auth(token);
    }
    let resp = req.send().await.map_err(transport_error)?;
    let status = resp.status();
    let bytes = resp.bytes().await.map_err(transport_error)?;
    if !status.is_success() {
        let preview: String = String::from_utf8_lossy(&bytes).chars().take(BODY_PREVIEW).collect();
        return Err(Error::upstream(Some(status.as_u16()), preview));
    }
    Ok(bytes.to_vec())
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8], what: &str) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| Error::Protocol(format!("unexpected {what} response: {e}")))
}

fn transport_error(err: reqwest::Error) -> Error {
    // URLs may carry credentials; never echo them.
    let err = err.without_url();
    if err.is_timeout() {
        Error::Timeout(err.to_string())
    } else {
        Error::upstream(err.status().map(|s| s.as_u16()), err.to_string())
    }
}

/// Joins `suffix` onto `base` unless it is already there.
pub(crate) fn with_suffix(base: &str, suffix: &str) -> String {
    let trimmed = base.trim().trim_end_matches('/');
    if trimmed.ends_with(suffix) {
        trimmed.to_string()
    } else {
        format!("{trimmed}{suffix}")
    }
}
