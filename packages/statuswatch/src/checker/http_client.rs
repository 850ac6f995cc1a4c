use anyhow::{Context, Result};
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;

/// A reqwest client wrapper that caps response bodies at a byte budget,
/// picking the budget by `Content-Type` (JSON gets its own, usually larger,
/// limit). Truncation is recorded in the response's metadata rather than
/// surfaced as an error — callers decide whether a truncated body still
/// counts as a successful probe.
#[derive(Clone)]
pub struct BoundedHttpClient {
    client: reqwest::Client,
    max_response_body_bytes: usize,
    max_json_response_body_bytes: usize,
}

/// The outcome of a bounded fetch: the (possibly truncated) body, the status
/// code, and truncation bookkeeping.
#[derive(Debug, Clone)]
pub struct BoundedResponse {
    pub status: u16,
    pub body: Bytes,
    pub body_truncated_by_client: bool,
    pub body_limit_bytes: usize,
    pub body_size_bytes: usize,
}

impl BoundedResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

impl BoundedHttpClient {
    pub fn new(
        user_agent: &str,
        default_timeout: Duration,
        max_response_body_bytes: usize,
        max_json_response_body_bytes: usize,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(default_timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            max_response_body_bytes,
            max_json_response_body_bytes,
        })
    }

    /// Issues a GET request, streaming the body and stopping once the
    /// content-type-selected limit is hit. The connection is dropped (not
    /// drained) past the limit — callers only ever see bounded memory use.
    pub async fn get(&self, url: &str, timeout: Option<Duration>) -> Result<BoundedResponse> {
        let mut request = self.client.get(url);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await.context("HTTP request failed")?;
        let status = response.status().as_u16();

        let limit = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|ct| ct.contains("json"))
            .map(|_| self.max_json_response_body_bytes)
            .unwrap_or(self.max_response_body_bytes);

        let mut buf = BytesMut::new();
        let mut truncated = false;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("HTTP body stream failed")?;
            if buf.len() + chunk.len() > limit {
                let remaining = limit.saturating_sub(buf.len());
                buf.extend_from_slice(&chunk[..remaining]);
                truncated = true;
                break;
            }
            buf.extend_from_slice(&chunk);
        }

        let body = buf.freeze();
        Ok(BoundedResponse {
            status,
            body_size_bytes: body.len(),
            body,
            body_truncated_by_client: truncated,
            body_limit_bytes: limit,
        })
    }

    /// Returns the unbuffered response untouched, for callers that opt into
    /// streaming themselves.
    pub async fn get_streaming(&self, url: &str) -> Result<reqwest::Response> {
        self.client
            .get(url)
            .send()
            .await
            .context("HTTP request failed")
    }
}
