//! HTTP client for the external rewriting service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use super::error::RelayError;

/// Rewritten texts shorter than this are "nothing usable".
pub const MIN_USABLE_LEN: usize = 10;

/// Contract for the external rewriting/filtering service.
#[async_trait]
pub trait Rewriter: Send + Sync {
    /// Submit raw post texts. `Ok(Some(text))` is a usable rewrite,
    /// `Ok(None)` means the service produced nothing usable (filtered
    /// the content out, or answered with an empty/too-short result).
    async fn rewrite(&self, posts: &[String]) -> Result<Option<String>, RelayError>;
}

#[derive(Serialize)]
struct RewriteRequest<'a> {
    posts: &'a [String],
    has_image: bool,
}

#[derive(Deserialize)]
struct RewriteResponse {
    status: String,
    #[serde(default)]
    result: Vec<RewrittenPost>,
}

#[derive(Deserialize)]
struct RewrittenPost {
    text: String,
}

/// reqwest-backed [`Rewriter`] with an explicit per-call timeout.
pub struct HttpRewriter {
    client: Client,
    endpoint: Url,
    timeout: Duration,
}

impl HttpRewriter {
    pub fn new(client: Client, endpoint: Url, timeout: Duration) -> Self {
        Self {
            client,
            endpoint,
            timeout,
        }
    }
}

#[async_trait]
impl Rewriter for HttpRewriter {
    async fn rewrite(&self, posts: &[String]) -> Result<Option<String>, RelayError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .timeout(self.timeout)
            .json(&RewriteRequest {
                posts,
                // The pipeline carries text-only items; the contract
                // field stays for the service's sake.
                has_image: false,
            })
            .send()
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::Api { status, body });
        }

        let body = response
            .text()
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))?;
        parse_rewrite_response(&body)
    }
}

/// Interpret a 2xx relay payload. An empty `result`, or a first text
/// shorter than [`MIN_USABLE_LEN`], is "nothing usable" rather than an
/// error.
fn parse_rewrite_response(body: &str) -> Result<Option<String>, RelayError> {
    let parsed: RewriteResponse =
        serde_json::from_str(body).map_err(|e| RelayError::Malformed(e.to_string()))?;
    if parsed.status != "success" {
        return Err(RelayError::Malformed(format!(
            "unexpected status {:?}",
            parsed.status
        )));
    }
    let Some(first) = parsed.result.first() else {
        return Ok(None);
    };
    let text = first.text.trim();
    if text.chars().count() < MIN_USABLE_LEN {
        return Ok(None);
    }
    Ok(Some(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_usable_result() {
        let body = r#"{"status":"success","result":[{"text":"a freshly rewritten post"}]}"#;
        assert_eq!(
            parse_rewrite_response(body).unwrap(),
            Some("a freshly rewritten post".to_string())
        );
    }

    #[test]
    fn test_parse_trims_before_length_check() {
        let body = r#"{"status":"success","result":[{"text":"   short   "}]}"#;
        assert_eq!(parse_rewrite_response(body).unwrap(), None);
    }

    #[test]
    fn test_parse_empty_result_is_nothing_usable() {
        let body = r#"{"status":"success","result":[]}"#;
        assert_eq!(parse_rewrite_response(body).unwrap(), None);

        let omitted = r#"{"status":"success"}"#;
        assert_eq!(parse_rewrite_response(omitted).unwrap(), None);
    }

    #[test]
    fn test_parse_short_first_result_is_nothing_usable() {
        let body = r#"{"status":"success","result":[{"text":"too short"}]}"#;
        assert_eq!(parse_rewrite_response(body).unwrap(), None);
    }

    #[test]
    fn test_parse_rejects_unexpected_status() {
        let body = r#"{"status":"error","result":[]}"#;
        assert!(matches!(
            parse_rewrite_response(body),
            Err(RelayError::Malformed(_))
        ));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            parse_rewrite_response("not json"),
            Err(RelayError::Malformed(_))
        ));
    }
}
