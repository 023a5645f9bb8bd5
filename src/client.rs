use std::io::Read;
use std::time::Duration;

use async_trait::async_trait;
use flate2::read::GzDecoder;
use reqwest::{Client, Response, StatusCode, header};
use tracing::{debug, warn};

use crate::config::TapConfig;
use crate::credential::TokenSigner;
use crate::credential_cache::TokenCache;
use crate::error::TapError;
use crate::retry::{Attempt, RetryPolicy, retry_with_backoff};
use crate::types::{ErrorResponse, ReportOutcome, ReportRequest};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const ACCEPT: &str = "application/a-gzip, application/json";

/// Anything that can download a report. The sync driver only talks to this.
#[async_trait]
pub trait ReportSource: Send + Sync {
    async fn fetch_report(&self, request: &ReportRequest) -> Result<ReportOutcome, TapError>;
}

/// HTTP client for the App Store Connect report endpoints.
pub struct AppStoreClient {
    http_client: Client,
    tokens: TokenCache,
    base_url: String,
    retry: RetryPolicy,
}

impl AppStoreClient {
    pub fn new(config: &TapConfig) -> Result<Self, TapError> {
        let signer = TokenSigner::from_config(config)?;
        let tokens = TokenCache::new(signer)?;
        let retry = RetryPolicy::default().with_max_retries(config.max_retries);
        Self::with_parts(tokens, &config.base_url, config.request_timeout, retry)
    }

    pub fn with_parts(
        tokens: TokenCache,
        base_url: &str,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, TapError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("tap-appstore/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TapError::Transport {
                attempts: 0,
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            http_client,
            tokens,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry,
        })
    }

    async fn authorized_send(
        &self,
        request: &ReportRequest,
    ) -> Result<Response, Attempt<ReportOutcome>> {
        let token = self.tokens.token().await.map_err(Attempt::Fail)?;
        self.send_with(request, &token.bearer())
            .await
            .map_err(classify_send_error)
    }

    async fn send_with(
        &self,
        request: &ReportRequest,
        authorization: &str,
    ) -> Result<Response, reqwest::Error> {
        let url = format!("{}{}", self.base_url, request.endpoint.path());
        self.http_client
            .get(&url)
            .query(&request.query())
            .header(header::AUTHORIZATION, authorization)
            .header(header::ACCEPT, ACCEPT)
            .send()
            .await
    }

    /// One attempt, including a single token refresh on 401.
    ///
    /// Only 404 counts as an unavailable report. 403 is an auth failure and
    /// every other client error fails the run.
    async fn attempt(&self, request: &ReportRequest) -> Attempt<ReportOutcome> {
        let mut response = match self.authorized_send(request).await {
            Ok(response) => response,
            Err(attempt) => return attempt,
        };

        if response.status() == StatusCode::UNAUTHORIZED {
            debug!("API answered 401, re-signing token");
            self.tokens.invalidate().await;
            response = match self.authorized_send(request).await {
                Ok(response) => response,
                Err(attempt) => return attempt,
            };
            if response.status() == StatusCode::UNAUTHORIZED {
                let message = error_message(response).await;
                return Attempt::Fail(TapError::Auth(format!(
                    "App Store Connect rejected the token: {}",
                    message
                )));
            }
        }

        let status = response.status();
        if status.is_success() {
            return match response.bytes().await {
                Ok(body) => match decode_body(&body) {
                    Ok(text) => Attempt::Done(ReportOutcome::Report(text)),
                    Err(e) => Attempt::Retry {
                        message: format!("failed to decompress report: {}", e),
                        retry_after: None,
                    },
                },
                Err(e) => classify_send_error(e),
            };
        }

        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            let retry_after = retry_after(&response);
            let message = error_message(response).await;
            return Attempt::Retry {
                message: format!("{}: {}", status, message),
                retry_after,
            };
        }

        let message = error_message(response).await;
        match status {
            StatusCode::NOT_FOUND => Attempt::Done(ReportOutcome::Unavailable {
                status: status.as_u16(),
                message,
            }),
            StatusCode::FORBIDDEN => Attempt::Fail(TapError::Auth(format!(
                "key has no access to {}: {}",
                request.endpoint, message
            ))),
            _ => Attempt::Fail(TapError::Api {
                status: status.as_u16(),
                message,
            }),
        }
    }
}

#[async_trait]
impl ReportSource for AppStoreClient {
    async fn fetch_report(&self, request: &ReportRequest) -> Result<ReportOutcome, TapError> {
        debug!(
            endpoint = %request.endpoint,
            report_date = request.report_date().unwrap_or("-"),
            "Downloading report"
        );
        retry_with_backoff(&self.retry, |_| self.attempt(request)).await
    }
}

fn classify_send_error(e: reqwest::Error) -> Attempt<ReportOutcome> {
    if e.is_connect() || e.is_timeout() || e.is_request() || e.is_body() || e.is_decode() {
        Attempt::Retry {
            message: e.to_string(),
            retry_after: None,
        }
    } else {
        Attempt::Fail(TapError::Transport {
            attempts: 1,
            message: e.to_string(),
        })
    }
}

fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

async fn error_message(response: Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorResponse>(&body) {
        Ok(parsed) if !parsed.errors.is_empty() => parsed.summary(),
        _ if body.trim().is_empty() => status.to_string(),
        _ => body.trim().to_string(),
    }
}

/// Reports arrive gzip-compressed (`application/a-gzip`) without a
/// `Content-Encoding` header, so decompression happens here.
pub fn decode_body(body: &[u8]) -> std::io::Result<String> {
    if body.starts_with(&GZIP_MAGIC) {
        let mut text = String::new();
        GzDecoder::new(body).read_to_string(&mut text)?;
        Ok(text)
    } else {
        match String::from_utf8(body.to_vec()) {
            Ok(text) => Ok(text),
            Err(e) => {
                warn!(
                    valid_up_to = e.utf8_error().valid_up_to(),
                    "Report body is not valid UTF-8, replacing invalid bytes"
                );
                Ok(String::from_utf8_lossy(body).into_owned())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    #[test]
    fn test_decode_gzip_body() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"Provider\tUnits\nAPPLE\t3\n").unwrap();
        let compressed = encoder.finish().unwrap();

        assert_eq!(decode_body(&compressed).unwrap(), "Provider\tUnits\nAPPLE\t3\n");
    }

    #[test]
    fn test_decode_plain_body() {
        assert_eq!(decode_body(b"a\tb\n1\t2").unwrap(), "a\tb\n1\t2");
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let text = decode_body(b"Title\nCaf\xe9\n").unwrap();
        assert_eq!(text, "Title\nCaf\u{fffd}\n");
    }
}
