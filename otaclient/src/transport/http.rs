//! HTTP transport built on `reqwest`'s blocking client.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, RANGE};

use super::{parse_content_range_start, Method, Transport, TransportRequest, TransportResponse};
use crate::config::DEFAULT_TIMEOUT_SECS;
use crate::error::{UpdateError, UpdateResult};

/// [`Transport`] backed by a blocking `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
    timeout: Duration,
}

impl ReqwestTransport {
    /// Create a transport with the default timeout.
    pub fn new() -> UpdateResult<Self> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create a transport with a custom timeout.
    pub fn with_timeout(timeout: Duration) -> UpdateResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("otaclient/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| UpdateError::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { client, timeout })
    }

    /// The configured request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, request: TransportRequest) -> UpdateResult<TransportResponse> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };

        if let Some(offset) = request.range_start {
            builder = builder.header(RANGE, format!("bytes={}-", offset));
        }
        if let Some((body, content_type)) = request.body {
            builder = builder.header(CONTENT_TYPE, content_type).body(body);
        }

        let response = builder.send().map_err(|e| {
            if e.is_timeout() {
                UpdateError::network(
                    &request.url,
                    format!("timed out after {}s", self.timeout.as_secs()),
                )
            } else {
                UpdateError::network(&request.url, e)
            }
        })?;

        let headers = response.headers();
        let content_length = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());
        let content_range_start = headers
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range_start);

        Ok(TransportResponse {
            status: response.status().as_u16(),
            content_length,
            content_range_start,
            body: Box::new(response),
        })
    }
}
