//! Transport abstraction shared by the fetcher, downloader and reporter.
//!
//! All network traffic of the client goes through the [`Transport`] trait
//! so the HTTP stack can be swapped for a scripted one in tests.

mod http;

pub use http::ReqwestTransport;

use std::fmt;
use std::io::Read;

use crate::error::UpdateResult;

/// HTTP status for a complete response body.
pub const STATUS_OK: u16 = 200;

/// HTTP status for a partial (range) response body.
pub const STATUS_PARTIAL_CONTENT: u16 = 206;

/// HTTP status for a range the server cannot satisfy.
pub const STATUS_RANGE_NOT_SATISFIABLE: u16 = 416;

/// Request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A single request issued through a [`Transport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    /// Request body and its content type.
    pub body: Option<(Vec<u8>, &'static str)>,
    /// First byte to request. Emits `Range: bytes=N-` when set.
    pub range_start: Option<u64>,
}

impl TransportRequest {
    /// Create a GET request.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            body: None,
            range_start: None,
        }
    }

    /// Create a POST request carrying `body`.
    pub fn post(url: impl Into<String>, body: Vec<u8>, content_type: &'static str) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            body: Some((body, content_type)),
            range_start: None,
        }
    }

    /// Request the resource starting at `offset`.
    pub fn with_range_start(mut self, offset: u64) -> Self {
        self.range_start = Some(offset);
        self
    }
}

/// Response to a [`TransportRequest`] with a streaming body.
pub struct TransportResponse {
    pub status: u16,
    /// Value of `Content-Length`, if sent.
    pub content_length: Option<u64>,
    /// Start offset from `Content-Range`, if sent.
    pub content_range_start: Option<u64>,
    pub body: Box<dyn Read + Send>,
}

impl TransportResponse {
    /// Whether the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .field("content_length", &self.content_length)
            .field("content_range_start", &self.content_range_start)
            .finish_non_exhaustive()
    }
}

/// Performs requests on behalf of the update client.
pub trait Transport: Send + Sync {
    /// Send a request and return the status with a streaming body.
    ///
    /// Connection failures and timeouts are `UpdateError::Network`. A
    /// non-success status is *not* an error at this level.
    fn send(&self, request: TransportRequest) -> UpdateResult<TransportResponse>;
}

/// Parse the start offset of a `Content-Range: bytes a-b/c` header value.
pub fn parse_content_range_start(value: &str) -> Option<u64> {
    let range = value.trim().strip_prefix("bytes")?.trim_start();
    let (start, _) = range.split_once('-')?;
    start.trim().parse().ok()
}
