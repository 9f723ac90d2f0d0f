//! Scripted transport and fixtures for unit tests.

use std::collections::{HashMap, VecDeque};
use std::io::Cursor;

use parking_lot::Mutex;

use crate::error::{UpdateError, UpdateResult};
use crate::transport::{
    Method, Transport, TransportRequest, TransportResponse, STATUS_OK, STATUS_PARTIAL_CONTENT,
    STATUS_RANGE_NOT_SATISFIABLE,
};
use crate::verifier::IntegrityVerifier;

/// Deterministic artifact bytes.
pub fn fixture(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * 31 + 7) % 251) as u8).collect()
}

/// SHA-256 of `data` as lowercase hex.
pub fn sha256_hex(data: &[u8]) -> String {
    IntegrityVerifier::new()
        .digest_reader(&mut Cursor::new(data))
        .unwrap()
}

/// A check response announcing an update.
pub fn descriptor_json(version: &str, digest: &str, size: u64, uri: &str) -> Vec<u8> {
    serde_json::json!({
        "update_available": true,
        "firmware_id": "sensor-fw",
        "version": version,
        "campaign_id": "spring-rollout",
        "size": size,
        "digest": digest,
        "download_uri": uri,
        "min_battery": 20,
        "min_signal": -90,
    })
    .to_string()
    .into_bytes()
}

/// One scripted reply.
pub enum MockResponse {
    Reply {
        status: u16,
        body: Vec<u8>,
        content_length: Option<u64>,
        content_range_start: Option<u64>,
    },
    NetworkError(String),
}

impl MockResponse {
    /// Empty body with the given status.
    pub fn status(status: u16) -> Self {
        Self::Reply {
            status,
            body: Vec::new(),
            content_length: Some(0),
            content_range_start: None,
        }
    }

    /// 200 with `body`.
    pub fn ok(body: Vec<u8>) -> Self {
        Self::Reply {
            status: STATUS_OK,
            content_length: Some(body.len() as u64),
            body,
            content_range_start: None,
        }
    }

    /// 206 with `body` declared to start at byte `start`.
    pub fn partial(start: u64, body: Vec<u8>) -> Self {
        Self::Reply {
            status: STATUS_PARTIAL_CONTENT,
            content_length: Some(body.len() as u64),
            body,
            content_range_start: Some(start),
        }
    }

    /// Connection-level failure.
    pub fn network_error(reason: &str) -> Self {
        Self::NetworkError(reason.to_string())
    }

    fn into_result(self, url: &str) -> UpdateResult<TransportResponse> {
        match self {
            Self::Reply {
                status,
                body,
                content_length,
                content_range_start,
            } => Ok(TransportResponse {
                status,
                content_length,
                content_range_start,
                body: Box::new(Cursor::new(body)),
            }),
            Self::NetworkError(reason) => Err(UpdateError::network(url, reason)),
        }
    }
}

#[derive(Default)]
struct State {
    scripted: HashMap<String, VecDeque<MockResponse>>,
    resources: HashMap<String, Vec<u8>>,
    requests: Vec<TransportRequest>,
}

/// Transport answering from scripted replies and served resources.
///
/// Scripted replies for a URL are consumed first, in order. After that a
/// GET for a served resource honours `Range` like a real server. Anything
/// else gets a 404.
pub struct MockTransport {
    state: Mutex<State>,
    honour_ranges: bool,
    send_length: bool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            honour_ranges: true,
            send_length: true,
        }
    }

    /// Serve `data` at `url`.
    pub fn serving(url: &str, data: Vec<u8>) -> Self {
        let transport = Self::new();
        transport.serve(url, data);
        transport
    }

    pub fn serve(&self, url: &str, data: Vec<u8>) {
        self.state.lock().resources.insert(url.to_string(), data);
    }

    /// Answer range requests with the full body and a 200.
    pub fn ignoring_ranges(mut self) -> Self {
        self.honour_ranges = false;
        self
    }

    /// Omit `Content-Length` on served resources.
    pub fn without_content_length(mut self) -> Self {
        self.send_length = false;
        self
    }

    /// Queue a reply for the next request to `url`.
    pub fn push(&self, url: &str, response: MockResponse) {
        self.state
            .lock()
            .scripted
            .entry(url.to_string())
            .or_default()
            .push_back(response);
    }

    /// Every request received, in order.
    pub fn requests(&self) -> Vec<TransportRequest> {
        self.state.lock().requests.clone()
    }

    /// Requests received for `url`.
    pub fn requests_to(&self, url: &str) -> Vec<TransportRequest> {
        self.requests().into_iter().filter(|r| r.url == url).collect()
    }

    /// JSON bodies POSTed to `url`.
    pub fn posted_json(&self, url: &str) -> Vec<serde_json::Value> {
        self.requests_to(url)
            .into_iter()
            .filter(|r| r.method == Method::Post)
            .filter_map(|r| r.body)
            .map(|(body, _)| serde_json::from_slice(&body).unwrap())
            .collect()
    }

    fn serve_resource(&self, data: &[u8], range_start: Option<u64>) -> MockResponse {
        let length = |len: usize| self.send_length.then_some(len as u64);

        match range_start.filter(|_| self.honour_ranges) {
            Some(start) if start >= data.len() as u64 => {
                MockResponse::status(STATUS_RANGE_NOT_SATISFIABLE)
            }
            Some(start) => {
                let body = data[start as usize..].to_vec();
                MockResponse::Reply {
                    status: STATUS_PARTIAL_CONTENT,
                    content_length: length(body.len()),
                    content_range_start: Some(start),
                    body,
                }
            }
            None => MockResponse::Reply {
                status: STATUS_OK,
                content_length: length(data.len()),
                content_range_start: None,
                body: data.to_vec(),
            },
        }
    }
}

impl Transport for MockTransport {
    fn send(&self, request: TransportRequest) -> UpdateResult<TransportResponse> {
        let url = request.url.clone();
        let range_start = request.range_start;
        let method = request.method;

        let (scripted, resource) = {
            let mut state = self.state.lock();
            state.requests.push(request);
            let scripted = state.scripted.get_mut(&url).and_then(VecDeque::pop_front);
            (scripted, state.resources.get(&url).cloned())
        };

        let response = match (scripted, resource) {
            (Some(response), _) => response,
            (None, Some(data)) if method == Method::Get => self.serve_resource(&data, range_start),
            _ => MockResponse::status(404),
        };
        response.into_result(&url)
    }
}
