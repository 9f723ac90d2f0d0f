//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::io::{self, Cursor, Read};
use std::sync::Mutex;

use otaclient::error::{UpdateError, UpdateResult};
use otaclient::transport::{Method, Transport, TransportRequest, TransportResponse};
use sha2::{Digest, Sha256};

pub const CHECK_URL: &str = "http://ota.test/api/v1/check";
pub const REPORT_URL: &str = "http://ota.test/api/v1/report";
pub const FIRMWARE_URL: &str = "http://ota.test/firmware/sensor-2.0.0.bin";

/// Deterministic firmware bytes.
pub fn firmware(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * 7 + i / 256) % 256) as u8).collect()
}

pub fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// Check response body announcing `data` as version `version`.
pub fn update_available(version: &str, data: &[u8], min_battery: u8) -> Vec<u8> {
    serde_json::json!({
        "update_available": true,
        "firmware_id": "sensor-fw",
        "version": version,
        "campaign_id": "2026-q4",
        "size": data.len(),
        "digest": sha256_hex(data).to_uppercase(),
        "download_uri": FIRMWARE_URL,
        "min_battery": min_battery,
        "min_signal": -100,
    })
    .to_string()
    .into_bytes()
}

pub fn no_update() -> Vec<u8> {
    br#"{"update_available": false}"#.to_vec()
}

/// Reader yielding `limit` bytes of `data`, then failing.
struct DroppingReader {
    inner: Cursor<Vec<u8>>,
    remaining: usize,
}

impl Read for DroppingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset"));
        }
        let len = buf.len().min(self.remaining);
        let n = self.inner.read(&mut buf[..len])?;
        self.remaining -= n;
        Ok(n)
    }
}

pub enum Scripted {
    Body(u16, Vec<u8>),
    NetworkError,
    /// Serve the resource but drop the connection after this many bytes.
    DropAfter(usize),
}

#[derive(Default)]
struct Inner {
    scripted: HashMap<String, VecDeque<Scripted>>,
    resources: HashMap<String, Vec<u8>>,
    log: Vec<TransportRequest>,
}

/// In-memory update server.
#[derive(Default)]
pub struct FakeServer {
    inner: Mutex<Inner>,
    ignore_ranges: bool,
}

impl FakeServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ignoring_ranges() -> Self {
        Self {
            ignore_ranges: true,
            ..Self::default()
        }
    }

    pub fn host(&self, url: &str, data: Vec<u8>) {
        self.inner.lock().unwrap().resources.insert(url.to_string(), data);
    }

    pub fn script(&self, url: &str, reply: Scripted) {
        self.inner
            .lock()
            .unwrap()
            .scripted
            .entry(url.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn requests_to(&self, url: &str) -> Vec<TransportRequest> {
        self.inner
            .lock()
            .unwrap()
            .log
            .iter()
            .filter(|r| r.url == url)
            .cloned()
            .collect()
    }

    pub fn reports(&self) -> Vec<serde_json::Value> {
        self.requests_to(REPORT_URL)
            .into_iter()
            .filter(|r| r.method == Method::Post)
            .filter_map(|r| r.body)
            .map(|(body, _)| serde_json::from_slice(&body).unwrap())
            .collect()
    }

    fn resource_response(&self, data: Vec<u8>, range_start: Option<u64>) -> TransportResponse {
        match range_start.filter(|_| !self.ignore_ranges) {
            Some(start) if start >= data.len() as u64 => reply(416, Vec::new()),
            Some(start) => {
                let body = data[start as usize..].to_vec();
                TransportResponse {
                    status: 206,
                    content_length: Some(body.len() as u64),
                    content_range_start: Some(start),
                    body: Box::new(Cursor::new(body)),
                }
            }
            None => reply(200, data),
        }
    }
}

fn reply(status: u16, body: Vec<u8>) -> TransportResponse {
    TransportResponse {
        status,
        content_length: Some(body.len() as u64),
        content_range_start: None,
        body: Box::new(Cursor::new(body)),
    }
}

impl Transport for FakeServer {
    fn send(&self, request: TransportRequest) -> UpdateResult<TransportResponse> {
        let url = request.url.clone();
        let range_start = request.range_start;

        let (scripted, resource) = {
            let mut inner = self.inner.lock().unwrap();
            inner.log.push(request);
            let scripted = inner.scripted.get_mut(&url).and_then(VecDeque::pop_front);
            (scripted, inner.resources.get(&url).cloned())
        };

        match (scripted, resource) {
            (Some(Scripted::Body(status, body)), _) => Ok(reply(status, body)),
            (Some(Scripted::NetworkError), _) => {
                Err(UpdateError::network(&url, "connection refused"))
            }
            (Some(Scripted::DropAfter(limit)), Some(data)) => {
                let mut response = self.resource_response(data, range_start);
                response.body = Box::new(DroppingReader {
                    inner: Cursor::new(read_all(response.body)),
                    remaining: limit,
                });
                Ok(response)
            }
            (None, Some(data)) => Ok(self.resource_response(data, range_start)),
            _ if url == REPORT_URL => Ok(reply(204, Vec::new())),
            _ => Ok(reply(404, Vec::new())),
        }
    }
}

fn read_all(mut body: Box<dyn Read + Send>) -> Vec<u8> {
    let mut data = Vec::new();
    body.read_to_end(&mut data).unwrap();
    data
}
