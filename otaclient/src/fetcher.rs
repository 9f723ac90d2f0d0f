//! Update check against the server.

use std::io::Read;
use std::sync::Arc;

use tracing::{debug, info};

use crate::descriptor::{CapabilitySnapshot, UpdateDescriptor};
use crate::error::{UpdateError, UpdateResult};
use crate::protocol::{CheckRequest, WireCodec, MAX_CHECK_RESPONSE_BYTES};
use crate::transport::{Transport, TransportRequest};

/// Asks the server whether an update is pending for this device.
pub struct DescriptorFetcher {
    transport: Arc<dyn Transport>,
    codec: Arc<dyn WireCodec>,
    check_url: String,
}

impl DescriptorFetcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        codec: Arc<dyn WireCodec>,
        check_url: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            codec,
            check_url: check_url.into(),
        }
    }

    pub fn check_url(&self) -> &str {
        &self.check_url
    }

    /// Send a check request and decode the answer.
    ///
    /// Returns `Ok(None)` when no update is pending. A non-2xx status is a
    /// `Protocol` error and an undecodable body is `MalformedResponse`.
    pub fn fetch(
        &self,
        device_id: &str,
        current_version: &str,
        capabilities: &CapabilitySnapshot,
    ) -> UpdateResult<Option<UpdateDescriptor>> {
        let request = CheckRequest {
            device_id: device_id.to_string(),
            current_version: current_version.to_string(),
            capabilities: *capabilities,
        };
        let body = self.codec.encode_check(&request)?;

        debug!(url = %self.check_url, device_id, current_version, "Checking for update");
        let response = self.transport.send(TransportRequest::post(
            &self.check_url,
            body,
            self.codec.content_type(),
        ))?;

        if !response.is_success() {
            return Err(UpdateError::Protocol {
                url: self.check_url.clone(),
                status: response.status,
            });
        }

        let mut bytes = Vec::new();
        response
            .body
            .take(MAX_CHECK_RESPONSE_BYTES + 1)
            .read_to_end(&mut bytes)
            .map_err(|e| UpdateError::network(&self.check_url, format!("read error: {}", e)))?;
        if bytes.len() as u64 > MAX_CHECK_RESPONSE_BYTES {
            return Err(UpdateError::MalformedResponse(format!(
                "check response exceeds {} bytes",
                MAX_CHECK_RESPONSE_BYTES
            )));
        }

        let descriptor = self.codec.decode_check(&bytes)?;
        match &descriptor {
            Some(d) => info!(descriptor = %d, "Update available"),
            None => debug!("No update available"),
        }
        Ok(descriptor)
    }
}
