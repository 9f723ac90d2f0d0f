//! JSON codec for the update server protocol.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{CheckRequest, OutcomeReport, WireCodec};
use crate::descriptor::{normalize_digest, UpdateDescriptor, MAX_IDENTIFIER_LEN};
use crate::error::{UpdateError, UpdateResult};

#[derive(Serialize)]
struct WireCheckRequest<'a> {
    device_id: &'a str,
    current_version: &'a str,
    battery: u8,
    signal: i32,
    free_storage: u64,
}

#[derive(Deserialize)]
struct WireDescriptor {
    firmware_id: String,
    version: String,
    campaign_id: String,
    size: u64,
    digest: String,
    download_uri: String,
    min_battery: u8,
    min_signal: i32,
    #[serde(default)]
    anti_rollback: Option<u32>,
    #[serde(default)]
    mtu: Option<u32>,
}

#[derive(Serialize)]
struct WireReport<'a> {
    device_id: &'a str,
    campaign_id: Option<&'a str>,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    progress: Option<u8>,
    attempt: u32,
    #[serde(rename = "final")]
    is_final: bool,
    timestamp: String,
}

/// [`WireCodec`] speaking JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl JsonCodec {
    pub fn new() -> Self {
        Self
    }
}

fn check_identifier(field: &str, value: &str) -> UpdateResult<()> {
    if value.is_empty() || value.chars().count() > MAX_IDENTIFIER_LEN {
        return Err(UpdateError::MalformedResponse(format!(
            "field '{}' must be 1-{} characters",
            field, MAX_IDENTIFIER_LEN
        )));
    }
    Ok(())
}

impl WireDescriptor {
    fn into_descriptor(self) -> UpdateResult<UpdateDescriptor> {
        check_identifier("firmware_id", &self.firmware_id)?;
        check_identifier("version", &self.version)?;
        check_identifier("campaign_id", &self.campaign_id)?;

        let digest = normalize_digest(&self.digest).ok_or_else(|| {
            UpdateError::MalformedResponse(format!(
                "field 'digest' is not a SHA-256 hex string: '{}'",
                self.digest
            ))
        })?;

        if self.download_uri.trim().is_empty() {
            return Err(UpdateError::MalformedResponse(
                "field 'download_uri' is empty".to_string(),
            ));
        }

        Ok(UpdateDescriptor {
            firmware_id: self.firmware_id,
            version: self.version,
            campaign_id: self.campaign_id,
            size: self.size,
            digest,
            download_uri: self.download_uri,
            min_battery: self.min_battery,
            min_signal: self.min_signal,
            anti_rollback: self.anti_rollback,
            mtu: self.mtu,
        })
    }
}

impl WireCodec for JsonCodec {
    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn encode_check(&self, request: &CheckRequest) -> UpdateResult<Vec<u8>> {
        let wire = WireCheckRequest {
            device_id: &request.device_id,
            current_version: &request.current_version,
            battery: request.capabilities.battery_percent,
            signal: request.capabilities.signal_strength,
            free_storage: request.capabilities.free_storage,
        };
        serde_json::to_vec(&wire)
            .map_err(|e| UpdateError::Config(format!("failed to encode check request: {}", e)))
    }

    fn decode_check(&self, body: &[u8]) -> UpdateResult<Option<UpdateDescriptor>> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| UpdateError::MalformedResponse(format!("invalid JSON: {}", e)))?;

        if value.get("update_available").and_then(Value::as_bool) != Some(true) {
            return Ok(None);
        }

        let wire: WireDescriptor = serde_json::from_value(value)
            .map_err(|e| UpdateError::MalformedResponse(e.to_string()))?;
        wire.into_descriptor().map(Some)
    }

    fn encode_report(&self, report: &OutcomeReport) -> UpdateResult<Vec<u8>> {
        let wire = WireReport {
            device_id: &report.device_id,
            campaign_id: report.campaign_id.as_deref(),
            status: report.status.as_str(),
            reason: report.reason.as_deref(),
            version: report.version.as_deref(),
            progress: report.progress,
            attempt: report.attempt,
            is_final: report.is_final,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        serde_json::to_vec(&wire)
            .map_err(|e| UpdateError::Config(format!("failed to encode report: {}", e)))
    }
}
