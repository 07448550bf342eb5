//! Builders for the JSON documents sent to KeyScaler.
//!
//! Everything here is pure: inputs in, a serialized document out. Member order is
//! preserved as written (`serde_json` is built with `preserve_order`).

use crate::asset::apm_password::Account;
use crate::error::Result;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde_json::{Map, Value, json};

/// Inputs of the dFactor authentication envelope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthenticationRequest {
    pub udi: String,
    pub device_tid: String,
    pub key_id: String,
    pub dfactor: String,
    pub user_agent: String,
    pub edge_device: bool,
}

/// `{"assetDeliveryStatus":{"assetId","status","failureReason"}}`, or an empty status object
/// when `asset_id` is empty.
pub fn build_acknowledge_message(asset_id: &str, status: bool, failure_reason: &str) -> String {
    let mut delivery = Map::new();
    if !asset_id.is_empty() {
        delivery.insert("assetId".to_string(), json!(asset_id));
        delivery.insert("status".to_string(), json!(status));
        delivery.insert("failureReason".to_string(), json!(failure_reason));
    }
    json!({ "assetDeliveryStatus": delivery }).to_string()
}

/// Authentication envelope. Empty fields are left out entirely; `userAgent` is only sent by
/// edge devices.
pub fn build_dfactor_auth_message(request: &AuthenticationRequest) -> String {
    let mut message = Map::new();
    let mut put = |name: &str, value: &str| {
        if !value.is_empty() {
            message.insert(name.to_string(), json!(value));
        }
    };
    put("udi", &request.udi);
    put("tid", &request.device_tid);
    put("keyId", &request.key_id);
    put("dFactor", &request.dfactor);
    if request.edge_device {
        put("userAgent", &request.user_agent);
    }
    Value::Object(message).to_string()
}

/// Shallow, destructive union of two objects: on a key collision `second` wins.
///
/// Non-object inputs are replaced by `second`.
pub fn merge_objects(first: &mut Value, second: Value) {
    match (first.as_object_mut(), second) {
        (Some(target), Value::Object(source)) => {
            for (key, value) in source {
                target.insert(key, value);
            }
        }
        (_, second) => *first = second,
    }
}

/// Parses both documents and merges them with [`merge_objects`].
pub fn merge_json(first: &str, second: &str) -> Result<String> {
    let mut merged: Value = serde_json::from_str(first)?;
    merge_objects(&mut merged, serde_json::from_str(second)?);
    Ok(merged.to_string())
}

/// Authentication request with an acknowledgement folded in.
pub fn build_auth_acknowledge_message(
    request: &AuthenticationRequest,
    asset_id: &str,
    status: bool,
    failure_reason: &str,
) -> Result<String> {
    merge_json(
        &build_dfactor_auth_message(request),
        &build_acknowledge_message(asset_id, status, failure_reason),
    )
}

/// `[{"line":1,"description":"..."}, ...]`, one entry per output line.
pub fn build_device_logs(output: &str) -> Value {
    Value::Array(
        output
            .lines()
            .enumerate()
            .map(|(index, line)| json!({ "line": index + 1, "description": line }))
            .collect(),
    )
}

/// Script result: the device log array, optionally deflated, base64-encoded under
/// `device_logs.data`.
pub fn build_script_result_message(output: &str, compress: bool) -> Result<String> {
    let logs = serde_json::to_vec(&build_device_logs(output))?;
    let (compression, data) = match compress {
        true => compress_logs(&logs)?,
        false => ("none", logs),
    };
    Ok(json!({
        "device_logs": {
            "type": "script",
            "compression": compression,
            "data": BASE64.encode(data),
        }
    })
    .to_string())
}

#[cfg(feature = "script-compression")]
fn compress_logs(logs: &[u8]) -> Result<(&'static str, Vec<u8>)> {
    use flate2::{Compression, write::ZlibEncoder};
    use std::io::Write;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(logs)?;
    Ok(("zlib", encoder.finish()?))
}

#[cfg(not(feature = "script-compression"))]
fn compress_logs(logs: &[u8]) -> Result<(&'static str, Vec<u8>)> {
    tracing::debug!("script-compression feature disabled, sending device logs uncompressed");
    Ok(("none", logs.to_vec()))
}

/// Password change status. `status` is embedded as a JSON value when it parses as one,
/// otherwise as a plain string.
pub fn build_password_change_status(asset_id: &str, status: &str) -> String {
    let status = serde_json::from_str::<Value>(status).unwrap_or_else(|_| json!(status));
    json!({
        "passwordChangeStatus": {
            "assetId": asset_id,
            "status": status,
        }
    })
    .to_string()
}

/// Per-account outcome of an APM password batch.
pub fn build_apm_passwords_message(asset_id: &str, accounts: &[Account]) -> String {
    let accounts: Vec<Value> = accounts
        .iter()
        .map(|account| {
            let mut entry = Map::new();
            entry.insert("name".to_string(), json!(account.name));
            entry.insert("result".to_string(), json!(account.result.as_str()));
            if !account.reason.is_empty() {
                entry.insert("reason".to_string(), json!(account.reason));
            }
            Value::Object(entry)
        })
        .collect();
    json!({ "assetId": asset_id, "accounts": accounts }).to_string()
}
