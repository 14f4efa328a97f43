// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reversible JSON transform that preserves byte buffers.
//!
//! Credential documents and some event payloads carry binary identity
//! material. On the wire and in the KV store these are kept as tagged
//! objects `{"type":"Buffer","data":"<base64>"}`. The encoder also
//! accepts the raw array shape `{"type":"Buffer","data":[1,2,3]}` that
//! typed arrays serialize to, so documents survive a round trip through
//! either representation.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{json, Map, Value};

/// Wrap raw bytes in the tagged-object encoding.
pub fn tag_bytes(bytes: &[u8]) -> Value {
    json!({ "type": "Buffer", "data": BASE64.encode(bytes) })
}

/// Extract raw bytes from a tagged object, accepting both the base64 and
/// the byte-array `data` shapes. Returns `None` for anything else.
pub fn untag_bytes(value: &Value) -> Option<Vec<u8>> {
    let obj = value.as_object()?;
    if obj.len() != 2 || obj.get("type")?.as_str()? != "Buffer" {
        return None;
    }
    match obj.get("data")? {
        Value::String(b64) => BASE64.decode(b64).ok(),
        Value::Array(items) => items
            .iter()
            .map(|v| v.as_u64().and_then(|n| u8::try_from(n).ok()))
            .collect(),
        _ => None,
    }
}

/// Deep-walk a value, normalizing every buffer-tagged object to the
/// base64 form. This is the shape persisted to the KV store and sent to
/// the webhook sink.
pub fn encode_buffers(value: &Value) -> Value {
    if let Some(bytes) = untag_bytes(value) {
        return tag_bytes(&bytes);
    }
    match value {
        Value::Array(items) => Value::Array(items.iter().map(encode_buffers).collect()),
        Value::Object(obj) => Value::Object(
            obj.iter()
                .map(|(k, v)| (k.clone(), encode_buffers(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Deep-walk a value, expanding every buffer-tagged object to the raw
/// byte-array form consumed by the protocol library.
pub fn decode_buffers(value: &Value) -> Value {
    if let Some(bytes) = untag_bytes(value) {
        let data: Vec<Value> = bytes.into_iter().map(|b| Value::from(b as u64)).collect();
        let mut obj = Map::new();
        obj.insert("type".into(), Value::from("Buffer"));
        obj.insert("data".into(), Value::Array(data));
        return Value::Object(obj);
    }
    match value {
        Value::Array(items) => Value::Array(items.iter().map(decode_buffers).collect()),
        Value::Object(obj) => Value::Object(
            obj.iter()
                .map(|(k, v)| (k.clone(), decode_buffers(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_doc() -> Value {
        json!({
            "noiseKey": {
                "private": { "type": "Buffer", "data": BASE64.encode([1u8, 2, 3, 255]) },
                "public": { "type": "Buffer", "data": BASE64.encode([9u8, 8, 7]) },
            },
            "registrationId": 4921,
            "me": { "id": "123456@s.whatsapp.net", "name": "gw" },
            "identities": [
                { "type": "Buffer", "data": BASE64.encode([0u8; 32]) },
            ],
            "plain": "text",
            "nested": { "deep": [1, 2, { "type": "Buffer", "data": BASE64.encode([42u8]) }] },
        })
    }

    #[test]
    fn tag_untag_round_trips_bytes() {
        let bytes = vec![0u8, 1, 2, 250, 255];
        assert_eq!(untag_bytes(&tag_bytes(&bytes)), Some(bytes));
    }

    #[test]
    fn untag_accepts_array_shape() {
        let node_style = json!({ "type": "Buffer", "data": [1, 2, 3] });
        assert_eq!(untag_bytes(&node_style), Some(vec![1, 2, 3]));
    }

    #[test]
    fn untag_rejects_non_buffers() {
        assert!(untag_bytes(&json!({"type": "Buffer"})).is_none());
        assert!(untag_bytes(&json!({"type": "Blob", "data": "AA=="})).is_none());
        assert!(untag_bytes(&json!({"type": "Buffer", "data": "AA==", "x": 1})).is_none());
        assert!(untag_bytes(&json!("AA==")).is_none());
        assert!(untag_bytes(&json!({"type": "Buffer", "data": [300]})).is_none());
    }

    #[test]
    fn encode_after_decode_is_identity_on_canonical_form() {
        let doc = sample_doc();
        assert_eq!(encode_buffers(&decode_buffers(&doc)), doc);
    }

    #[test]
    fn encode_normalizes_array_shape_to_base64() {
        let mixed = json!({
            "a": { "type": "Buffer", "data": [1, 2, 3] },
            "b": { "type": "Buffer", "data": BASE64.encode([4u8, 5]) },
        });
        let encoded = encode_buffers(&mixed);
        assert_eq!(encoded["a"]["data"], BASE64.encode([1u8, 2, 3]));
        assert_eq!(encoded["b"]["data"], BASE64.encode([4u8, 5]));
    }

    #[test]
    fn non_buffer_values_pass_through_unchanged() {
        let doc = json!({ "n": 1, "s": "x", "b": true, "z": null, "arr": [1, "two"] });
        assert_eq!(encode_buffers(&doc), doc);
        assert_eq!(decode_buffers(&doc), doc);
    }
}
