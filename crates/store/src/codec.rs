//! Payload codec seam; the registry only needs a byte form of `CustomObjectData`.

use dynapi_core::CustomObjectData;

pub trait ObjectCodec: Send + Sync {
    fn encode(&self, obj: &CustomObjectData) -> Result<Vec<u8>, String>;
    fn decode(&self, raw: &[u8]) -> Result<CustomObjectData, String>;
}

/// serde_json encoding of the envelope (`name`, `version`, `data`).
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl ObjectCodec for JsonCodec {
    fn encode(&self, obj: &CustomObjectData) -> Result<Vec<u8>, String> {
        serde_json::to_vec(obj).map_err(|e| e.to_string())
    }

    fn decode(&self, raw: &[u8]) -> Result<CustomObjectData, String> {
        serde_json::from_slice(raw).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_keeps_data_as_string() {
        let obj = CustomObjectData { name: "w1".into(), version: "v1".into(), data: r#"{"name":"w1"}"#.into() };
        let raw = JsonCodec.encode(&obj).unwrap();
        let v: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert!(v["data"].is_string());
        assert!(JsonCodec.decode(b"not json").is_err());
    }
}
