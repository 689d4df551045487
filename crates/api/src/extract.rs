use axum::body::Body;
use bytes::{Bytes, BytesMut};
use dynapi_core::{ApiError, CustomObjectData};
use futures::StreamExt;
use once_cell::sync::Lazy;
use tracing::warn;

static MAX_BODY_BYTES: Lazy<usize> = Lazy::new(|| {
    std::env::var("DYNAPI_MAX_BODY_BYTES")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(1_000_000) // 1 MB default
});

/// Build a `CustomObjectData` from raw request bytes.
///
/// The body must be a JSON object with a string `name`; `data` keeps the bytes verbatim.
pub fn parse_custom_object(version: &str, raw: &[u8]) -> Result<CustomObjectData, ApiError> {
    let value: serde_json::Value = serde_json::from_slice(raw).map_err(|e| ApiError::bad_request(e.to_string()))?;
    let obj = value.as_object().ok_or_else(|| ApiError::bad_request("JSON data is not an object."))?;
    let name = obj
        .get("name")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ApiError::bad_request("Missing name field."))?
        .to_string();
    let data = String::from_utf8(raw.to_vec()).map_err(|e| ApiError::bad_request(e.to_string()))?;
    Ok(CustomObjectData { name, version: version.to_string(), data })
}

/// Read the whole body and parse it; a read failure is an internal error.
pub async fn extract_custom_object(version: &str, body: Body) -> Result<CustomObjectData, ApiError> {
    let raw = read_body(body, *MAX_BODY_BYTES).await?;
    parse_custom_object(version, &raw)
}

/// Collect at most `limit` bytes. Going over is the caller's fault (413); a broken stream is ours.
async fn read_body(body: Body, limit: usize) -> Result<Bytes, ApiError> {
    let mut stream = body.into_data_stream();
    let mut buf = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| {
            warn!(error = %e, "reading request body failed");
            ApiError::Internal("failed to read request body".into())
        })?;
        if buf.len() + chunk.len() > limit {
            return Err(ApiError::PayloadTooLarge(format!("request body exceeds {} bytes", limit)));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf.freeze())
}
