use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use bytes::{BufMut, Bytes, BytesMut};
use dynapi_core::{find_version, ApiError, Schema};
use dynapi_schema::SchemaRegistry;
use dynapi_store::CustomObjectRegistry;
use http::{header, Method, Request, Response, StatusCode};
use metrics::{counter, histogram};
use smallvec::SmallVec;
use tracing::{debug, error, warn};

use crate::extract::extract_custom_object;

const INVALID_PATH: &str = "Invalid path, expected /custom/<schema>/<version> or /custom/<schema>/<version>/<name>";

/// Parsed `custom/<schema>/<version>[/<name>]` request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectPath {
    pub schema: String,
    pub version: String,
    pub name: Option<String>,
}

impl ObjectPath {
    pub fn parse(path: &str) -> Result<Self, ApiError> {
        let trimmed = path.strip_prefix('/').unwrap_or(path);
        let parts: SmallVec<[&str; 4]> = trimmed.split('/').collect();
        if parts.len() < 3 || parts.len() > 4 {
            return Err(ApiError::bad_request(INVALID_PATH));
        }
        if parts[0] != "custom" {
            return Err(ApiError::bad_request(format!("Invalid prefix: {}", parts[0])));
        }
        if parts[1..].iter().any(|p| p.is_empty()) {
            return Err(ApiError::bad_request(INVALID_PATH));
        }
        Ok(Self {
            schema: parts[1].to_string(),
            version: parts[2].to_string(),
            name: parts.get(3).map(|s| s.to_string()),
        })
    }
}

/// Routes custom object requests to the object registry after resolving schema and version.
pub struct CustomObjectHandler {
    schemas: Arc<dyn SchemaRegistry>,
    objects: Arc<dyn CustomObjectRegistry>,
}

impl CustomObjectHandler {
    pub fn new(schemas: Arc<dyn SchemaRegistry>, objects: Arc<dyn CustomObjectRegistry>) -> Self {
        Self { schemas, objects }
    }

    pub async fn serve(&self, req: Request<Body>) -> Response<Body> {
        let started = Instant::now();
        let (parts, body) = req.into_parts();
        let path = parts.uri.path().to_string();
        let resp = match self.dispatch(&parts.method, &path, body).await {
            Ok(resp) => resp,
            Err(e) => {
                match &e {
                    ApiError::Internal(_) => error!(method = %parts.method, %path, error = %e, "custom object request failed"),
                    _ => debug!(method = %parts.method, %path, error = %e, "custom object request rejected"),
                }
                status_response(&e)
            }
        };
        counter!("custom_requests_total", "method" => parts.method.to_string(), "code" => resp.status().as_u16().to_string()).increment(1);
        histogram!("custom_request_ms").record(started.elapsed().as_secs_f64() * 1000.0);
        resp
    }

    async fn dispatch(&self, method: &Method, path: &str, body: Body) -> Result<Response<Body>, ApiError> {
        let target = ObjectPath::parse(path)?;
        let schema = self.schemas.get(&target.schema).await?;
        if find_version(&schema, &target.version).is_none() {
            return Err(ApiError::not_found("version", format!("{}/{}", target.schema, target.version)));
        }

        match (method, target.name.as_deref()) {
            (&Method::GET, None) => self.list(&schema).await,
            (&Method::GET, Some(name)) => self.get(&schema, &target.version, name).await,
            (&Method::POST, None) => {
                let obj = extract_custom_object(&target.version, body).await?;
                self.objects.set(schema.name(), &obj.name, &obj).await.map_err(|e| store_error("creating", e))?;
                Ok(write_raw_json(Bytes::from(obj.data)))
            }
            (&Method::PUT, Some(name)) => {
                let obj = extract_custom_object(&target.version, body).await?;
                // path name wins over the body's own name
                self.objects.set(schema.name(), name, &obj).await.map_err(|e| store_error("updating", e))?;
                Ok(write_raw_json(Bytes::from(obj.data)))
            }
            (&Method::DELETE, Some(name)) => {
                self.objects.delete(schema.name(), name).await.map_err(|e| store_error("deleting", e))?;
                Ok(empty_ok())
            }
            (&Method::POST, Some(_)) => Err(ApiError::bad_request("creating object: invalid path, POST takes no object name")),
            (&Method::PUT, None) => Err(ApiError::bad_request("updating object: invalid path, object name required")),
            (&Method::DELETE, None) => Err(ApiError::bad_request("deleting object: invalid path, object name required")),
            (m, _) => Err(ApiError::bad_request(format!("unsupported method: {}", m))),
        }
    }

    async fn list(&self, schema: &Schema) -> Result<Response<Body>, ApiError> {
        let items = self.objects.list(schema.name()).await.map_err(|e| store_error("listing", e))?;
        // Stored data is already JSON text; splice it in rather than re-encoding.
        let cap = 12 + items.iter().map(|o| o.data.len() + 1).sum::<usize>();
        let mut buf = BytesMut::with_capacity(cap);
        buf.put_slice(b"{\"items\": [");
        for (ix, obj) in items.iter().enumerate() {
            if ix > 0 { buf.put_u8(b','); }
            buf.put_slice(obj.data.as_bytes());
        }
        buf.put_slice(b"]}");
        Ok(write_raw_json(buf.freeze()))
    }

    async fn get(&self, schema: &Schema, version: &str, name: &str) -> Result<Response<Body>, ApiError> {
        let obj = self.objects.get(schema.name(), name).await.map_err(|e| match e {
            dynapi_core::StoreError::NotFound(_) => ApiError::not_found("object", format!("{}/{}", schema.name(), name)),
            other => store_error("getting", other),
        })?;
        if obj.version != version {
            return Err(ApiError::bad_request(format!(
                "Storage data version {} is not the same as requested version: {}",
                obj.version, version
            )));
        }
        Ok(write_raw_json(Bytes::from(obj.data)))
    }
}

fn store_error(action: &str, e: dynapi_core::StoreError) -> ApiError {
    if !e.is_not_found() {
        warn!(action, error = %e, "custom object store failure");
    }
    ApiError::from(e)
}

fn write_raw_json(data: Bytes) -> Response<Body> {
    json_response(StatusCode::OK, data)
}

fn empty_ok() -> Response<Body> {
    let mut resp = Response::new(Body::empty());
    *resp.status_mut() = StatusCode::OK;
    resp
}

fn json_response(status: StatusCode, data: Bytes) -> Response<Body> {
    let mut resp = Response::new(Body::from(data));
    *resp.status_mut() = status;
    resp.headers_mut().insert(header::CONTENT_TYPE, header::HeaderValue::from_static("application/json"));
    resp
}

/// Render `e` as a JSON `Status` whose code matches the HTTP status line.
pub fn status_response(e: &ApiError) -> Response<Body> {
    let status = e.status();
    let code = StatusCode::from_u16(status.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    match serde_json::to_vec(&status) {
        Ok(body) => json_response(code, Bytes::from(body)),
        Err(err) => {
            error!(error = %err, "encoding status failed");
            let mut resp = Response::new(Body::from(status.message));
            *resp.status_mut() = code;
            resp
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_collection_and_item_paths() {
        assert_eq!(ObjectPath::parse("/custom/widgets/v1").unwrap(), ObjectPath {
            schema: "widgets".into(),
            version: "v1".into(),
            name: None,
        });
        assert_eq!(ObjectPath::parse("/custom/widgets/v1/w1").unwrap().name.as_deref(), Some("w1"));
    }

    #[test]
    fn rejects_bad_shapes() {
        for p in ["/custom/widgets", "/custom", "/custom/a/b/c/d", "/", "/custom/widgets/v1/"] {
            let err = ObjectPath::parse(p).unwrap_err();
            assert_eq!(err.code(), 400, "path {}", p);
        }
        let err = ObjectPath::parse("/other/widgets/v1").unwrap_err();
        assert_eq!(err.to_string(), "Invalid prefix: other");
    }
}
