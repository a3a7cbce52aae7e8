use serde::de::DeserializeOwned;
use serde::Serialize;

use super::error::{Result, RpcError};

/// JSON marshalling of nameserver request and response bodies.
///
/// # Example
///
/// ```
/// use httprpc_common::protocol::{FindServiceRequest, JsonCodec};
///
/// let req = FindServiceRequest { service_path: "/orders".to_string() };
/// let bytes = JsonCodec::encode(&req).unwrap();
/// assert_eq!(bytes, br#"{"service_path":"/orders"}"#);
/// ```
pub struct JsonCodec;

impl JsonCodec {
    pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(RpcError::from)
    }

    /// Decodes `data`, reporting the offending body in the error so that a
    /// misbehaving nameserver shows up in logs.
    pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
        serde_json::from_slice(data).map_err(|e| {
            RpcError::Marshal(format!(
                "{} in body {:?}",
                e,
                String::from_utf8_lossy(data)
            ))
        })
    }
}
