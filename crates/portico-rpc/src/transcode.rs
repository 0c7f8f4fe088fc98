// crates/portico-rpc/src/transcode.rs
//
// REST mapping declarations consumed by the gateway.
//
// A RestMapping pairs a method descriptor (which must carry an HTTP binding)
// with a typed transcoder: JSON object -> request message -> RPC call ->
// response message -> JSON value. Messages used this way derive both
// `prost::Message` and serde.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use prost::Message;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tonic::Status;

use crate::client::RpcClient;
use crate::descriptor::{HttpRule, MethodDescriptor};

/// Failure while transcoding one REST request.
#[derive(Debug, Error)]
pub enum TranscodeError {
    /// The merged JSON did not fit the request message.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The RPC call itself failed.
    #[error("rpc error: {}", .0.message())]
    Rpc(Status),

    /// The response message could not be rendered as JSON.
    #[error("failed to encode response: {0}")]
    Encode(String),
}

type JsonCall = Arc<dyn Fn(RpcClient, Value) -> BoxFuture<'static, Result<Value, TranscodeError>> + Send + Sync>;

/// A REST-exposed RPC method.
#[derive(Clone)]
pub struct RestMapping {
    descriptor: MethodDescriptor,
    call: JsonCall,
}

impl RestMapping {
    /// Declare a unary mapping with request type `Req` and response type `Resp`.
    pub fn unary<Req, Resp>(descriptor: MethodDescriptor) -> Self
    where
        Req: Message + DeserializeOwned + 'static,
        Resp: Message + Default + Serialize + 'static,
    {
        let call: JsonCall = Arc::new(move |client: RpcClient, body: Value| {
            Box::pin(async move {
                let request: Req =
                    serde_json::from_value(body).map_err(|e| TranscodeError::InvalidRequest(e.to_string()))?;
                let response: Resp = client.call(&descriptor, request).await.map_err(TranscodeError::Rpc)?;
                serde_json::to_value(&response).map_err(|e| TranscodeError::Encode(e.to_string()))
            }) as BoxFuture<'static, Result<Value, TranscodeError>>
        });
        Self { descriptor, call }
    }

    pub fn descriptor(&self) -> &MethodDescriptor {
        &self.descriptor
    }

    pub fn http(&self) -> Option<&HttpRule> {
        self.descriptor.http.as_ref()
    }

    /// Transcode `body` into a call on `client` and return the JSON response.
    pub async fn invoke(&self, client: RpcClient, body: Value) -> Result<Value, TranscodeError> {
        (self.call)(client, body).await
    }
}

impl fmt::Debug for RestMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestMapping")
            .field("method", &self.descriptor.path())
            .field("http", &self.descriptor.http)
            .finish()
    }
}

/// Deserializers that accept numbers written as JSON strings. Path and query
/// parameters always arrive as strings, and proto3 JSON writes 64-bit
/// integers as strings too.
pub mod lenient {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(u64),
        Text(String),
    }

    pub fn u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        match NumberOrString::deserialize(deserializer)? {
            NumberOrString::Number(n) => Ok(n),
            NumberOrString::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| serde::de::Error::custom(format!("expected an unsigned integer, got '{}'", s))),
        }
    }
}
