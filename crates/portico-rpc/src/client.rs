// crates/portico-rpc/src/client.rs
//
// Thin unary gRPC client over a tonic Channel. Used by the gateway to reach
// the RPC server over loopback, and by the CLI and integration tests.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use bytes::Bytes;
use http::uri::PathAndQuery;
use prost::Message;
use tonic::client::Grpc;
use tonic::metadata::MetadataMap;
use tonic::transport::{Channel, Endpoint};
use tonic::Status;

use crate::codec::RawCodec;
use crate::descriptor::MethodDescriptor;
use crate::error::RpcError;

/// Connected unary RPC client. Cheap to clone; clones share the connection.
#[derive(Debug, Clone)]
pub struct RpcClient {
    channel: Channel,
    endpoint: String,
}

impl RpcClient {
    /// Dial `endpoint` (`host:port` or an `http://` URI), failing if the
    /// connection is not established within `timeout`.
    pub async fn connect(endpoint: &str, timeout: Duration) -> Result<Self, RpcError> {
        let uri = dial_uri(endpoint);
        let connect_err = |reason: String| RpcError::Connect {
            endpoint: uri.clone(),
            reason,
        };

        let channel = Endpoint::from_shared(uri.clone())
            .map_err(|e| connect_err(e.to_string()))?
            .connect_timeout(timeout)
            .connect()
            .await
            .map_err(|e| connect_err(e.to_string()))?;

        tracing::debug!("Connected RPC client to {}", uri);
        Ok(Self {
            channel,
            endpoint: uri,
        })
    }

    /// The URI this client dialed.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Issue a unary call with an already-encoded request.
    pub async fn call_raw(&self, path: &str, message: Bytes, metadata: MetadataMap) -> Result<Bytes, Status> {
        let path: PathAndQuery = path
            .parse()
            .map_err(|_| Status::internal(format!("invalid method path {}", path)))?;

        let mut grpc = Grpc::new(self.channel.clone());
        grpc.ready()
            .await
            .map_err(|e| Status::unavailable(format!("rpc endpoint not ready: {}", e)))?;

        let mut request = tonic::Request::new(message);
        *request.metadata_mut() = metadata;
        let response = grpc.unary(request, path, RawCodec).await?;
        Ok(response.into_inner())
    }

    /// Issue a typed unary call to the method described by `descriptor`.
    pub async fn call<Req, Resp>(&self, descriptor: &MethodDescriptor, request: Req) -> Result<Resp, Status>
    where
        Req: Message,
        Resp: Message + Default,
    {
        let encoded = Bytes::from(request.encode_to_vec());
        let reply = self.call_raw(&descriptor.path(), encoded, MetadataMap::new()).await?;
        Resp::decode(reply).map_err(|e| Status::internal(format!("malformed response message: {}", e)))
    }
}

/// Build the URI to dial for a listen address. Unspecified hosts (`0.0.0.0`,
/// `::`) are not dialable and become loopback of the same family.
pub fn dial_uri(endpoint: &str) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        return endpoint.to_string();
    }
    match endpoint.parse::<SocketAddr>() {
        Ok(addr) => format!("http://{}", dialable(addr)),
        Err(_) => format!("http://{}", endpoint),
    }
}

fn dialable(mut addr: SocketAddr) -> SocketAddr {
    if addr.ip().is_unspecified() {
        let loopback = match addr.ip() {
            IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
            IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::LOCALHOST),
        };
        addr.set_ip(loopback);
    }
    addr
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unspecified_hosts_dial_loopback() {
        assert_eq!(dial_uri("0.0.0.0:9090"), "http://127.0.0.1:9090");
        assert_eq!(dial_uri("[::]:9090"), "http://[::1]:9090");
    }

    #[test]
    fn concrete_hosts_are_kept() {
        assert_eq!(dial_uri("10.1.2.3:9090"), "http://10.1.2.3:9090");
        assert_eq!(dial_uri("rpc.internal:9090"), "http://rpc.internal:9090");
        assert_eq!(dial_uri("http://127.0.0.1:1"), "http://127.0.0.1:1");
    }

    #[tokio::test]
    async fn connect_to_closed_port_fails() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = RpcClient::connect(&addr.to_string(), Duration::from_millis(500))
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::Connect { .. }));
    }
}
