// crates/portico-cli/src/client.rs
//
// Connections to the daemon: RPC via `RpcClient`, REST via reqwest against
// the gateway.

use std::time::Duration;

use serde::de::DeserializeOwned;
use thiserror::Error;

use portico_rpc::{RpcClient, RpcError, Status};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Connect(#[from] RpcError),

    #[error("{:?}: {}", .0.code(), .0.message())]
    Rpc(#[from] Status),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Rest { status: u16, body: String },

    #[error("Response missing field '{0}'")]
    MissingField(&'static str),
}

/// Dial the daemon's RPC endpoint.
pub async fn connect(endpoint: &str) -> Result<RpcClient, CliError> {
    Ok(RpcClient::connect(endpoint, CONNECT_TIMEOUT).await?)
}

/// GET `{base}{path}` on the gateway and decode the JSON body. Non-2xx
/// responses surface the gateway's error body verbatim.
pub async fn rest_get<T: DeserializeOwned>(base: &str, path: &str) -> Result<T, CliError> {
    let url = format!("{}{}", base.trim_end_matches('/'), path);
    let response = reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()?
        .get(url)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(CliError::Rest {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response.json().await?)
}
