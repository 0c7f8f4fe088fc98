// crates/portico-cli/src/commands/ping.rs
//
// `portico ping [--rest]`: liveness check against the daemon.

use portico_rpc::handlers::platform::{self, PingRequest, PingResponse};

use crate::client;
use crate::output::{format_json, OutputFormat};

/// Run the ping command against `target`, an RPC endpoint or, with `rest`,
/// the gateway base URL.
pub async fn run(target: &str, rest: bool, format: &OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let response: PingResponse = if rest {
        client::rest_get(target, "/ping").await?
    } else {
        let rpc = client::connect(target).await?;
        rpc.call(&platform::PING, PingRequest {}).await?
    };

    match format {
        OutputFormat::Json => println!("{}", format_json(&response)),
        OutputFormat::Table => println!("{} ({})", response.message, target),
    }
    Ok(())
}
