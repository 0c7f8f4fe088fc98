// crates/portico-cli/src/commands/services.rs
//
// `portico services`: list registered services via the reflection service.

use tabled::Tabled;

use portico_rpc::reflection::{self, ListServicesRequest, ListServicesResponse};

use crate::client;
use crate::output::{format_json, format_table, OutputFormat};

/// One method as a table row.
#[derive(Debug, Tabled)]
struct MethodRow {
    #[tabled(rename = "Service")]
    service: String,
    #[tabled(rename = "Method")]
    method: String,
    #[tabled(rename = "Input")]
    input: String,
    #[tabled(rename = "Output")]
    output: String,
    #[tabled(rename = "REST")]
    rest: String,
}

fn rows(listing: &ListServicesResponse) -> Vec<MethodRow> {
    listing
        .services
        .iter()
        .flat_map(|service| {
            service.methods.iter().map(move |m| MethodRow {
                service: service.name.clone(),
                method: m.name.clone(),
                input: m.input_type.clone(),
                output: m.output_type.clone(),
                rest: if m.http_method.is_empty() {
                    "-".to_string()
                } else {
                    format!("{} {}", m.http_method, m.http_path)
                },
            })
        })
        .collect()
}

/// Run the services command.
pub async fn run(endpoint: &str, format: &OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let rpc = client::connect(endpoint).await?;
    let listing: ListServicesResponse = rpc
        .call(&reflection::LIST_SERVICES, ListServicesRequest {})
        .await?;

    match format {
        OutputFormat::Json => println!("{}", format_json(&listing)),
        OutputFormat::Table => {
            println!("{}", format_table(&rows(&listing)));
            println!("{} services", listing.services.len());
        }
    }
    Ok(())
}
