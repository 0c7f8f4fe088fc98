// crates/portico-cli/src/main.rs
//
// CLI entrypoint for the Portico operator tools.
//
// Talks to a running portico-daemon over RPC (default) or through the REST
// gateway, and prints results as tables or JSON.

mod client;
mod commands;
mod output;

use clap::{Parser, Subcommand};
use commands::user::UserCmd;
use output::OutputFormat;

/// Portico CLI: call the platform API on a running daemon.
#[derive(Parser, Debug)]
#[command(name = "portico", version = "0.1.0", about = "Portico front door CLI")]
struct Cli {
    /// RPC endpoint of the daemon.
    #[arg(long, global = true, default_value = "http://127.0.0.1:9090")]
    rpc: String,

    /// REST gateway base URL, including the route prefix.
    #[arg(long, global = true, default_value = "http://127.0.0.1:8080/api/v1")]
    http: String,

    /// Print raw JSON instead of tables.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Check that the daemon answers.
    Ping {
        /// Go through the REST gateway instead of RPC.
        #[arg(long)]
        rest: bool,
    },

    /// User management: create, get, delete.
    #[command(subcommand)]
    User(UserCmd),

    /// List the services and methods the daemon exposes.
    Services,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Table
    };

    match &cli.command {
        Commands::Ping { rest } => {
            let target = if *rest { &cli.http } else { &cli.rpc };
            commands::ping::run(target, *rest, &format).await?
        }
        Commands::User(cmd) => commands::user::run(&cli.rpc, cmd, &format).await?,
        Commands::Services => commands::services::run(&cli.rpc, &format).await?,
    }

    Ok(())
}
