// crates/portico-cli/src/commands/user.rs
//
// `portico user {create, get, delete}`: user management over RPC.

use clap::Subcommand;

use portico_rpc::handlers::platform::{
    self, CreateUserRequest, CreateUserResponse, DeleteUserRequest, DeleteUserResponse, GetUserRequest,
    GetUserResponse, User,
};

use crate::client::{self, CliError};
use crate::output::{format_json, render_user, OutputFormat};

/// User management subcommands.
#[derive(Debug, Subcommand)]
pub enum UserCmd {
    /// Create a new user.
    Create {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
    },
    /// Get a user by id.
    Get {
        #[arg(long)]
        id: u64,
    },
    /// Soft-delete a user by id.
    Delete {
        #[arg(long)]
        id: u64,
    },
}

/// Run the user subcommand.
pub async fn run(endpoint: &str, cmd: &UserCmd, format: &OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let rpc = client::connect(endpoint).await?;

    match cmd {
        UserCmd::Create { username, email } => {
            let response: CreateUserResponse = rpc
                .call(
                    &platform::CREATE_USER,
                    CreateUserRequest {
                        username: username.clone(),
                        email: email.clone(),
                    },
                )
                .await?;
            println!("{}", render_user(required(&response.user)?, format));
        }
        UserCmd::Get { id } => {
            let response: GetUserResponse = rpc.call(&platform::GET_USER, GetUserRequest { id: *id }).await?;
            println!("{}", render_user(required(&response.user)?, format));
        }
        UserCmd::Delete { id } => {
            let response: DeleteUserResponse = rpc
                .call(&platform::DELETE_USER, DeleteUserRequest { id: *id })
                .await?;
            match format {
                OutputFormat::Json => println!("{}", format_json(&response)),
                OutputFormat::Table => println!("User {} deleted", id),
            }
        }
    }

    Ok(())
}

fn required(user: &Option<User>) -> Result<&User, CliError> {
    user.as_ref().ok_or(CliError::MissingField("user"))
}
