// crates/portico-cli/src/commands/mod.rs
//
// Command module declarations for the Portico CLI.

pub mod ping;
pub mod services;
pub mod user;
