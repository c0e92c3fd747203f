// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::web::ServerConfig;

#[derive(Parser)]
#[command(name = "extension-gatekeeper")]
#[command(about = "Filter uploads against a server-persisted extension blocklist")]
pub struct Cli {
    #[arg(long, global = true, help = "Enable debug logging")]
    pub debug: bool,

    #[arg(long, global = true, help = "Enable OpenTelemetry logging export")]
    pub enable_otel_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the blocklist and upload server
    Serve(ServeArgs),

    /// Check which files the current blocklist lets through
    Check {
        #[command(flatten)]
        remote: RemoteArgs,

        #[arg(required = true, value_name = "FILE")]
        files: Vec<PathBuf>,
    },

    /// Inspect or change the blocklist on a running server
    Block {
        #[command(flatten)]
        remote: RemoteArgs,

        #[command(subcommand)]
        action: BlockAction,
    },
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum BlockAction {
    /// Show fixed and custom extensions
    List,
    /// Add a custom extension
    Add { ext: String },
    /// Remove a custom extension
    Remove { ext: String },
    /// Turn a fixed extension on, or off with --off
    Fixed {
        ext: String,
        #[arg(long, help = "Unblock instead of block")]
        off: bool,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    #[arg(long, default_value = "127.0.0.1:5420", help = "Address to listen on")]
    pub listen: String,

    #[arg(
        long,
        default_value = "data",
        value_name = "DIR",
        help = "Directory uploads are stored in"
    )]
    pub upload_dir: PathBuf,

    #[arg(
        long,
        default_value = "block_config.json",
        value_name = "FILE",
        help = "JSON file the blocklist is persisted to"
    )]
    pub block_config: PathBuf,
}

impl ServeArgs {
    pub fn validate(&self) -> Result<(), String> {
        if self.upload_dir.exists() && !self.upload_dir.is_dir() {
            return Err(format!(
                "Upload path '{}' is not a directory",
                self.upload_dir.display()
            ));
        }

        if self.block_config.is_dir() {
            return Err(format!(
                "Blocklist config '{}' is a directory",
                self.block_config.display()
            ));
        }

        Ok(())
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            listen: self.listen.clone(),
            upload_dir: self.upload_dir.clone(),
            block_config: self.block_config.clone(),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct RemoteArgs {
    #[arg(
        long,
        default_value = "http://127.0.0.1:5420",
        value_name = "URL",
        help = "Base URL of the blocklist server"
    )]
    pub server: String,

    #[arg(long, default_value_t = 10, help = "Per-request timeout in seconds")]
    pub timeout_secs: u64,
}

impl RemoteArgs {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Cli {
    pub fn parse() -> Self {
        Parser::parse()
    }
}
