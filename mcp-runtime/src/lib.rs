//! MCP runtime exposing Kibana Security detection rules, exception lists,
//! alerts, cases, endpoint response actions, and saved objects as tools.

use std::sync::Arc;

use clap::{Args, Subcommand};

pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod harness;
pub mod resolver;
pub mod server;
pub mod tools;

#[cfg(test)]
mod testing;

pub use config::{Auth, ConfigError, ConnectionSettings, GatewayConfig};
pub use engine::{AssociationEngine, AssociationOutcome, AssociationRequest, ItemsAdded};
pub use error::{ResourceKind, Step, ToolError};
pub use gateway::{
    ApiRequest, ApiResponse, BackendGateway, FileUpload, GatewayError, HttpGateway,
};
pub use harness::{FailureKind, SharedGateway, ToolResult};
pub use resolver::{ResolutionError, ResolvedRule, Resolver, ResourceRef};
pub use server::McpServer;

#[derive(Subcommand)]
pub enum McpCommands {
    /// Run the Kibana Security MCP server over stdio
    Serve(McpServeArgs),
}

#[derive(Args, Clone, Debug)]
pub struct McpServeArgs {
    #[command(flatten)]
    pub connection: ConnectionSettings,
}

pub async fn run(command: McpCommands) -> i32 {
    match command {
        McpCommands::Serve(args) => {
            let gateway = match GatewayConfig::from_settings(&args.connection)
                .and_then(HttpGateway::new)
            {
                Ok(gateway) => gateway,
                Err(err) => {
                    tracing::error!(error = %err, "invalid Kibana configuration");
                    eprintln!("{}", server::error_payload("config_error", &err.to_string()));
                    return 1;
                }
            };

            let gateway: SharedGateway = Arc::new(gateway);
            let mcp = McpServer::new(Some(gateway));
            match mcp.serve_stdio().await {
                Ok(()) => 0,
                Err(err) => {
                    eprintln!("{}", server::error_payload("mcp_server_error", &err));
                    1
                }
            }
        }
    }
}
