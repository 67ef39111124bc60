//! # Rolodex Gateway
//!
//! Multi-tenant HTTP gateway with a JSON-RPC protocol: account signup and
//! signin, stateless session tokens, and ownership-scoped company records.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Authentication and authorization.
pub mod auth;
/// Company records and ownership-scoped storage.
pub mod companies;
mod middleware;
/// JSON-RPC protocol types and constants.
pub mod rpc;
mod server;

pub use auth::{AuthConfig, AuthError, AuthState, Identity, PublicUser, Role, User, UserStore};
pub use companies::{Company, CompanyStore, OwnerAction, authorize_owner};
pub use middleware::GatewayRateLimiter;
pub use rpc::{RpcError, RpcRequest, RpcResponse};
pub use server::{Gateway, GatewayConfig, GatewayState};

/// Start the gateway server.
///
/// # Errors
///
/// Returns error if server fails to start.
pub async fn start(config: GatewayConfig) -> Result<(), GatewayError> {
    let gateway = Gateway::new(config)?;
    gateway.run().await
}

/// Gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Server error.
    #[error("Server error: {0}")]
    Server(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
