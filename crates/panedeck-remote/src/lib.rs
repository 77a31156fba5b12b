#![deny(clippy::all)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

//! Remote access to a single terminal per authenticated WebSocket.
//!
//! [`RemoteGateway`] is the transport-free state machine: capacity gate,
//! token authentication and the per-socket terminal lifecycle. The axum
//! server in [`server`] only moves frames between sockets and the gateway.
//! Remote terminals live in the gateway's own pool and are never visible
//! to the local session manager.

mod config;
mod edition;
mod error;
mod gateway;
mod protocol;
pub mod server;
mod token;

pub use config::RemoteConfig;
pub use edition::ConnectionLimit;
pub use edition::EditionPolicy;
pub use edition::StaticEdition;
pub use error::GatewayError;
pub use error::RemoteServerError;
pub use gateway::CloseReason;
pub use gateway::GatewayConfig;
pub use gateway::Outbound;
pub use gateway::Outbox;
pub use gateway::RemoteGateway;
pub use gateway::RotationPolicy;
pub use gateway::SocketId;
pub use protocol::ClientMessage;
pub use protocol::ProtocolError;
pub use protocol::ServerMessage;
pub use server::RemoteServerHandle;
pub use server::start_remote_server;
pub use token::AccessTokenStore;
pub use token::TOKEN_HEX_LEN;
