//! Gateway for Pinlog
//!
//! Routes channel events to the aggregation engine and serves the HTTP API.

mod command;
mod handler;
mod server;

pub use command::Command;
pub use handler::ApiHandler;
pub use server::{Gateway, GatewayBuilder, GatewayState, GatewayStatus};
