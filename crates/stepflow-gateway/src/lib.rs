mod connection;
mod protocol;
mod routes;
mod server;
mod state;

pub use protocol::{ApiError, ErrorPayload, RunRequest, RunResponse};
pub use server::GatewayServer;
