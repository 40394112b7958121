//! HTTP and WebSocket transport for the response resumer.

pub mod frames;
pub mod generator;
pub mod middleware;
pub mod server;
pub mod ws_record;
pub mod ws_replay;

pub use generator::{EchoGenerator, ResponseGenerator, TokenStream};
pub use middleware::AuthConfig;
pub use server::{AppState, GatewayServer};
