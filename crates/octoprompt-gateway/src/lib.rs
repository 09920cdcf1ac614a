//! # Octoprompt Gateway
//!
//! The embedded HTTP control API: status, schedule listing, history,
//! manual triggering, enable/disable patching, and the signed bridge-event
//! relay. A deliberately framework-free HTTP/1.1 server — one port, one
//! request per connection, JSON everywhere.

pub mod bridge;
pub mod http;
pub mod server;

pub use server::{GatewayState, HttpServer};
