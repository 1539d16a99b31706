//! Network Module
//!
//! TCP/TLS server, client, and connection handling.
//!
//! ## Architecture
//! - Single accept loop, bounded by `max_connections`
//! - One task per connection (plus a reader task feeding it commands)
//! - Commands routed through [`LogService`](crate::service::LogService)
//! - Shutdown broadcast over a watch channel to every connection

mod server;
mod connection;
mod client;
pub mod tls;

pub use server::{Server, ServerHandle};
pub use connection::Connection;
pub use client::{ConsumeStream, LogClient, ProduceStream};
