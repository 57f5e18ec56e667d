//! Network Module
//!
//! TCP server and client handling.
//!
//! ## Architecture
//! - Single acceptor thread polling a non-blocking listener
//! - One thread per connection, capped by `max_connections`
//! - Queue commands routed through the QueueRegistry, health commands
//!   through the HealthMonitor

mod server;
mod connection;
mod client;

pub use server::Server;
pub use connection::Connection;
pub use client::{Client, RemoteItem, RemoteWatch};
