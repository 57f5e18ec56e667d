//! TCP Server
//!
//! Accepts connections and runs each one on its own thread.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::config::Config;
use crate::error::{QueueError, Result};
use crate::health::HealthMonitor;
use crate::registry::QueueRegistry;

use super::Connection;

/// How long the accept loop sleeps when no client is waiting
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// TCP server for SPQueue
///
/// The listener is non-blocking so the accept loop can observe the shutdown
/// flag between polls.
pub struct Server {
    config: Config,
    registry: Arc<QueueRegistry>,
    health: Arc<HealthMonitor>,
    listener: TcpListener,
    shutdown: AtomicBool,
    active: Arc<AtomicUsize>,
}

impl Server {
    /// Bind the configured listen address
    pub fn bind(config: Config, registry: Arc<QueueRegistry>, health: Arc<HealthMonitor>) -> Result<Self> {
        let listener = TcpListener::bind(&config.listen_addr).map_err(|e| {
            QueueError::Network(format!("failed to bind {}: {}", config.listen_addr, e))
        })?;
        listener.set_nonblocking(true)?;

        tracing::info!("Server listening on {}", listener.local_addr()?);

        Ok(Self {
            config,
            registry,
            health,
            listener,
            shutdown: AtomicBool::new(false),
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` is called (blocking)
    ///
    /// On exit the health status turns NotServing and every loaded durable
    /// queue is checkpointed.
    pub fn run(&self) -> Result<()> {
        while !self.shutdown.load(Ordering::Acquire) {
            match self.listener.accept() {
                Ok((stream, addr)) => self.dispatch(stream, addr),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    tracing::error!("Accept failed: {}", e);
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
            }
        }

        tracing::info!(
            "Server shutting down with {} open connection(s)",
            self.active_connections()
        );

        self.health.stop();
        self.registry.close()
    }

    /// Signal the server to shutdown gracefully
    pub fn shutdown(&self) {
        if !self.shutdown.swap(true, Ordering::AcqRel) {
            self.health.set_status(crate::health::ServingStatus::NotServing);
        }
    }

    /// Number of connections currently being served
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    fn dispatch(&self, stream: TcpStream, addr: SocketAddr) {
        if self.active.load(Ordering::Acquire) >= self.config.max_connections {
            tracing::warn!(
                "Rejecting {}: connection limit {} reached",
                addr,
                self.config.max_connections
            );
            return;
        }

        // Accepted sockets inherit non-blocking mode on some platforms
        if let Err(e) = stream.set_nonblocking(false) {
            tracing::warn!("Failed to configure connection from {}: {}", addr, e);
            return;
        }

        let mut connection = match Connection::new(stream, Arc::clone(&self.registry), Arc::clone(&self.health)) {
            Ok(connection) => connection,
            Err(e) => {
                tracing::warn!("Failed to set up connection from {}: {}", addr, e);
                return;
            }
        };

        if let Err(e) = connection.set_timeouts(self.config.read_timeout_ms, self.config.write_timeout_ms) {
            tracing::warn!("Failed to set timeouts for {}: {}", addr, e);
            return;
        }

        let active = Arc::clone(&self.active);
        active.fetch_add(1, Ordering::AcqRel);

        let spawned = thread::Builder::new()
            .name(format!("conn-{}", addr))
            .spawn(move || {
                if let Err(e) = connection.handle() {
                    tracing::debug!("Connection {} closed with error: {}", connection.peer_addr(), e);
                }
                active.fetch_sub(1, Ordering::AcqRel);
            });

        if let Err(e) = spawned {
            tracing::error!("Failed to spawn handler for {}: {}", addr, e);
            self.active.fetch_sub(1, Ordering::AcqRel);
        }
    }
}
