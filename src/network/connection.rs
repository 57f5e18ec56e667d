//! Connection Handler
//!
//! Handles individual client connections.

use std::io::{self, BufReader, BufWriter};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{QueueError, Result};
use crate::health::HealthMonitor;
use crate::protocol::{read_command, write_response, Command, Reply, Response};
use crate::registry::QueueRegistry;

/// Handles a single client connection
pub struct Connection {
    /// TCP stream reader (buffered for efficiency)
    reader: BufReader<TcpStream>,

    /// TCP stream writer (buffered for efficiency)
    writer: BufWriter<TcpStream>,

    /// Queues served by this process
    registry: Arc<QueueRegistry>,

    /// Liveness state for Check / Watch
    health: Arc<HealthMonitor>,

    /// Peer address for logging
    peer_addr: String,
}

impl Connection {
    /// Create a new connection handler
    ///
    /// Sets up buffered I/O and disables Nagle's algorithm
    pub fn new(stream: TcpStream, registry: Arc<QueueRegistry>, health: Arc<HealthMonitor>) -> Result<Self> {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        stream.set_nodelay(true)?;

        let read_stream = stream.try_clone()?;

        Ok(Self {
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(stream),
            registry,
            health,
            peer_addr,
        })
    }

    /// Configure connection timeouts (0 = no timeout)
    pub fn set_timeouts(&mut self, read_ms: u64, write_ms: u64) -> Result<()> {
        if read_ms > 0 {
            self.reader
                .get_ref()
                .set_read_timeout(Some(Duration::from_millis(read_ms)))?;
        }
        if write_ms > 0 {
            self.writer
                .get_ref()
                .set_write_timeout(Some(Duration::from_millis(write_ms)))?;
        }

        Ok(())
    }

    /// Handle the connection (blocking until closed)
    ///
    /// Reads commands in a loop and sends responses. A Watch turns the
    /// connection into a one-way status stream for the rest of its life.
    pub fn handle(&mut self) -> Result<()> {
        tracing::debug!("Connection established from {}", self.peer_addr);

        loop {
            let command = match read_command(&mut self.reader) {
                Ok(cmd) => cmd,
                Err(QueueError::Io(ref e)) if is_disconnect(e) => {
                    tracing::debug!("Client {} disconnected", self.peer_addr);
                    return Ok(());
                }
                Err(QueueError::Io(ref e))
                    if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) =>
                {
                    tracing::debug!("Read timeout for client {}", self.peer_addr);
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!("Error reading from {}: {}", self.peer_addr, e);
                    let _ = self.send_response(Response::from_error(&e));
                    return Err(e);
                }
            };

            tracing::trace!("Received command from {}: {:?}", self.peer_addr, command.command_type());

            if command == Command::Watch {
                return self.stream_health();
            }

            let response = self.execute_command(command);

            if let Err(e) = self.send_response(response) {
                return self.write_failed(e);
            }
        }
    }

    /// Execute a command and return a response
    fn execute_command(&self, command: Command) -> Response {
        let result = match command {
            Command::Check => Ok(Reply::Health {
                status: self.health.check(),
            }),
            other => self.registry.execute(other),
        };

        match result {
            Ok(reply) => Response::ok(&reply),
            Err(e) => {
                tracing::debug!("Request from {} failed: {}", self.peer_addr, e);
                Response::from_error(&e)
            }
        }
    }

    /// Push every status the monitor publishes until the client goes away
    /// or the monitor stops
    fn stream_health(&mut self) -> Result<()> {
        let stream = self.health.watch();
        tracing::debug!("Client {} watching health (watcher {})", self.peer_addr, stream.id());

        for status in stream {
            if let Err(e) = self.send_response(Response::ok(&Reply::Health { status })) {
                return self.write_failed(e);
            }
        }

        tracing::debug!("Health stream for {} ended", self.peer_addr);
        Ok(())
    }

    /// Send a response to the client
    fn send_response(&mut self, response: Response) -> Result<()> {
        write_response(&mut self.writer, &response)
    }

    /// A client that hung up before reading its response is not a server error
    fn write_failed(&self, e: QueueError) -> Result<()> {
        if let QueueError::Io(ref io_err) = e {
            if is_disconnect(io_err) || io_err.kind() == io::ErrorKind::BrokenPipe {
                tracing::debug!(
                    "Client {} disconnected before response could be sent: {}",
                    self.peer_addr,
                    e
                );
                return Ok(());
            }
        }
        tracing::warn!("Error writing to {}: {}", self.peer_addr, e);
        Err(e)
    }

    /// Get the peer address string
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }
}

fn is_disconnect(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::UnexpectedEof | io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted
    )
}
