//! Blocking Client
//!
//! One TCP connection, one request in flight at a time.

use std::io::{BufReader, BufWriter, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use bytes::Bytes;

use crate::error::{QueueError, Result};
use crate::health::ServingStatus;
use crate::index::Feature;
use crate::protocol::{encode_add_item, read_response, write_command, Command, Reply};
use crate::queue::QueueType;

/// Result of a remote Dequeue or Peek
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteItem {
    pub has_item: bool,
    pub item: Bytes,
    pub size: u64,
}

/// Client for an SPQueue server
pub struct Client {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
}

impl Client {
    /// Connect to a server
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .map_err(|e| QueueError::Network(format!("connect failed: {}", e)))?;
        stream.set_nodelay(true)?;

        let read_stream = stream.try_clone()?;

        Ok(Self {
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(stream),
        })
    }

    /// Bound every read and write on this connection
    pub fn set_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        self.reader.get_ref().set_read_timeout(timeout)?;
        self.writer.get_ref().set_write_timeout(timeout)?;
        Ok(())
    }

    /// Send a command and wait for its reply
    pub fn call(&mut self, command: &Command) -> Result<Reply> {
        write_command(&mut self.writer, command)?;
        read_response(&mut self.reader)?.into_reply()
    }

    pub fn create_queue<I, S>(&mut self, name: &str, queue_type: QueueType, features: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        match self.call(&Command::create_queue(name, queue_type, features))? {
            Reply::QueueCreated { name } => Ok(name),
            other => Err(unexpected("CreateQueue", &other)),
        }
    }

    /// Enqueue an item; returns the queue size
    pub fn enqueue(&mut self, queue_name: &str, item: impl Into<Bytes>, features: Vec<Feature>) -> Result<u64> {
        match self.call(&Command::enqueue(queue_name, item, features))? {
            Reply::Size { size } => Ok(size),
            other => Err(unexpected("Enqueue", &other)),
        }
    }

    pub fn dequeue(&mut self, queue_name: &str) -> Result<RemoteItem> {
        let reply = self.call(&Command::dequeue(queue_name))?;
        into_item("Dequeue", reply)
    }

    pub fn peek(&mut self, queue_name: &str) -> Result<RemoteItem> {
        let reply = self.call(&Command::peek(queue_name))?;
        into_item("Peek", reply)
    }

    pub fn get_size(&mut self, queue_name: &str) -> Result<u64> {
        match self.call(&Command::get_size(queue_name))? {
            Reply::Size { size } => Ok(size),
            other => Err(unexpected("GetSize", &other)),
        }
    }

    pub fn get_epoch(&mut self, queue_name: &str) -> Result<u64> {
        match self.call(&Command::get_epoch(queue_name))? {
            Reply::Epoch { epoch } => Ok(epoch),
            other => Err(unexpected("GetEpoch", &other)),
        }
    }

    pub fn check(&mut self) -> Result<ServingStatus> {
        match self.call(&Command::Check)? {
            Reply::Health { status } => Ok(status),
            other => Err(unexpected("Check", &other)),
        }
    }

    /// Legacy AddItem on the default queue
    pub fn add_item(&mut self, item: &[u8], features: Vec<Feature>) -> Result<u64> {
        let frame = encode_add_item(item, features)?;
        self.writer.write_all(&frame)?;
        self.writer.flush()?;

        match read_response(&mut self.reader)?.into_reply()? {
            Reply::Size { size } => Ok(size),
            other => Err(unexpected("AddItem", &other)),
        }
    }

    /// Turn this connection into a health stream
    ///
    /// Dropping the returned stream closes the connection, which ends the
    /// server-side subscription.
    pub fn watch(mut self) -> Result<RemoteWatch> {
        write_command(&mut self.writer, &Command::Watch)?;
        Ok(RemoteWatch {
            client: self,
            done: false,
        })
    }
}

/// Health statuses streamed by the server
///
/// Ends after the server closes the stream or the first error.
pub struct RemoteWatch {
    client: Client,
    done: bool,
}

impl Iterator for RemoteWatch {
    type Item = Result<ServingStatus>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let reply = match read_response(&mut self.client.reader) {
            Ok(response) => response.into_reply(),
            Err(QueueError::Io(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                self.done = true;
                return None;
            }
            Err(e) => Err(e),
        };
        self.done = reply.is_err();

        Some(reply.and_then(|reply| match reply {
            Reply::Health { status } => Ok(status),
            other => Err(unexpected("Watch", &other)),
        }))
    }
}

fn into_item(method: &str, reply: Reply) -> Result<RemoteItem> {
    match reply {
        Reply::Item { has_item, item, size } => Ok(RemoteItem { has_item, item, size }),
        other => Err(unexpected(method, &other)),
    }
}

fn unexpected(method: &str, reply: &Reply) -> QueueError {
    QueueError::Protocol(format!("unexpected reply to {}: {:?}", method, reply))
}
