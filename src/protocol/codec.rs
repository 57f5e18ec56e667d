//! Protocol codec
//!
//! Encoding and decoding functions for the wire protocol.
//!
//! ## Wire Format
//!
//! ### Request (Command) Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │ Cmd (1)  │ Len (4)  │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! ### Payload by Command Type (bincode)
//! - CREATE_QUEUE: CreateQueueRequest
//! - ENQUEUE:      EnqueueRequest
//! - DEQUEUE, PEEK, GET_SIZE, GET_EPOCH: QueueRequest
//! - CHECK, WATCH, GET_NEXT_ITEM, PEEK_NEXT_ITEM: empty
//! - ADD_ITEM:     item + features (no queue name)
//!
//! ### Response Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │Status(1) │ Len (4)  │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```

use std::io::{Read, Write};

use serde::de::DeserializeOwned;

use crate::error::{QueueError, Result};
use super::command::AddItemRequest;
use super::{Command, CommandType, QueueRequest, Response, Status};

/// Header size: 1 byte command/status + 4 bytes length
pub const HEADER_SIZE: usize = 5;

/// Maximum payload size (16 MB)
pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

// =============================================================================
// Command Encoding/Decoding
// =============================================================================

/// Encode a command to bytes
///
/// Format: cmd_type (1) + payload_len (4) + payload
pub fn encode_command(command: &Command) -> Result<Vec<u8>> {
    let cmd_type = command.command_type() as u8;

    let payload = match command {
        Command::CreateQueue(request) => bincode::serialize(request)?,
        Command::Enqueue(request) => bincode::serialize(request)?,
        Command::Dequeue(request)
        | Command::Peek(request)
        | Command::GetSize(request)
        | Command::GetEpoch(request) => bincode::serialize(request)?,
        Command::Check | Command::Watch => Vec::new(),
    };

    if payload.len() > MAX_PAYLOAD_SIZE as usize {
        return Err(QueueError::Protocol(format!(
            "Payload too large: {} bytes (max {})",
            payload.len(),
            MAX_PAYLOAD_SIZE
        )));
    }

    Ok(frame(cmd_type, &payload))
}

/// Decode a command from bytes
pub fn decode_command(bytes: &[u8]) -> Result<Command> {
    let (cmd_type, payload) = split_frame(bytes, "command")?;

    match cmd_type {
        0x01 => Ok(Command::CreateQueue(decode_payload(payload, "CREATE_QUEUE")?)),
        0x02 => Ok(Command::Enqueue(decode_payload(payload, "ENQUEUE")?)),
        0x03 => Ok(Command::Dequeue(decode_payload(payload, "DEQUEUE")?)),
        0x04 => Ok(Command::Peek(decode_payload(payload, "PEEK")?)),
        0x05 => Ok(Command::GetSize(decode_payload(payload, "GET_SIZE")?)),
        0x06 => Ok(Command::GetEpoch(decode_payload(payload, "GET_EPOCH")?)),
        0x07 => expect_empty(payload, "CHECK").map(|_| Command::Check),
        0x08 => expect_empty(payload, "WATCH").map(|_| Command::Watch),
        0x11 => {
            let request: AddItemRequest = decode_payload(payload, "ADD_ITEM")?;
            Ok(Command::enqueue("", request.item, request.features))
        }
        0x12 => expect_empty(payload, "GET_NEXT_ITEM").map(|_| Command::Dequeue(default_queue())),
        0x13 => expect_empty(payload, "PEEK_NEXT_ITEM").map(|_| Command::Peek(default_queue())),
        _ => Err(QueueError::Protocol(format!(
            "Unknown command type: 0x{:02x}",
            cmd_type
        ))),
    }
}

/// Encode a legacy AddItem request (default queue)
pub fn encode_add_item(item: &[u8], features: Vec<crate::index::Feature>) -> Result<Vec<u8>> {
    let payload = bincode::serialize(&AddItemRequest {
        item: bytes::Bytes::copy_from_slice(item),
        features,
    })?;
    Ok(frame(CommandType::AddItem as u8, &payload))
}

fn default_queue() -> QueueRequest {
    QueueRequest {
        queue_name: String::new(),
    }
}

fn decode_payload<T: DeserializeOwned>(payload: &[u8], name: &str) -> Result<T> {
    bincode::deserialize(payload)
        .map_err(|e| QueueError::Protocol(format!("{} command: malformed payload: {}", name, e)))
}

fn expect_empty(payload: &[u8], name: &str) -> Result<()> {
    if !payload.is_empty() {
        return Err(QueueError::Protocol(format!(
            "{} command: unexpected payload of {} bytes",
            name,
            payload.len()
        )));
    }
    Ok(())
}

// =============================================================================
// Response Encoding/Decoding
// =============================================================================

/// Encode a response to bytes
///
/// Format: status (1) + payload_len (4) + payload
pub fn encode_response(response: &Response) -> Vec<u8> {
    let payload = response.payload.as_deref().unwrap_or(&[]);
    frame(response.status as u8, payload)
}

/// Decode a response from bytes
pub fn decode_response(bytes: &[u8]) -> Result<Response> {
    let (status_byte, payload) = split_frame(bytes, "response")?;

    let status = match status_byte {
        0x00 => Status::Ok,
        0x01 => Status::NotFound,
        0x02 => Status::InvalidArgument,
        0x03 => Status::Unavailable,
        0x04 => Status::Error,
        _ => {
            return Err(QueueError::Protocol(format!(
                "Unknown response status: 0x{:02x}",
                status_byte
            )))
        }
    };

    let payload = if payload.is_empty() {
        None
    } else {
        Some(payload.to_vec())
    };

    Ok(Response { status, payload })
}

// =============================================================================
// Framing
// =============================================================================

fn frame(kind: u8, payload: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(HEADER_SIZE + payload.len());
    message.push(kind);
    message.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    message.extend_from_slice(payload);
    message
}

/// Validate a frame and return its kind byte and payload
fn split_frame<'a>(bytes: &'a [u8], what: &str) -> Result<(u8, &'a [u8])> {
    if bytes.len() < HEADER_SIZE {
        return Err(QueueError::Protocol(format!(
            "Incomplete {} header: expected {} bytes, got {}",
            what,
            HEADER_SIZE,
            bytes.len()
        )));
    }

    let payload_len = u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]) as usize;

    if payload_len > MAX_PAYLOAD_SIZE as usize {
        return Err(QueueError::Protocol(format!(
            "{} payload too large: {} bytes (max {})",
            what, payload_len, MAX_PAYLOAD_SIZE
        )));
    }

    let total_len = HEADER_SIZE + payload_len;
    if bytes.len() < total_len {
        return Err(QueueError::Protocol(format!(
            "Incomplete {} payload: expected {} bytes, got {}",
            what,
            total_len,
            bytes.len()
        )));
    }

    Ok((bytes[0], &bytes[HEADER_SIZE..total_len]))
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Read one complete frame (header + payload) from a stream
fn read_frame<R: Read>(reader: &mut R) -> Result<Vec<u8>> {
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header)?;

    let payload_len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]) as usize;

    if payload_len > MAX_PAYLOAD_SIZE as usize {
        return Err(QueueError::Protocol(format!(
            "Payload too large: {} bytes (max {})",
            payload_len, MAX_PAYLOAD_SIZE
        )));
    }

    let mut message = vec![0u8; HEADER_SIZE + payload_len];
    message[..HEADER_SIZE].copy_from_slice(&header);
    if payload_len > 0 {
        reader.read_exact(&mut message[HEADER_SIZE..])?;
    }

    Ok(message)
}

/// Read a complete command from a stream
///
/// Blocks until a complete command is received or an error occurs
pub fn read_command<R: Read>(reader: &mut R) -> Result<Command> {
    let message = read_frame(reader)?;
    decode_command(&message)
}

/// Write a command to a stream
pub fn write_command<W: Write>(writer: &mut W, command: &Command) -> Result<()> {
    let bytes = encode_command(command)?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

/// Read a complete response from a stream
pub fn read_response<R: Read>(reader: &mut R) -> Result<Response> {
    let message = read_frame(reader)?;
    decode_response(&message)
}

/// Write a response to a stream
pub fn write_response<W: Write>(writer: &mut W, response: &Response) -> Result<()> {
    let bytes = encode_response(response);
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}
