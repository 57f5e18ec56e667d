//! Protocol Module
//!
//! Defines the wire protocol for client-server communication.
//!
//! ## Protocol Format (V1 - Framed bincode)
//!
//! ### Request Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │ Cmd (1)  │ Len (4)  │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! ### Commands
//! - 0x01: CREATE_QUEUE - name, queue type, feature names
//! - 0x02: ENQUEUE      - queue name, item, features
//! - 0x03: DEQUEUE      - queue name
//! - 0x04: PEEK         - queue name
//! - 0x05: GET_SIZE     - queue name
//! - 0x06: GET_EPOCH    - queue name
//! - 0x07: CHECK        - empty
//! - 0x08: WATCH        - empty; answered by a stream of HEALTH replies
//! - 0x11..0x13: legacy ADD_ITEM / GET_NEXT_ITEM / PEEK_NEXT_ITEM on the
//!   default queue
//!
//! An empty queue name selects the default queue.
//!
//! ### Response Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │Status(1) │ Len (4)  │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! ### Status Codes
//! - 0x00: OK (payload: bincode `Reply`)
//! - 0x01: NOT_FOUND
//! - 0x02: INVALID_ARGUMENT
//! - 0x03: UNAVAILABLE
//! - 0x04: ERROR

mod command;
mod response;
mod codec;

pub use command::{Command, CommandType, CreateQueueRequest, EnqueueRequest, QueueRequest};
pub use response::{Reply, Response, Status};
pub use codec::{
    decode_command, decode_response, encode_add_item, encode_command, encode_response,
    read_command, read_response, write_command, write_response, HEADER_SIZE, MAX_PAYLOAD_SIZE,
};
