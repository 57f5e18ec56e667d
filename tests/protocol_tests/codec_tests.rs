//! Codec Tests
//!
//! Tests for command and response encoding/decoding.

use std::io::Cursor;

use bytes::Bytes;
use spqueue::health::ServingStatus;
use spqueue::index::Feature;
use spqueue::protocol::{
    decode_command, decode_response, encode_add_item, encode_command, encode_response,
    read_command, read_response, write_command, write_response, Command, CommandType, Reply,
    Response, Status, HEADER_SIZE, MAX_PAYLOAD_SIZE,
};
use spqueue::{QueueError, QueueType};

// =============================================================================
// Helper Functions
// =============================================================================

fn frame(cmd: u8, payload: &[u8]) -> Vec<u8> {
    let mut bytes = vec![cmd];
    bytes.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    bytes.extend_from_slice(payload);
    bytes
}

// =============================================================================
// Command Encoding/Decoding Tests
// =============================================================================

#[test]
fn test_create_queue_command() {
    let cmd = Command::create_queue("orders", QueueType::InMemory, ["urgency", "value"]);
    let encoded = encode_command(&cmd).unwrap();

    assert_eq!(encoded[0], CommandType::CreateQueue as u8);

    match decode_command(&encoded).unwrap() {
        Command::CreateQueue(request) => {
            assert_eq!(request.name, "orders");
            assert_eq!(request.queue_type, 1);
            assert_eq!(request.features, vec!["urgency", "value"]);
        }
        other => panic!("Expected CREATE_QUEUE command, got {:?}", other),
    }
}

#[test]
fn test_enqueue_command_with_binary_payload() {
    let payload: Vec<u8> = (0..=255).collect();
    let cmd = Command::enqueue(
        "q",
        payload.clone(),
        vec![Feature::new("a", -1.5), Feature::new("b", 1e10)],
    );

    let decoded = decode_command(&encode_command(&cmd).unwrap()).unwrap();
    assert_eq!(decoded, cmd);

    match decoded {
        Command::Enqueue(request) => assert_eq!(request.item.as_ref(), payload.as_slice()),
        other => panic!("Expected ENQUEUE command, got {:?}", other),
    }
}

#[test]
fn test_queue_commands_keep_their_type() {
    let commands = [
        (Command::dequeue("q"), CommandType::Dequeue),
        (Command::peek("q"), CommandType::Peek),
        (Command::get_size("q"), CommandType::GetSize),
        (Command::get_epoch("q"), CommandType::GetEpoch),
    ];

    for (cmd, expected) in commands {
        let encoded = encode_command(&cmd).unwrap();
        assert_eq!(encoded[0], expected as u8);
        assert_eq!(decode_command(&encoded).unwrap(), cmd);
    }
}

#[test]
fn test_health_commands_have_empty_payload() {
    for cmd in [Command::Check, Command::Watch] {
        let encoded = encode_command(&cmd).unwrap();
        assert_eq!(encoded.len(), HEADER_SIZE);
        assert_eq!(decode_command(&encoded).unwrap(), cmd);
    }
}

#[test]
fn test_health_command_with_payload_rejected() {
    let bytes = frame(CommandType::Check as u8, b"x");
    assert!(matches!(decode_command(&bytes), Err(QueueError::Protocol(_))));
}

// =============================================================================
// Legacy Opcode Tests
// =============================================================================

#[test]
fn test_add_item_maps_to_default_enqueue() {
    let bytes = encode_add_item(b"legacy", vec![Feature::new("feature_name", 3.0)]).unwrap();
    assert_eq!(bytes[0], 0x11);

    match decode_command(&bytes).unwrap() {
        Command::Enqueue(request) => {
            assert_eq!(request.queue_name, "");
            assert_eq!(request.item, Bytes::from_static(b"legacy"));
            assert_eq!(request.features, vec![Feature::new("feature_name", 3.0)]);
        }
        other => panic!("Expected ENQUEUE command, got {:?}", other),
    }
}

#[test]
fn test_get_next_item_maps_to_default_dequeue() {
    let decoded = decode_command(&frame(0x12, &[])).unwrap();
    assert_eq!(decoded, Command::dequeue(""));
}

#[test]
fn test_peek_next_item_maps_to_default_peek() {
    let decoded = decode_command(&frame(0x13, &[])).unwrap();
    assert_eq!(decoded, Command::peek(""));
}

// =============================================================================
// Malformed Input Tests
// =============================================================================

#[test]
fn test_unknown_command_type() {
    let err = decode_command(&frame(0x7F, &[])).unwrap_err();
    assert!(err.to_string().contains("0x7f"));
}

#[test]
fn test_incomplete_header() {
    assert!(matches!(
        decode_command(&[0x03, 0x00]),
        Err(QueueError::Protocol(_))
    ));
}

#[test]
fn test_incomplete_payload() {
    let encoded = encode_command(&Command::dequeue("some queue")).unwrap();
    assert!(matches!(
        decode_command(&encoded[..encoded.len() - 2]),
        Err(QueueError::Protocol(_))
    ));
}

#[test]
fn test_oversized_payload_rejected() {
    let mut bytes = vec![CommandType::Enqueue as u8];
    bytes.extend_from_slice(&(MAX_PAYLOAD_SIZE + 1).to_be_bytes());

    let err = read_command(&mut Cursor::new(bytes)).unwrap_err();
    assert!(err.to_string().contains("too large"));
}

#[test]
fn test_malformed_payload() {
    let bytes = frame(CommandType::CreateQueue as u8, &[0xFF; 3]);
    assert!(matches!(decode_command(&bytes), Err(QueueError::Protocol(_))));
}

// =============================================================================
// Response Tests
// =============================================================================

#[test]
fn test_ok_response_carries_reply() {
    let reply = Reply::Item {
        has_item: true,
        item: Bytes::from_static(b"payload"),
        size: 4,
    };

    let decoded = decode_response(&encode_response(&Response::ok(&reply))).unwrap();
    assert_eq!(decoded.status, Status::Ok);
    assert_eq!(decoded.into_reply().unwrap(), reply);
}

#[test]
fn test_health_reply() {
    let reply = Reply::Health {
        status: ServingStatus::NotServing,
    };
    let decoded = decode_response(&encode_response(&Response::ok(&reply))).unwrap();
    assert_eq!(decoded.into_reply().unwrap(), reply);
}

#[test]
fn test_error_statuses_map_back_to_errors() {
    let cases = [
        (QueueError::QueueNotFound("q".into()), Status::NotFound),
        (QueueError::InvalidArgument("bad".into()), Status::InvalidArgument),
        (QueueError::Busy, Status::Unavailable),
        (QueueError::DurabilityFailure("disk".into()), Status::Unavailable),
        (QueueError::recovery("q", "torn"), Status::Unavailable),
        (QueueError::Serialization("x".into()), Status::Error),
    ];

    for (err, status) in cases {
        let response = Response::from_error(&err);
        assert_eq!(response.status, status, "{}", err);

        let decoded = decode_response(&encode_response(&response)).unwrap();
        let back = decoded.into_reply().unwrap_err();
        match status {
            Status::NotFound => assert!(matches!(back, QueueError::QueueNotFound(_))),
            Status::InvalidArgument => assert!(matches!(back, QueueError::InvalidArgument(_))),
            Status::Unavailable => assert!(back.is_unavailable()),
            _ => assert!(matches!(back, QueueError::Remote(_))),
        }
    }
}

#[test]
fn test_busy_message_is_retry_hint() {
    let response = Response::from_error(&QueueError::Busy);
    let message = String::from_utf8(response.payload.unwrap()).unwrap();
    assert!(message.contains("please retry"));
}

#[test]
fn test_unknown_status_rejected() {
    assert!(matches!(
        decode_response(&frame(0x42, &[])),
        Err(QueueError::Protocol(_))
    ));
}

// =============================================================================
// Stream I/O Tests
// =============================================================================

#[test]
fn test_stream_multiple_commands() {
    let mut buffer = Vec::new();
    write_command(&mut buffer, &Command::create_queue("q", QueueType::Durable, ["p"])).unwrap();
    write_command(&mut buffer, &Command::enqueue("q", "item", vec![Feature::new("p", 1.0)])).unwrap();
    write_command(&mut buffer, &Command::Watch).unwrap();

    let mut cursor = Cursor::new(buffer);
    assert!(matches!(read_command(&mut cursor).unwrap(), Command::CreateQueue(_)));
    assert!(matches!(read_command(&mut cursor).unwrap(), Command::Enqueue(_)));
    assert_eq!(read_command(&mut cursor).unwrap(), Command::Watch);

    assert!(matches!(
        read_command(&mut cursor),
        Err(QueueError::Io(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof
    ));
}

#[test]
fn test_stream_responses() {
    let mut buffer = Vec::new();
    write_response(&mut buffer, &Response::ok(&Reply::Size { size: 3 })).unwrap();
    write_response(&mut buffer, &Response::not_found("gone")).unwrap();

    let mut cursor = Cursor::new(buffer);
    assert_eq!(
        read_response(&mut cursor).unwrap().into_reply().unwrap(),
        Reply::Size { size: 3 }
    );

    let not_found = read_response(&mut cursor).unwrap();
    assert_eq!(not_found.status, Status::NotFound);
    assert_eq!(not_found.payload.as_deref(), Some(&b"gone"[..]));
}
