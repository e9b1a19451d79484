use std::io::Cursor;

use buildtap_frame::Frame;
use bytes::Bytes;
use serde::Deserialize;

use crate::error::{DecodeError, Result};
use crate::value::Value;

/// Deepest array/map nesting accepted in a payload.
///
/// Decoding recurses once per level, and the tap worker runs on a default
/// sized thread stack in every build profile.
pub const MAX_NESTING_DEPTH: usize = 128;

/// Logging projection of one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedMessage {
    pub channel: u64,
    pub body: MessageBody,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MessageBody {
    /// Top-level values in payload order. Empty for an empty payload.
    Values(Vec<Value>),
    /// The payload did not decode; `raw` is the untouched payload.
    Undecodable { reason: String, raw: Bytes },
}

impl DecodedMessage {
    pub fn is_decoded(&self) -> bool {
        matches!(self.body, MessageBody::Values(_))
    }
}

/// Decode every top-level value in `payload`.
///
/// Fails if any byte is left that does not form a complete value.
pub fn decode_values(payload: &[u8]) -> Result<Vec<Value>> {
    let mut cursor = Cursor::new(payload);
    let mut values = Vec::new();

    loop {
        let offset = cursor.position() as usize;
        if offset >= payload.len() {
            return Ok(values);
        }

        let mut de = rmp_serde::Deserializer::new(&mut cursor);
        de.set_max_depth(MAX_NESTING_DEPTH);
        let value = Value::deserialize(&mut de)
            .map_err(|source| DecodeError::Malformed { offset, source })?;

        if cursor.position() as usize == offset {
            return Err(DecodeError::Stalled { offset });
        }
        values.push(value);
    }
}

/// Decode a frame's payload for logging. Never fails.
pub fn decode_message(frame: &Frame) -> DecodedMessage {
    let body = match decode_values(&frame.payload) {
        Ok(values) => MessageBody::Values(values),
        Err(err) => {
            tracing::debug!(
                channel = frame.channel,
                len = frame.payload.len(),
                error = %err,
                "payload did not decode"
            );
            MessageBody::Undecodable {
                reason: err.to_string(),
                raw: frame.payload.clone(),
            }
        }
    };

    DecodedMessage {
        channel: frame.channel,
        body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int32_forty_two() {
        // 0xd2 = int32 marker, then big-endian 42.
        let values = decode_values(&[0xd2, 0x00, 0x00, 0x00, 0x2a]).unwrap();
        assert_eq!(values, vec![Value::Int(42)]);
    }

    #[test]
    fn scalars_of_every_width() {
        let payload = [
            0xc0, // nil
            0xc3, // true
            0x7f, // fixint 127
            0xe0, // negative fixint -32
            0xcc, 0xff, // uint8 255
            0xd1, 0xfe, 0x0c, // int16 -500
            0xcf, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, // uint64 max
            0xcb, 0x3f, 0xf8, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // float64 1.5
            0xca, 0x40, 0x20, 0x00, 0x00, // float32 2.5
        ];
        let values = decode_values(&payload).unwrap();
        assert_eq!(
            values,
            vec![
                Value::Nil,
                Value::Boolean(true),
                Value::Int(127),
                Value::Int(-32),
                Value::Int(255),
                Value::Int(-500),
                Value::UInt(u64::MAX),
                Value::Float(1.5),
                Value::Float(2.5),
            ]
        );
    }

    #[test]
    fn strings_and_binary() {
        let payload = [
            0xa5, b'h', b'e', b'l', b'l', b'o', // fixstr "hello"
            0xc4, 0x03, 0x01, 0x02, 0x03, // bin8 [1, 2, 3]
            0xd9, 0x00, // str8 ""
        ];
        let values = decode_values(&payload).unwrap();
        assert_eq!(
            values,
            vec![
                Value::from("hello"),
                Value::Binary(vec![1, 2, 3]),
                Value::from(""),
            ]
        );
    }

    #[test]
    fn nested_arrays_and_maps() {
        // ["CREATE_SESSION", {"name": "App", "ids": [1, 2]}]
        let mut payload = vec![0x92, 0xae];
        payload.extend_from_slice(b"CREATE_SESSION");
        payload.extend_from_slice(&[0x82, 0xa4]);
        payload.extend_from_slice(b"name");
        payload.extend_from_slice(&[0xa3]);
        payload.extend_from_slice(b"App");
        payload.extend_from_slice(&[0xa3]);
        payload.extend_from_slice(b"ids");
        payload.extend_from_slice(&[0x92, 0x01, 0x02]);

        let values = decode_values(&payload).unwrap();
        assert_eq!(
            values,
            vec![Value::Array(vec![
                Value::from("CREATE_SESSION"),
                Value::Map(vec![
                    (Value::from("name"), Value::from("App")),
                    (
                        Value::from("ids"),
                        Value::Array(vec![Value::Int(1), Value::Int(2)])
                    ),
                ]),
            ])]
        );
    }

    #[test]
    fn map_with_integer_keys_keeps_order() {
        let payload = [0x82, 0x02, 0xc2, 0x01, 0xc3];
        let values = decode_values(&payload).unwrap();
        assert_eq!(
            values,
            vec![Value::Map(vec![
                (Value::Int(2), Value::Boolean(false)),
                (Value::Int(1), Value::Boolean(true)),
            ])]
        );
    }

    #[test]
    fn ext_projects_as_type_and_binary() {
        // fixext1, type 5, data 0x2a
        let values = decode_values(&[0xd4, 0x05, 0x2a]).unwrap();
        assert_eq!(
            values,
            vec![Value::Array(vec![Value::Int(5), Value::Binary(vec![0x2a])])]
        );
        assert_eq!(serde_json::to_string(&values).unwrap(), r#"[[5,"Kg=="]]"#);
    }

    #[test]
    fn invalid_utf8_string_falls_back_to_binary() {
        let values = decode_values(&[0xa2, 0xff, 0xfe]).unwrap();
        assert_eq!(values, vec![Value::Binary(vec![0xff, 0xfe])]);
    }

    fn nested_arrays(depth: usize) -> Vec<u8> {
        // `depth` one-element arrays around a nil.
        let mut payload = vec![0x91; depth];
        payload.push(0xc0);
        payload
    }

    #[test]
    fn moderate_nesting_decodes() {
        let values = decode_values(&nested_arrays(64)).unwrap();
        let mut depth = 0;
        let mut current = &values[0];
        while let Value::Array(items) = current {
            depth += 1;
            current = &items[0];
        }
        assert_eq!(depth, 64);
        assert_eq!(current, &Value::Nil);
    }

    #[test]
    fn excessive_nesting_is_malformed() {
        let err = decode_values(&nested_arrays(MAX_NESTING_DEPTH * 2)).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed { offset: 0, .. }));
    }

    #[test]
    fn hostile_nesting_never_exhausts_a_worker_stack() {
        let payload = nested_arrays(100_000);
        let message = std::thread::spawn(move || decode_message(&Frame::new(3, payload)))
            .join()
            .expect("decoding must not overflow the stack");
        assert!(!message.is_decoded());
    }

    #[test]
    fn empty_payload_has_no_values() {
        assert!(decode_values(&[]).unwrap().is_empty());
    }

    #[test]
    fn reserved_tag_is_an_error() {
        let err = decode_values(&[0xc1]).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed { offset: 0, .. }));
    }

    #[test]
    fn truncated_value_reports_offset() {
        // Valid nil, then an int32 missing two bytes.
        let err = decode_values(&[0xc0, 0xd2, 0x00, 0x00]).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed { offset: 1, .. }));
    }

    #[test]
    fn array_claiming_more_items_than_present() {
        // array32 claiming 2^32-1 items with a single item present.
        let err = decode_values(&[0xdd, 0xff, 0xff, 0xff, 0xff, 0x01]).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed { .. }));
    }

    #[test]
    fn decode_message_keeps_raw_on_failure() {
        let frame = Frame::new(3, vec![0xc1, 0xc1, 0xc1, 0xc1]);
        let message = decode_message(&frame);

        assert_eq!(message.channel, 3);
        assert!(!message.is_decoded());
        match message.body {
            MessageBody::Undecodable { reason, raw } => {
                assert!(reason.contains("byte 0"));
                assert_eq!(raw.as_ref(), &[0xc1, 0xc1, 0xc1, 0xc1]);
            }
            other => panic!("expected undecodable, got {other:?}"),
        }
    }

    #[test]
    fn decode_message_success() {
        let frame = Frame::new(1, vec![0xd2, 0x00, 0x00, 0x00, 0x2a]);
        let message = decode_message(&frame);

        assert_eq!(
            message,
            DecodedMessage {
                channel: 1,
                body: MessageBody::Values(vec![Value::Int(42)]),
            }
        );
    }
}
