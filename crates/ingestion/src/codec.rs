//! Stream value codec
//!
//! Layout: `u32` big-endian body length, then the bincode body of a `Record`.
//! The message key carries the vehicle_id and must match the body.

use bincode::Options;
use bytes::{BufMut, Bytes, BytesMut};
use contracts::{ContractError, Record, StreamMessage};

/// Size of the length prefix in bytes
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Upper bound on an encoded body
pub const MAX_BODY_LEN: u64 = 64 * 1024;

fn body_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_limit(MAX_BODY_LEN)
}

/// Encode a record into a length-prefixed stream value.
pub fn encode_record(record: &Record) -> Result<Bytes, ContractError> {
    record.validate()?;

    let body = body_options()
        .serialize(record)
        .map_err(|e| ContractError::Encode {
            message: e.to_string(),
        })?;

    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_LEN + body.len());
    // body is bounded by MAX_BODY_LEN, so it always fits in u32
    buf.put_u32(body.len() as u32);
    buf.put_slice(&body);
    Ok(buf.freeze())
}

/// Decode a length-prefixed stream value.
pub fn decode_record(value: &[u8]) -> Result<Record, ContractError> {
    if value.len() < LENGTH_PREFIX_LEN {
        return Err(ContractError::decode(format!(
            "value too short for length prefix: {} byte(s)",
            value.len()
        )));
    }

    let (prefix, body) = value.split_at(LENGTH_PREFIX_LEN);
    let declared = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
    if declared != body.len() {
        return Err(ContractError::decode(format!(
            "length prefix says {declared} byte(s), body has {}",
            body.len()
        )));
    }

    let record: Record = body_options()
        .deserialize(body)
        .map_err(|e| ContractError::decode(e.to_string()))?;
    record
        .validate()
        .map_err(|e| ContractError::decode(e.to_string()))?;
    Ok(record)
}

/// Decode a stream message and check that its key matches the record.
pub fn decode_message(message: &StreamMessage) -> Result<Record, ContractError> {
    let record = decode_record(&message.value)?;
    if !message.key.is_empty() && message.key.as_ref() != record.vehicle_id.as_bytes() {
        return Err(ContractError::decode(format!(
            "message key '{}' does not match vehicle_id '{}'",
            String::from_utf8_lossy(&message.key),
            record.vehicle_id
        )));
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use contracts::StreamPosition;

    fn record(vehicle_id: &str) -> Record {
        Record {
            vehicle_id: vehicle_id.to_string(),
            latitude: 10.0,
            longitude: 20.0,
            speed: 55.5,
            engine_temp: 190.0,
            observed_at: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
        }
    }

    fn message(key: &str, value: Bytes) -> StreamMessage {
        StreamMessage {
            position: StreamPosition {
                partition: 0,
                offset: 0,
            },
            key: Bytes::copy_from_slice(key.as_bytes()),
            value,
        }
    }

    #[test]
    fn test_encode_decode() {
        let original = record("T1");
        let encoded = encode_record(&original).unwrap();
        let declared = u32::from_be_bytes(encoded[..4].try_into().unwrap()) as usize;
        assert_eq!(declared, encoded.len() - LENGTH_PREFIX_LEN);
        assert_eq!(decode_record(&encoded).unwrap(), original);
    }

    #[test]
    fn test_encode_rejects_empty_vehicle_id() {
        assert!(encode_record(&record("")).is_err());
    }

    #[test]
    fn test_decode_short_value() {
        let err = decode_record(&[0, 1]).unwrap_err();
        assert!(matches!(err, ContractError::Decode { .. }));
    }

    #[test]
    fn test_decode_length_mismatch() {
        let mut encoded = encode_record(&record("T1")).unwrap().to_vec();
        encoded.push(0xFF);
        let err = decode_record(&encoded).unwrap_err();
        assert!(err.to_string().contains("length prefix"));
    }

    #[test]
    fn test_decode_garbage_body() {
        let mut value = vec![0, 0, 0, 3];
        value.extend_from_slice(b"abc");
        assert!(decode_record(&value).is_err());
    }

    #[test]
    fn test_decode_message_key_mismatch() {
        let value = encode_record(&record("T1")).unwrap();
        assert!(decode_message(&message("T1", value.clone())).is_ok());
        assert!(decode_message(&message("T2", value)).is_err());
    }
}
