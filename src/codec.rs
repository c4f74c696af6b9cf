//! Length-prefixed field framing for envelope payloads.
//!
//! A payload is an ordered sequence of named binary fields. Each field is
//! framed as:
//!
//! ```text
//! name_len (u16 BE) || name (utf-8) || value_len (u32 BE) || value
//! ```
//!
//! Values are raw bytes, so fields nest: a field value may itself be a
//! sealed envelope or another encoded sequence. Decoding consumes the
//! input exactly and fails on any length prefix that overruns it.

use crate::Error;

/// A single named binary field inside an envelope payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub value: Vec<u8>,
}

impl Field {
    pub fn new(name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Field {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Encode an ordered sequence of fields into bytes.
///
/// The length prefixes cap a field name at 65535 bytes and a value at
/// 4 GiB; `encode` panics on a field it cannot represent. Protocol
/// messages stay far under both caps.
pub fn encode(fields: &[Field]) -> Vec<u8> {
    let mut out = Vec::new();
    for field in fields {
        let name = field.name.as_bytes();
        assert!(name.len() <= u16::MAX as usize, "athens: field name too long");
        assert!(
            field.value.len() <= u32::MAX as usize,
            "athens: field value too large"
        );

        out.extend_from_slice(&(name.len() as u16).to_be_bytes());
        out.extend_from_slice(name);
        out.extend_from_slice(&(field.value.len() as u32).to_be_bytes());
        out.extend_from_slice(&field.value);
    }
    out
}

/// Decode bytes back into the ordered field sequence they encode.
pub fn decode(bytes: &[u8]) -> Result<Vec<Field>, Error> {
    let mut fields = Vec::new();
    let mut rest = bytes;

    while !rest.is_empty() {
        if rest.len() < 2 {
            return Err(Error::TruncatedMessage);
        }
        let name_len = u16::from_be_bytes([rest[0], rest[1]]) as usize;
        rest = &rest[2..];

        if rest.len() < name_len {
            return Err(Error::TruncatedMessage);
        }
        let name = std::str::from_utf8(&rest[..name_len])
            .map_err(|_| Error::FieldNameBadUtf8)?
            .to_owned();
        rest = &rest[name_len..];

        if rest.len() < 4 {
            return Err(Error::TruncatedMessage);
        }
        let value_len = u32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
        rest = &rest[4..];

        if rest.len() < value_len {
            return Err(Error::TruncatedMessage);
        }
        let value = rest[..value_len].to_vec();
        rest = &rest[value_len..];

        fields.push(Field { name, value });
    }

    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let fields = vec![
            Field::new("session", vec![1u8; 16]),
            Field::new("identity", b"V-0042".to_vec()),
            Field::new("empty", Vec::new()),
        ];

        let encoded = encode(&fields);
        let decoded = decode(&encoded).unwrap();
        assert_eq!(fields, decoded);
    }

    #[test]
    fn empty_input_decodes_to_no_fields() {
        assert_eq!(decode(&[]).unwrap(), Vec::new());
        assert_eq!(encode(&[]), Vec::<u8>::new());
    }

    #[test]
    fn values_are_opaque_bytes() {
        // Values that look like framing must come back out untouched
        let inner = encode(&[Field::new("nested", b"payload".to_vec())]);
        let fields = vec![Field::new("outer", inner.clone())];

        let decoded = decode(&encode(&fields)).unwrap();
        assert_eq!(decoded[0].value, inner);
    }

    #[test]
    fn large_values_round_trip() {
        let fields = vec![Field::new("ballot", vec![0xA5u8; 1024 * 1024])];
        let decoded = decode(&encode(&fields)).unwrap();
        assert_eq!(fields, decoded);
    }

    #[test]
    fn truncated_input_is_rejected() {
        let encoded = encode(&[Field::new("session", vec![1u8; 16])]);

        // Every proper prefix of a valid encoding is invalid
        for len in 1..encoded.len() {
            assert!(matches!(
                decode(&encoded[..len]),
                Err(Error::TruncatedMessage)
            ));
        }
    }

    #[test]
    fn overrunning_length_prefix_is_rejected() {
        // Claims a 1024-byte value but carries none
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&4u16.to_be_bytes());
        bytes.extend_from_slice(b"name");
        bytes.extend_from_slice(&1024u32.to_be_bytes());

        assert!(matches!(decode(&bytes), Err(Error::TruncatedMessage)));
    }

    #[test]
    fn non_utf8_name_is_rejected() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&2u16.to_be_bytes());
        bytes.extend_from_slice(&[0xFF, 0xFE]);
        bytes.extend_from_slice(&0u32.to_be_bytes());

        assert!(matches!(decode(&bytes), Err(Error::FieldNameBadUtf8)));
    }

    #[test]
    #[should_panic(expected = "athens: field name too long")]
    fn unrepresentable_field_name_panics() {
        let name = "x".repeat(u16::MAX as usize + 1);
        encode(&[Field::new(name, Vec::new())]);
    }
}
