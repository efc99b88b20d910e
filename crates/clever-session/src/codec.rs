//! Encoding sessions to and from durable byte blobs.
//!
//! The store never looks inside a blob; it only hands sessions to a
//! [`SessionCodec`] on write and asks for them back on a cache miss.

use serde::{Deserialize, Serialize};

use crate::error::CodecError;
use crate::session::{AttributeValue, Session, is_blank};

/// Current blob format version written by [`JsonCodec`].
pub const FORMAT_VERSION: u32 = 1;

/// Default maximum nesting depth for attribute values.
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Converts sessions to and from the bytes stored in a [`SessionRecord`](crate::SessionRecord).
pub trait SessionCodec: Send + Sync {
    /// Encode a session. Fails without side effects if any attribute is unsupported.
    fn encode(&self, session: &Session) -> Result<Vec<u8>, CodecError>;

    /// Decode a blob previously produced by [`encode`](Self::encode).
    fn decode(&self, bytes: &[u8]) -> Result<Session, CodecError>;
}

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    format: u32,
    session: &'a Session,
}

#[derive(Deserialize)]
struct Envelope {
    format: u32,
    session: serde_json::Value,
}

/// JSON codec with a versioned envelope.
#[derive(Debug, Clone)]
pub struct JsonCodec {
    max_depth: usize,
}

impl Default for JsonCodec {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl JsonCodec {
    /// Create a codec with the default nesting limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum nesting depth for attribute values.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }

    fn validate(&self, session: &Session) -> Result<(), CodecError> {
        for (key, value) in &session.attributes {
            if key.is_empty() {
                return Err(CodecError::EmptyKey);
            }
            self.validate_value(key, value, 1)?;
        }
        Ok(())
    }

    fn validate_value(&self, key: &str, value: &AttributeValue, depth: usize) -> Result<(), CodecError> {
        if depth > self.max_depth {
            return Err(CodecError::TooDeep {
                key: key.to_string(),
                max_depth: self.max_depth,
            });
        }
        match value {
            AttributeValue::Float(f) if !f.is_finite() => Err(CodecError::NonFiniteFloat {
                key: key.to_string(),
            }),
            AttributeValue::List(items) => items
                .iter()
                .try_for_each(|item| self.validate_value(key, item, depth + 1)),
            AttributeValue::Map(map) => map.iter().try_for_each(|(k, v)| {
                if k.is_empty() {
                    return Err(CodecError::EmptyKey);
                }
                self.validate_value(key, v, depth + 1)
            }),
            _ => Ok(()),
        }
    }
}

impl SessionCodec for JsonCodec {
    fn encode(&self, session: &Session) -> Result<Vec<u8>, CodecError> {
        self.validate(session)?;
        let envelope = EnvelopeRef {
            format: FORMAT_VERSION,
            session,
        };
        Ok(serde_json::to_vec(&envelope)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Session, CodecError> {
        let envelope: Envelope = serde_json::from_slice(bytes)?;
        if envelope.format != FORMAT_VERSION {
            return Err(CodecError::UnsupportedVersion(envelope.format));
        }
        let session: Session = serde_json::from_value(envelope.session)?;
        if is_blank(&session.id) {
            return Err(CodecError::BlankId);
        }
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn nested(depth: usize) -> AttributeValue {
        let mut value = AttributeValue::from("leaf");
        for _ in 1..depth {
            value = AttributeValue::List(vec![value]);
        }
        value
    }

    #[test]
    fn test_heterogeneous_round_trip() {
        let mut profile = BTreeMap::new();
        profile.insert("dept".to_string(), AttributeValue::from("ops"));
        profile.insert("level".to_string(), AttributeValue::from(3_i64));

        let session = Session::new("abc123")
            .with_host("10.0.0.7")
            .with_attribute("authenticated", "true")
            .with_attribute("login_name", "alice")
            .with_attribute("remember_me", true)
            .with_attribute("visits", 42_i64)
            .with_attribute("score", 1.0)
            .with_attribute("roles", vec![AttributeValue::from("admin"), AttributeValue::from(7_i64)])
            .with_attribute("profile", profile);

        let codec = JsonCodec::new();
        let bytes = codec.encode(&session).unwrap();
        let decoded = codec.decode(&bytes).unwrap();

        assert_eq!(decoded, session);
        assert_eq!(decoded.attribute("score"), Some(&AttributeValue::Float(1.0)));
        assert_eq!(decoded.attribute("visits"), Some(&AttributeValue::Integer(42)));
    }

    #[test]
    fn test_rejects_non_finite_float() {
        let session = Session::new("s1").with_attribute("ratio", f64::NAN);
        let err = JsonCodec::new().encode(&session).unwrap_err();
        assert!(matches!(err, CodecError::NonFiniteFloat { key } if key == "ratio"));

        let mut map = BTreeMap::new();
        map.insert("inner".to_string(), AttributeValue::Float(f64::INFINITY));
        let session = Session::new("s1").with_attribute("outer", map);
        assert!(matches!(
            JsonCodec::new().encode(&session),
            Err(CodecError::NonFiniteFloat { .. })
        ));
    }

    #[test]
    fn test_rejects_excessive_nesting() {
        let codec = JsonCodec::new().with_max_depth(4);

        let ok = Session::new("s1").with_attribute("deep", nested(4));
        assert!(codec.encode(&ok).is_ok());

        let too_deep = Session::new("s1").with_attribute("deep", nested(5));
        assert!(matches!(
            codec.encode(&too_deep),
            Err(CodecError::TooDeep { max_depth: 4, .. })
        ));
    }

    #[test]
    fn test_rejects_empty_keys() {
        let session = Session::new("s1").with_attribute("", "x");
        assert!(matches!(JsonCodec::new().encode(&session), Err(CodecError::EmptyKey)));

        let mut map = BTreeMap::new();
        map.insert(String::new(), AttributeValue::from(1_i64));
        let session = Session::new("s1").with_attribute("m", map);
        assert!(matches!(JsonCodec::new().encode(&session), Err(CodecError::EmptyKey)));
    }

    #[test]
    fn test_decode_rejects_unknown_version() {
        let codec = JsonCodec::new();
        let mut value: serde_json::Value =
            serde_json::from_slice(&codec.encode(&Session::new("s1")).unwrap()).unwrap();
        value["format"] = serde_json::json!(99);
        let bytes = serde_json::to_vec(&value).unwrap();

        assert!(matches!(codec.decode(&bytes), Err(CodecError::UnsupportedVersion(99))));
    }

    #[test]
    fn test_decode_rejects_garbage_and_blank_id() {
        let codec = JsonCodec::new();
        assert!(matches!(codec.decode(b"\x00\x01not json"), Err(CodecError::Serialization(_))));

        let mut value: serde_json::Value =
            serde_json::from_slice(&codec.encode(&Session::new("s1")).unwrap()).unwrap();
        value["session"]["id"] = serde_json::json!("  ");
        let bytes = serde_json::to_vec(&value).unwrap();
        assert!(matches!(codec.decode(&bytes), Err(CodecError::BlankId)));
    }
}
