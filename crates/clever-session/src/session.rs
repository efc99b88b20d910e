//! Session values and their durable projection.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single attribute stored in a session's attribute bag.
///
/// The set of variants is closed so that every value the store accepts has a
/// lossless encoding. Tagging keeps `Integer(1)` and `Float(1.0)` distinct
/// across a round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AttributeValue {
    String(String),
    Bool(bool),
    Integer(i64),
    Float(f64),
    List(Vec<AttributeValue>),
    Map(BTreeMap<String, AttributeValue>),
}

impl AttributeValue {
    /// Render a scalar the way the online-flag derivation compares it.
    ///
    /// Lists and maps have no scalar rendering and return `None`.
    pub fn as_marker_string(&self) -> Option<String> {
        match self {
            AttributeValue::String(s) => Some(s.clone()),
            AttributeValue::Bool(b) => Some(b.to_string()),
            AttributeValue::Integer(i) => Some(i.to_string()),
            AttributeValue::Float(f) => Some(f.to_string()),
            AttributeValue::List(_) | AttributeValue::Map(_) => None,
        }
    }

    /// Borrow the inner string, if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::String(s) => write!(f, "{s:?}"),
            AttributeValue::Bool(b) => write!(f, "{b}"),
            AttributeValue::Integer(i) => write!(f, "{i}"),
            AttributeValue::Float(x) => write!(f, "{x}"),
            AttributeValue::List(items) => write!(f, "[{} items]", items.len()),
            AttributeValue::Map(map) => write!(f, "{{{} keys}}", map.len()),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::String(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Integer(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Float(value)
    }
}

impl From<Vec<AttributeValue>> for AttributeValue {
    fn from(value: Vec<AttributeValue>) -> Self {
        AttributeValue::List(value)
    }
}

impl From<BTreeMap<String, AttributeValue>> for AttributeValue {
    fn from(value: BTreeMap<String, AttributeValue>) -> Self {
        AttributeValue::Map(value)
    }
}

/// Server-side state bound to one client's interaction.
///
/// The ID is assigned by an external generator; the store only requires it
/// to be non-blank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Unique session identifier.
    pub id: String,

    /// Remote host the session was opened from.
    pub host: Option<String>,

    /// Attribute bag.
    pub attributes: BTreeMap<String, AttributeValue>,

    /// When the session was started.
    pub start_timestamp: DateTime<Utc>,

    /// When the session was last accessed.
    pub last_access_time: DateTime<Utc>,

    /// Idle timeout in milliseconds, if the session manager set one.
    pub timeout_ms: Option<u64>,
}

impl Session {
    /// Create an empty session with the given ID.
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            host: None,
            attributes: BTreeMap::new(),
            start_timestamp: now,
            last_access_time: now,
            timeout_ms: None,
        }
    }

    /// Set the remote host.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Add an attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Set the idle timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Look up an attribute.
    pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }

    /// Insert or replace an attribute, returning the previous value.
    pub fn set_attribute(
        &mut self,
        key: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Option<AttributeValue> {
        self.attributes.insert(key.into(), value.into())
    }

    /// Record an access at the current time.
    pub fn touch(&mut self) {
        self.last_access_time = Utc::now();
    }

    /// Whether the idle timeout has elapsed as of `now`.
    ///
    /// Sessions without a timeout never expire.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.timeout_ms {
            None => false,
            Some(ms) => {
                let idle = now.signed_duration_since(self.last_access_time);
                idle.num_milliseconds() > i64::try_from(ms).unwrap_or(i64::MAX)
            }
        }
    }

    /// Whether the ID is blank (empty or whitespace).
    pub fn has_blank_id(&self) -> bool {
        is_blank(&self.id)
    }
}

/// Whether a session ID is empty or whitespace-only.
pub(crate) fn is_blank(id: &str) -> bool {
    id.trim().is_empty()
}

/// Online status derived from the authenticated marker at the last write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnlineFlag {
    Online,
    Offline,
}

impl OnlineFlag {
    /// Stable textual form used in durable storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            OnlineFlag::Online => "online",
            OnlineFlag::Offline => "offline",
        }
    }
}

impl fmt::Display for OnlineFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OnlineFlag {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "online" => Ok(OnlineFlag::Online),
            "offline" => Ok(OnlineFlag::Offline),
            other => Err(format!("unknown online flag: {other}")),
        }
    }
}

/// Durable projection of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    /// Primary key. Never blank.
    pub session_id: String,

    /// Principal name derived from the session, if known.
    pub login_name: Option<String>,

    /// Codec output for the full session.
    pub session_blob: Vec<u8>,

    /// Online status at the last create or update.
    pub online: OnlineFlag,

    /// Remote host of the session.
    pub host_ip: Option<String>,

    /// Set once on creation.
    pub created_at: DateTime<Utc>,

    /// Advances on every update.
    pub updated_at: DateTime<Utc>,
}

/// A page request for reporting queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    /// Zero-based page number.
    pub number: usize,

    /// Records per page.
    pub size: usize,
}

impl Page {
    /// Create a page request. A size of zero is treated as one.
    pub fn new(number: usize, size: usize) -> Self {
        Self {
            number,
            size: size.max(1),
        }
    }

    /// Number of records to skip.
    pub fn offset(&self) -> usize {
        self.number.saturating_mul(self.size)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(0, 20)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_string_rendering() {
        assert_eq!(AttributeValue::from("TRUE").as_marker_string(), Some("TRUE".to_string()));
        assert_eq!(AttributeValue::from(false).as_marker_string(), Some("false".to_string()));
        assert_eq!(AttributeValue::from(7_i64).as_marker_string(), Some("7".to_string()));
        assert_eq!(AttributeValue::List(vec![]).as_marker_string(), None);
    }

    #[test]
    fn test_blank_ids() {
        assert!(Session::new("").has_blank_id());
        assert!(Session::new("   ").has_blank_id());
        assert!(!Session::new("abc123").has_blank_id());
    }

    #[test]
    fn test_expiry() {
        let mut session = Session::new("s").with_timeout(Duration::from_secs(60));
        let now = Utc::now();
        session.last_access_time = now - chrono::Duration::seconds(120);
        assert!(session.is_expired_at(now));

        session.touch();
        assert!(!session.is_expired_at(Utc::now()));
        assert!(session.last_access_time >= now);

        let no_timeout = Session::new("t");
        assert!(!no_timeout.is_expired_at(now + chrono::Duration::days(365)));
    }

    #[test]
    fn test_online_flag_parse() {
        assert_eq!("online".parse::<OnlineFlag>(), Ok(OnlineFlag::Online));
        assert_eq!("offline".parse::<OnlineFlag>(), Ok(OnlineFlag::Offline));
        assert!("Y".parse::<OnlineFlag>().is_err());
    }

    #[test]
    fn test_page_offset() {
        assert_eq!(Page::new(0, 20).offset(), 0);
        assert_eq!(Page::new(3, 10).offset(), 30);
        assert_eq!(Page::new(2, 0).size, 1);
    }
}
