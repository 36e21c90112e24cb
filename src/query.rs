//! Canonical query strings.
//!
//! Keys are ordered byte-wise (a `BTreeMap<String, _>` already does that) and
//! values are escaped with the RFC 3986 unreserved set. The signature is only
//! valid over exactly this form.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryValue {
    Text(String),
    Int(i64),
    Timestamp(DateTime<Utc>),
}

impl fmt::Display for QueryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryValue::Text(s) => f.write_str(s),
            QueryValue::Int(n) => write!(f, "{n}"),
            QueryValue::Timestamp(ts) => f.write_str(&format_timestamp(ts)),
        }
    }
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        QueryValue::Text(value.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        QueryValue::Text(value)
    }
}

impl From<u32> for QueryValue {
    fn from(value: u32) -> Self {
        QueryValue::Int(value.into())
    }
}

impl From<i64> for QueryValue {
    fn from(value: i64) -> Self {
        QueryValue::Int(value)
    }
}

impl From<DateTime<Utc>> for QueryValue {
    fn from(value: DateTime<Utc>) -> Self {
        QueryValue::Timestamp(value)
    }
}

/// Parameter name to value, unique keys in byte order.
#[derive(Debug, Clone, Default)]
pub struct QueryParams(BTreeMap<String, QueryValue>);

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a parameter.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<QueryValue>) -> &mut Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&QueryValue> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `key=escaped(value)` pairs joined by `&`, ascending key order.
    pub fn canonical(&self) -> String {
        self.0
            .iter()
            .map(|(k, v)| format!("{k}={}", percent_encode(&v.to_string())))
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// Escapes every byte except `A-Z a-z 0-9 - _ . ~`, with upper-case hex digits.
#[inline]
pub fn percent_encode(value: &str) -> Cow<'_, str> {
    urlencoding::encode(value)
}

/// `2013-07-31T00:00:00.000Z`
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn is_canonical_char(b: u8) -> bool {
        b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~')
    }

    /// Only unreserved characters and `%XX` triples.
    fn assert_escaped(value: &str) {
        let bytes = value.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'%' {
                assert!(i + 2 < bytes.len(), "truncated escape in {value}");
                assert!(bytes[i + 1].is_ascii_hexdigit() && bytes[i + 2].is_ascii_hexdigit());
                assert!(!bytes[i + 1].is_ascii_lowercase() && !bytes[i + 2].is_ascii_lowercase());
                i += 3;
            } else {
                assert!(is_canonical_char(bytes[i]), "unescaped {:?} in {value}", bytes[i] as char);
                i += 1;
            }
        }
    }

    #[test]
    fn empty_params_yield_empty_string() {
        assert_eq!(QueryParams::new().canonical(), "");
    }

    #[test]
    fn keys_are_sorted_bytewise() {
        let mut params = QueryParams::new();
        params
            .insert("Timestamp", "t")
            .insert("Action", "TopSites")
            .insert("AWSAccessKeyId", "id")
            .insert("action", "lower")
            .insert("Count", 100u32);

        let canonical = params.canonical();
        let keys: Vec<&str> = canonical
            .split('&')
            .map(|pair| pair.split('=').next().unwrap())
            .collect();
        // Upper-case sorts before lower-case, `AW` before `Ac`.
        assert_eq!(keys, ["AWSAccessKeyId", "Action", "Count", "Timestamp", "action"]);
        assert!(keys.windows(2).all(|w| w[0].as_bytes() < w[1].as_bytes()));
    }

    #[test]
    fn escapes_everything_outside_unreserved_set() {
        assert_eq!(percent_encode("a b:c/d+e"), "a%20b%3Ac%2Fd%2Be");
        assert_eq!(percent_encode("*!'()=&,;@$"), "%2A%21%27%28%29%3D%26%2C%3B%40%24");
        assert_eq!(percent_encode("AZaz09-_.~"), "AZaz09-_.~");
        assert_eq!(percent_encode("é"), "%C3%A9");
    }

    #[test]
    fn encoded_values_round_trip() {
        let samples = [
            "2013-07-31T00:00:00.000Z",
            "abc+/=",
            "space and\ttab",
            "ünïcødé ✓",
            "~already-safe_.",
            "100%",
        ];
        for sample in samples {
            let encoded = percent_encode(sample);
            assert_escaped(&encoded);
            assert_eq!(urlencoding::decode(&encoded).unwrap(), sample);
        }
    }

    #[test]
    fn timestamp_has_millis_and_z() {
        let ts = Utc.with_ymd_and_hms(2013, 7, 31, 0, 0, 0).unwrap();
        assert_eq!(format_timestamp(&ts), "2013-07-31T00:00:00.000Z");

        let mut params = QueryParams::new();
        params.insert("Timestamp", ts);
        assert_eq!(params.canonical(), "Timestamp=2013-07-31T00%3A00%3A00.000Z");
    }

    #[test]
    fn insert_replaces_existing_key() {
        let mut params = QueryParams::new();
        params.insert("Start", 1u32).insert("Start", 101u32);
        assert_eq!(params.len(), 1);
        assert_eq!(params.get("Start"), Some(&QueryValue::Int(101)));
    }
}
