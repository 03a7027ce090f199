//! Lenient timestamp (de)serialization.
//!
//! The task service emits naive UTC datetimes (`2025-03-01T09:30:00.123456`)
//! while other producers send RFC 3339 with an offset. Both decode to
//! `DateTime<Utc>`; output is always RFC 3339.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serializer};

/// Parse an RFC 3339 or offset-less ISO 8601 datetime as UTC.
///
/// # Errors
///
/// Returns the chrono parse error when neither form matches.
pub fn parse(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => Ok(dt.with_timezone(&Utc)),
        Err(rfc_err) => NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .map_err(|_| rfc_err),
    }
}

pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_rfc3339())
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse(&raw).map_err(serde::de::Error::custom)
}

/// `Option<DateTime<Utc>>` flavour, for `due_date`.
pub mod option {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(dt) => serializer.serialize_some(&dt.to_rfc3339()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|raw| super::parse(&raw).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::parse;
    use chrono::{Datelike, Timelike};

    #[test]
    fn naive_datetime_is_read_as_utc() {
        let dt = parse("2025-03-01T09:30:00.123456").expect("naive form parses");
        assert_eq!(dt.year(), 2025);
        assert_eq!(dt.hour(), 9);
        assert_eq!(dt.nanosecond(), 123_456_000);
    }

    #[test]
    fn offset_datetime_is_normalized() {
        let dt = parse("2025-03-01T11:30:00+02:00").expect("rfc3339 parses");
        assert_eq!(dt.hour(), 9);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse("yesterday").is_err());
    }
}
