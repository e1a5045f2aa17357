//! SQLite type encoding and decoding.

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};

/// Text layouts SQLite's date functions produce.
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// A SQLite value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqliteValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl SqliteValue {
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, SqliteValue::Null)
    }

    /// Convert from rusqlite ValueRef.
    pub fn from_value_ref(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => SqliteValue::Null,
            ValueRef::Integer(i) => SqliteValue::Integer(i),
            ValueRef::Real(f) => SqliteValue::Real(f),
            ValueRef::Text(s) => SqliteValue::Text(String::from_utf8_lossy(s).into_owned()),
            ValueRef::Blob(b) => SqliteValue::Blob(b.to_vec()),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqliteValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqliteValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Read a timestamp stored as `datetime()` text or as unix seconds.
    ///
    /// SQLite has no timezone-aware type; the wall-clock reading is returned
    /// as is.
    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            SqliteValue::Text(s) => DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok()),
            SqliteValue::Integer(secs) => DateTime::from_timestamp(*secs, 0).map(|dt| dt.naive_utc()),
            _ => None,
        }
    }

    /// Like [`as_datetime`](Self::as_datetime), reading the value as UTC.
    pub fn as_utc(&self) -> Option<DateTime<Utc>> {
        self.as_datetime().map(|naive| naive.and_utc())
    }
}

impl From<i64> for SqliteValue {
    fn from(v: i64) -> Self {
        SqliteValue::Integer(v)
    }
}

impl From<f64> for SqliteValue {
    fn from(v: f64) -> Self {
        SqliteValue::Real(v)
    }
}

impl From<&str> for SqliteValue {
    fn from(v: &str) -> Self {
        SqliteValue::Text(v.to_string())
    }
}

impl From<String> for SqliteValue {
    fn from(v: String) -> Self {
        SqliteValue::Text(v)
    }
}

impl From<Vec<u8>> for SqliteValue {
    fn from(v: Vec<u8>) -> Self {
        SqliteValue::Blob(v)
    }
}

impl From<NaiveDateTime> for SqliteValue {
    fn from(v: NaiveDateTime) -> Self {
        SqliteValue::Text(v.format("%Y-%m-%d %H:%M:%S%.f").to_string())
    }
}

impl<T: Into<SqliteValue>> From<Option<T>> for SqliteValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqliteValue::Null, Into::into)
    }
}

impl ToSql for SqliteValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            SqliteValue::Null => Ok(ToSqlOutput::Owned(rusqlite::types::Value::Null)),
            SqliteValue::Integer(i) => Ok(ToSqlOutput::Owned(rusqlite::types::Value::Integer(*i))),
            SqliteValue::Real(f) => Ok(ToSqlOutput::Owned(rusqlite::types::Value::Real(*f))),
            SqliteValue::Text(s) => Ok(ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes()))),
            SqliteValue::Blob(b) => Ok(ToSqlOutput::Borrowed(ValueRef::Blob(b))),
        }
    }
}

impl FromSql for SqliteValue {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Ok(SqliteValue::from_value_ref(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2017, 8, 18)
            .and_then(|d| d.and_hms_opt(h, m, s))
            .expect("valid date")
    }

    #[test]
    fn test_datetime_from_text() {
        let v = SqliteValue::from("2017-08-18 09:30:00");
        assert_eq!(v.as_datetime(), Some(at(9, 30, 0)));

        let v = SqliteValue::from("2017-08-18T09:30:00.250");
        assert_eq!(v.as_datetime().map(|d| d.and_utc().timestamp_subsec_millis()), Some(250));
    }

    #[test]
    fn test_datetime_from_unix_seconds() {
        let v = SqliteValue::Integer(at(0, 0, 0).and_utc().timestamp());
        assert_eq!(v.as_datetime(), Some(at(0, 0, 0)));
    }

    #[test]
    fn test_datetime_round_trips_through_text() {
        let v = SqliteValue::from(at(23, 59, 59));
        assert_eq!(v.as_str(), Some("2017-08-18 23:59:59"));
        assert_eq!(v.as_datetime(), Some(at(23, 59, 59)));
    }

    #[test]
    fn test_not_a_datetime() {
        assert!(SqliteValue::from("yesterday").as_datetime().is_none());
        assert!(SqliteValue::Null.as_datetime().is_none());
    }

    #[test]
    fn test_option_conversion() {
        assert!(SqliteValue::from(None::<i64>).is_null());
        assert_eq!(SqliteValue::from(Some(7_i64)).as_i64(), Some(7));
    }
}
