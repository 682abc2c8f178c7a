//! # Dynamic Result Rows
//!
//! Backend-neutral result rows. Both adapters decode driver rows into
//! [`Row`]s of [`SqlValue`]s; repositories then read typed fields through the
//! tolerant getters below.
//!
//! Tolerance matters because the two engines surface the same logical type
//! differently: SQLite hands back timestamps as the RFC 3339 TEXT this crate
//! wrote, booleans as 0/1 integers, and `SUM` of an integer column as an
//! integer, while PostgreSQL returns `TIMESTAMPTZ`, `BOOL` and numeric types
//! natively.

use chrono::{DateTime, Utc};

use crate::error::{DbError, DbResult};
use crate::query::SqlValue;

/// One decoded result row: column names paired with values, in select order.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Vec<(String, SqlValue)>,
}

impl Row {
    pub fn new(columns: Vec<(String, SqlValue)>) -> Self {
        Row { columns }
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Raw value lookup by column name.
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, v)| v)
    }

    fn require(&self, column: &str) -> DbResult<&SqlValue> {
        self.get(column)
            .ok_or_else(|| DbError::MissingColumn(column.to_string()))
    }

    fn type_error(column: &str, expected: &'static str, actual: &SqlValue) -> DbError {
        DbError::ColumnType {
            column: column.to_string(),
            expected,
            actual: actual.type_name(),
        }
    }

    // =========================================================================
    // Typed getters
    // =========================================================================

    pub fn str(&self, column: &str) -> DbResult<String> {
        match self.require(column)? {
            SqlValue::Text(s) => Ok(s.clone()),
            other => Err(Self::type_error(column, "text", other)),
        }
    }

    pub fn opt_str(&self, column: &str) -> DbResult<Option<String>> {
        match self.require(column)? {
            SqlValue::Null => Ok(None),
            SqlValue::Text(s) => Ok(Some(s.clone())),
            other => Err(Self::type_error(column, "text", other)),
        }
    }

    pub fn i64(&self, column: &str) -> DbResult<i64> {
        match self.require(column)? {
            SqlValue::Integer(v) => Ok(*v),
            SqlValue::Boolean(b) => Ok(*b as i64),
            other => Err(Self::type_error(column, "integer", other)),
        }
    }

    pub fn opt_i64(&self, column: &str) -> DbResult<Option<i64>> {
        match self.require(column)? {
            SqlValue::Null => Ok(None),
            _ => self.i64(column).map(Some),
        }
    }

    /// Real value; integers widen (SQLite `SUM`/`AVG` results).
    pub fn f64(&self, column: &str) -> DbResult<f64> {
        match self.require(column)? {
            SqlValue::Real(v) => Ok(*v),
            SqlValue::Integer(v) => Ok(*v as f64),
            other => Err(Self::type_error(column, "real", other)),
        }
    }

    pub fn opt_f64(&self, column: &str) -> DbResult<Option<f64>> {
        match self.require(column)? {
            SqlValue::Null => Ok(None),
            _ => self.f64(column).map(Some),
        }
    }

    /// Boolean; SQLite stores these as 0/1 integers.
    pub fn bool(&self, column: &str) -> DbResult<bool> {
        match self.require(column)? {
            SqlValue::Boolean(b) => Ok(*b),
            SqlValue::Integer(v) => Ok(*v != 0),
            other => Err(Self::type_error(column, "boolean", other)),
        }
    }

    /// Timestamp; accepts native values and the RFC 3339 TEXT form the
    /// embedded backend stores.
    pub fn datetime(&self, column: &str) -> DbResult<DateTime<Utc>> {
        match self.require(column)? {
            SqlValue::Timestamp(ts) => Ok(*ts),
            SqlValue::Text(s) => parse_timestamp(s).ok_or_else(|| DbError::CorruptValue {
                column: column.to_string(),
                value: s.clone(),
            }),
            other => Err(Self::type_error(column, "timestamp", other)),
        }
    }

    pub fn opt_datetime(&self, column: &str) -> DbResult<Option<DateTime<Utc>>> {
        match self.require(column)? {
            SqlValue::Null => Ok(None),
            _ => self.datetime(column).map(Some),
        }
    }
}

/// Canonical stored form for timestamps on the embedded backend.
///
/// Fixed-width RFC 3339 with microseconds and a `Z` suffix, so lexicographic
/// TEXT comparison matches chronological order in WHERE clauses.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

/// Parses the stored TEXT form (and tolerates a space separator, which the
/// networked backend's text casts produce).
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, fmt) {
            return Some(DateTime::from_naive_utc_and_offset(naive, Utc));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row() -> Row {
        Row::new(vec![
            ("name".into(), SqlValue::Text("Amoxicillin".into())),
            ("quantity".into(), SqlValue::Integer(12)),
            ("price".into(), SqlValue::Real(4.5)),
            ("active".into(), SqlValue::Integer(1)),
            (
                "created_at".into(),
                SqlValue::Text("2026-03-01T08:30:00.000000Z".into()),
            ),
            ("expiry".into(), SqlValue::Null),
        ])
    }

    #[test]
    fn typed_getters() {
        let row = sample_row();
        assert_eq!(row.str("name").unwrap(), "Amoxicillin");
        assert_eq!(row.i64("quantity").unwrap(), 12);
        assert_eq!(row.f64("price").unwrap(), 4.5);
        assert!(row.bool("active").unwrap());
        assert_eq!(row.opt_datetime("expiry").unwrap(), None);
        assert_eq!(
            row.datetime("created_at").unwrap().to_rfc3339(),
            "2026-03-01T08:30:00+00:00"
        );
    }

    #[test]
    fn integer_widens_to_real() {
        let row = Row::new(vec![("total".into(), SqlValue::Integer(7))]);
        assert_eq!(row.f64("total").unwrap(), 7.0);
    }

    #[test]
    fn missing_and_mistyped_columns_are_typed_errors() {
        let row = sample_row();
        assert!(matches!(
            row.str("nope"),
            Err(DbError::MissingColumn(c)) if c == "nope"
        ));
        assert!(matches!(
            row.str("quantity"),
            Err(DbError::ColumnType { .. })
        ));
    }

    #[test]
    fn timestamp_round_trip_is_lexicographic() {
        let a = Utc::now();
        let b = a + chrono::Duration::seconds(1);
        let (fa, fb) = (format_timestamp(&a), format_timestamp(&b));
        assert!(fa < fb);
        assert_eq!(parse_timestamp(&fa).unwrap().timestamp(), a.timestamp());
    }

    #[test]
    fn parses_space_separated_form() {
        assert!(parse_timestamp("2026-03-01 08:30:00.5+00").is_some());
        assert!(parse_timestamp("2026-03-01 08:30:00").is_some());
        assert!(parse_timestamp("yesterday-ish").is_none());
    }
}
