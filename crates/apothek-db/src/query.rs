//! # Declarative Query Model
//!
//! The only way calling code can describe a database operation. Every table
//! and column name passes identifier validation, every value becomes a bind
//! parameter, so unparameterized SQL is unrepresentable outside this crate.
//!
//! ## Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Query Model → Translator                           │
//! │                                                                         │
//! │  Select / Insert / Update / Delete / Aggregate   (this module)         │
//! │       │                                                                 │
//! │       │   Filter: tagged-union predicate tree                          │
//! │       │   Assign: Set / Increment / Decrement / Multiply / Divide      │
//! │       ▼                                                                 │
//! │  translate::render_* (per Dialect)                                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Statement { sql, params } ──► sqlx runtime bind ──► backend           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//! ```rust
//! use apothek_db::query::{Filter, OrderDir, Select};
//!
//! let low_stock = Select::from("medicines")
//!     .filter(
//!         Filter::lte_col("quantity", "reorder_level")
//!             .and(Filter::contains("name", "cillin")),
//!     )
//!     .order_by("name", OrderDir::Asc)
//!     .limit(50);
//! # let _ = low_stock;
//! ```

use chrono::{DateTime, Utc};

// =============================================================================
// SqlValue
// =============================================================================

/// A bind parameter or a decoded column value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Name of the variant, for decode-error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Integer(_) => "integer",
            SqlValue::Real(_) => "real",
            SqlValue::Text(_) => "text",
            SqlValue::Boolean(_) => "boolean",
            SqlValue::Timestamp(_) => "timestamp",
        }
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Integer(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Integer(v as i64)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Real(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Boolean(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        SqlValue::Timestamp(v)
    }
}

impl<T> From<Option<T>> for SqlValue
where
    T: Into<SqlValue>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => SqlValue::Null,
        }
    }
}

// =============================================================================
// Filter
// =============================================================================

/// A predicate tree over one table's columns.
///
/// Matching note: `Contains` / `StartsWith` / `EndsWith` compile to
/// case-insensitive `ILIKE` on the networked backend but case-sensitive
/// `LIKE` on the embedded backend. The asymmetry is inherited from the two
/// engines and deliberately not papered over.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, SqlValue),
    Ne(String, SqlValue),
    Gt(String, SqlValue),
    Gte(String, SqlValue),
    Lt(String, SqlValue),
    Lte(String, SqlValue),
    /// Column-to-column comparison, e.g. `quantity <= reorder_level`.
    LteCol(String, String),
    In(String, Vec<SqlValue>),
    NotIn(String, Vec<SqlValue>),
    Contains(String, String),
    StartsWith(String, String),
    EndsWith(String, String),
    IsNull(String),
    IsNotNull(String),
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Filter::Eq(column.into(), value.into())
    }

    pub fn ne(column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Filter::Ne(column.into(), value.into())
    }

    pub fn gt(column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Filter::Gt(column.into(), value.into())
    }

    pub fn gte(column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Filter::Gte(column.into(), value.into())
    }

    pub fn lt(column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Filter::Lt(column.into(), value.into())
    }

    pub fn lte(column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Filter::Lte(column.into(), value.into())
    }

    pub fn lte_col(column: impl Into<String>, other: impl Into<String>) -> Self {
        Filter::LteCol(column.into(), other.into())
    }

    pub fn is_in<V: Into<SqlValue>>(
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Filter::In(column.into(), values.into_iter().map(Into::into).collect())
    }

    pub fn not_in<V: Into<SqlValue>>(
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Filter::NotIn(column.into(), values.into_iter().map(Into::into).collect())
    }

    pub fn contains(column: impl Into<String>, needle: impl Into<String>) -> Self {
        Filter::Contains(column.into(), needle.into())
    }

    pub fn starts_with(column: impl Into<String>, needle: impl Into<String>) -> Self {
        Filter::StartsWith(column.into(), needle.into())
    }

    pub fn ends_with(column: impl Into<String>, needle: impl Into<String>) -> Self {
        Filter::EndsWith(column.into(), needle.into())
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Filter::IsNull(column.into())
    }

    pub fn is_not_null(column: impl Into<String>) -> Self {
        Filter::IsNotNull(column.into())
    }

    /// Conjunction, flattening nested `And`s.
    pub fn and(self, other: Filter) -> Self {
        match self {
            Filter::And(mut parts) => {
                parts.push(other);
                Filter::And(parts)
            }
            first => Filter::And(vec![first, other]),
        }
    }

    /// Disjunction, flattening nested `Or`s.
    pub fn or(self, other: Filter) -> Self {
        match self {
            Filter::Or(mut parts) => {
                parts.push(other);
                Filter::Or(parts)
            }
            first => Filter::Or(vec![first, other]),
        }
    }

    pub fn negate(self) -> Self {
        Filter::Not(Box::new(self))
    }
}

// =============================================================================
// Ordering
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDir {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub column: String,
    pub dir: OrderDir,
}

// =============================================================================
// Select
// =============================================================================

/// A read of zero or more rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub table: String,
    /// Empty means all columns.
    pub columns: Vec<String>,
    pub filter: Option<Filter>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl Select {
    pub fn from(table: impl Into<String>) -> Self {
        Select {
            table: table.into(),
            columns: Vec::new(),
            filter: None,
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Sets the predicate; ANDs with an existing one.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(filter),
            None => filter,
        });
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, dir: OrderDir) -> Self {
        self.order_by.push(OrderBy {
            column: column.into(),
            dir,
        });
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }
}

// =============================================================================
// Insert
// =============================================================================

/// A single-row insert.
#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    pub table: String,
    pub columns: Vec<String>,
    pub values: Vec<SqlValue>,
    /// Column used to re-read the row where `RETURNING` is unavailable.
    pub primary_key: String,
}

impl Insert {
    pub fn into(table: impl Into<String>) -> Self {
        Insert {
            table: table.into(),
            columns: Vec::new(),
            values: Vec::new(),
            primary_key: "id".to_string(),
        }
    }

    pub fn value(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.columns.push(column.into());
        self.values.push(value.into());
        self
    }

    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = column.into();
        self
    }

    /// The bound value of the primary-key column, if present.
    pub fn primary_key_value(&self) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|c| *c == self.primary_key)
            .map(|i| &self.values[i])
    }
}

// =============================================================================
// Update
// =============================================================================

/// A column assignment.
///
/// The arithmetic variants render as `col = col ± $n`, so two concurrent
/// writers adjusting the same counter never race through a read-modify-write
/// in application code.
#[derive(Debug, Clone, PartialEq)]
pub enum Assign {
    Set(SqlValue),
    Increment(SqlValue),
    Decrement(SqlValue),
    Multiply(SqlValue),
    Divide(SqlValue),
}

/// A filtered multi-column update.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub table: String,
    pub assignments: Vec<(String, Assign)>,
    pub filter: Option<Filter>,
}

impl Update {
    pub fn table(table: impl Into<String>) -> Self {
        Update {
            table: table.into(),
            assignments: Vec::new(),
            filter: None,
        }
    }

    pub fn set(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.assignments
            .push((column.into(), Assign::Set(value.into())));
        self
    }

    pub fn increment(mut self, column: impl Into<String>, by: impl Into<SqlValue>) -> Self {
        self.assignments
            .push((column.into(), Assign::Increment(by.into())));
        self
    }

    pub fn decrement(mut self, column: impl Into<String>, by: impl Into<SqlValue>) -> Self {
        self.assignments
            .push((column.into(), Assign::Decrement(by.into())));
        self
    }

    pub fn multiply(mut self, column: impl Into<String>, by: impl Into<SqlValue>) -> Self {
        self.assignments
            .push((column.into(), Assign::Multiply(by.into())));
        self
    }

    pub fn divide(mut self, column: impl Into<String>, by: impl Into<SqlValue>) -> Self {
        self.assignments
            .push((column.into(), Assign::Divide(by.into())));
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(filter),
            None => filter,
        });
        self
    }
}

// =============================================================================
// Delete
// =============================================================================

/// A filtered delete.
#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    pub table: String,
    pub filter: Option<Filter>,
}

impl Delete {
    pub fn from(table: impl Into<String>) -> Self {
        Delete {
            table: table.into(),
            filter: None,
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(filter),
            None => filter,
        });
        self
    }
}

// =============================================================================
// Aggregate
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFn {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFn {
    pub(crate) fn sql_name(&self) -> &'static str {
        match self {
            AggregateFn::Count => "COUNT",
            AggregateFn::Sum => "SUM",
            AggregateFn::Avg => "AVG",
            AggregateFn::Min => "MIN",
            AggregateFn::Max => "MAX",
        }
    }
}

/// One aggregated output column.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateColumn {
    pub function: AggregateFn,
    /// `*` is only valid with `Count`.
    pub column: String,
    pub alias: String,
}

/// An aggregation, optionally grouped.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub table: String,
    pub columns: Vec<AggregateColumn>,
    pub filter: Option<Filter>,
    pub group_by: Vec<String>,
}

impl Aggregate {
    pub fn over(table: impl Into<String>) -> Self {
        Aggregate {
            table: table.into(),
            columns: Vec::new(),
            filter: None,
            group_by: Vec::new(),
        }
    }

    pub fn count(self, alias: impl Into<String>) -> Self {
        self.apply(AggregateFn::Count, "*", alias)
    }

    pub fn sum(self, column: impl Into<String>, alias: impl Into<String>) -> Self {
        self.apply(AggregateFn::Sum, column, alias)
    }

    pub fn avg(self, column: impl Into<String>, alias: impl Into<String>) -> Self {
        self.apply(AggregateFn::Avg, column, alias)
    }

    pub fn min(self, column: impl Into<String>, alias: impl Into<String>) -> Self {
        self.apply(AggregateFn::Min, column, alias)
    }

    pub fn max(self, column: impl Into<String>, alias: impl Into<String>) -> Self {
        self.apply(AggregateFn::Max, column, alias)
    }

    pub fn apply(
        mut self,
        function: AggregateFn,
        column: impl Into<String>,
        alias: impl Into<String>,
    ) -> Self {
        self.columns.push(AggregateColumn {
            function,
            column: column.into(),
            alias: alias.into(),
        });
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(filter),
            None => filter,
        });
        self
    }

    pub fn group_by(mut self, column: impl Into<String>) -> Self {
        self.group_by.push(column.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_maps_to_null() {
        let v: SqlValue = Option::<String>::None.into();
        assert!(v.is_null());
        let v: SqlValue = Some("x").into();
        assert_eq!(v, SqlValue::Text("x".into()));
    }

    #[test]
    fn and_flattens() {
        let f = Filter::eq("a", 1i64)
            .and(Filter::eq("b", 2i64))
            .and(Filter::eq("c", 3i64));
        match f {
            Filter::And(parts) => assert_eq!(parts.len(), 3),
            other => panic!("expected And, got {other:?}"),
        }
    }

    #[test]
    fn select_filter_accumulates() {
        let s = Select::from("medicines")
            .filter(Filter::eq("category", "Analgesic"))
            .filter(Filter::gt("quantity", 0i64));
        match s.filter {
            Some(Filter::And(parts)) => assert_eq!(parts.len(), 2),
            other => panic!("expected And, got {other:?}"),
        }
    }

    #[test]
    fn insert_exposes_primary_key_value() {
        let q = Insert::into("branches")
            .value("id", "b1")
            .value("name", "Main");
        assert_eq!(q.primary_key_value(), Some(&SqlValue::Text("b1".into())));

        let q = Insert::into("settings").value("key", "k").primary_key("key");
        assert_eq!(q.primary_key_value(), Some(&SqlValue::Text("k".into())));
    }
}
