//! # SQL Translator
//!
//! Renders the declarative query model into backend-correct SQL.
//!
//! ## Dialect Differences
//! ```text
//! ┌──────────────────────┬──────────────────────┬───────────────────────────┐
//! │                      │ Embedded (SQLite)    │ Networked (PostgreSQL)    │
//! ├──────────────────────┼──────────────────────┼───────────────────────────┤
//! │ Placeholders         │ ?1 ?2 ?3 (ordinal)   │ $1 $2 $3 (positional)     │
//! │ Substring match      │ LIKE (case sens.)    │ ILIKE (case insens.)      │
//! │ INSERT ... RETURNING │ emulated (re-SELECT) │ native RETURNING *        │
//! │ Timestamps           │ TEXT, RFC 3339 (Z)   │ TIMESTAMPTZ               │
//! └──────────────────────┴──────────────────────┴───────────────────────────┘
//! ```
//!
//! The substring-match asymmetry is inherited from the engines and surfaced
//! in the query-model docs rather than papered over with `LOWER()` wrapping.

use crate::error::{DbError, DbResult};
use crate::query::{
    Aggregate, AggregateFn, Assign, Delete, Filter, Insert, OrderDir, Select, SqlValue, Update,
};

// =============================================================================
// Dialect
// =============================================================================

/// Which SQL flavor to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Embedded file backend (SQLite).
    Sqlite,
    /// Networked pool backend (PostgreSQL).
    Postgres,
}

impl Dialect {
    /// The substring-match operator for Contains/StartsWith/EndsWith.
    fn like_op(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "LIKE",
            Dialect::Postgres => "ILIKE",
        }
    }

    /// Whether `INSERT ... RETURNING *` is rendered natively.
    pub fn supports_returning(&self) -> bool {
        matches!(self, Dialect::Postgres)
    }
}

// =============================================================================
// Statement
// =============================================================================

/// A rendered statement: SQL text plus its bind parameters, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

/// Accumulates SQL text and bind parameters.
struct SqlWriter {
    dialect: Dialect,
    sql: String,
    params: Vec<SqlValue>,
}

impl SqlWriter {
    fn new(dialect: Dialect) -> Self {
        SqlWriter {
            dialect,
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push(&mut self, text: &str) {
        self.sql.push_str(text);
    }

    /// Appends a placeholder and queues the value for binding.
    fn bind(&mut self, value: SqlValue) {
        self.params.push(value);
        let n = self.params.len();
        match self.dialect {
            Dialect::Sqlite => self.sql.push_str(&format!("?{n}")),
            Dialect::Postgres => self.sql.push_str(&format!("${n}")),
        }
    }

    fn finish(self) -> Statement {
        Statement {
            sql: self.sql,
            params: self.params,
        }
    }
}

// =============================================================================
// Identifiers
// =============================================================================

/// Validates and quotes a table/column name.
///
/// Only `[A-Za-z_][A-Za-z0-9_]*` up to 64 chars is accepted; anything else is
/// a typed error, never interpolated into SQL.
fn quote_ident(name: &str) -> DbResult<String> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if !valid || name.len() > 64 {
        return Err(DbError::InvalidIdentifier(name.to_string()));
    }
    Ok(format!("\"{name}\""))
}

/// Escapes LIKE wildcards in a user-supplied needle.
///
/// The pattern itself still travels as a bind parameter; only `%`, `_` and
/// the escape character need neutralizing so a needle of `50%` matches
/// literally.
fn escape_like(needle: &str) -> String {
    let mut out = String::with_capacity(needle.len());
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

// =============================================================================
// Filter rendering
// =============================================================================

fn render_comparison(
    w: &mut SqlWriter,
    column: &str,
    op: &str,
    value: &SqlValue,
) -> DbResult<()> {
    w.push(&quote_ident(column)?);
    w.push(" ");
    w.push(op);
    w.push(" ");
    w.bind(value.clone());
    Ok(())
}

fn render_like(w: &mut SqlWriter, column: &str, pattern: String) -> DbResult<()> {
    w.push(&quote_ident(column)?);
    w.push(" ");
    w.push(w.dialect.like_op());
    w.push(" ");
    w.bind(SqlValue::Text(pattern));
    w.push(" ESCAPE '\\'");
    Ok(())
}

fn render_filter(w: &mut SqlWriter, filter: &Filter) -> DbResult<()> {
    match filter {
        Filter::Eq(c, SqlValue::Null) => {
            // `= NULL` never matches; normalize to IS NULL.
            w.push(&quote_ident(c)?);
            w.push(" IS NULL");
        }
        Filter::Ne(c, SqlValue::Null) => {
            w.push(&quote_ident(c)?);
            w.push(" IS NOT NULL");
        }
        Filter::Eq(c, v) => render_comparison(w, c, "=", v)?,
        Filter::Ne(c, v) => render_comparison(w, c, "<>", v)?,
        Filter::Gt(c, v) => render_comparison(w, c, ">", v)?,
        Filter::Gte(c, v) => render_comparison(w, c, ">=", v)?,
        Filter::Lt(c, v) => render_comparison(w, c, "<", v)?,
        Filter::Lte(c, v) => render_comparison(w, c, "<=", v)?,

        Filter::LteCol(c, other) => {
            w.push(&quote_ident(c)?);
            w.push(" <= ");
            w.push(&quote_ident(other)?);
        }

        Filter::In(c, values) if values.is_empty() => {
            // IN () is a syntax error on both backends; an empty set matches
            // nothing.
            let _ = quote_ident(c)?;
            w.push("1 = 0");
        }
        Filter::NotIn(c, values) if values.is_empty() => {
            let _ = quote_ident(c)?;
            w.push("1 = 1");
        }
        Filter::In(c, values) | Filter::NotIn(c, values) => {
            w.push(&quote_ident(c)?);
            if matches!(filter, Filter::NotIn(..)) {
                w.push(" NOT");
            }
            w.push(" IN (");
            for (i, v) in values.iter().enumerate() {
                if i > 0 {
                    w.push(", ");
                }
                w.bind(v.clone());
            }
            w.push(")");
        }

        Filter::Contains(c, needle) => {
            render_like(w, c, format!("%{}%", escape_like(needle)))?
        }
        Filter::StartsWith(c, needle) => {
            render_like(w, c, format!("{}%", escape_like(needle)))?
        }
        Filter::EndsWith(c, needle) => render_like(w, c, format!("%{}", escape_like(needle)))?,

        Filter::IsNull(c) => {
            w.push(&quote_ident(c)?);
            w.push(" IS NULL");
        }
        Filter::IsNotNull(c) => {
            w.push(&quote_ident(c)?);
            w.push(" IS NOT NULL");
        }

        Filter::And(parts) | Filter::Or(parts) => {
            if parts.is_empty() {
                w.push("1 = 1");
            } else {
                let joiner = if matches!(filter, Filter::And(_)) {
                    " AND "
                } else {
                    " OR "
                };
                w.push("(");
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        w.push(joiner);
                    }
                    render_filter(w, part)?;
                }
                w.push(")");
            }
        }

        Filter::Not(inner) => {
            w.push("NOT (");
            render_filter(w, inner)?;
            w.push(")");
        }
    }
    Ok(())
}

fn render_where(w: &mut SqlWriter, filter: &Option<Filter>) -> DbResult<()> {
    if let Some(filter) = filter {
        w.push(" WHERE ");
        render_filter(w, filter)?;
    }
    Ok(())
}

fn render_limit_offset(w: &mut SqlWriter, limit: Option<u64>, offset: Option<u64>) {
    match (limit, offset, w.dialect) {
        (None, None, _) => {}
        (Some(l), None, _) => w.push(&format!(" LIMIT {l}")),
        (Some(l), Some(o), _) => w.push(&format!(" LIMIT {l} OFFSET {o}")),
        // SQLite refuses a bare OFFSET; -1 means unlimited.
        (None, Some(o), Dialect::Sqlite) => w.push(&format!(" LIMIT -1 OFFSET {o}")),
        (None, Some(o), Dialect::Postgres) => w.push(&format!(" OFFSET {o}")),
    }
}

// =============================================================================
// Statements
// =============================================================================

pub fn render_select(dialect: Dialect, q: &Select) -> DbResult<Statement> {
    let mut w = SqlWriter::new(dialect);
    w.push("SELECT ");
    if q.columns.is_empty() {
        w.push("*");
    } else {
        for (i, c) in q.columns.iter().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            let quoted = quote_ident(c)?;
            w.push(&quoted);
        }
    }
    w.push(" FROM ");
    let table = quote_ident(&q.table)?;
    w.push(&table);
    render_where(&mut w, &q.filter)?;

    if !q.order_by.is_empty() {
        w.push(" ORDER BY ");
        for (i, o) in q.order_by.iter().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            let quoted = quote_ident(&o.column)?;
            w.push(&quoted);
            w.push(match o.dir {
                OrderDir::Asc => " ASC",
                OrderDir::Desc => " DESC",
            });
        }
    }
    render_limit_offset(&mut w, q.limit, q.offset);
    Ok(w.finish())
}

pub fn render_insert(dialect: Dialect, q: &Insert, returning: bool) -> DbResult<Statement> {
    if q.columns.is_empty() {
        return Err(DbError::EmptyInsert {
            table: q.table.clone(),
        });
    }
    let mut w = SqlWriter::new(dialect);
    w.push("INSERT INTO ");
    let table = quote_ident(&q.table)?;
    w.push(&table);
    w.push(" (");
    for (i, c) in q.columns.iter().enumerate() {
        if i > 0 {
            w.push(", ");
        }
        let quoted = quote_ident(c)?;
        w.push(&quoted);
    }
    w.push(") VALUES (");
    for (i, v) in q.values.iter().enumerate() {
        if i > 0 {
            w.push(", ");
        }
        w.bind(v.clone());
    }
    w.push(")");
    if returning && dialect.supports_returning() {
        w.push(" RETURNING *");
    }
    Ok(w.finish())
}

pub fn render_update(dialect: Dialect, q: &Update) -> DbResult<Statement> {
    if q.assignments.is_empty() {
        return Err(DbError::EmptyUpdate {
            table: q.table.clone(),
        });
    }
    let mut w = SqlWriter::new(dialect);
    w.push("UPDATE ");
    let table = quote_ident(&q.table)?;
    w.push(&table);
    w.push(" SET ");
    for (i, (column, assign)) in q.assignments.iter().enumerate() {
        if i > 0 {
            w.push(", ");
        }
        let quoted = quote_ident(column)?;
        w.push(&quoted);
        w.push(" = ");
        match assign {
            Assign::Set(v) => w.bind(v.clone()),
            Assign::Increment(v) | Assign::Decrement(v) | Assign::Multiply(v)
            | Assign::Divide(v) => {
                w.push(&quoted);
                w.push(match assign {
                    Assign::Increment(_) => " + ",
                    Assign::Decrement(_) => " - ",
                    Assign::Multiply(_) => " * ",
                    Assign::Divide(_) => " / ",
                    Assign::Set(_) => unreachable!(),
                });
                w.bind(v.clone());
            }
        }
    }
    render_where(&mut w, &q.filter)?;
    Ok(w.finish())
}

pub fn render_delete(dialect: Dialect, q: &Delete) -> DbResult<Statement> {
    let mut w = SqlWriter::new(dialect);
    w.push("DELETE FROM ");
    let table = quote_ident(&q.table)?;
    w.push(&table);
    render_where(&mut w, &q.filter)?;
    Ok(w.finish())
}

pub fn render_aggregate(dialect: Dialect, q: &Aggregate) -> DbResult<Statement> {
    let mut w = SqlWriter::new(dialect);
    w.push("SELECT ");
    let mut first = true;
    for g in &q.group_by {
        if !first {
            w.push(", ");
        }
        first = false;
        let quoted = quote_ident(g)?;
        w.push(&quoted);
    }
    for a in &q.columns {
        if !first {
            w.push(", ");
        }
        first = false;
        w.push(a.function.sql_name());
        w.push("(");
        if a.column == "*" {
            if a.function != AggregateFn::Count {
                return Err(DbError::InvalidIdentifier("*".to_string()));
            }
            w.push("*");
        } else {
            let quoted = quote_ident(&a.column)?;
            w.push(&quoted);
        }
        w.push(") AS ");
        let alias = quote_ident(&a.alias)?;
        w.push(&alias);
    }
    w.push(" FROM ");
    let table = quote_ident(&q.table)?;
    w.push(&table);
    render_where(&mut w, &q.filter)?;
    if !q.group_by.is_empty() {
        w.push(" GROUP BY ");
        for (i, g) in q.group_by.iter().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            let quoted = quote_ident(g)?;
            w.push(&quoted);
        }
    }
    Ok(w.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Filter;

    #[test]
    fn placeholder_styles_differ() {
        let q = Select::from("medicines").filter(Filter::eq("id", "m1"));
        let s = render_select(Dialect::Sqlite, &q).unwrap();
        assert_eq!(s.sql, r#"SELECT * FROM "medicines" WHERE "id" = ?1"#);
        let p = render_select(Dialect::Postgres, &q).unwrap();
        assert_eq!(p.sql, r#"SELECT * FROM "medicines" WHERE "id" = $1"#);
        assert_eq!(s.params, p.params);
    }

    #[test]
    fn explicit_column_list_is_quoted() {
        let q = Select::from("users")
            .columns(&["id", "name", "email"])
            .order_by("name", OrderDir::Asc);
        let s = render_select(Dialect::Sqlite, &q).unwrap();
        assert_eq!(
            s.sql,
            r#"SELECT "id", "name", "email" FROM "users" ORDER BY "name" ASC"#
        );
    }

    #[test]
    fn substring_match_dialect_asymmetry() {
        let q = Select::from("medicines").filter(Filter::contains("name", "cillin"));
        let s = render_select(Dialect::Sqlite, &q).unwrap();
        assert!(s.sql.contains(r#""name" LIKE ?1 ESCAPE '\'"#), "{}", s.sql);
        let p = render_select(Dialect::Postgres, &q).unwrap();
        assert!(p.sql.contains(r#""name" ILIKE $1 ESCAPE '\'"#), "{}", p.sql);
        assert_eq!(s.params, vec![SqlValue::Text("%cillin%".into())]);
    }

    #[test]
    fn like_wildcards_are_escaped() {
        let q = Select::from("medicines").filter(Filter::starts_with("name", "50%_x"));
        let s = render_select(Dialect::Sqlite, &q).unwrap();
        assert_eq!(s.params, vec![SqlValue::Text(r"50\%\_x%".into())]);
    }

    #[test]
    fn empty_in_never_matches() {
        let q = Select::from("users").filter(Filter::is_in("id", Vec::<String>::new()));
        let s = render_select(Dialect::Postgres, &q).unwrap();
        assert!(s.sql.ends_with("WHERE 1 = 0"));
        assert!(s.params.is_empty());
    }

    #[test]
    fn boolean_composition_parenthesizes() {
        let f = Filter::eq("a", 1i64)
            .and(Filter::eq("b", 2i64))
            .or(Filter::eq("c", 3i64).negate());
        let q = Select::from("t").filter(f);
        let s = render_select(Dialect::Sqlite, &q).unwrap();
        assert_eq!(
            s.sql,
            r#"SELECT * FROM "t" WHERE (("a" = ?1 AND "b" = ?2) OR NOT ("c" = ?3))"#
        );
    }

    #[test]
    fn eq_null_normalizes_to_is_null() {
        let q = Select::from("t").filter(Filter::eq("deleted_at", SqlValue::Null));
        let s = render_select(Dialect::Postgres, &q).unwrap();
        assert!(s.sql.ends_with(r#""deleted_at" IS NULL"#));
        assert!(s.params.is_empty());
    }

    #[test]
    fn returning_only_on_postgres() {
        let q = Insert::into("branches").value("id", "b1").value("name", "Main");
        let p = render_insert(Dialect::Postgres, &q, true).unwrap();
        assert!(p.sql.ends_with("RETURNING *"));
        let s = render_insert(Dialect::Sqlite, &q, true).unwrap();
        assert!(!s.sql.contains("RETURNING"));
    }

    #[test]
    fn atomic_mutators_reference_the_column() {
        let q = Update::table("medicines")
            .decrement("quantity", 3i64)
            .set("updated_at", "2026-01-01T00:00:00Z")
            .filter(Filter::eq("id", "m1"));
        let s = render_update(Dialect::Postgres, &q).unwrap();
        assert_eq!(
            s.sql,
            r#"UPDATE "medicines" SET "quantity" = "quantity" - $1, "updated_at" = $2 WHERE "id" = $3"#
        );

        let q = Update::table("medicines")
            .multiply("selling_price", 1.1)
            .divide("cost_price", 2.0)
            .increment("reorder_level", 1i64);
        let s = render_update(Dialect::Sqlite, &q).unwrap();
        assert_eq!(
            s.sql,
            r#"UPDATE "medicines" SET "selling_price" = "selling_price" * ?1, "cost_price" = "cost_price" / ?2, "reorder_level" = "reorder_level" + ?3"#
        );
    }

    #[test]
    fn aggregate_with_group_by() {
        let q = Aggregate::over("sales")
            .sum("total", "revenue")
            .count("n")
            .filter(Filter::eq("status", "COMPLETED"))
            .group_by("branch_id");
        let s = render_aggregate(Dialect::Postgres, &q).unwrap();
        assert_eq!(
            s.sql,
            r#"SELECT "branch_id", SUM("total") AS "revenue", COUNT(*) AS "n" FROM "sales" WHERE "status" = $1 GROUP BY "branch_id""#
        );
    }

    #[test]
    fn hostile_identifiers_are_rejected() {
        for bad in ["1col", "col name", "a;drop table x", "a\"b", ""] {
            let q = Select::from("t").filter(Filter::eq(bad, 1i64));
            assert!(
                render_select(Dialect::Sqlite, &q).is_err(),
                "{bad:?} should be rejected"
            );
        }
        let q = Select::from("users; --");
        assert!(render_select(Dialect::Postgres, &q).is_err());
    }

    #[test]
    fn offset_without_limit_is_valid_sqlite() {
        let q = Select::from("t").offset(10);
        let s = render_select(Dialect::Sqlite, &q).unwrap();
        assert!(s.sql.ends_with("LIMIT -1 OFFSET 10"));
        let p = render_select(Dialect::Postgres, &q).unwrap();
        assert!(p.sql.ends_with("OFFSET 10"));
    }
}
