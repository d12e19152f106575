//! SQL compilation of store queries
//!
//! Relational adapters do not evaluate filters themselves; they compile the
//! [`StoreQuery`] into a parameterised statement and hand it to their driver.
//! Every literal becomes a bind parameter, and identifiers come from the
//! static resource schemas and are quoted for the dialect.
//!
//! # Example
//!
//! ```rust,ignore
//! use resource_engine::store::{Dialect, SqlCompiler, StoreQuery};
//!
//! let compiler = SqlCompiler::new(Dialect::Postgres, "shows");
//! let query = compiler.select(&StoreQuery::filtered(Some(filter)).limit(21))?;
//! sqlx::query_with(&query.sql, bind(query.params)).fetch_all(&pool).await?;
//! ```

use std::fmt::Write as _;

use super::{StoreError, StoreQuery, StoreResult};
use crate::query::{Filter, OrderBy, SortTarget};
use crate::resource::{Field, Resource, Value};

/// SQL flavour to emit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    /// Generic SQL using `?` placeholders
    #[default]
    Generic,
    /// SQLite-style `?` placeholders
    Sqlite,
    /// MySQL-style `?` placeholders with backtick quoting
    MySql,
    /// Postgres-style `$1, $2, ...` placeholders
    Postgres,
}

impl Dialect {
    fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${index}"),
            Dialect::Generic | Dialect::Sqlite | Dialect::MySql => "?".to_string(),
        }
    }

    fn quote_char(self) -> char {
        match self {
            Dialect::MySql => '`',
            Dialect::Generic | Dialect::Sqlite | Dialect::Postgres => '"',
        }
    }

    fn quote(self, identifier: &str) -> String {
        let quote = self.quote_char();
        let escaped = identifier.replace(quote, &format!("{quote}{quote}"));
        format!("{quote}{escaped}{quote}")
    }
}

/// A compiled statement and its bind parameters, in placeholder order
#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Compiles store queries against one table
#[derive(Debug, Clone)]
pub struct SqlCompiler {
    dialect: Dialect,
    table: String,
}

impl SqlCompiler {
    pub fn new(dialect: Dialect, table: impl Into<String>) -> Self {
        Self {
            dialect,
            table: table.into(),
        }
    }

    /// `SELECT *` with filter, ordering and limit
    ///
    /// # Errors
    ///
    /// [`StoreError::Unsupported`] when the filter holds an in-memory
    /// predicate, or uses a node the dialect has no form for.
    pub fn select<T: Resource>(&self, query: &StoreQuery<T>) -> StoreResult<SqlQuery> {
        let mut writer = Writer::new(self.dialect);
        write!(writer.sql, "SELECT * FROM {}", self.dialect.quote(&self.table)).ok();
        if let Some(filter) = &query.filter {
            writer.sql.push_str(" WHERE ");
            writer.filter(filter)?;
        }
        if let Some(order) = &query.order {
            writer.order(order)?;
        }
        if let Some(limit) = query.limit {
            write!(writer.sql, " LIMIT {}", limit).ok();
        }
        Ok(writer.finish())
    }

    /// `SELECT count(*)` with an optional filter
    pub fn count<T: Resource>(&self, filter: Option<&Filter<T>>) -> StoreResult<SqlQuery> {
        let mut writer = Writer::new(self.dialect);
        write!(writer.sql, "SELECT count(*) FROM {}", self.dialect.quote(&self.table)).ok();
        if let Some(filter) = filter {
            writer.sql.push_str(" WHERE ");
            writer.filter(filter)?;
        }
        Ok(writer.finish())
    }
}

struct Writer {
    dialect: Dialect,
    sql: String,
    params: Vec<Value>,
}

impl Writer {
    fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn finish(self) -> SqlQuery {
        SqlQuery {
            sql: self.sql,
            params: self.params,
        }
    }

    fn bind(&mut self, value: Value) -> String {
        self.params.push(value);
        self.dialect.placeholder(self.params.len())
    }

    fn column<T>(&self, field: &Field<T>) -> String {
        self.dialect.quote(field.column)
    }

    fn require_postgres(&self, what: &str) -> StoreResult<()> {
        if self.dialect == Dialect::Postgres {
            Ok(())
        } else {
            Err(StoreError::Unsupported(format!(
                "{} is only available for Postgres",
                what
            )))
        }
    }

    fn random_key<T: Resource>(&mut self, seed: u64) -> String {
        let seed = self.bind(Value::Text(seed.to_string()));
        let id = self.column(&T::schema().id_field());
        format!("md5({} || cast({} as text))", seed, id)
    }

    fn filter<T: Resource>(&mut self, filter: &Filter<T>) -> StoreResult<()> {
        match filter {
            Filter::And(a, b) | Filter::Or(a, b) => {
                let joiner = if matches!(filter, Filter::And(..)) {
                    " and "
                } else {
                    " or "
                };
                self.sql.push('(');
                self.filter(a)?;
                self.sql.push_str(joiner);
                self.filter(b)?;
                self.sql.push(')');
            }
            Filter::Not(inner) => {
                self.sql.push_str("not (");
                self.filter(inner)?;
                self.sql.push(')');
            }
            Filter::Eq(field, Value::Null) => {
                let column = self.column(field);
                write!(self.sql, "{} is null", column).ok();
            }
            Filter::Ne(field, Value::Null) => {
                let column = self.column(field);
                write!(self.sql, "{} is not null", column).ok();
            }
            Filter::Has(field, value) => {
                self.require_postgres("has")?;
                let column = self.column(field);
                let placeholder = self.bind(value.clone());
                write!(self.sql, "{} = any({})", placeholder, column).ok();
            }
            Filter::In(_, values) if values.is_empty() => self.sql.push_str("1 = 0"),
            Filter::In(field, values) => {
                let column = self.column(field);
                let placeholders: Vec<String> =
                    values.iter().map(|v| self.bind(v.clone())).collect();
                write!(self.sql, "{} in ({})", column, placeholders.join(", ")).ok();
            }
            Filter::Contains(fields, needle) => {
                let pattern = format!("%{}%", escape_like(&needle.to_lowercase()));
                let escape = if self.dialect == Dialect::MySql {
                    ""
                } else {
                    " escape '\\'"
                };
                let terms: Vec<String> = fields
                    .iter()
                    .map(|field| {
                        let column = self.column(field);
                        let placeholder = self.bind(Value::Text(pattern.clone()));
                        format!("lower({}) like {}{}", column, placeholder, escape)
                    })
                    .collect();
                if terms.is_empty() {
                    self.sql.push_str("1 = 0");
                } else {
                    write!(self.sql, "({})", terms.join(" or ")).ok();
                }
            }
            Filter::Random { seed, op, pivot } => {
                self.require_postgres("random ordering")?;
                let key = self.random_key::<T>(*seed);
                let seed = self.bind(Value::Text(seed.to_string()));
                let pivot = self.bind(Value::Text(pivot.to_string()));
                write!(
                    self.sql,
                    "{} {} md5({} || {})",
                    key,
                    op.as_sql(),
                    seed,
                    pivot
                )
                .ok();
            }
            Filter::Lambda(_) => {
                return Err(StoreError::Unsupported(
                    "in-memory predicates can not be compiled to SQL".to_string(),
                ))
            }
            leaf => {
                if let Some((field, op, value)) = leaf.comparison() {
                    let column = self.column(&field);
                    let placeholder = self.bind(value.clone());
                    write!(self.sql, "{} {} {}", column, op.as_sql(), placeholder).ok();
                }
            }
        }
        Ok(())
    }

    fn order<T: Resource>(&mut self, order: &OrderBy<T>) -> StoreResult<()> {
        let mut terms = Vec::new();
        for key in order.keys() {
            let direction = if key.descending { "desc" } else { "asc" };
            match key.target {
                SortTarget::Random(seed) => {
                    self.require_postgres("random ordering")?;
                    let expression = self.random_key::<T>(seed);
                    terms.push(format!("{} {}", expression, direction));
                }
                SortTarget::Field(field) => {
                    let column = self.column(&field);
                    let nulls = if key.nulls_first { "first" } else { "last" };
                    if !field.nullable {
                        terms.push(format!("{} {}", column, direction));
                    } else if self.dialect == Dialect::MySql {
                        let null_rank = if key.nulls_first { "desc" } else { "asc" };
                        terms.push(format!("{} is null {}", column, null_rank));
                        terms.push(format!("{} {}", column, direction));
                    } else {
                        terms.push(format!("{} {} nulls {}", column, direction, nulls));
                    }
                }
            }
        }
        write!(self.sql, " ORDER BY {}", terms.join(", ")).ok();
        Ok(())
    }
}

fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::filter::tests::Book;
    use crate::query::Sort;

    fn field(name: &str) -> Field<Book> {
        Book::schema().field(name).unwrap()
    }

    #[test]
    fn test_postgres_select_with_order_and_limit() {
        let filter = Filter::<Book>::parse("pages gt 10 and title eq \"x\"").unwrap();
        let query = StoreQuery::filtered(Some(filter))
            .ordered(Sort::by_desc(field("pages")).compile())
            .limit(11);
        let compiled = SqlCompiler::new(Dialect::Postgres, "books").select(&query).unwrap();

        assert_eq!(
            compiled.sql,
            "SELECT * FROM \"books\" WHERE (\"pages\" > $1 and \"title\" = $2) \
             ORDER BY \"pages\" desc nulls last, \"id\" desc LIMIT 11"
        );
        assert_eq!(compiled.params, vec![Value::Int(10), Value::from("x")]);
    }

    #[test]
    fn test_null_comparisons_become_is_null() {
        let filter = Filter::or([
            Some(Filter::Eq(field("pages"), Value::Null)),
            Some(Filter::Ne(field("title"), Value::Null).negate()),
        ]);
        let compiled = SqlCompiler::new(Dialect::Sqlite, "books")
            .count(filter.as_ref())
            .unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT count(*) FROM \"books\" WHERE (\"pages\" is null or not (\"title\" is not null))"
        );
        assert!(compiled.params.is_empty());
    }

    #[test]
    fn test_mysql_quoting_and_in_list() {
        let filter = Filter::In(field("id"), vec![Value::Int(1), Value::Int(2)]);
        let query = StoreQuery::filtered(Some(filter)).ordered(Sort::by(field("pages")).compile());
        let compiled = SqlCompiler::new(Dialect::MySql, "books").select(&query).unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT * FROM `books` WHERE `id` in (?, ?) \
             ORDER BY `pages` is null asc, `pages` asc, `id` asc"
        );
    }

    #[test]
    fn test_contains_escapes_wildcards() {
        let filter = Filter::contains(vec![field("title")], "100%");
        let compiled = SqlCompiler::new(Dialect::Postgres, "books")
            .count(Some(&filter))
            .unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT count(*) FROM \"books\" WHERE (lower(\"title\") like $1 escape '\\')"
        );
        assert_eq!(compiled.params, vec![Value::from("%100\\%%")]);
    }

    #[test]
    fn test_unsupported_nodes() {
        let lambda = Filter::<Book>::lambda(|_| true);
        assert!(matches!(
            SqlCompiler::new(Dialect::Postgres, "books").count(Some(&lambda)),
            Err(StoreError::Unsupported(_))
        ));

        let has = Filter::Has(field("tags"), Value::from("drama"));
        assert!(SqlCompiler::new(Dialect::Postgres, "books")
            .count(Some(&has))
            .is_ok());
        assert!(matches!(
            SqlCompiler::new(Dialect::Sqlite, "books").count(Some(&has)),
            Err(StoreError::Unsupported(_))
        ));
    }

    #[test]
    fn test_random_order_uses_seeded_hash() {
        let query = StoreQuery::<Book>::all().ordered(Sort::Random { seed: 7 }.compile());
        let compiled = SqlCompiler::new(Dialect::Postgres, "books").select(&query).unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT * FROM \"books\" ORDER BY md5($1 || cast(\"id\" as text)) asc, \"id\" asc"
        );
        assert_eq!(compiled.params, vec![Value::from("7")]);
    }
}
