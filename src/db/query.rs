//! Parameterized statement construction.
//!
//! Table and column names are interpolated verbatim. Only pass identifiers
//! known at compile time; user input must travel through the argument list.

#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Text(String),
    Integer(i64),
    Bool(bool),
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Integer(value)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Bool(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// A statement with one `?` marker per argument.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub sql: String,
    pub args: Vec<SqlValue>,
    returns_rows: bool,
}

impl Query {
    pub fn new(sql: impl Into<String>, args: Vec<SqlValue>) -> Self {
        Self {
            sql: sql.into(),
            args,
            returns_rows: false,
        }
    }

    /// A statement without arguments, such as DDL.
    pub fn raw(sql: impl Into<String>) -> Self {
        Self::new(sql, Vec::new())
    }

    pub fn returning(mut self, columns: &[&str]) -> Self {
        self.sql = format!("{} RETURNING {}", self.sql, columns.join(", "));
        self.returns_rows = true;
        self
    }

    pub fn returns_rows(&self) -> bool {
        self.returns_rows
    }
}

pub fn insert<K, V>(table: &str, data: impl IntoIterator<Item = (K, V)>) -> Query
where
    K: AsRef<str>,
    V: Into<SqlValue>,
{
    let (columns, args): (Vec<String>, Vec<SqlValue>) = data
        .into_iter()
        .map(|(column, value)| (column.as_ref().to_string(), value.into()))
        .unzip();
    let placeholders = vec!["?"; args.len()].join(", ");

    Query::new(
        format!(
            "INSERT INTO {table} ({}) VALUES ({placeholders})",
            columns.join(", ")
        ),
        args,
    )
}

pub fn select(table: &str, columns: &[&str], limit: Option<u32>) -> Query {
    let sql = format!("SELECT {} FROM {table}", columns.join(", "));
    with_limit(sql, limit)
}

/// Like [`select`], newest rows first by `order_column`.
pub fn select_recent(table: &str, columns: &[&str], order_column: &str, limit: Option<u32>) -> Query {
    let sql = format!(
        "SELECT {} FROM {table} ORDER BY {order_column} DESC",
        columns.join(", ")
    );
    with_limit(sql, limit)
}

fn with_limit(sql: String, limit: Option<u32>) -> Query {
    let mut query = match limit {
        Some(limit) => Query::new(
            format!("{sql} LIMIT ?"),
            vec![SqlValue::Integer(i64::from(limit))],
        ),
        None => Query::new(sql, Vec::new()),
    };
    query.returns_rows = true;
    query
}
