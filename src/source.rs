//! Lectura de tablas SQLite como registros de origen.

use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use regex::Regex;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, OpenFlags};
use serde_json::{Number, Value};
use thiserror::Error;
use tracing::{debug, info};

use crate::models::{value_to_doc_id, Fields, Record};
use crate::store::FieldFilter;

lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
}

/// Columna usada como id de documento
pub const PRIMARY_KEY: &str = "id";

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("'{0}' is not a valid table or column name")]
    InvalidIdentifier(String),
    #[error("database file {0} does not exist")]
    MissingFile(PathBuf),
}

pub struct SqliteSource {
    conn: Connection,
}

impl SqliteSource {
    /// Opens an existing database read-only
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        if !path.is_file() {
            return Err(SourceError::MissingFile(path.to_path_buf()));
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        info!("Conectado a SQLite: {}", path.display());
        Ok(Self { conn })
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    pub fn table_exists(&self, table: &str) -> Result<bool, SourceError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// All rows of `table`, optionally restricted to `column = value`, in
    /// rowid order
    pub fn fetch_table(
        &self,
        table: &str,
        filter: Option<&FieldFilter>,
    ) -> Result<Vec<Record>, SourceError> {
        let table = checked_identifier(table)?;
        let mut sql = format!("SELECT * FROM \"{}\"", table);
        let mut params = Vec::new();
        if let Some(filter) = filter {
            let column = checked_identifier(&filter.field)?;
            sql.push_str(&format!(" WHERE \"{}\" = ?1", column));
            params.push(json_to_sql(&filter.value));
        }
        debug!("{}", sql);

        let mut stmt = self.conn.prepare(&sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.query(params_from_iter(params))?;

        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let mut fields = Fields::new();
            for (i, column) in columns.iter().enumerate() {
                fields.insert(column.clone(), sql_to_json(row.get_ref(i)?));
            }
            let id = fields
                .get(PRIMARY_KEY)
                .and_then(value_to_doc_id)
                .unwrap_or_else(|| format!("{}#{}", table, records.len() + 1));
            records.push(Record::new(id, fields));
        }
        Ok(records)
    }
}

fn checked_identifier(name: &str) -> Result<&str, SourceError> {
    if IDENTIFIER.is_match(name) {
        Ok(name)
    } else {
        Err(SourceError::InvalidIdentifier(name.to_string()))
    }
}

fn sql_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
    }
}

fn json_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}
