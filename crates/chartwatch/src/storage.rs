//! Relational storage for the static and dynamic tables.
//!
//! `StorageGateway` is the narrow execute/commit surface the reconciler writes
//! through; `SqliteGateway` implements it on an embedded SQLite database.

use std::path::Path;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::{TrackerError, TrackerResult};

/// The fixed statement shapes issued against the two tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Statement {
    /// `(id, name, url, image_url)`
    InsertStatic,
    /// `(id, price, timestamp)`, replacing on key conflict.
    ReplaceDynamic,
    ClearStatic,
    ClearDynamic,
}

impl Statement {
    pub fn sql(self) -> &'static str {
        match self {
            Statement::InsertStatic => {
                "INSERT INTO static (id, name, url, image_url) VALUES (?1, ?2, ?3, ?4)"
            }
            Statement::ReplaceDynamic => {
                "REPLACE INTO dynamic (id, price, timestamp) VALUES (?1, ?2, ?3)"
            }
            Statement::ClearStatic => "DELETE FROM static",
            Statement::ClearDynamic => "DELETE FROM dynamic",
        }
    }

    /// Number of bound parameters the statement expects.
    pub fn arity(self) -> usize {
        match self {
            Statement::InsertStatic => 4,
            Statement::ReplaceDynamic => 3,
            Statement::ClearStatic | Statement::ClearDynamic => 0,
        }
    }
}

/// Primary key of the dynamic table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DynamicKeying {
    /// `PRIMARY KEY (id)`: each observation replaces the previous one.
    #[default]
    LatestOnly,
    /// `PRIMARY KEY (id, timestamp)`: observations accumulate.
    History,
}

impl DynamicKeying {
    fn dynamic_table_sql(self) -> &'static str {
        match self {
            DynamicKeying::LatestOnly => {
                "CREATE TABLE IF NOT EXISTS dynamic (
                    id VARCHAR(100) PRIMARY KEY,
                    price TEXT,
                    timestamp VARCHAR(100)
                );"
            }
            DynamicKeying::History => {
                "CREATE TABLE IF NOT EXISTS dynamic (
                    id VARCHAR(100) NOT NULL,
                    price TEXT,
                    timestamp VARCHAR(100) NOT NULL,
                    PRIMARY KEY (id, timestamp)
                );"
            }
        }
    }
}

const STATIC_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS static (
    id VARCHAR(100) PRIMARY KEY,
    name VARCHAR(100),
    url VARCHAR(100),
    image_url VARCHAR(2000)
);";

/// A persisted row of the static table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticRow {
    pub id: String,
    pub name: String,
    pub url: String,
    pub image_url: String,
}

/// A persisted row of the dynamic table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicRow {
    pub id: String,
    /// Decimal string exactly as extracted.
    pub price: String,
    pub timestamp: String,
}

/// Execute/commit access to the two tables.
pub trait StorageGateway {
    fn begin(&mut self) -> TrackerResult<()>;
    /// Run one of the fixed statements, returning the number of affected rows.
    fn execute(&mut self, statement: Statement, params: &[&str]) -> TrackerResult<usize>;
    fn commit(&mut self) -> TrackerResult<()>;
    fn rollback(&mut self) -> TrackerResult<()>;
}

/// Gateway backed by a SQLite connection.
pub struct SqliteGateway {
    conn: Connection,
    keying: DynamicKeying,
}

impl SqliteGateway {
    /// Open or create the database file and ensure both tables exist.
    pub fn open(path: &Path, keying: DynamicKeying) -> TrackerResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                TrackerError::Storage(format!(
                    "failed to create directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
        let conn = Connection::open(path)?;
        info!("Opened database {}", path.display());
        Self::with_connection(conn, keying)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory(keying: DynamicKeying) -> TrackerResult<Self> {
        Self::with_connection(Connection::open_in_memory()?, keying)
    }

    fn with_connection(conn: Connection, keying: DynamicKeying) -> TrackerResult<Self> {
        let gateway = Self { conn, keying };
        gateway.ensure_schema()?;
        Ok(gateway)
    }

    fn ensure_schema(&self) -> TrackerResult<()> {
        self.conn.execute_batch(STATIC_TABLE_SQL)?;
        self.conn.execute_batch(self.keying.dynamic_table_sql())?;

        let on_disk = self.dynamic_keying_on_disk()?;
        if on_disk != self.keying {
            return Err(TrackerError::Config(format!(
                "dynamic table was created with {on_disk:?} keying but {:?} was requested",
                self.keying
            )));
        }
        Ok(())
    }

    /// Keying of the existing dynamic table, read from its primary key columns.
    fn dynamic_keying_on_disk(&self) -> TrackerResult<DynamicKeying> {
        let mut stmt = self.conn.prepare("PRAGMA table_info(dynamic)")?;
        let key_columns = stmt
            .query_map([], |row| row.get::<_, i64>(5))?
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .filter(|pk| *pk > 0)
            .count();
        match key_columns {
            1 => Ok(DynamicKeying::LatestOnly),
            2 => Ok(DynamicKeying::History),
            n => Err(TrackerError::Storage(format!(
                "dynamic table has an unexpected primary key ({n} columns)"
            ))),
        }
    }

    pub fn keying(&self) -> DynamicKeying {
        self.keying
    }

    /// All static rows ordered by id.
    pub fn static_rows(&self) -> TrackerResult<Vec<StaticRow>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, url, image_url FROM static ORDER BY id")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(StaticRow {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    url: row.get(2)?,
                    image_url: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// All dynamic rows ordered by id, then timestamp.
    pub fn dynamic_rows(&self) -> TrackerResult<Vec<DynamicRow>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, price, timestamp FROM dynamic ORDER BY id, timestamp")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(DynamicRow {
                    id: row.get(0)?,
                    price: row.get(1)?,
                    timestamp: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Close the connection, surfacing any error SQLite reports on close.
    pub fn close(self) -> TrackerResult<()> {
        self.conn.close().map_err(|(_, e)| TrackerError::from(e))
    }
}

impl StorageGateway for SqliteGateway {
    fn begin(&mut self) -> TrackerResult<()> {
        self.conn.execute_batch("BEGIN")?;
        Ok(())
    }

    fn execute(&mut self, statement: Statement, params: &[&str]) -> TrackerResult<usize> {
        if params.len() != statement.arity() {
            return Err(TrackerError::Storage(format!(
                "{statement:?} expects {} parameters, got {}",
                statement.arity(),
                params.len()
            )));
        }
        let mut stmt = self.conn.prepare_cached(statement.sql())?;
        Ok(stmt.execute(rusqlite::params_from_iter(params.iter()))?)
    }

    fn commit(&mut self) -> TrackerResult<()> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&mut self) -> TrackerResult<()> {
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }
}
