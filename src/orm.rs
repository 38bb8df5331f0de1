//! Minimal async ORM (sqlite + sqlx)
//!
//! Usage:
//! let db = Db::connect("sqlite::memory:").await?;
//! db.execute("CREATE TABLE ...").await?;
//! db.fetch_all("SELECT ...").await?
//!
//! Models describe their table through [`Model`] and register a [`Migration`] with
//! `inventory`; [`Resource`] adds generic create/read/update/delete on top.
pub use futures::future::BoxFuture;
use log::{debug, info};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
pub use sqlx::FromRow;
use sqlx::query::QueryAs;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Executor, Row, Sqlite, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;
use validator::Validate;

use crate::error::{AppError, Result};

/// An async database pool wrapper.
#[derive(Clone)]
pub struct Db {
    pool: SqlitePool,
}

pub struct Migration(pub MigrationFn);

impl std::ops::Deref for Migration {
    type Target = MigrationFn;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Migration function pointer for a model.
pub type MigrationFn = fn(Arc<Db>) -> BoxFuture<'static, std::result::Result<(), sqlx::Error>>;

const MIGRATIONS_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS __schema_migrations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    table_name TEXT UNIQUE NOT NULL,
    schema_sql TEXT NOT NULL,
    hash TEXT NOT NULL,
    applied_at DATETIME DEFAULT CURRENT_TIMESTAMP
)";

#[async_trait::async_trait]
pub trait Model: Send + Sync {
    fn table_name() -> &'static str;
    fn create_table_sql() -> String;
    /// Non-key columns with their SQL types, in insert order.
    fn columns() -> Vec<(String, String)>;

    /// Create the table on first run; afterwards add any columns missing from it.
    async fn migrate(db: Arc<Db>) -> std::result::Result<(), sqlx::Error> {
        let table_name = Self::table_name();
        let create_sql = Self::create_table_sql();
        let schema_hash = hash(&create_sql);

        db.execute(MIGRATIONS_TABLE_SQL).await?;

        let recorded: Option<(String,)> =
            sqlx::query_as("SELECT hash FROM __schema_migrations WHERE table_name = ?")
                .bind(table_name)
                .fetch_optional(db.pool())
                .await?;

        let Some((recorded_hash,)) = recorded else {
            db.execute(&create_sql).await?;
            sqlx::query(
                "INSERT INTO __schema_migrations (table_name, schema_sql, hash) VALUES (?, ?, ?)",
            )
            .bind(table_name)
            .bind(&create_sql)
            .bind(&schema_hash)
            .execute(db.pool())
            .await?;
            info!("Migrated `{}` (table created, initial schema applied).", table_name);
            return Ok(());
        };

        if recorded_hash == schema_hash {
            info!("No schema changes detected for `{}`.", table_name);
            return Ok(());
        }

        let pragma_sql = format!("PRAGMA table_info({})", table_name);
        let existing: Vec<String> = sqlx::query(&pragma_sql)
            .fetch_all(db.pool())
            .await?
            .into_iter()
            .map(|row: SqliteRow| row.get::<String, _>("name"))
            .collect();

        let mut added = Vec::new();
        for (name, sqltype) in Self::columns() {
            if !existing.contains(&name) {
                let statement = format!(
                    "ALTER TABLE {} ADD COLUMN {} {};",
                    table_name, name, sqltype
                );
                db.execute(&statement).await?;
                added.push((name, sqltype));
            }
        }

        if !added.is_empty() {
            info!(
                "Schema changes detected for `{}`; the following columns were added:",
                table_name
            );
            for (name, sqltype) in &added {
                info!("  - {} {}", name, sqltype);
            }
        }
        sqlx::query(
            "UPDATE __schema_migrations \
             SET schema_sql = ?, hash = ?, applied_at = CURRENT_TIMESTAMP \
             WHERE table_name = ?",
        )
        .bind(&create_sql)
        .bind(&schema_hash)
        .bind(table_name)
        .execute(db.pool())
        .await?;
        Ok(())
    }
}

// Helper function to hash a SQL string
fn hash(s: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl Db {
    /// Connect to (creating if needed) a SQLite database at the given URI.
    pub async fn connect(uri: &str) -> std::result::Result<Self, sqlx::Error> {
        info!("Connecting to SQLite database at URI: {}", uri);
        let options = SqliteConnectOptions::from_str(uri)?
            .create_if_missing(true)
            .foreign_keys(true);
        // Every connection to `:memory:` would otherwise see its own empty database.
        let max_connections = if uri.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        info!("Connected to SQLite database: {}", uri);
        Ok(Db { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Execute an arbitrary SQL statement, e.g. DDL, INSERT, UPDATE.
    pub async fn execute(&self, sql: &str) -> std::result::Result<(), sqlx::Error> {
        debug!("Executing SQL: {}", sql);
        let result = self.pool.execute(sql).await;
        match &result {
            Ok(_) => debug!("SQL executed successfully"),
            Err(e) => log::error!("SQL execution failed: {}", e),
        }
        result.map(|_| ())
    }

    /// Fetch all rows and map to a type implementing `FromRow`.
    pub async fn fetch_all<T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin>(
        &self,
        sql: &str,
    ) -> std::result::Result<Vec<T>, sqlx::Error> {
        debug!("Fetching rows with SQL: {}", sql);
        let result = sqlx::query_as(sql).fetch_all(&self.pool).await;
        match &result {
            Ok(rows) => debug!("Fetched {} rows successfully", rows.len()),
            Err(e) => log::error!("Row fetch failed: {}", e),
        }
        result
    }
}

/// Migrate all registered models using the inventory pattern.
pub async fn auto_migrate(db: Arc<Db>) -> std::result::Result<(), sqlx::Error> {
    info!("Starting auto migration of all registered models...");
    let mut total = 0;
    for m in inventory::iter::<Migration> {
        total += 1;
        if let Err(e) = m(db.clone()).await {
            log::error!("Auto-migration failed for a model: {}", e);
            return Err(e);
        }
    }
    info!("Auto migration completed for {} models.", total);
    Ok(())
}

/// A model exposed through generic CRUD operations.
///
/// `Input` is the writable shape of a row (everything but the key). Create
/// deserializes it from the request body; update merges a partial patch over
/// the stored row's `Input` and deserializes the result, so both paths are
/// type-checked and validated the same way.
pub trait Resource:
    Model + for<'r> FromRow<'r, SqliteRow> + Serialize + Send + Unpin + Sized + 'static
{
    type Input: Serialize + DeserializeOwned + Validate + Send + Sync;

    /// Human-facing name used in error messages, e.g. "Product".
    const LABEL: &'static str;

    fn to_input(&self) -> Self::Input;

    /// Last hook before a write. `changed` holds the fields the client sent.
    fn prepare(input: Self::Input, _changed: &Map<String, Value>) -> Result<Self::Input> {
        Ok(input)
    }
}

type RowQuery<'q, R> = QueryAs<'q, Sqlite, R, SqliteArguments<'q>>;

fn bind_json<'q, R>(query: RowQuery<'q, R>, value: Option<&Value>) -> RowQuery<'q, R> {
    match value {
        None | Some(Value::Null) => query.bind(None::<String>),
        Some(Value::Bool(b)) => query.bind(*b),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(i) => query.bind(i),
            None => query.bind(n.as_f64()),
        },
        Some(Value::String(s)) => query.bind(s.clone()),
        Some(other) => query.bind(other.to_string()),
    }
}

fn expect_object(body: Value) -> Result<Map<String, Value>> {
    match body {
        Value::Object(map) => Ok(map),
        _ => Err(AppError::BadRequest("Expected a JSON object".into())),
    }
}

fn validated_input<R: Resource>(fields: Map<String, Value>, changed: &Map<String, Value>) -> Result<R::Input> {
    let input: R::Input = serde_json::from_value(Value::Object(fields))
        .map_err(|e| AppError::Validation(e.to_string()))?;
    input.validate()?;
    R::prepare(input, changed)
}

fn input_columns<R: Resource>(input: &R::Input) -> Result<(Vec<String>, Map<String, Value>)> {
    let values = expect_object(serde_json::to_value(input)?)?;
    let columns = R::columns().into_iter().map(|(name, _)| name).collect();
    Ok((columns, values))
}

/// Insert a new row from a JSON body.
pub async fn create<R: Resource>(db: &Db, body: Value) -> Result<R> {
    let fields = expect_object(body)?;
    let input = validated_input::<R>(fields.clone(), &fields)?;
    let (columns, values) = input_columns::<R>(&input)?;

    let placeholders = vec!["?"; columns.len()].join(", ");
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) RETURNING *",
        R::table_name(),
        columns.join(", "),
        placeholders
    );
    let mut query = sqlx::query_as::<_, R>(&sql);
    for column in &columns {
        query = bind_json(query, values.get(column));
    }
    let row = query.fetch_one(db.pool()).await?;
    info!("Created {} row in `{}`", R::LABEL, R::table_name());
    Ok(row)
}

pub async fn list<R: Resource>(db: &Db) -> Result<Vec<R>> {
    let sql = format!("SELECT * FROM {} ORDER BY id", R::table_name());
    Ok(db.fetch_all::<R>(&sql).await?)
}

pub async fn get<R: Resource>(db: &Db, id: i64) -> Result<R> {
    let sql = format!("SELECT * FROM {} WHERE id = ?", R::table_name());
    sqlx::query_as::<_, R>(&sql)
        .bind(id)
        .fetch_optional(db.pool())
        .await?
        .ok_or_else(|| not_found::<R>())
}

/// Apply a partial JSON patch to an existing row.
pub async fn update<R: Resource>(db: &Db, id: i64, patch: Value) -> Result<R> {
    let patch = expect_object(patch)?;
    let known: Vec<String> = R::columns().into_iter().map(|(name, _)| name).collect();
    if let Some(unknown) = patch.keys().find(|k| !known.contains(k)) {
        return Err(AppError::BadRequest(format!("Unknown field '{}'", unknown)));
    }

    let current = get::<R>(db, id).await?;
    let mut merged = expect_object(serde_json::to_value(current.to_input())?)?;
    for (key, value) in &patch {
        merged.insert(key.clone(), value.clone());
    }
    let input = validated_input::<R>(merged, &patch)?;
    let (columns, values) = input_columns::<R>(&input)?;

    let assignments: Vec<String> = columns.iter().map(|c| format!("{} = ?", c)).collect();
    let sql = format!(
        "UPDATE {} SET {} WHERE id = ? RETURNING *",
        R::table_name(),
        assignments.join(", ")
    );
    let mut query = sqlx::query_as::<_, R>(&sql);
    for column in &columns {
        query = bind_json(query, values.get(column));
    }
    query
        .bind(id)
        .fetch_optional(db.pool())
        .await?
        .ok_or_else(|| not_found::<R>())
}

/// Delete a row, returning it as it was.
pub async fn delete<R: Resource>(db: &Db, id: i64) -> Result<R> {
    let sql = format!("DELETE FROM {} WHERE id = ? RETURNING *", R::table_name());
    sqlx::query_as::<_, R>(&sql)
        .bind(id)
        .fetch_optional(db.pool())
        .await?
        .ok_or_else(|| not_found::<R>())
}

fn not_found<R: Resource>() -> AppError {
    AppError::NotFound(format!("{} not found", R::LABEL))
}
