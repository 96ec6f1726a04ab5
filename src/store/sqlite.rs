//! SQLite implementation of [`DocumentStore`].
//!
//! One table per collection:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS "customers" (
//!   seq INTEGER PRIMARY KEY AUTOINCREMENT,
//!   id TEXT NOT NULL UNIQUE,
//!   doc TEXT NOT NULL,
//!   created_at TEXT NOT NULL,
//!   updated_at TEXT NOT NULL
//! )
//! ```
//!
//! `doc` holds the JSON body; filters are evaluated with `json_extract`,
//! `json_type` and the `REGEXP` function registered on each connection.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use super::{Document, DocumentStore, StoredDocument};
use crate::error::Result;
use crate::orm::{SortKey, StoreQuery, order_by_sql};

const COLUMNS: &str = "seq, id, doc, created_at, updated_at";

#[derive(Debug, FromRow)]
struct DocumentRow {
    seq: i64,
    id: String,
    doc: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl DocumentRow {
    fn into_document(self) -> Result<StoredDocument> {
        Ok(StoredDocument {
            id: self.id,
            seq: self.seq,
            body: serde_json::from_str(&self.doc)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn table(collection: &str) -> String {
    format!("\"{}\"", collection)
}

/// Document store backed by a SQLite connection pool.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Wrap an existing pool. Connections must have `REGEXP` registered.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if missing) the database at `url`.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .with_regexp();
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        tracing::info!(url = %url, max_connections, "Connected to SQLite");
        Ok(Self { pool })
    }

    /// A private in-memory database.
    ///
    /// Held on a single connection that is never recycled, since every new
    /// connection to `:memory:` would see an empty database.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.with_regexp();
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn fetch_documents(
        &self,
        sql: &str,
        values: &[crate::orm::SqlValue],
    ) -> Result<Vec<StoredDocument>> {
        let mut query = sqlx::query(sql);
        for value in values {
            query = value.bind_to_query(query);
        }
        let rows: Vec<SqliteRow> = query.fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| DocumentRow::from_row(row)?.into_document())
            .collect()
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn ensure_collection(&self, collection: &str) -> Result<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (\n  seq INTEGER PRIMARY KEY AUTOINCREMENT,\n  id TEXT NOT NULL UNIQUE,\n  doc TEXT NOT NULL,\n  created_at TEXT NOT NULL,\n  updated_at TEXT NOT NULL\n)",
            table(collection)
        );
        tracing::debug!(sql = %sql, "Ensuring collection");
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }

    async fn find(
        &self,
        collection: &str,
        query: &StoreQuery,
        skip: i64,
        limit: Option<i64>,
        sort: &[SortKey],
    ) -> Result<Vec<StoredDocument>> {
        let (where_sql, values) = query.to_where_sql();
        let mut sql = format!(
            "SELECT {} FROM {}{}{}",
            COLUMNS,
            table(collection),
            where_sql,
            order_by_sql(sort)
        );
        // SQLite only accepts OFFSET after a LIMIT; -1 means unbounded.
        sql.push_str(&format!(" LIMIT {}", limit.unwrap_or(-1)));
        if skip > 0 {
            sql.push_str(&format!(" OFFSET {}", skip));
        }

        tracing::debug!(sql = %sql, "Executing document query");
        self.fetch_documents(&sql, &values).await
    }

    async fn count(&self, collection: &str, query: &StoreQuery) -> Result<i64> {
        let (where_sql, values) = query.to_where_sql();
        let sql = format!("SELECT COUNT(*) FROM {}{}", table(collection), where_sql);
        tracing::debug!(sql = %sql, "Executing count query");

        let mut query = sqlx::query_scalar::<_, i64>(&sql);
        for value in &values {
            query = value.bind_to_scalar(query);
        }
        Ok(query.fetch_one(&self.pool).await?)
    }

    async fn insert(&self, collection: &str, body: Document) -> Result<StoredDocument> {
        let sql = format!(
            "INSERT INTO {} (id, doc, created_at, updated_at) VALUES (?, ?, ?, ?) RETURNING {}",
            table(collection),
            COLUMNS
        );
        let id = Uuid::new_v4().to_string();
        let doc = serde_json::to_string(&body)?;
        let now = Utc::now();

        tracing::debug!(sql = %sql, id = %id, "Inserting document");
        let row = sqlx::query_as::<_, DocumentRow>(&sql)
            .bind(&id)
            .bind(&doc)
            .bind(now)
            .bind(now)
            .fetch_one(&self.pool)
            .await?;
        row.into_document()
    }

    async fn find_by_id(&self, collection: &str, id: &str) -> Result<Option<StoredDocument>> {
        let sql = format!("SELECT {} FROM {} WHERE id = ?", COLUMNS, table(collection));
        tracing::debug!(sql = %sql, id = %id, "Fetching document by id");
        sqlx::query_as::<_, DocumentRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(DocumentRow::into_document)
            .transpose()
    }

    async fn find_by_id_and_update(
        &self,
        collection: &str,
        id: &str,
        patch: Document,
    ) -> Result<Option<StoredDocument>> {
        if patch.is_empty() {
            return self.find_by_id(collection, id).await;
        }

        let assignments = vec!["?, json(?)"; patch.len()].join(", ");
        let sql = format!(
            "UPDATE {} SET doc = json_set(doc, {}), updated_at = ? WHERE id = ? RETURNING {}",
            table(collection),
            assignments,
            COLUMNS
        );
        tracing::debug!(sql = %sql, id = %id, fields = patch.len(), "Updating document");

        let mut binds = Vec::with_capacity(patch.len() * 2);
        for (key, value) in &patch {
            binds.push(format!("$.{}", key));
            binds.push(serde_json::to_string(value)?);
        }

        let mut query = sqlx::query_as::<_, DocumentRow>(&sql);
        for bind in &binds {
            query = query.bind(bind.as_str());
        }
        query
            .bind(Utc::now())
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(DocumentRow::into_document)
            .transpose()
    }
}
