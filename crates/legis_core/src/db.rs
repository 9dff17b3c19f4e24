use crate::error::StoreError;
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params, params_from_iter};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;

/// A stored document type: one table per collection, keyed by natural key.
pub trait Document: Serialize {
    const COLLECTION: Collection;

    fn key(&self) -> &str;

    /// Messages for every constraint the document breaks; empty when valid.
    fn validate(&self) -> Vec<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Legislators,
    Bills,
    Rolls,
}

impl Collection {
    pub const ALL: [Collection; 3] = [Collection::Legislators, Collection::Bills, Collection::Rolls];

    pub fn table(self) -> &'static str {
        match self {
            Collection::Legislators => "legislators",
            Collection::Bills => "bills",
            Collection::Rolls => "rolls",
        }
    }

    /// Fields worth an expression index.
    fn indexes(self) -> &'static [&'static str] {
        match self {
            Collection::Legislators => &["govtrack_id", "state", "party", "last_name"],
            Collection::Bills => &[
                "type",
                "code",
                "chamber",
                "session",
                "introduced_at",
                "sponsor_id",
                "last_action_at",
                "last_vote_at",
                "enacted_at",
                "enacted",
            ],
            Collection::Rolls => &["chamber", "session", "type", "result", "voted_at", "bill_id"],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Text(String),
    Bool(bool),
}

/// A query condition on a top-level document field.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Equals(&'static str, FilterValue),
    /// The field is an array containing the value.
    Contains(&'static str, String),
}

impl Condition {
    pub fn equals(field: &'static str, value: impl Into<String>) -> Self {
        Condition::Equals(field, FilterValue::Text(value.into()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    fn sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

/// Which top-level fields to return. Dotted names match on their root.
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    All,
    Fields(Vec<String>),
}

impl Projection {
    pub fn fields(fields: &[&str]) -> Self {
        Projection::Fields(fields.iter().map(|field| field.to_string()).collect())
    }

    pub fn apply(&self, mut document: Value) -> Value {
        if let (Projection::Fields(fields), Value::Object(map)) = (self, &mut document) {
            map.retain(|key, _| {
                fields
                    .iter()
                    .any(|field| field.split('.').next() == Some(key.as_str()))
            });
        }
        document
    }
}

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        let store = Self { conn };
        store.init()?;
        Ok(store)
    }

    /// Opens an existing database without creating tables.
    pub fn open_read_only(db_path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> Result<(), StoreError> {
        for collection in Collection::ALL {
            let table = collection.table();
            self.conn.execute_batch(&format!(
                r#"
                CREATE TABLE IF NOT EXISTS {table} (
                  key TEXT PRIMARY KEY,
                  document TEXT NOT NULL,
                  created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
                  updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now'))
                );
                "#
            ))?;
            for field in collection.indexes() {
                self.conn.execute_batch(&format!(
                    "CREATE INDEX IF NOT EXISTS idx_{table}_{field} ON {table}(json_extract(document, '$.{field}'));"
                ))?;
            }
        }
        Ok(())
    }

    /// Inserts the document or replaces every field of the stored one.
    pub fn upsert<D: Document>(&self, document: &D) -> Result<(), StoreError> {
        let errors = document.validate();
        if !errors.is_empty() {
            return Err(StoreError::Invalid(errors));
        }
        let document_json = serde_json::to_string(document)?;
        let table = D::COLLECTION.table();

        self.conn.execute(
            &format!(
                r#"
                INSERT INTO {table} (key, document)
                VALUES (?1, ?2)
                ON CONFLICT(key) DO UPDATE SET
                  document=excluded.document,
                  updated_at=strftime('%Y-%m-%dT%H:%M:%fZ','now')
                "#
            ),
            params![document.key(), document_json],
        )?;

        Ok(())
    }

    pub fn get<D: Document + DeserializeOwned>(&self, key: &str) -> Result<Option<D>, StoreError> {
        let table = D::COLLECTION.table();
        let raw: Option<String> = self
            .conn
            .query_row(
                &format!("SELECT document FROM {table} WHERE key = ?1"),
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn all<D: Document + DeserializeOwned>(&self) -> Result<Vec<D>, StoreError> {
        let table = D::COLLECTION.table();
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT document FROM {table} ORDER BY key"))?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut documents = Vec::new();
        for raw in rows {
            documents.push(serde_json::from_str(&raw?)?);
        }
        Ok(documents)
    }

    pub fn count(&self, collection: Collection) -> Result<usize, StoreError> {
        let table = collection.table();
        let count: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn find_one(
        &self,
        collection: Collection,
        conditions: &[Condition],
        projection: &Projection,
    ) -> Result<Option<Value>, StoreError> {
        let mut found = self.find_many(collection, conditions, &[], 1, 0, projection)?;
        Ok(found.pop())
    }

    pub fn find_many(
        &self,
        collection: Collection,
        conditions: &[Condition],
        order: &[(&'static str, Direction)],
        limit: u32,
        offset: u64,
        projection: &Projection,
    ) -> Result<Vec<Value>, StoreError> {
        let table = collection.table();
        let mut sql = format!("SELECT document FROM {table}");
        let mut bindings: Vec<SqlValue> = Vec::new();

        let clauses: Vec<String> = conditions
            .iter()
            .map(|condition| match condition {
                Condition::Equals(field, value) => {
                    bindings.push(match value {
                        FilterValue::Text(text) => SqlValue::Text(text.clone()),
                        FilterValue::Bool(flag) => SqlValue::Integer(i64::from(*flag)),
                    });
                    format!("json_extract(document, '$.{field}') = ?{}", bindings.len())
                }
                Condition::Contains(field, value) => {
                    bindings.push(SqlValue::Text(value.clone()));
                    format!(
                        "EXISTS (SELECT 1 FROM json_each({table}.document, '$.{field}') WHERE json_each.value = ?{})",
                        bindings.len()
                    )
                }
            })
            .collect();
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        if !order.is_empty() {
            let terms: Vec<String> = order
                .iter()
                .map(|(field, direction)| {
                    format!("json_extract(document, '$.{field}') {}", direction.sql())
                })
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&terms.join(", "));
        }

        bindings.push(SqlValue::Integer(i64::from(limit)));
        sql.push_str(&format!(" LIMIT ?{}", bindings.len()));
        bindings.push(SqlValue::Integer(offset as i64));
        sql.push_str(&format!(" OFFSET ?{}", bindings.len()));

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(bindings), |row| row.get::<_, String>(0))?;

        let mut documents = Vec::new();
        for raw in rows {
            let document: Value = serde_json::from_str(&raw?)?;
            documents.push(projection.apply(document));
        }
        Ok(documents)
    }
}
