//! Document store abstraction.
//!
//! The [`Store`] trait covers every storage operation the service needs:
//! filtered/sorted/windowed reads, counts, bulk inserts, bulk deletes,
//! lookups by id and the fixed aggregations behind the reports.
//!
//! Documents are `serde_json::Value` objects that have already been cast
//! through their kind's schema and carry an `_id`. Each backend also keeps
//! an insertion-order key used by [`SortField::Inserted`](crate::query::SortField).
//!
//! | Backend | Use |
//! |---------|-----|
//! | [`sqlite::SqliteStore`] | default; JSON bodies in a single `documents` table |
//! | [`memory::MemoryStore`] | in-process, nothing persisted |

pub mod memory;
pub mod sqlite;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::cast;
use crate::config::{Backend, Config};
use crate::db;
use crate::migrate;
use crate::models::RecordKind;
use crate::query::{Filter, SortSpec, Window};

/// Totals over a whole collection, computed by [`Store::summarize`].
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub count: i64,
    /// Mean of the numeric values of the averaged field; `None` when no
    /// document has one.
    pub average: Option<f64>,
    /// Documents whose flag field is `true`.
    pub flagged: i64,
}

/// How [`Store::histogram`] derives the group key from a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grouping {
    /// The numeric value of the field itself.
    Value(&'static str),
    /// The UTC calendar year of an epoch-millisecond field.
    Year(&'static str),
}

/// One row of a grouped count. Documents without a usable key share the
/// `null` bucket, which sorts first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bucket {
    #[serde(rename = "_id", serialize_with = "cast::ser_number")]
    pub key: Option<f64>,
    pub count: i64,
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Insert all documents or none. Returns the number inserted.
    async fn insert_many(&self, kind: RecordKind, docs: Vec<Value>) -> Result<u64>;

    /// Documents matching `filter`, ordered by `sort` (ties broken by
    /// insertion order in the same direction), optionally windowed.
    async fn find(
        &self,
        kind: RecordKind,
        filter: &Filter,
        sort: SortSpec,
        window: Option<Window>,
    ) -> Result<Vec<Value>>;

    async fn count(&self, kind: RecordKind, filter: &Filter) -> Result<u64>;

    /// Documents whose `_id` is in `ids`, in insertion order. Unknown ids
    /// are skipped.
    async fn find_by_ids(&self, kind: RecordKind, ids: &[String]) -> Result<Vec<Value>>;

    /// Delete every document of `kind`. Returns the number deleted.
    async fn delete_all(&self, kind: RecordKind) -> Result<u64>;

    async fn summarize(
        &self,
        kind: RecordKind,
        average_of: &'static str,
        flag: &'static str,
    ) -> Result<Summary>;

    /// Grouped counts ordered ascending by key.
    async fn histogram(&self, kind: RecordKind, grouping: Grouping) -> Result<Vec<Bucket>>;

    /// Release backend resources.
    async fn close(&self) {}
}

/// Open the backend selected by `[store].backend`.
///
/// The SQLite schema is applied on open, so a fresh database works without
/// a separate `init`.
pub async fn open(config: &Config) -> Result<Arc<dyn Store>> {
    match config.store.backend {
        Backend::Sqlite => {
            let pool = db::connect(config).await?;
            migrate::apply(&pool).await?;
            Ok(Arc::new(sqlite::SqliteStore::new(pool)))
        }
        Backend::Memory => Ok(Arc::new(memory::MemoryStore::new())),
    }
}

/// The `_id` of a stored document.
pub(crate) fn document_id(doc: &Value) -> Result<&str> {
    doc.get("_id")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow::anyhow!("document is missing a string _id"))
}
