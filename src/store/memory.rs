//! In-memory [`Store`] implementation.
//!
//! Keeps every document in a `Vec` behind a `std::sync::RwLock`, in
//! insertion order. Filters are evaluated with [`Filter::matches`], so the
//! semantics are the reference the SQLite backend is tested against.

use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Datelike};
use serde_json::Value;

use crate::models::RecordKind;
use crate::query::{compare_optional, Direction, Filter, SortSpec, Window};

use super::{document_id, Bucket, Grouping, Store, Summary};

struct StoredDoc {
    seq: u64,
    kind: RecordKind,
    body: Value,
}

#[derive(Default)]
struct Inner {
    docs: Vec<StoredDoc>,
    next_seq: u64,
}

/// Process-local store; contents are lost on exit.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }

    fn matching<'a>(inner: &'a Inner, kind: RecordKind, filter: &Filter) -> Vec<&'a StoredDoc> {
        inner
            .docs
            .iter()
            .filter(|d| d.kind == kind && filter.matches(&d.body))
            .collect()
    }
}

fn year_of(ms: f64) -> Option<f64> {
    DateTime::from_timestamp_millis(ms.floor() as i64).map(|dt| dt.year() as f64)
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_many(&self, kind: RecordKind, docs: Vec<Value>) -> Result<u64> {
        let mut inner = self.write()?;

        let mut seen: HashSet<&str> = inner
            .docs
            .iter()
            .filter_map(|d| d.body.get("_id").and_then(Value::as_str))
            .collect();
        for doc in &docs {
            let id = document_id(doc)?;
            if !seen.insert(id) {
                bail!("duplicate _id: {}", id);
            }
        }
        drop(seen);

        let inserted = docs.len() as u64;
        for body in docs {
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.docs.push(StoredDoc { seq, kind, body });
        }
        Ok(inserted)
    }

    async fn find(
        &self,
        kind: RecordKind,
        filter: &Filter,
        sort: SortSpec,
        window: Option<Window>,
    ) -> Result<Vec<Value>> {
        let inner = self.read()?;
        let mut hits = Self::matching(&inner, kind, filter);

        hits.sort_by(|a, b| {
            let by_seq = match sort.direction {
                Direction::Asc => a.seq.cmp(&b.seq),
                Direction::Desc => b.seq.cmp(&a.seq),
            };
            sort.compare_fields(&a.body, &b.body).then(by_seq)
        });

        let (skip, take) = match window {
            Some(w) => (w.skip.max(0) as usize, w.limit.max(0) as usize),
            None => (0, usize::MAX),
        };
        Ok(hits
            .into_iter()
            .skip(skip)
            .take(take)
            .map(|d| d.body.clone())
            .collect())
    }

    async fn count(&self, kind: RecordKind, filter: &Filter) -> Result<u64> {
        let inner = self.read()?;
        Ok(Self::matching(&inner, kind, filter).len() as u64)
    }

    async fn find_by_ids(&self, kind: RecordKind, ids: &[String]) -> Result<Vec<Value>> {
        let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let inner = self.read()?;
        Ok(inner
            .docs
            .iter()
            .filter(|d| d.kind == kind)
            .filter(|d| {
                d.body
                    .get("_id")
                    .and_then(Value::as_str)
                    .is_some_and(|id| wanted.contains(id))
            })
            .map(|d| d.body.clone())
            .collect())
    }

    async fn delete_all(&self, kind: RecordKind) -> Result<u64> {
        let mut inner = self.write()?;
        let before = inner.docs.len();
        inner.docs.retain(|d| d.kind != kind);
        Ok((before - inner.docs.len()) as u64)
    }

    async fn summarize(
        &self,
        kind: RecordKind,
        average_of: &'static str,
        flag: &'static str,
    ) -> Result<Summary> {
        let inner = self.read()?;
        let docs = Self::matching(&inner, kind, &Filter::all());

        let values: Vec<f64> = docs
            .iter()
            .filter_map(|d| d.body.get(average_of).and_then(Value::as_f64))
            .collect();
        let average = if values.is_empty() {
            None
        } else {
            Some(values.iter().sum::<f64>() / values.len() as f64)
        };
        let flagged = docs
            .iter()
            .filter(|d| d.body.get(flag).and_then(Value::as_bool) == Some(true))
            .count() as i64;

        Ok(Summary {
            count: docs.len() as i64,
            average,
            flagged,
        })
    }

    async fn histogram(&self, kind: RecordKind, grouping: Grouping) -> Result<Vec<Bucket>> {
        let inner = self.read()?;

        // f64 keys are grouped by bit pattern; -0.0 is folded into 0.0.
        let mut groups: HashMap<Option<u64>, Bucket> = HashMap::new();
        for doc in Self::matching(&inner, kind, &Filter::all()) {
            let key = match grouping {
                Grouping::Value(field) => doc.body.get(field).and_then(Value::as_f64),
                Grouping::Year(field) => doc
                    .body
                    .get(field)
                    .and_then(Value::as_f64)
                    .and_then(year_of),
            }
            .map(|k| if k == 0.0 { 0.0 } else { k });

            groups
                .entry(key.map(f64::to_bits))
                .or_insert(Bucket { key, count: 0 })
                .count += 1;
        }

        let mut buckets: Vec<Bucket> = groups.into_values().collect();
        buckets.sort_by(|a, b| compare_optional(a.key, b.key));
        Ok(buckets)
    }
}
