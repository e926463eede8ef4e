//! SQLite-backed [`Store`] implementation.
//!
//! All kinds share one `documents` table (see [`crate::migrate`]); each row
//! holds the JSON body of one document. Filters, sorts and aggregations are
//! translated into `json_extract`/`json_type` expressions, with `seq`
//! (`INTEGER PRIMARY KEY AUTOINCREMENT`) as the insertion-order key.
//!
//! Substring matching goes through sqlx's `REGEXP` function with an escaped,
//! `(?i)` pattern, so case folding is Unicode-aware like the memory backend.
//! The pool must be opened with regexp support (see [`crate::db::connect`]).

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use crate::models::RecordKind;
use crate::query::{Condition, Direction, Filter, SortField, SortSpec, Window};

use super::{document_id, Bucket, Grouping, Store, Summary};

/// Ids per `IN (...)` batch in [`SqliteStore::find_by_ids`].
const ID_BATCH: usize = 500;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn path(field: &str) -> String {
    format!("'$.{}'", field)
}

fn is_number(field: &str) -> String {
    format!("json_type(body, {}) IN ('integer', 'real')", path(field))
}

fn extract(field: &str) -> String {
    format!("json_extract(body, {})", path(field))
}

/// Case-insensitive regex matching `needle` literally.
fn contains_pattern(needle: &str) -> String {
    format!("(?i){}", regex::escape(needle))
}

fn push_condition(qb: &mut QueryBuilder<'_, Sqlite>, condition: &Condition) {
    match condition {
        Condition::Contains { field, needle } => {
            // CASE keeps REGEXP away from non-text values.
            qb.push(format!(
                "(CASE WHEN json_type(body, {}) = 'text' THEN {} REGEXP ",
                path(field),
                extract(field)
            ));
            qb.push_bind(contains_pattern(needle));
            qb.push(" ELSE 0 END)");
        }
        Condition::AtLeast { field, value } => {
            qb.push(format!("({} AND {} >= ", is_number(field), extract(field)));
            qb.push_bind(*value);
            qb.push(")");
        }
        Condition::Flag { field, value } => {
            let wanted = if *value { "true" } else { "false" };
            qb.push(format!("json_type(body, {}) = '{}'", path(field), wanted));
        }
        Condition::Within { field, start, end } => {
            qb.push(format!("({} AND {} >= ", is_number(field), extract(field)));
            qb.push_bind(*start);
            qb.push(format!(" AND {} < ", extract(field)));
            qb.push_bind(*end);
            qb.push(")");
        }
        Condition::AnyOf(options) => {
            if options.is_empty() {
                qb.push("0");
                return;
            }
            qb.push("(");
            for (i, option) in options.iter().enumerate() {
                if i > 0 {
                    qb.push(" OR ");
                }
                push_condition(qb, option);
            }
            qb.push(")");
        }
    }
}

fn push_where(qb: &mut QueryBuilder<'_, Sqlite>, kind: RecordKind, filter: &Filter) {
    qb.push(" WHERE kind = ");
    qb.push_bind(kind.as_str());
    for condition in &filter.conditions {
        qb.push(" AND ");
        push_condition(qb, condition);
    }
}

fn push_order(qb: &mut QueryBuilder<'_, Sqlite>, sort: SortSpec) {
    let dir = match sort.direction {
        Direction::Asc => "ASC",
        Direction::Desc => "DESC",
    };
    qb.push(" ORDER BY ");
    if let SortField::Field(field) = sort.field {
        // Non-numeric values sort as NULL, before every number.
        qb.push(format!(
            "CASE WHEN {} THEN {} END {}, ",
            is_number(field),
            extract(field),
            dir
        ));
    }
    qb.push(format!("seq {}", dir));
}

fn parse_bodies(rows: Vec<sqlx::sqlite::SqliteRow>) -> Result<Vec<Value>> {
    rows.iter()
        .map(|row| -> Result<Value> {
            let body: String = row.try_get("body")?;
            serde_json::from_str(&body).context("stored document is not valid JSON")
        })
        .collect()
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert_many(&self, kind: RecordKind, docs: Vec<Value>) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        for doc in &docs {
            let id = document_id(doc)?;
            let body = serde_json::to_string(doc)?;
            sqlx::query("INSERT INTO documents (id, kind, body) VALUES (?, ?, ?)")
                .bind(id)
                .bind(kind.as_str())
                .bind(&body)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("failed to insert document {}", id))?;
        }

        tx.commit().await?;
        Ok(docs.len() as u64)
    }

    async fn find(
        &self,
        kind: RecordKind,
        filter: &Filter,
        sort: SortSpec,
        window: Option<Window>,
    ) -> Result<Vec<Value>> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT body FROM documents");
        push_where(&mut qb, kind, filter);
        push_order(&mut qb, sort);
        if let Some(w) = window {
            qb.push(" LIMIT ");
            qb.push_bind(w.limit.max(0));
            qb.push(" OFFSET ");
            qb.push_bind(w.skip.max(0));
        }

        let rows = qb.build().fetch_all(&self.pool).await?;
        parse_bodies(rows)
    }

    async fn count(&self, kind: RecordKind, filter: &Filter) -> Result<u64> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM documents");
        push_where(&mut qb, kind, filter);
        let total: i64 = qb.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(total as u64)
    }

    async fn find_by_ids(&self, kind: RecordKind, ids: &[String]) -> Result<Vec<Value>> {
        let mut found: Vec<(i64, String)> = Vec::new();
        for batch in ids.chunks(ID_BATCH) {
            let mut qb = QueryBuilder::<Sqlite>::new("SELECT seq, body FROM documents WHERE kind = ");
            qb.push_bind(kind.as_str());
            qb.push(" AND id IN (");
            let mut separated = qb.separated(", ");
            for id in batch {
                separated.push_bind(id.as_str());
            }
            separated.push_unseparated(")");
            for row in qb.build().fetch_all(&self.pool).await? {
                found.push((row.try_get("seq")?, row.try_get("body")?));
            }
        }
        found.sort_by_key(|(seq, _)| *seq);
        found
            .iter()
            .map(|(_, body)| {
                serde_json::from_str(body).context("stored document is not valid JSON")
            })
            .collect()
    }

    async fn delete_all(&self, kind: RecordKind) -> Result<u64> {
        let result = sqlx::query("DELETE FROM documents WHERE kind = ?")
            .bind(kind.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn summarize(
        &self,
        kind: RecordKind,
        average_of: &'static str,
        flag: &'static str,
    ) -> Result<Summary> {
        let sql = format!(
            r#"
            SELECT
                COUNT(*) AS count,
                AVG(CASE WHEN {numeric} THEN CAST({value} AS REAL) END) AS average,
                COALESCE(SUM(CASE WHEN json_type(body, {flag}) = 'true' THEN 1 ELSE 0 END), 0) AS flagged
            FROM documents
            WHERE kind = ?
            "#,
            numeric = is_number(average_of),
            value = extract(average_of),
            flag = path(flag),
        );
        let row = sqlx::query(&sql)
            .bind(kind.as_str())
            .fetch_one(&self.pool)
            .await?;

        Ok(Summary {
            count: row.try_get("count")?,
            average: row.try_get("average")?,
            flagged: row.try_get("flagged")?,
        })
    }

    async fn histogram(&self, kind: RecordKind, grouping: Grouping) -> Result<Vec<Bucket>> {
        let key = match grouping {
            Grouping::Value(field) => format!(
                "CASE WHEN {} THEN CAST({} AS REAL) END",
                is_number(field),
                extract(field)
            ),
            Grouping::Year(field) => format!(
                "CASE WHEN {} THEN CAST(strftime('%Y', {} / 1000.0, 'unixepoch') AS REAL) END",
                is_number(field),
                extract(field)
            ),
        };
        let sql = format!(
            "SELECT {} AS bucket, COUNT(*) AS count FROM documents WHERE kind = ? \
             GROUP BY bucket ORDER BY bucket ASC",
            key
        );

        let rows = sqlx::query(&sql)
            .bind(kind.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| -> Result<Bucket> {
                Ok(Bucket {
                    key: row.try_get("bucket")?,
                    count: row.try_get("count")?,
                })
            })
            .collect()
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, DbConfig};
    use crate::db;
    use crate::migrate;
    use crate::query::{build_list_query, ListParams};
    use serde_json::json;
    use tempfile::TempDir;

    async fn open_temp() -> (TempDir, SqliteStore) {
        let tmp = TempDir::new().unwrap();
        let config = Config {
            db: DbConfig {
                path: tmp.path().join("data").join("test.sqlite"),
            },
            ..Config::default()
        };
        let pool = db::connect(&config).await.unwrap();
        migrate::apply(&pool).await.unwrap();
        (tmp, SqliteStore::new(pool))
    }

    fn params(pairs: &[(&str, &str)]) -> ListParams {
        ListParams::from_pairs(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string())),
        )
    }

    async fn seed(store: &SqliteStore) {
        let docs = vec![
            json!({"_id": "a", "rating": 1, "title": "Crashes a lot", "timestamp": 1_577_836_800_000i64, "verified_purchase": true}),
            json!({"_id": "b", "rating": 1, "text": "never opens", "timestamp": 1_609_459_199_999i64}),
            json!({"_id": "c", "rating": 3, "title": "ok", "timestamp": 1_609_459_200_000i64, "verified_purchase": false}),
            json!({"_id": "d", "rating": 5, "text": "No CRASH since update", "verified_purchase": true}),
            json!({"_id": "e", "rating": 5, "title": "love it"}),
            json!({"_id": "f", "rating": 5, "title": "5 stars", "timestamp": 1_546_300_800_000i64}),
        ];
        assert_eq!(
            store.insert_many(RecordKind::Software, docs).await.unwrap(),
            6
        );
    }

    async fn ids(store: &SqliteStore, pairs: &[(&str, &str)]) -> Vec<String> {
        let q = build_list_query(&params(pairs));
        store
            .find(RecordKind::Software, &q.filter, q.sort, Some(q.window()))
            .await
            .unwrap()
            .iter()
            .map(|d| d["_id"].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_default_order_and_window() {
        let (_tmp, store) = open_temp().await;
        seed(&store).await;
        assert_eq!(ids(&store, &[]).await, vec!["f", "e", "d", "c", "b", "a"]);
        assert_eq!(
            ids(&store, &[("page", "2"), ("limit", "4")]).await,
            vec!["b", "a"]
        );
    }

    #[tokio::test]
    async fn test_text_search_matches_title_or_text() {
        let (_tmp, store) = open_temp().await;
        seed(&store).await;
        assert_eq!(ids(&store, &[("q", "crash")]).await, vec!["d", "a"]);

        store
            .insert_many(
                RecordKind::Software,
                vec![
                    json!({"_id": "g", "title": "écran cassé"}),
                    json!({"_id": "h", "text": "după ștergere, dar nu merge"}),
                    json!({"_id": "i", "text": "a.b (c+"}),
                ],
            )
            .await
            .unwrap();
        assert_eq!(ids(&store, &[("q", "ÉCRAN")]).await, vec!["g"]);
        assert_eq!(ids(&store, &[("q", "ȘTERGERE")]).await, vec!["h"]);
        // regex metacharacters are matched literally
        assert_eq!(ids(&store, &[("q", "(C+")]).await, vec!["i"]);
        assert!(ids(&store, &[("q", ".*")]).await.is_empty());
    }

    #[tokio::test]
    async fn test_min_rating_and_verified() {
        let (_tmp, store) = open_temp().await;
        seed(&store).await;
        assert_eq!(
            ids(&store, &[("minRating", "3"), ("sort", "rating_asc")]).await,
            vec!["c", "d", "e", "f"]
        );
        assert_eq!(ids(&store, &[("verified", "true")]).await, vec!["d", "a"]);
        assert_eq!(ids(&store, &[("verified", "false")]).await.len(), 6);
    }

    #[tokio::test]
    async fn test_year_filter_half_open() {
        let (_tmp, store) = open_temp().await;
        seed(&store).await;
        assert_eq!(ids(&store, &[("year", "2020")]).await, vec!["b", "a"]);
        assert_eq!(ids(&store, &[("year", "2021")]).await, vec!["c"]);
    }

    #[tokio::test]
    async fn test_sort_by_date_puts_missing_last_when_descending() {
        let (_tmp, store) = open_temp().await;
        seed(&store).await;
        assert_eq!(
            ids(&store, &[("sort", "date_desc")]).await,
            vec!["c", "b", "a", "f", "e", "d"]
        );
    }

    #[tokio::test]
    async fn test_count_matches_find() {
        let (_tmp, store) = open_temp().await;
        seed(&store).await;
        let q = build_list_query(&params(&[("minRating", "5")]));
        assert_eq!(store.count(RecordKind::Software, &q.filter).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_histograms() {
        let (_tmp, store) = open_temp().await;
        seed(&store).await;

        let ratings = store
            .histogram(RecordKind::Software, Grouping::Value("rating"))
            .await
            .unwrap();
        assert_eq!(
            serde_json::to_value(&ratings).unwrap(),
            json!([
                {"_id": 1, "count": 2},
                {"_id": 3, "count": 1},
                {"_id": 5, "count": 3}
            ])
        );

        let years = store
            .histogram(RecordKind::Software, Grouping::Year("timestamp"))
            .await
            .unwrap();
        assert_eq!(
            serde_json::to_value(&years).unwrap(),
            json!([
                {"_id": null, "count": 2},
                {"_id": 2019, "count": 1},
                {"_id": 2020, "count": 2},
                {"_id": 2021, "count": 1}
            ])
        );
    }

    #[tokio::test]
    async fn test_summarize_and_delete() {
        let (_tmp, store) = open_temp().await;
        let empty = store
            .summarize(RecordKind::Software, "rating", "verified_purchase")
            .await
            .unwrap();
        assert_eq!(empty.count, 0);
        assert_eq!(empty.average, None);

        seed(&store).await;
        let summary = store
            .summarize(RecordKind::Software, "rating", "verified_purchase")
            .await
            .unwrap();
        assert_eq!(summary.count, 6);
        assert_eq!(summary.flagged, 2);
        assert!((summary.average.unwrap() - 20.0 / 6.0).abs() < 1e-9);

        assert_eq!(store.delete_all(RecordKind::Software).await.unwrap(), 6);
        assert_eq!(
            store
                .count(RecordKind::Software, &Filter::all())
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_find_by_ids_skips_unknown() {
        let (_tmp, store) = open_temp().await;
        store
            .insert_many(
                RecordKind::User,
                vec![
                    json!({"_id": "u1", "name": "Ana"}),
                    json!({"_id": "u2", "name": "Radu"}),
                ],
            )
            .await
            .unwrap();
        let found = store
            .find_by_ids(
                RecordKind::User,
                &["u2".to_string(), "missing".to_string(), "u1".to_string()],
            )
            .await
            .unwrap();
        let names: Vec<&str> = found.iter().map(|d| d["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["Ana", "Radu"]);
    }

    #[tokio::test]
    async fn test_duplicate_id_rolls_back_batch() {
        let (_tmp, store) = open_temp().await;
        seed(&store).await;
        let result = store
            .insert_many(
                RecordKind::Software,
                vec![json!({"_id": "new"}), json!({"_id": "a"})],
            )
            .await;
        assert!(result.is_err());
        assert_eq!(
            store
                .count(RecordKind::Software, &Filter::all())
                .await
                .unwrap(),
            6
        );
    }
}
