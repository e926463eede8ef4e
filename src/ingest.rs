//! CSV bulk import.
//!
//! The pipeline is parse → decode nested JSON → cast → insert, run to
//! completion for one payload before anything is written:
//!
//! 1. [`parse_csv`] turns the payload into header-keyed row maps.
//! 2. Cells whose trimmed value starts with `{` go through
//!    [`try_parse_structured`]; unparsable cells stay strings.
//! 3. Each row is cast through the target kind's schema. One bad row
//!    rejects the whole import.
//! 4. All rows are inserted with a single [`Store::insert_many`] call.
//!
//! There is no deduplication: importing the same file twice stores every
//! row twice.

use std::path::Path;

use anyhow::{Context, Result};
use serde_json::{Map, Value};

use crate::config::Config;
use crate::error::ImportError;
use crate::models::RecordKind;
use crate::store::{self, Store};

/// Decode a cell that looks like a JSON object, or keep it as a string.
pub fn try_parse_structured(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.starts_with('{') {
        if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
            return value;
        }
    }
    Value::String(raw.to_string())
}

/// Parse a CSV payload into one field map per data row, keyed by header.
pub fn parse_csv(bytes: &[u8]) -> Result<Vec<Map<String, Value>>, ImportError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(bytes);

    let headers = reader.headers()?.clone();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row: Map<String, Value> = headers
            .iter()
            .zip(record.iter())
            .map(|(name, cell)| (name.to_string(), try_parse_structured(cell)))
            .collect();
        rows.push(row);
    }
    Ok(rows)
}

/// Run the full import pipeline for one payload. Returns the number of
/// records inserted.
pub async fn import_csv(
    store: &dyn Store,
    kind: RecordKind,
    bytes: &[u8],
) -> Result<u64, ImportError> {
    let rows = parse_csv(bytes)?;

    let docs = rows
        .into_iter()
        .enumerate()
        .map(|(i, row)| {
            kind.cast(row).map_err(|e| ImportError::Rejected {
                row: i + 1,
                message: e.to_string(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    if docs.is_empty() {
        tracing::info!(%kind, "csv import had no data rows");
        return Ok(0);
    }

    let inserted = store
        .insert_many(kind, docs)
        .await
        .map_err(|e| ImportError::Store(format!("{:#}", e)))?;

    tracing::info!(%kind, inserted, "csv import complete");
    Ok(inserted)
}

/// CLI entry point for `reviewdesk import <kind> <file>`.
pub async fn run_import(config: &Config, kind: RecordKind, file: &Path) -> Result<()> {
    let bytes = std::fs::read(file)
        .with_context(|| format!("Failed to read CSV file: {}", file.display()))?;

    let store = store::open(config).await?;
    let result = import_csv(store.as_ref(), kind, &bytes).await;
    store.close().await;

    let inserted = result.with_context(|| format!("Failed to import {}", kind.label()))?;

    println!("import {}", kind);
    println!("  file: {}", file.display());
    println!("  inserted: {}", inserted);
    println!("ok");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Filter, SortSpec};
    use crate::store::memory::MemoryStore;
    use serde_json::json;

    const SOFTWARE_CSV: &str = "\
rating,title,text,timestamp,verified_purchase,meta
5,Great,Works well,1588687728923,true,\"{\"\"os\"\":\"\"linux\"\"}\"
1,Bad,Crashes,1609459200000,false,{not json
3,Meh,,1577836800000,true,plain
";

    #[test]
    fn test_try_parse_structured() {
        assert_eq!(try_parse_structured("{\"a\":1}"), json!({"a": 1}));
        assert_eq!(try_parse_structured("  {\"a\":1} "), json!({"a": 1}));
        assert_eq!(try_parse_structured("{not json"), json!("{not json"));
        assert_eq!(try_parse_structured("[1,2]"), json!("[1,2]"));
        assert_eq!(try_parse_structured("5"), json!("5"));
    }

    #[test]
    fn test_parse_csv_rows() {
        let rows = parse_csv(SOFTWARE_CSV.as_bytes()).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["rating"], json!("5"));
        assert_eq!(rows[0]["meta"], json!({"os": "linux"}));
        assert_eq!(rows[1]["meta"], json!("{not json"));
        assert_eq!(rows[2]["text"], json!(""));
    }

    #[test]
    fn test_parse_csv_rejects_ragged_rows() {
        let err = parse_csv(b"a,b\n1,2,3\n").unwrap_err();
        assert!(matches!(err, ImportError::Csv(_)));
    }

    #[test]
    fn test_header_only_is_empty() {
        assert!(parse_csv(b"name,email\n").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_import_counts_and_does_not_dedup() {
        let store = MemoryStore::new();
        let n = import_csv(&store, RecordKind::Software, SOFTWARE_CSV.as_bytes())
            .await
            .unwrap();
        assert_eq!(n, 3);
        let n = import_csv(&store, RecordKind::Software, SOFTWARE_CSV.as_bytes())
            .await
            .unwrap();
        assert_eq!(n, 3);
        assert_eq!(
            store
                .count(RecordKind::Software, &Filter::all())
                .await
                .unwrap(),
            6
        );
    }

    #[tokio::test]
    async fn test_import_casts_types() {
        let store = MemoryStore::new();
        import_csv(&store, RecordKind::Software, SOFTWARE_CSV.as_bytes())
            .await
            .unwrap();
        let docs = store
            .find(RecordKind::Software, &Filter::all(), SortSpec::OLDEST_FIRST, None)
            .await
            .unwrap();
        assert_eq!(docs[0]["rating"], json!(5));
        assert_eq!(docs[0]["verified_purchase"], json!(true));
        assert_eq!(docs[0]["timestamp"], json!(1588687728923i64));
        // strict kind: unknown columns are dropped
        assert!(docs[0].get("meta").is_none());
    }

    #[tokio::test]
    async fn test_flexible_kind_keeps_structured_cells() {
        let store = MemoryStore::new();
        let csv = "name,address,note\nAna,\"{\"\"city\"\":\"\"Cluj\"\"}\",{oops\n";
        import_csv(&store, RecordKind::User, csv.as_bytes())
            .await
            .unwrap();
        let docs = store
            .find(RecordKind::User, &Filter::all(), SortSpec::OLDEST_FIRST, None)
            .await
            .unwrap();
        assert_eq!(docs[0]["address"], json!({"city": "Cluj"}));
        assert_eq!(docs[0]["note"], json!("{oops"));
    }

    #[tokio::test]
    async fn test_cast_failure_rejects_everything() {
        let store = MemoryStore::new();
        let csv = "rating,title\n4,ok\nfive,bad\n";
        let err = import_csv(&store, RecordKind::Software, csv.as_bytes())
            .await
            .unwrap_err();
        match err {
            ImportError::Rejected { row, message } => {
                assert_eq!(row, 2);
                assert!(message.contains("Cast to Number failed"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            store
                .count(RecordKind::Software, &Filter::all())
                .await
                .unwrap(),
            0
        );
    }
}
