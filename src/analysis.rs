//! Join-on-read and the critical-review report.
//!
//! Reviews reference users and products by `_id` (`userId`, `productId`)
//! without any integrity guarantee. [`populate_reviews`] resolves them in
//! two steps: collect the referenced key sets, batch-fetch each kind once,
//! then merge in memory. A dangling reference becomes `null`.

use std::collections::{BTreeSet, HashMap};

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;

use crate::models::RecordKind;
use crate::query::{Condition, Filter, SortSpec};
use crate::store::Store;

/// Marker word for a contrastive clause ("but") in the reviewed language.
pub const CRITICAL_MARKER: &str = "dar";
pub const UNKNOWN_NAME: &str = "Unknown";
pub const EMPTY_COMMENT: &str = "[no comment text]";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CriticalReview {
    pub comment: String,
    pub user: String,
    pub product: String,
}

/// Response body of `GET /analysis/critical-reviews`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CriticalReport {
    pub total: usize,
    pub reviews: Vec<CriticalReview>,
}

/// Response body of `GET /data`.
#[derive(Debug, Clone, Serialize)]
pub struct DataDump {
    pub users: Vec<Value>,
    pub products: Vec<Value>,
    pub reviews: Vec<Value>,
}

const REFERENCES: [(&str, RecordKind); 2] = [
    ("userId", RecordKind::User),
    ("productId", RecordKind::Product),
];

/// Replace each review's `userId`/`productId` with the referenced record.
pub async fn populate_reviews(store: &dyn Store, mut reviews: Vec<Value>) -> Result<Vec<Value>> {
    for (field, kind) in REFERENCES {
        let keys: BTreeSet<String> = reviews
            .iter()
            .filter_map(|r| r.get(field).and_then(Value::as_str))
            .map(str::to_string)
            .collect();
        if keys.is_empty() {
            continue;
        }

        let keys: Vec<String> = keys.into_iter().collect();
        let found: HashMap<String, Value> = store
            .find_by_ids(kind, &keys)
            .await?
            .into_iter()
            .filter_map(|doc| {
                let id = doc.get("_id")?.as_str()?.to_string();
                Some((id, doc))
            })
            .collect();

        for review in reviews.iter_mut() {
            let Some(obj) = review.as_object_mut() else {
                continue;
            };
            let resolved = match obj.get(field).and_then(Value::as_str) {
                Some(id) => found.get(id).cloned().unwrap_or(Value::Null),
                None => continue,
            };
            obj.insert(field.to_string(), resolved);
        }
    }
    Ok(reviews)
}

/// All reviews in insertion order, references resolved.
pub async fn populated_reviews(store: &dyn Store) -> Result<Vec<Value>> {
    let reviews = store
        .find(RecordKind::Review, &Filter::all(), SortSpec::OLDEST_FIRST, None)
        .await?;
    populate_reviews(store, reviews).await
}

pub async fn list_all(store: &dyn Store, kind: RecordKind) -> Result<Vec<Value>> {
    store
        .find(kind, &Filter::all(), SortSpec::OLDEST_FIRST, None)
        .await
}

/// Every user, product and populated review.
pub async fn data_dump(store: &dyn Store) -> Result<DataDump> {
    let (users, products, reviews) = tokio::try_join!(
        list_all(store, RecordKind::User),
        list_all(store, RecordKind::Product),
        populated_reviews(store),
    )?;
    Ok(DataDump {
        users,
        products,
        reviews,
    })
}

/// Reviews whose comment contains [`CRITICAL_MARKER`], case-insensitively.
///
/// Loads the entire matching set; there is no pagination.
pub async fn critical_reviews(store: &dyn Store) -> Result<CriticalReport> {
    let filter = Filter::all().and(Condition::Contains {
        field: "comment",
        needle: CRITICAL_MARKER.to_string(),
    });
    let matches = store
        .find(RecordKind::Review, &filter, SortSpec::OLDEST_FIRST, None)
        .await?;
    let populated = populate_reviews(store, matches).await?;

    let reviews: Vec<CriticalReview> = populated
        .iter()
        .map(|r| CriticalReview {
            comment: comment_text(r),
            user: display_name(r.get("userId")),
            product: display_name(r.get("productId")),
        })
        .collect();

    Ok(CriticalReport {
        total: reviews.len(),
        reviews,
    })
}

fn comment_text(review: &Value) -> String {
    review
        .get("comment")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(EMPTY_COMMENT)
        .to_string()
}

fn display_name(reference: Option<&Value>) -> String {
    reference
        .and_then(|r| r.get("name"))
        .and_then(Value::as_str)
        .unwrap_or(UNKNOWN_NAME)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use serde_json::json;

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .insert_many(RecordKind::User, vec![json!({"_id": "u1", "name": "Ana"})])
            .await
            .unwrap();
        store
            .insert_many(
                RecordKind::Product,
                vec![json!({"_id": "p1", "name": "Laptop", "inStock": true})],
            )
            .await
            .unwrap();
        store
            .insert_many(
                RecordKind::Review,
                vec![
                    json!({"_id": "r1", "userId": "u1", "productId": "p1", "rating": 3,
                           "comment": "  Good product, dar the battery dies fast  "}),
                    json!({"_id": "r2", "userId": "u1", "productId": "p1", "rating": 5,
                           "comment": "Excellent"}),
                    json!({"_id": "r3", "userId": "ghost", "rating": 2,
                           "comment": "DAR nu merge"}),
                ],
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_critical_reviews() {
        let store = seeded().await;
        let report = critical_reviews(&store).await.unwrap();
        assert_eq!(report.total, 2);
        assert_eq!(
            report.reviews[0],
            CriticalReview {
                comment: "Good product, dar the battery dies fast".to_string(),
                user: "Ana".to_string(),
                product: "Laptop".to_string(),
            }
        );
        assert_eq!(report.reviews[1].user, UNKNOWN_NAME);
        assert_eq!(report.reviews[1].product, UNKNOWN_NAME);
    }

    #[tokio::test]
    async fn test_no_critical_reviews() {
        let store = MemoryStore::new();
        let report = critical_reviews(&store).await.unwrap();
        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            json!({"total": 0, "reviews": []})
        );
    }

    #[tokio::test]
    async fn test_populate_resolves_and_nulls_dangling() {
        let store = seeded().await;
        let reviews = populated_reviews(&store).await.unwrap();
        assert_eq!(reviews.len(), 3);
        assert_eq!(reviews[0]["userId"]["name"], json!("Ana"));
        assert_eq!(reviews[0]["productId"]["name"], json!("Laptop"));
        assert_eq!(reviews[2]["userId"], Value::Null);
        assert!(reviews[2].get("productId").is_none());
    }

    #[tokio::test]
    async fn test_data_dump() {
        let store = seeded().await;
        let dump = data_dump(&store).await.unwrap();
        assert_eq!(dump.users.len(), 1);
        assert_eq!(dump.products.len(), 1);
        assert_eq!(dump.reviews.len(), 3);
    }

    #[test]
    fn test_comment_placeholder() {
        assert_eq!(comment_text(&json!({"comment": "   "})), EMPTY_COMMENT);
        assert_eq!(comment_text(&json!({})), EMPTY_COMMENT);
        assert_eq!(comment_text(&json!({"comment": " dar "})), "dar");
    }
}
