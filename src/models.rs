//! Record kinds and their schemas.
//!
//! Every record is stored as a JSON document. Before a document reaches the
//! store it is cast through the typed schema of its [`RecordKind`]: values
//! are coerced (see [`crate::cast`]), required fields are checked and an
//! `_id` is generated when absent.
//!
//! Strict kinds ([`SoftwareReview`], [`Review`]) drop fields their schema does
//! not name. Flexible kinds ([`User`], [`Product`]) keep unrecognised fields
//! in an `extra` side map that is re-emitted verbatim.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::cast;

/// The logical collections served by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Software,
    User,
    Product,
    Review,
}

impl RecordKind {
    pub const ALL: [RecordKind; 4] = [
        RecordKind::Software,
        RecordKind::User,
        RecordKind::Product,
        RecordKind::Review,
    ];

    /// Path segment and storage key (`software`, `users`, `products`, `reviews`).
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Software => "software",
            RecordKind::User => "users",
            RecordKind::Product => "products",
            RecordKind::Review => "reviews",
        }
    }

    /// Human-readable plural used in response messages.
    pub fn label(&self) -> &'static str {
        match self {
            RecordKind::Software => "software reviews",
            RecordKind::User => "users",
            RecordKind::Product => "products",
            RecordKind::Review => "reviews",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        RecordKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == name)
    }

    /// Cast a raw field map through this kind's schema, producing the
    /// document that will be stored.
    pub fn cast(&self, fields: Map<String, Value>) -> Result<Value, serde_json::Error> {
        let raw = Value::Object(fields);
        match self {
            RecordKind::Software => through::<SoftwareReview>(raw),
            RecordKind::User => through::<User>(raw),
            RecordKind::Product => through::<Product>(raw),
            RecordKind::Review => through::<Review>(raw),
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn through<T: DeserializeOwned + Serialize>(raw: Value) -> Result<Value, serde_json::Error> {
    let record: T = serde_json::from_value(raw)?;
    serde_json::to_value(record)
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn default_true() -> bool {
    true
}

/// A product review as exported by the marketplace dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoftwareReview {
    #[serde(rename = "_id", default = "new_id")]
    pub id: String,
    #[serde(
        default,
        deserialize_with = "cast::number",
        serialize_with = "cast::ser_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub rating: Option<f64>,
    #[serde(
        default,
        deserialize_with = "cast::string",
        skip_serializing_if = "Option::is_none"
    )]
    pub title: Option<String>,
    #[serde(
        default,
        deserialize_with = "cast::string",
        skip_serializing_if = "Option::is_none"
    )]
    pub text: Option<String>,
    #[serde(
        default,
        deserialize_with = "cast::array",
        skip_serializing_if = "Option::is_none"
    )]
    pub images: Option<Vec<Value>>,
    #[serde(
        default,
        deserialize_with = "cast::string",
        skip_serializing_if = "Option::is_none"
    )]
    pub asin: Option<String>,
    #[serde(
        default,
        deserialize_with = "cast::string",
        skip_serializing_if = "Option::is_none"
    )]
    pub parent_asin: Option<String>,
    #[serde(
        default,
        deserialize_with = "cast::string",
        skip_serializing_if = "Option::is_none"
    )]
    pub user_id: Option<String>,
    /// Epoch milliseconds.
    #[serde(
        default,
        deserialize_with = "cast::integer",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<i64>,
    #[serde(
        default,
        deserialize_with = "cast::integer",
        skip_serializing_if = "Option::is_none"
    )]
    pub helpful_vote: Option<i64>,
    #[serde(
        default,
        deserialize_with = "cast::boolean",
        skip_serializing_if = "Option::is_none"
    )]
    pub verified_purchase: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id", default = "new_id")]
    pub id: String,
    #[serde(deserialize_with = "cast::required_string")]
    pub name: String,
    #[serde(
        default,
        deserialize_with = "cast::string",
        skip_serializing_if = "Option::is_none"
    )]
    pub email: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    #[serde(rename = "_id", default = "new_id")]
    pub id: String,
    #[serde(deserialize_with = "cast::required_string")]
    pub name: String,
    #[serde(
        default,
        deserialize_with = "cast::string",
        skip_serializing_if = "Option::is_none"
    )]
    pub category: Option<String>,
    #[serde(
        default,
        deserialize_with = "cast::number",
        serialize_with = "cast::ser_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub price: Option<f64>,
    #[serde(
        rename = "inStock",
        default = "default_true",
        deserialize_with = "cast::loose_flag"
    )]
    pub in_stock: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A user's comment on a product. `userId` and `productId` are soft
/// references resolved on read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    #[serde(rename = "_id", default = "new_id")]
    pub id: String,
    #[serde(
        rename = "userId",
        default,
        deserialize_with = "cast::string",
        skip_serializing_if = "Option::is_none"
    )]
    pub user_id: Option<String>,
    #[serde(
        rename = "productId",
        default,
        deserialize_with = "cast::string",
        skip_serializing_if = "Option::is_none"
    )]
    pub product_id: Option<String>,
    #[serde(
        default,
        deserialize_with = "cast::number",
        serialize_with = "cast::ser_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub rating: Option<f64>,
    #[serde(
        default,
        deserialize_with = "cast::string",
        skip_serializing_if = "Option::is_none"
    )]
    pub comment: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_kind_names_round_trip() {
        for kind in RecordKind::ALL {
            assert_eq!(RecordKind::from_name(kind.as_str()), Some(kind));
        }
        assert_eq!(RecordKind::from_name("orders"), None);
    }

    #[test]
    fn test_software_cast_coerces_and_drops_unknown_fields() {
        let doc = RecordKind::Software
            .cast(fields(json!({
                "rating": "5",
                "title": "Great",
                "timestamp": "1588687728923",
                "verified_purchase": "True",
                "helpful_vote": "0",
                "images": "[]",
                "sentiment": "positive"
            })))
            .unwrap();

        assert_eq!(doc["rating"], json!(5));
        assert_eq!(doc["timestamp"], json!(1588687728923i64));
        assert_eq!(doc["verified_purchase"], json!(true));
        assert_eq!(doc["images"], json!([]));
        assert!(doc.get("sentiment").is_none());
        assert!(doc["_id"].as_str().is_some_and(|id| !id.is_empty()));
    }

    #[test]
    fn test_software_cast_rejects_bad_rating() {
        let err = RecordKind::Software
            .cast(fields(json!({"rating": "excellent"})))
            .unwrap_err();
        assert!(err.to_string().contains("Cast to Number failed"));
    }

    #[test]
    fn test_user_keeps_extra_fields() {
        let doc = RecordKind::User
            .cast(fields(json!({
                "name": "Ana",
                "city": "Cluj",
                "prefs": {"theme": "dark"}
            })))
            .unwrap();
        assert_eq!(doc["name"], json!("Ana"));
        assert_eq!(doc["city"], json!("Cluj"));
        assert_eq!(doc["prefs"], json!({"theme": "dark"}));
    }

    #[test]
    fn test_user_requires_name() {
        assert!(RecordKind::User.cast(fields(json!({"email": "a@b.c"}))).is_err());
        assert!(RecordKind::User.cast(fields(json!({"name": "  "}))).is_err());
    }

    #[test]
    fn test_product_in_stock_setter() {
        let cast = |v: Value| RecordKind::Product.cast(fields(v)).unwrap()["inStock"].clone();
        assert_eq!(cast(json!({"name": "Pen"})), json!(true));
        assert_eq!(cast(json!({"name": "Pen", "inStock": " YES "})), json!(true));
        assert_eq!(cast(json!({"name": "Pen", "inStock": "1"})), json!(true));
        assert_eq!(cast(json!({"name": "Pen", "inStock": "nope"})), json!(false));
        assert_eq!(cast(json!({"name": "Pen", "inStock": false})), json!(false));
    }

    #[test]
    fn test_provided_id_is_kept() {
        let doc = RecordKind::Review
            .cast(fields(json!({"_id": "r-1", "comment": "ok", "userId": "u-1"})))
            .unwrap();
        assert_eq!(doc["_id"], json!("r-1"));
        assert_eq!(doc["userId"], json!("u-1"));
    }
}
