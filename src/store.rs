//! In-memory record store and the property data model.
//!
//! The backing document is a JSON object: array-valued keys are record
//! collections (`properties`, `bookings`, ...), object-valued keys are
//! singular resources. It is read once at startup; writes made through the
//! record router stay in memory for the lifetime of the process.

use crate::error::StoreError;
use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::path::Path;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Collection the property filter reads from.
pub const PROPERTIES: &str = "properties";

/// A property listing.
///
/// Fields the filter does not look at, the id included, are kept in
/// `extra` so responses echo records exactly as stored whatever the
/// configured id field is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Property {
    /// Kept as the stored JSON number so responses echo it unchanged
    pub price_per_night: Number,
    pub max_guests: u32,
    pub bedrooms: u32,
    pub is_available: bool,
    pub location: Location,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub amenities: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Property {
    pub fn nightly_price(&self) -> f64 {
        self.price_per_night.as_f64().unwrap_or(f64::NAN)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub city: String,
    pub state: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Read access to the property collection.
#[async_trait]
pub trait PropertySource: Send + Sync {
    async fn load_properties(&self) -> Result<Vec<Property>, StoreError>;
}

/// Fixed, in-memory property list.
#[async_trait]
impl PropertySource for Vec<Property> {
    async fn load_properties(&self) -> Result<Vec<Property>, StoreError> {
        Ok(self.clone())
    }
}

/// Shared, lock-guarded JSON document.
pub struct RecordStore {
    document: RwLock<Map<String, Value>>,
    id_field: String,
}

impl RecordStore {
    /// Create a store from an already parsed document.
    pub fn new(document: Value, id_field: impl Into<String>) -> Result<Self, StoreError> {
        match document {
            Value::Object(document) => Ok(Self {
                document: RwLock::new(document),
                id_field: id_field.into(),
            }),
            _ => Err(StoreError::NotAnObject),
        }
    }

    /// Load the document from a JSON file.
    pub async fn from_file(path: &Path, id_field: impl Into<String>) -> Result<Self, StoreError> {
        let content = tokio::fs::read(path).await.map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let document: Value = serde_json::from_slice(&content)?;
        let store = Self::new(document, id_field)?;
        info!(
            path = %path.display(),
            resources = store.document.read().await.len(),
            "Loaded data file"
        );
        Ok(store)
    }

    pub fn id_field(&self) -> &str {
        &self.id_field
    }

    /// Copy of the whole document.
    pub async fn snapshot(&self) -> Value {
        Value::Object(self.document.read().await.clone())
    }

    /// Copy of a collection (array) or singular resource (object).
    pub async fn resource(&self, resource: &str) -> Result<Value, StoreError> {
        self.document
            .read()
            .await
            .get(resource)
            .cloned()
            .ok_or_else(|| StoreError::UnknownResource(resource.to_string()))
    }

    /// Fetch one record by id.
    pub async fn get(&self, resource: &str, id: &str) -> Result<Value, StoreError> {
        let document = self.document.read().await;
        let records = collection(&document, resource)?;
        records
            .iter()
            .find(|record| id_matches(record, &self.id_field, id))
            .cloned()
            .ok_or_else(|| not_found(resource, id))
    }

    /// Append a record, generating an id when the body has none.
    pub async fn insert(&self, resource: &str, mut record: Value) -> Result<Value, StoreError> {
        let mut document = self.document.write().await;
        let records = collection_mut(&mut document, resource)?;
        let fields = record.as_object_mut().ok_or(StoreError::InvalidRecord)?;

        let given_id = fields
            .get(&self.id_field)
            .filter(|id| !id.is_null())
            .map(id_to_string);
        match given_id {
            Some(id) => {
                if records.iter().any(|r| id_matches(r, &self.id_field, &id)) {
                    return Err(StoreError::DuplicateId {
                        resource: resource.to_string(),
                        id,
                    });
                }
            }
            None => {
                let id = next_id(records, &self.id_field);
                fields.insert(self.id_field.clone(), id);
            }
        }

        debug!(resource, id = %record[&self.id_field], "Inserted record");
        records.push(record.clone());
        Ok(record)
    }

    /// Replace a record wholesale, keeping its id.
    pub async fn replace(&self, resource: &str, id: &str, mut record: Value) -> Result<Value, StoreError> {
        let mut document = self.document.write().await;
        let records = collection_mut(&mut document, resource)?;
        let existing = records
            .iter_mut()
            .find(|r| id_matches(r, &self.id_field, id))
            .ok_or_else(|| not_found(resource, id))?;

        let fields = record.as_object_mut().ok_or(StoreError::InvalidRecord)?;
        fields.insert(self.id_field.clone(), existing[&self.id_field].clone());
        *existing = record.clone();
        Ok(record)
    }

    /// Shallow-merge fields into a record. The id cannot be changed.
    pub async fn merge(&self, resource: &str, id: &str, patch: Value) -> Result<Value, StoreError> {
        let mut document = self.document.write().await;
        let records = collection_mut(&mut document, resource)?;
        let existing = records
            .iter_mut()
            .find(|r| id_matches(r, &self.id_field, id))
            .ok_or_else(|| not_found(resource, id))?;

        let Value::Object(patch) = patch else {
            return Err(StoreError::InvalidRecord);
        };
        if let Some(fields) = existing.as_object_mut() {
            for (key, value) in patch {
                if key != self.id_field {
                    fields.insert(key, value);
                }
            }
        }
        Ok(existing.clone())
    }

    /// Remove a record, returning it.
    pub async fn remove(&self, resource: &str, id: &str) -> Result<Value, StoreError> {
        let mut document = self.document.write().await;
        let records = collection_mut(&mut document, resource)?;
        let index = records
            .iter()
            .position(|r| id_matches(r, &self.id_field, id))
            .ok_or_else(|| not_found(resource, id))?;
        Ok(records.remove(index))
    }

    /// Replace a singular resource.
    pub async fn replace_singular(&self, resource: &str, body: Value) -> Result<Value, StoreError> {
        if !body.is_object() {
            return Err(StoreError::InvalidRecord);
        }
        let mut document = self.document.write().await;
        let current = singular_mut(&mut document, resource)?;
        *current = body.clone();
        Ok(body)
    }

    /// Shallow-merge fields into a singular resource.
    pub async fn merge_singular(&self, resource: &str, patch: Value) -> Result<Value, StoreError> {
        let Value::Object(patch) = patch else {
            return Err(StoreError::InvalidRecord);
        };
        let mut document = self.document.write().await;
        let current = singular_mut(&mut document, resource)?;
        if let Some(fields) = current.as_object_mut() {
            fields.extend(patch);
        }
        Ok(current.clone())
    }
}

#[async_trait]
impl PropertySource for RecordStore {
    async fn load_properties(&self) -> Result<Vec<Property>, StoreError> {
        let document = self.document.read().await;
        let records = collection(&document, PROPERTIES)?;
        let properties = records
            .iter()
            .filter_map(|record| match Property::deserialize(record) {
                Ok(property) => Some(property),
                Err(e) => {
                    let id = record.get(&self.id_field).cloned().unwrap_or_default();
                    warn!(
                        id = %id,
                        error = %e,
                        "Skipping malformed property record"
                    );
                    None
                }
            })
            .collect();
        Ok(properties)
    }
}

fn collection<'a>(document: &'a Map<String, Value>, resource: &str) -> Result<&'a Vec<Value>, StoreError> {
    match document.get(resource) {
        Some(Value::Array(records)) => Ok(records),
        Some(_) => Err(StoreError::UnsupportedOperation(resource.to_string())),
        None => Err(StoreError::UnknownResource(resource.to_string())),
    }
}

fn collection_mut<'a>(
    document: &'a mut Map<String, Value>,
    resource: &str,
) -> Result<&'a mut Vec<Value>, StoreError> {
    match document.get_mut(resource) {
        Some(Value::Array(records)) => Ok(records),
        Some(_) => Err(StoreError::UnsupportedOperation(resource.to_string())),
        None => Err(StoreError::UnknownResource(resource.to_string())),
    }
}

fn singular_mut<'a>(document: &'a mut Map<String, Value>, resource: &str) -> Result<&'a mut Value, StoreError> {
    match document.get_mut(resource) {
        Some(value @ Value::Object(_)) => Ok(value),
        Some(_) => Err(StoreError::UnsupportedOperation(resource.to_string())),
        None => Err(StoreError::UnknownResource(resource.to_string())),
    }
}

fn not_found(resource: &str, id: &str) -> StoreError {
    StoreError::RecordNotFound {
        resource: resource.to_string(),
        id: id.to_string(),
    }
}

/// Ids arrive as path segments, so `7` and `"7"` both match `/7`.
fn id_matches(record: &Value, id_field: &str, id: &str) -> bool {
    match record.get(id_field) {
        Some(value @ (Value::String(_) | Value::Number(_))) => id_to_string(value) == id,
        _ => false,
    }
}

fn id_to_string(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn next_id(records: &[Value], id_field: &str) -> Value {
    let numeric: Option<Vec<u64>> = records
        .iter()
        .map(|r| r.get(id_field).and_then(Value::as_u64))
        .collect();

    match numeric {
        Some(ids) => match ids.into_iter().max().unwrap_or(0).checked_add(1) {
            Some(id) => Value::from(id),
            None => random_id(),
        },
        None => random_id(),
    }
}

fn random_id() -> Value {
    let id: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(char::from)
        .collect();
    Value::String(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_document() -> Value {
        json!({
            "properties": [
                {
                    "id": "p1",
                    "title": "Loft",
                    "pricePerNight": 120.0,
                    "maxGuests": 2,
                    "bedrooms": 1,
                    "isAvailable": true,
                    "location": { "city": "Austin", "state": "TX", "country": "USA" },
                    "type": "Apartment",
                    "amenities": ["wifi", "kitchen"]
                },
                { "id": "broken", "pricePerNight": "cheap" }
            ],
            "bookings": [ { "id": 1, "propertyId": "p1" }, { "id": 4, "propertyId": "p1" } ],
            "profile": { "name": "demo" }
        })
    }

    fn store() -> RecordStore {
        RecordStore::new(sample_document(), "id").unwrap()
    }

    #[test]
    fn test_rejects_non_object_document() {
        assert!(matches!(
            RecordStore::new(json!([1, 2]), "id"),
            Err(StoreError::NotAnObject)
        ));
    }

    #[tokio::test]
    async fn test_load_properties_skips_malformed_records() {
        let properties = store().load_properties().await.unwrap();
        assert_eq!(properties.len(), 1);
        let loft = &properties[0];
        assert_eq!(loft.extra.get("id"), Some(&json!("p1")));
        assert_eq!(loft.kind, "Apartment");
        assert_eq!(loft.location.city, "Austin");
        assert_eq!(loft.extra.get("title"), Some(&json!("Loft")));
        assert_eq!(loft.location.extra.get("country"), Some(&json!("USA")));
    }

    #[tokio::test]
    async fn test_property_serializes_back_to_stored_shape() {
        let properties = store().load_properties().await.unwrap();
        let value = serde_json::to_value(&properties[0]).unwrap();
        assert_eq!(value, sample_document()["properties"][0]);
    }

    #[tokio::test]
    async fn test_load_properties_without_collection() {
        let store = RecordStore::new(json!({ "bookings": [] }), "id").unwrap();
        assert!(matches!(
            store.load_properties().await,
            Err(StoreError::UnknownResource(_))
        ));
    }

    #[tokio::test]
    async fn test_get_matches_numeric_and_string_ids() {
        let store = store();
        assert_eq!(store.get("bookings", "4").await.unwrap()["propertyId"], "p1");
        assert_eq!(store.get("properties", "p1").await.unwrap()["title"], "Loft");
        assert!(matches!(
            store.get("bookings", "2").await,
            Err(StoreError::RecordNotFound { .. })
        ));
        assert!(matches!(
            store.get("reviews", "1").await,
            Err(StoreError::UnknownResource(_))
        ));
        assert!(matches!(
            store.get("profile", "1").await,
            Err(StoreError::UnsupportedOperation(_))
        ));
    }

    #[tokio::test]
    async fn test_insert_assigns_next_numeric_id() {
        let store = store();
        let created = store.insert("bookings", json!({ "propertyId": "p2" })).await.unwrap();
        assert_eq!(created["id"], json!(5));
        assert_eq!(store.resource("bookings").await.unwrap().as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_insert_assigns_random_id_for_string_ids() {
        let store = store();
        let created = store.insert("properties", json!({ "title": "Cabin" })).await.unwrap();
        let id = created["id"].as_str().unwrap();
        assert_eq!(id.len(), 9);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicates_and_non_objects() {
        let store = store();
        assert!(matches!(
            store.insert("bookings", json!({ "id": 1 })).await,
            Err(StoreError::DuplicateId { .. })
        ));
        assert!(matches!(
            store.insert("bookings", json!("text")).await,
            Err(StoreError::InvalidRecord)
        ));
    }

    #[tokio::test]
    async fn test_replace_keeps_id() {
        let store = store();
        let replaced = store
            .replace("bookings", "1", json!({ "id": 99, "propertyId": "p9" }))
            .await
            .unwrap();
        assert_eq!(replaced, json!({ "id": 1, "propertyId": "p9" }));
        assert_eq!(store.get("bookings", "1").await.unwrap(), replaced);
    }

    #[tokio::test]
    async fn test_merge_updates_fields() {
        let store = store();
        let merged = store
            .merge("bookings", "4", json!({ "id": 7, "guests": 3 }))
            .await
            .unwrap();
        assert_eq!(merged, json!({ "id": 4, "propertyId": "p1", "guests": 3 }));
    }

    #[tokio::test]
    async fn test_remove() {
        let store = store();
        let removed = store.remove("bookings", "1").await.unwrap();
        assert_eq!(removed["id"], 1);
        assert!(store.get("bookings", "1").await.is_err());
        assert!(store.remove("bookings", "1").await.is_err());
    }

    #[tokio::test]
    async fn test_singular_resources() {
        let store = store();
        let merged = store.merge_singular("profile", json!({ "theme": "dark" })).await.unwrap();
        assert_eq!(merged, json!({ "name": "demo", "theme": "dark" }));

        let replaced = store.replace_singular("profile", json!({ "name": "new" })).await.unwrap();
        assert_eq!(store.resource("profile").await.unwrap(), replaced);

        assert!(matches!(
            store.replace_singular("bookings", json!({})).await,
            Err(StoreError::UnsupportedOperation(_))
        ));
    }

    #[tokio::test]
    async fn test_custom_id_field() {
        let store = RecordStore::new(json!({ "users": [ { "_id": 3 } ] }), "_id").unwrap();
        assert!(store.get("users", "3").await.is_ok());
        let created = store.insert("users", json!({})).await.unwrap();
        assert_eq!(created["_id"], json!(4));
    }

    #[tokio::test]
    async fn test_load_properties_with_custom_id_field() {
        let store = RecordStore::new(
            json!({
                "properties": [{
                    "_id": 1,
                    "pricePerNight": 90,
                    "maxGuests": 2,
                    "bedrooms": 1,
                    "isAvailable": true,
                    "location": { "city": "Austin", "state": "TX" },
                    "type": "Cabin"
                }]
            }),
            "_id",
        )
        .unwrap();
        let properties = store.load_properties().await.unwrap();
        assert_eq!(properties.len(), 1);
        assert_eq!(properties[0].extra.get("_id"), Some(&json!(1)));
        assert_eq!(
            serde_json::to_value(&properties[0]).unwrap()["pricePerNight"],
            json!(90)
        );
    }

    #[tokio::test]
    async fn test_insert_after_largest_numeric_id() {
        let store = RecordStore::new(json!({ "bookings": [ { "id": u64::MAX } ] }), "id").unwrap();
        let created = store.insert("bookings", json!({})).await.unwrap();
        let id = created["id"].as_str().unwrap();
        assert_eq!(id.len(), 9);
    }

    #[tokio::test]
    async fn test_from_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", sample_document()).unwrap();
        let store = RecordStore::from_file(file.path(), "id").await.unwrap();
        assert_eq!(store.snapshot().await, sample_document());
    }

    #[tokio::test]
    async fn test_from_file_errors() {
        let missing = RecordStore::from_file(Path::new("/nonexistent/db.json"), "id").await;
        assert!(matches!(missing, Err(StoreError::Io { .. })));

        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let corrupt = RecordStore::from_file(file.path(), "id").await;
        assert!(matches!(corrupt, Err(StoreError::Parse(_))));
    }
}
