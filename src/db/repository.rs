use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::AppError;

/// Sort direction for a collection's natural listing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// A record type stored in its own collection.
///
/// Field names used here are the serialized (camelCase) names.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + Unpin + 'static {
    /// Collection name in the document store.
    const COLLECTION: &'static str;
    /// Field holding the record's unique key (`slug` or `id`).
    const KEY_FIELD: &'static str;
    /// Additional fields that must be unique across the collection.
    const UNIQUE_FIELDS: &'static [&'static str] = &[];
    /// Fields matched by substring search.
    const SEARCH_FIELDS: &'static [&'static str] = &[];
    /// Natural listing order.
    const SORT: &'static [(&'static str, Direction)];

    fn key(&self) -> &str;
}

/// Equality filter over serialized field values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub eq: Vec<(&'static str, Value)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: &'static str, value: impl Into<Value>) -> Self {
        self.eq.push((field, value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.eq.is_empty()
    }
}

/// Repository trait for a single record collection.
///
/// This trait allows swapping the database layer for an in-memory store and
/// mocking it in tests.
#[async_trait]
pub trait Repository<T: Record>: Send + Sync {
    /// Insert a new record. Fails with `Conflict` if a unique field collides.
    async fn insert(&self, record: &T) -> Result<(), AppError>;

    /// Find a record by its key.
    async fn find(&self, key: &str) -> Result<Option<T>, AppError>;

    /// Whether a record with this key exists.
    async fn exists(&self, key: &str) -> Result<bool, AppError>;

    /// List records matching `filter` in the collection's natural order.
    async fn list(&self, filter: &Filter) -> Result<Vec<T>, AppError>;

    /// Replace the record stored under `key` (the key itself may change).
    /// Returns `false` if nothing was stored under `key`.
    async fn replace(&self, key: &str, record: &T) -> Result<bool, AppError>;

    /// Delete the record stored under `key`. Returns `false` if absent.
    async fn delete(&self, key: &str) -> Result<bool, AppError>;

    /// Case-insensitive substring match over `Record::SEARCH_FIELDS`.
    async fn search(&self, text: &str, limit: usize) -> Result<Vec<T>, AppError>;

    /// Delete every record matching `filter`, returning the count.
    async fn delete_where(&self, filter: &Filter) -> Result<u64, AppError>;

    /// Set `field` to `value` on every record matching `filter`, returning the
    /// number of records modified.
    async fn set_where(
        &self,
        filter: &Filter,
        field: &'static str,
        value: Value,
    ) -> Result<u64, AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_builder() {
        let filter = Filter::new().eq("popular", true).eq("country", "India");
        assert_eq!(filter.eq.len(), 2);
        assert_eq!(filter.eq[0], ("popular", Value::Bool(true)));
        assert!(!filter.is_empty());
        assert!(Filter::new().is_empty());
    }
}
