use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, to_bson, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{FindOptions, IndexOptions};
use mongodb::IndexModel;
use serde_json::Value;

use crate::db::repository::{Direction, Filter, Record, Repository};
use crate::error::AppError;

/// Server error code for a unique index violation.
const DUPLICATE_KEY: i32 = 11000;

/// MongoDB implementation of `Repository`, one collection per record type.
pub struct MongoRepository<T: Send + Sync> {
    collection: mongodb::Collection<T>,
}

impl<T: Record> MongoRepository<T> {
    pub fn new(db: &mongodb::Database) -> Self {
        Self {
            collection: db.collection(T::COLLECTION),
        }
    }

    /// Create unique indexes on the key field and `Record::UNIQUE_FIELDS`.
    pub async fn ensure_indexes(&self) -> Result<(), AppError> {
        let unique = std::iter::once(T::KEY_FIELD).chain(T::UNIQUE_FIELDS.iter().copied());
        for name in unique {
            let mut keys = Document::new();
            keys.insert(name, 1);
            let model = IndexModel::builder()
                .keys(keys)
                .options(IndexOptions::builder().unique(true).build())
                .build();

            self.collection
                .create_index(model)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
        }

        tracing::debug!("Indexes ensured for '{}'", T::COLLECTION);
        Ok(())
    }

    fn key_filter(key: &str) -> Document {
        let mut filter = Document::new();
        filter.insert(T::KEY_FIELD, key);
        filter
    }

    fn sort_document() -> Document {
        let mut sort = Document::new();
        for (name, direction) in T::SORT {
            let order = match direction {
                Direction::Asc => 1,
                Direction::Desc => -1,
            };
            sort.insert(*name, order);
        }
        sort
    }

    fn map_write_error(e: mongodb::error::Error) -> AppError {
        match e.kind.as_ref() {
            ErrorKind::Write(WriteFailure::WriteError(we)) if we.code == DUPLICATE_KEY => {
                AppError::Conflict(format!("Duplicate key in {}: {}", T::COLLECTION, we.message))
            }
            _ => AppError::Database(e.to_string()),
        }
    }

    async fn find_many(&self, filter: Document, limit: Option<i64>) -> Result<Vec<T>, AppError> {
        let options = FindOptions::builder()
            .sort(Self::sort_document())
            .limit(limit)
            .build();

        let cursor = self
            .collection
            .find(filter)
            .with_options(options)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        cursor
            .try_collect()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

fn filter_document(filter: &Filter) -> Result<Document, AppError> {
    let mut document = Document::new();
    for (name, value) in &filter.eq {
        let value = to_bson(value).map_err(|e| AppError::Internal(e.to_string()))?;
        document.insert(*name, value);
    }
    Ok(document)
}

#[async_trait]
impl<T: Record> Repository<T> for MongoRepository<T> {
    async fn insert(&self, record: &T) -> Result<(), AppError> {
        self.collection
            .insert_one(record)
            .await
            .map_err(Self::map_write_error)?;
        Ok(())
    }

    async fn find(&self, key: &str) -> Result<Option<T>, AppError> {
        self.collection
            .find_one(Self::key_filter(key))
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn exists(&self, key: &str) -> Result<bool, AppError> {
        let count = self
            .collection
            .count_documents(Self::key_filter(key))
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(count > 0)
    }

    async fn list(&self, filter: &Filter) -> Result<Vec<T>, AppError> {
        self.find_many(filter_document(filter)?, None).await
    }

    async fn replace(&self, key: &str, record: &T) -> Result<bool, AppError> {
        let result = self
            .collection
            .replace_one(Self::key_filter(key), record)
            .await
            .map_err(Self::map_write_error)?;
        Ok(result.matched_count > 0)
    }

    async fn delete(&self, key: &str) -> Result<bool, AppError> {
        let result = self
            .collection
            .delete_one(Self::key_filter(key))
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(result.deleted_count > 0)
    }

    async fn search(&self, text: &str, limit: usize) -> Result<Vec<T>, AppError> {
        let pattern = regex::escape(text);
        let clauses: Vec<Document> = T::SEARCH_FIELDS
            .iter()
            .map(|name| {
                let mut clause = Document::new();
                clause.insert(*name, doc! { "$regex": pattern.as_str(), "$options": "i" });
                clause
            })
            .collect();

        self.find_many(doc! { "$or": clauses }, Some(limit as i64))
            .await
    }

    async fn delete_where(&self, filter: &Filter) -> Result<u64, AppError> {
        let result = self
            .collection
            .delete_many(filter_document(filter)?)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(result.deleted_count)
    }

    async fn set_where(
        &self,
        filter: &Filter,
        field: &'static str,
        value: Value,
    ) -> Result<u64, AppError> {
        let mut set = Document::new();
        set.insert(field, to_bson(&value).map_err(|e| AppError::Internal(e.to_string()))?);

        let result = self
            .collection
            .update_many(filter_document(filter)?, doc! { "$set": set })
            .await
            .map_err(Self::map_write_error)?;
        Ok(result.modified_count)
    }
}
