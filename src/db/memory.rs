use std::cmp::Ordering;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use serde_json::Value;

use crate::db::repository::{Direction, Filter, Record, Repository};
use crate::error::AppError;

/// In-memory implementation of `Repository`.
///
/// Used with `database.backend = "memory"` and by the test suites. Filters,
/// sorting and search operate on the serialized JSON form so they see the same
/// field names as the MongoDB implementation.
pub struct MemoryRepository<T> {
    records: RwLock<Vec<T>>,
}

impl<T: Record> Default for MemoryRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Record> MemoryRepository<T> {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Vec<T>>, AppError> {
        self.records
            .read()
            .map_err(|_| AppError::Internal(format!("{} store lock poisoned", T::COLLECTION)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Vec<T>>, AppError> {
        self.records
            .write()
            .map_err(|_| AppError::Internal(format!("{} store lock poisoned", T::COLLECTION)))
    }

    /// Reject `candidate` if a unique field collides with any record other
    /// than the one stored under `skip_key`.
    fn check_unique(
        records: &[T],
        candidate: &Value,
        skip_key: Option<&str>,
    ) -> Result<(), AppError> {
        let unique = std::iter::once(T::KEY_FIELD).chain(T::UNIQUE_FIELDS.iter().copied());
        for name in unique {
            let wanted = field(candidate, name);
            if wanted.is_null() {
                continue;
            }
            for existing in records {
                if Some(existing.key()) == skip_key {
                    continue;
                }
                let existing = serde_json::to_value(existing)?;
                if values_equal(field(&existing, name), wanted) {
                    return Err(AppError::Conflict(format!(
                        "Duplicate {} '{}' in {}",
                        name,
                        label(wanted),
                        T::COLLECTION
                    )));
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<T: Record> Repository<T> for MemoryRepository<T> {
    async fn insert(&self, record: &T) -> Result<(), AppError> {
        let candidate = serde_json::to_value(record)?;
        let mut records = self.write()?;
        Self::check_unique(&records, &candidate, None)?;
        records.push(record.clone());
        Ok(())
    }

    async fn find(&self, key: &str) -> Result<Option<T>, AppError> {
        Ok(self.read()?.iter().find(|r| r.key() == key).cloned())
    }

    async fn exists(&self, key: &str) -> Result<bool, AppError> {
        Ok(self.read()?.iter().any(|r| r.key() == key))
    }

    async fn list(&self, filter: &Filter) -> Result<Vec<T>, AppError> {
        let records = self.read()?;
        let mut matched = Vec::new();
        for record in records.iter() {
            let value = serde_json::to_value(record)?;
            if matches(&value, filter) {
                matched.push((value, record.clone()));
            }
        }

        matched.sort_by(|(a, _), (b, _)| {
            T::SORT
                .iter()
                .map(|(name, direction)| {
                    let ord = compare(field(a, name), field(b, name));
                    match direction {
                        Direction::Asc => ord,
                        Direction::Desc => ord.reverse(),
                    }
                })
                .find(|ord| *ord != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });

        Ok(matched.into_iter().map(|(_, record)| record).collect())
    }

    async fn replace(&self, key: &str, record: &T) -> Result<bool, AppError> {
        let candidate = serde_json::to_value(record)?;
        let mut records = self.write()?;
        let Some(index) = records.iter().position(|r| r.key() == key) else {
            return Ok(false);
        };
        Self::check_unique(&records, &candidate, Some(key))?;
        records[index] = record.clone();
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<bool, AppError> {
        let mut records = self.write()?;
        let before = records.len();
        records.retain(|r| r.key() != key);
        Ok(records.len() != before)
    }

    async fn search(&self, text: &str, limit: usize) -> Result<Vec<T>, AppError> {
        let needle = text.to_lowercase();
        let mut hits = Vec::new();
        for record in self.list(&Filter::new()).await? {
            if hits.len() >= limit {
                break;
            }
            let value = serde_json::to_value(&record)?;
            let found = T::SEARCH_FIELDS
                .iter()
                .any(|name| contains_text(field(&value, name), &needle));
            if found {
                hits.push(record);
            }
        }
        Ok(hits)
    }

    async fn delete_where(&self, filter: &Filter) -> Result<u64, AppError> {
        let mut records = self.write()?;
        // Decide every record before touching the vector so a failure leaves
        // it intact.
        let doomed = records
            .iter()
            .map(|r| Ok(matches(&serde_json::to_value(r)?, filter)))
            .collect::<Result<Vec<bool>, AppError>>()?;
        let mut verdicts = doomed.iter();
        records.retain(|_| !verdicts.next().copied().unwrap_or(false));
        Ok(doomed.iter().filter(|d| **d).count() as u64)
    }

    async fn set_where(
        &self,
        filter: &Filter,
        field_name: &'static str,
        value: Value,
    ) -> Result<u64, AppError> {
        let mut records = self.write()?;
        let mut modified = 0;
        for record in records.iter_mut() {
            let mut current = serde_json::to_value(&*record)?;
            if !matches(&current, filter) {
                continue;
            }
            if let Value::Object(map) = &mut current {
                map.insert(field_name.to_string(), value.clone());
            }
            *record = serde_json::from_value(current)?;
            modified += 1;
        }
        Ok(modified)
    }
}

fn field<'a>(value: &'a Value, name: &str) -> &'a Value {
    value.get(name).unwrap_or(&Value::Null)
}

fn label(value: &Value) -> String {
    value
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| value.to_string())
}

fn matches(value: &Value, filter: &Filter) -> bool {
    filter
        .eq
        .iter()
        .all(|(name, wanted)| values_equal(field(value, name), wanted))
}

/// Numbers compare by value so `1` matches `1.0`, as the document store does.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Nulls sort first; mismatched types compare equal.
fn compare(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

fn contains_text(value: &Value, needle: &str) -> bool {
    match value {
        Value::String(s) => s.to_lowercase().contains(needle),
        Value::Array(items) => items.iter().any(|item| contains_text(item, needle)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
    use std::sync::Arc;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Place {
        slug: String,
        name: String,
        rank: i64,
        popular: bool,
        tags: Vec<String>,
        #[serde(default)]
        email: Option<String>,
    }

    impl Record for Place {
        const COLLECTION: &'static str = "places";
        const KEY_FIELD: &'static str = "slug";
        const UNIQUE_FIELDS: &'static [&'static str] = &["email"];
        const SEARCH_FIELDS: &'static [&'static str] = &["name", "tags"];
        const SORT: &'static [(&'static str, Direction)] =
            &[("rank", Direction::Asc), ("name", Direction::Asc)];

        fn key(&self) -> &str {
            &self.slug
        }
    }

    fn place(slug: &str, name: &str, rank: i64, popular: bool) -> Place {
        Place {
            slug: slug.to_string(),
            name: name.to_string(),
            rank,
            popular,
            tags: vec![],
            email: None,
        }
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_key() {
        let repo = MemoryRepository::new();
        repo.insert(&place("goa", "Goa", 1, true)).await.unwrap();

        let result = repo.insert(&place("goa", "Goa again", 2, false)).await;
        match result.unwrap_err() {
            AppError::Conflict(msg) => assert!(msg.contains("goa")),
            other => panic!("Expected Conflict error, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_unique_field() {
        let repo = MemoryRepository::new();
        let mut a = place("a", "A", 1, true);
        a.email = Some("x@example.com".to_string());
        let mut b = place("b", "B", 1, true);
        b.email = Some("x@example.com".to_string());

        repo.insert(&a).await.unwrap();
        assert!(matches!(
            repo.insert(&b).await,
            Err(AppError::Conflict(_))
        ));
        // Absent optional fields never collide.
        repo.insert(&place("c", "C", 1, true)).await.unwrap();
        repo.insert(&place("d", "D", 1, true)).await.unwrap();
    }

    #[tokio::test]
    async fn test_list_filters_and_sorts() {
        let repo = MemoryRepository::new();
        repo.insert(&place("c", "Coorg", 2, true)).await.unwrap();
        repo.insert(&place("a", "Agra", 2, false)).await.unwrap();
        repo.insert(&place("b", "Bali", 1, true)).await.unwrap();

        let all = repo.list(&Filter::new()).await.unwrap();
        let slugs: Vec<&str> = all.iter().map(|p| p.slug.as_str()).collect();
        assert_eq!(slugs, vec!["b", "a", "c"]);

        let popular = repo.list(&Filter::new().eq("popular", true)).await.unwrap();
        let slugs: Vec<&str> = popular.iter().map(|p| p.slug.as_str()).collect();
        assert_eq!(slugs, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_search_matches_strings_and_arrays() {
        let repo = MemoryRepository::new();
        let mut beach = place("beach", "Palolem", 1, true);
        beach.tags = vec!["Beach".to_string(), "Sunset".to_string()];
        repo.insert(&beach).await.unwrap();
        repo.insert(&place("fort", "Amber Fort", 2, true)).await.unwrap();

        let hits = repo.search("sunset", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].slug, "beach");

        let hits = repo.search("FORT", 10).await.unwrap();
        assert_eq!(hits[0].slug, "fort");

        // The key is not a search field here.
        assert!(repo.search("beach-", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_respects_limit() {
        let repo = MemoryRepository::new();
        for i in 0..5 {
            repo.insert(&place(&format!("p{i}"), "Lake", i, true))
                .await
                .unwrap();
        }
        assert_eq!(repo.search("lake", 3).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_replace_can_change_key() {
        let repo = MemoryRepository::new();
        repo.insert(&place("old", "Old", 1, true)).await.unwrap();
        repo.insert(&place("other", "Other", 1, true)).await.unwrap();

        assert!(repo.replace("old", &place("new", "New", 1, true)).await.unwrap());
        assert!(!repo.exists("old").await.unwrap());
        assert!(repo.exists("new").await.unwrap());

        // Renaming onto another record's key is a conflict.
        assert!(matches!(
            repo.replace("new", &place("other", "Clash", 1, true)).await,
            Err(AppError::Conflict(_))
        ));

        assert!(!repo.replace("missing", &place("x", "X", 1, true)).await.unwrap());
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Fragile {
        slug: String,
        #[serde(skip_deserializing, serialize_with = "fail_when_broken")]
        broken: Arc<AtomicBool>,
    }

    fn fail_when_broken<S: serde::Serializer>(
        broken: &Arc<AtomicBool>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        if broken.load(AtomicOrdering::SeqCst) {
            return Err(serde::ser::Error::custom("refusing to serialize"));
        }
        serializer.serialize_bool(false)
    }

    impl Record for Fragile {
        const COLLECTION: &'static str = "fragile";
        const KEY_FIELD: &'static str = "slug";
        const SORT: &'static [(&'static str, Direction)] = &[];

        fn key(&self) -> &str {
            &self.slug
        }
    }

    #[tokio::test]
    async fn test_failed_delete_where_keeps_records() {
        let repo = MemoryRepository::new();
        let broken = Arc::new(AtomicBool::new(false));
        for slug in ["a", "b", "c"] {
            repo.insert(&Fragile {
                slug: slug.to_string(),
                broken: if slug == "b" { broken.clone() } else { Arc::default() },
            })
            .await
            .unwrap();
        }

        broken.store(true, AtomicOrdering::SeqCst);
        assert!(repo.delete_where(&Filter::new()).await.is_err());

        broken.store(false, AtomicOrdering::SeqCst);
        assert_eq!(repo.list(&Filter::new()).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_delete_where_and_set_where() {
        let repo = MemoryRepository::new();
        repo.insert(&place("a", "A", 1, true)).await.unwrap();
        repo.insert(&place("b", "B", 1, false)).await.unwrap();
        repo.insert(&place("c", "C", 2, true)).await.unwrap();

        let modified = repo
            .set_where(&Filter::new().eq("rank", 1), "popular", Value::Bool(false))
            .await
            .unwrap();
        assert_eq!(modified, 2);
        assert!(!repo.find("a").await.unwrap().unwrap().popular);

        let removed = repo
            .delete_where(&Filter::new().eq("popular", false))
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert!(repo.exists("c").await.unwrap());
        assert!(!repo.delete("a").await.unwrap());
    }
}
