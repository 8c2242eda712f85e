use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::api::response::{ok, ApiJson};
use crate::app::AppState;
use crate::auth::models::{AdminGrant, Session};
use crate::db::models::Timestamp;
use crate::db::repository::{Filter, Record, Repository};
use crate::db::stores::{HasStore, Stores};
use crate::error::AppError;
use crate::slug::{slugify, unique_slug};

/// Query parameters accepted by the list endpoints.
///
/// Each collection picks the ones it understands in
/// [`CatalogRecord::list_filter`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    pub popular: Option<bool>,
    pub featured: Option<bool>,
    pub activity: Option<String>,
}

/// A content record managed through the generic CRUD endpoints.
pub trait CatalogRecord: Record + Default {
    /// Human-readable name used in messages.
    const KIND: &'static str;
    /// Fields that must be present and non-blank.
    const REQUIRED: &'static [&'static str];
    /// Field a slug is derived from when the request carries none.
    const LABEL_FIELD: &'static str;
    /// Fields a partial update never touches.
    const IMMUTABLE: &'static [&'static str] = &["id", "createdAt"];

    fn list_filter(_params: &ListParams) -> Filter {
        Filter::new()
    }

    /// Recompute derived fields before every write.
    fn finalize(&mut self) {}

    /// Record-specific checks beyond the required fields.
    fn validate(&self) -> Result<(), AppError> {
        Ok(())
    }
}

/// Result of a partial update.
#[derive(Debug, Clone)]
pub struct Updated<T> {
    /// Key the record was stored under before the update.
    pub previous_key: String,
    pub record: T,
}

impl<T: Record> Updated<T> {
    pub fn key_changed(&self) -> bool {
        self.previous_key != self.record.key()
    }
}

/// Response body of a delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deleted {
    pub deleted: String,
}

fn into_object(body: Value) -> Result<Map<String, Value>, AppError> {
    match body {
        Value::Object(map) => Ok(map),
        _ => Err(AppError::BadRequest(
            "Request body must be a JSON object".into(),
        )),
    }
}

fn parse<T: CatalogRecord>(value: Value) -> Result<T, AppError> {
    serde_json::from_value(value)
        .map_err(|e| AppError::BadRequest(format!("Invalid {}: {}", T::KIND, e)))
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

fn check_required<T: CatalogRecord>(value: &Value) -> Result<(), AppError> {
    for field in T::REQUIRED {
        if is_blank(value.get(*field)) {
            return Err(AppError::BadRequest(format!("{} is required", field)));
        }
    }
    Ok(())
}

/// Slugify a client-supplied slug and make sure no other record holds it.
async fn claim_slug<T: CatalogRecord>(
    store: &dyn Repository<T>,
    requested: &Value,
    current: Option<&str>,
) -> Result<String, AppError> {
    let raw = requested
        .as_str()
        .ok_or_else(|| AppError::BadRequest("slug must be a string".into()))?;
    let slug = slugify(raw);
    if slug.is_empty() {
        return Err(AppError::BadRequest(format!(
            "Slug '{}' has no usable characters",
            raw
        )));
    }
    if current != Some(slug.as_str()) && store.exists(&slug).await? {
        return Err(AppError::Conflict(format!(
            "{} with slug '{}' already exists",
            T::KIND,
            slug
        )));
    }
    Ok(slug)
}

async fn assign_key<T: CatalogRecord>(
    store: &dyn Repository<T>,
    requested_slug: Option<Value>,
    draft: &Value,
) -> Result<String, AppError> {
    if T::KEY_FIELD != "slug" {
        return Ok(uuid::Uuid::new_v4().to_string());
    }

    if let Some(requested) = requested_slug.filter(|v| !is_blank(Some(v))) {
        return claim_slug(store, &requested, None).await;
    }

    let label = draft
        .get(T::LABEL_FIELD)
        .and_then(Value::as_str)
        .unwrap_or_default();
    let chosen = unique_slug(store, label).await?;
    if chosen.slug.is_empty() {
        return Err(AppError::BadRequest(format!(
            "Cannot derive a slug from {} '{}'",
            T::LABEL_FIELD,
            label
        )));
    }
    Ok(chosen.slug)
}

/// Create a record from a request body.
///
/// Server-managed fields in the body are ignored. The key is either the
/// slugified `slug` from the body, a slug derived from the label field, or a
/// fresh UUID for id-keyed collections.
pub async fn create_record<T: CatalogRecord>(
    store: &dyn Repository<T>,
    body: Value,
) -> Result<T, AppError> {
    let mut fields = into_object(body)?;
    fields.remove("createdAt");
    fields.remove("updatedAt");
    fields.remove("id");
    let requested_slug = fields.remove("slug");

    let draft: T = parse(Value::Object(fields))?;
    let mut value = serde_json::to_value(&draft)?;
    check_required::<T>(&value)?;

    let key = assign_key(store, requested_slug, &value).await?;
    let now = serde_json::to_value(Timestamp::now())?;
    value[T::KEY_FIELD] = Value::String(key);
    value["createdAt"] = now.clone();
    value["updatedAt"] = now;

    let mut record: T = parse(value)?;
    record.finalize();
    record.validate()?;
    store.insert(&record).await?;

    tracing::info!("Created {} '{}'", T::KIND, record.key());
    Ok(record)
}

/// Merge `patch` over the record stored under `key` and write it back.
///
/// Top-level keys in the patch replace stored values. Immutable fields and
/// `updatedAt` are ignored; a `slug` is slugified and conflict-checked.
pub async fn update_record<T: CatalogRecord>(
    store: &dyn Repository<T>,
    key: &str,
    patch: Value,
) -> Result<Updated<T>, AppError> {
    let patch = into_object(patch)?;
    let existing = store
        .find(key)
        .await?
        .ok_or_else(|| AppError::not_found(T::KIND, key))?;

    let mut value = serde_json::to_value(&existing)?;
    let Some(target) = value.as_object_mut() else {
        return Err(AppError::Internal(format!(
            "{} '{}' is not stored as an object",
            T::KIND,
            key
        )));
    };

    for (field, new_value) in patch {
        if T::IMMUTABLE.contains(&field.as_str()) || field == "updatedAt" {
            continue;
        }
        if field == T::KEY_FIELD {
            if field == "slug" {
                let slug = claim_slug(store, &new_value, Some(key)).await?;
                target.insert(field, Value::String(slug));
            }
            continue;
        }
        target.insert(field, new_value);
    }
    target.insert(
        "updatedAt".to_string(),
        serde_json::to_value(Timestamp::now())?,
    );

    let mut record: T = parse(value)?;
    check_required::<T>(&serde_json::to_value(&record)?)?;
    record.finalize();
    record.validate()?;

    if !store.replace(key, &record).await? {
        return Err(AppError::not_found(T::KIND, key));
    }

    tracing::info!("Updated {} '{}'", T::KIND, record.key());
    Ok(Updated {
        previous_key: key.to_string(),
        record,
    })
}

/// Delete the record stored under `key`.
pub async fn delete_record<T: CatalogRecord>(
    store: &dyn Repository<T>,
    key: &str,
) -> Result<Deleted, AppError> {
    if !store.delete(key).await? {
        return Err(AppError::not_found(T::KIND, key));
    }
    tracing::info!("Deleted {} '{}'", T::KIND, key);
    Ok(Deleted {
        deleted: key.to_string(),
    })
}

/// List records using the collection's filters and natural order.
pub async fn process_list<T: CatalogRecord>(
    store: &dyn Repository<T>,
    params: &ListParams,
) -> Result<Vec<T>, AppError> {
    store.list(&T::list_filter(params)).await
}

/// Fetch one record by key.
pub async fn process_get<T: CatalogRecord>(
    store: &dyn Repository<T>,
    key: &str,
) -> Result<T, AppError> {
    store
        .find(key)
        .await?
        .ok_or_else(|| AppError::not_found(T::KIND, key))
}

/// Admin-only create.
pub async fn process_create<T: CatalogRecord>(
    store: &dyn Repository<T>,
    _grant: &AdminGrant,
    body: Value,
) -> Result<T, AppError> {
    create_record(store, body).await
}

/// Admin-only partial update.
pub async fn process_update<T: CatalogRecord>(
    store: &dyn Repository<T>,
    _grant: &AdminGrant,
    key: &str,
    patch: Value,
) -> Result<Updated<T>, AppError> {
    update_record(store, key, patch).await
}

/// Admin-only delete.
pub async fn process_delete<T: CatalogRecord>(
    store: &dyn Repository<T>,
    _grant: &AdminGrant,
    key: &str,
) -> Result<Deleted, AppError> {
    delete_record(store, key).await
}

/// `GET /api/<collection>`
pub async fn list_handler<T>(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<ApiJson<Vec<T>>, AppError>
where
    T: CatalogRecord,
    Stores: HasStore<T>,
{
    let records = process_list::<T>(HasStore::<T>::store(&state.stores), &params).await?;
    Ok(ok(records))
}

/// `GET /api/<collection>/{key}`
pub async fn get_handler<T>(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<ApiJson<T>, AppError>
where
    T: CatalogRecord,
    Stores: HasStore<T>,
{
    let record = process_get::<T>(HasStore::<T>::store(&state.stores), &key).await?;
    Ok(ok(record))
}

/// `POST /api/<collection>` (admin)
pub async fn create_handler<T>(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<Value>,
) -> Result<(StatusCode, ApiJson<T>), AppError>
where
    T: CatalogRecord,
    Stores: HasStore<T>,
{
    let grant = session.require_admin()?;
    let record = process_create::<T>(HasStore::<T>::store(&state.stores), &grant, body).await?;
    Ok((StatusCode::CREATED, ok(record)))
}

/// `PUT /api/<collection>/{key}` (admin)
pub async fn update_handler<T>(
    State(state): State<AppState>,
    session: Session,
    Path(key): Path<String>,
    Json(patch): Json<Value>,
) -> Result<ApiJson<T>, AppError>
where
    T: CatalogRecord,
    Stores: HasStore<T>,
{
    let grant = session.require_admin()?;
    let updated = process_update::<T>(HasStore::<T>::store(&state.stores), &grant, &key, patch).await?;
    Ok(ok(updated.record))
}

/// `DELETE /api/<collection>/{key}` (admin)
pub async fn delete_handler<T>(
    State(state): State<AppState>,
    session: Session,
    Path(key): Path<String>,
) -> Result<ApiJson<Deleted>, AppError>
where
    T: CatalogRecord,
    Stores: HasStore<T>,
{
    let grant = session.require_admin()?;
    let deleted = process_delete::<T>(HasStore::<T>::store(&state.stores), &grant, &key).await?;
    Ok(ok(deleted))
}
