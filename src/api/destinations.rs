use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::catalog::{
    create_record, delete_record, update_record, CatalogRecord, Deleted, ListParams,
};
use crate::api::response::{ok, ApiJson};
use crate::app::AppState;
use crate::auth::models::{AdminGrant, Session};
use crate::db::models::{
    CascadeAction, CascadeFailure, Destination, DestinationTrip, Timestamp,
};
use crate::db::repository::{Filter, Record, Repository};
use crate::error::AppError;
use crate::slug::slugify;

const PARENT_FIELD: &str = "destinationSlug";

impl CatalogRecord for Destination {
    const KIND: &'static str = "Destination";
    const REQUIRED: &'static [&'static str] = &["name"];
    const LABEL_FIELD: &'static str = "name";

    fn list_filter(params: &ListParams) -> Filter {
        match params.popular {
            Some(popular) => Filter::new().eq("popular", popular),
            None => Filter::new(),
        }
    }
}

impl CatalogRecord for DestinationTrip {
    const KIND: &'static str = "Destination trip";
    const REQUIRED: &'static [&'static str] = &["title", "destinationSlug"];
    const LABEL_FIELD: &'static str = "title";

    fn validate(&self) -> Result<(), AppError> {
        match self.price {
            Some(p) if p < 0.0 => Err(AppError::BadRequest("price cannot be negative".into())),
            _ => Ok(()),
        }
    }
}

/// A parent write plus the outcome of its follow-up child write.
///
/// `cascade_failed` means the parent change stands but the children were not
/// updated; a `CascadeFailure` was recorded for an admin to retry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadeOutcome<T> {
    #[serde(flatten)]
    pub record: T,
    pub cascade_failed: bool,
    pub affected_trips: u64,
}

/// Result of a successful reconciliation retry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryOutcome {
    pub id: String,
    pub affected_trips: u64,
}

/// Apply a child step to the trips of `parent_slug`.
async fn run_cascade(
    trips: &dyn Repository<DestinationTrip>,
    parent_slug: &str,
    action: CascadeAction,
    new_slug: Option<&str>,
) -> Result<u64, AppError> {
    let children = Filter::new().eq(PARENT_FIELD, parent_slug);
    match (action, new_slug) {
        (CascadeAction::Delete, _) => trips.delete_where(&children).await,
        (CascadeAction::Rename, Some(new_slug)) => {
            trips
                .set_where(&children, PARENT_FIELD, Value::String(new_slug.to_string()))
                .await
        }
        (CascadeAction::Rename, None) => Err(AppError::Internal(format!(
            "Rename cascade for '{}' has no target slug",
            parent_slug
        ))),
    }
}

/// Run a child step; on failure log it and leave a reconciliation record.
///
/// Returns `(cascade_failed, affected_trips)`.
async fn cascade_or_record(
    trips: &dyn Repository<DestinationTrip>,
    failures: &dyn Repository<CascadeFailure>,
    parent_slug: &str,
    action: CascadeAction,
    new_slug: Option<&str>,
) -> (bool, u64) {
    match run_cascade(trips, parent_slug, action, new_slug).await {
        Ok(affected) => (false, affected),
        Err(e) => {
            tracing::error!(
                "Cascade {:?} of destination '{}' to {} failed: {}",
                action,
                parent_slug,
                DestinationTrip::COLLECTION,
                e
            );
            let failure = CascadeFailure {
                id: uuid::Uuid::new_v4().to_string(),
                parent_collection: Destination::COLLECTION.to_string(),
                parent_slug: parent_slug.to_string(),
                child_collection: DestinationTrip::COLLECTION.to_string(),
                action,
                new_slug: new_slug.map(str::to_string),
                error: e.to_string(),
                created_at: Timestamp::now(),
            };
            if let Err(record_err) = failures.insert(&failure).await {
                tracing::error!(
                    "Could not record cascade failure for destination '{}': {}",
                    parent_slug,
                    record_err
                );
            }
            (true, 0)
        }
    }
}

/// Partial update of a destination. A slug change re-points its trips.
pub async fn process_update_destination(
    destinations: &dyn Repository<Destination>,
    trips: &dyn Repository<DestinationTrip>,
    failures: &dyn Repository<CascadeFailure>,
    _grant: &AdminGrant,
    slug: &str,
    patch: Value,
) -> Result<CascadeOutcome<Destination>, AppError> {
    let updated = update_record(destinations, slug, patch).await?;

    let (cascade_failed, affected_trips) = if updated.key_changed() {
        cascade_or_record(
            trips,
            failures,
            &updated.previous_key,
            CascadeAction::Rename,
            Some(updated.record.key()),
        )
        .await
    } else {
        (false, 0)
    };

    Ok(CascadeOutcome {
        record: updated.record,
        cascade_failed,
        affected_trips,
    })
}

/// Delete a destination and then its trips.
pub async fn process_delete_destination(
    destinations: &dyn Repository<Destination>,
    trips: &dyn Repository<DestinationTrip>,
    failures: &dyn Repository<CascadeFailure>,
    _grant: &AdminGrant,
    slug: &str,
) -> Result<CascadeOutcome<Deleted>, AppError> {
    let deleted = delete_record(destinations, slug).await?;
    let (cascade_failed, affected_trips) =
        cascade_or_record(trips, failures, slug, CascadeAction::Delete, None).await;

    Ok(CascadeOutcome {
        record: deleted,
        cascade_failed,
        affected_trips,
    })
}

/// Trips belonging to one destination.
pub async fn process_destination_trips(
    destinations: &dyn Repository<Destination>,
    trips: &dyn Repository<DestinationTrip>,
    slug: &str,
) -> Result<Vec<DestinationTrip>, AppError> {
    if !destinations.exists(slug).await? {
        return Err(AppError::not_found(Destination::KIND, slug));
    }
    trips.list(&Filter::new().eq(PARENT_FIELD, slug)).await
}

/// Slugify the parent reference in `body` in place and check that the
/// destination exists. An absent reference is only accepted when not
/// `required`.
async fn claim_parent(
    destinations: &dyn Repository<Destination>,
    body: &mut Value,
    required: bool,
) -> Result<(), AppError> {
    let slug = match body.get(PARENT_FIELD) {
        None if !required => return Ok(()),
        None => String::new(),
        Some(value) => value.as_str().map(slugify).unwrap_or_default(),
    };
    if slug.is_empty() {
        return Err(AppError::BadRequest(format!("{} is required", PARENT_FIELD)));
    }
    if !destinations.exists(&slug).await? {
        return Err(AppError::BadRequest(format!(
            "Destination '{}' does not exist",
            slug
        )));
    }
    if let Some(fields) = body.as_object_mut() {
        fields.insert(PARENT_FIELD.to_string(), Value::String(slug));
    }
    Ok(())
}

/// Create a destination trip under an existing destination.
pub async fn process_create_destination_trip(
    destinations: &dyn Repository<Destination>,
    trips: &dyn Repository<DestinationTrip>,
    _grant: &AdminGrant,
    mut body: Value,
) -> Result<DestinationTrip, AppError> {
    claim_parent(destinations, &mut body, true).await?;
    create_record(trips, body).await
}

/// Partial update of a destination trip; a new parent must exist.
pub async fn process_update_destination_trip(
    destinations: &dyn Repository<Destination>,
    trips: &dyn Repository<DestinationTrip>,
    _grant: &AdminGrant,
    slug: &str,
    mut patch: Value,
) -> Result<DestinationTrip, AppError> {
    claim_parent(destinations, &mut patch, false).await?;
    Ok(update_record(trips, slug, patch).await?.record)
}

/// Pending cascade failures, oldest first.
pub async fn process_list_reconciliation(
    failures: &dyn Repository<CascadeFailure>,
    _grant: &AdminGrant,
) -> Result<Vec<CascadeFailure>, AppError> {
    failures.list(&Filter::new()).await
}

/// Re-run a failed child step. The record is removed on success and keeps
/// the latest error otherwise.
pub async fn process_retry(
    failures: &dyn Repository<CascadeFailure>,
    trips: &dyn Repository<DestinationTrip>,
    _grant: &AdminGrant,
    id: &str,
) -> Result<RetryOutcome, AppError> {
    let mut failure = failures
        .find(id)
        .await?
        .ok_or_else(|| AppError::not_found("Cascade failure", id))?;

    match run_cascade(
        trips,
        &failure.parent_slug,
        failure.action,
        failure.new_slug.as_deref(),
    )
    .await
    {
        Ok(affected_trips) => {
            failures.delete(id).await?;
            tracing::info!(
                "Reconciled cascade {} for destination '{}' ({} trips)",
                id,
                failure.parent_slug,
                affected_trips
            );
            Ok(RetryOutcome {
                id: id.to_string(),
                affected_trips,
            })
        }
        Err(e) => {
            tracing::warn!("Retry of cascade {} failed again: {}", id, e);
            failure.error = e.to_string();
            failures.replace(id, &failure).await?;
            Err(e)
        }
    }
}

/// `PUT /api/destinations/{slug}` (admin)
pub async fn update_destination_handler(
    State(state): State<AppState>,
    session: Session,
    Path(slug): Path<String>,
    Json(patch): Json<Value>,
) -> Result<ApiJson<CascadeOutcome<Destination>>, AppError> {
    let grant = session.require_admin()?;
    let outcome = process_update_destination(
        state.stores.destinations.as_ref(),
        state.stores.destination_trips.as_ref(),
        state.stores.cascade_failures.as_ref(),
        &grant,
        &slug,
        patch,
    )
    .await?;
    Ok(ok(outcome))
}

/// `DELETE /api/destinations/{slug}` (admin)
pub async fn delete_destination_handler(
    State(state): State<AppState>,
    session: Session,
    Path(slug): Path<String>,
) -> Result<ApiJson<CascadeOutcome<Deleted>>, AppError> {
    let grant = session.require_admin()?;
    let outcome = process_delete_destination(
        state.stores.destinations.as_ref(),
        state.stores.destination_trips.as_ref(),
        state.stores.cascade_failures.as_ref(),
        &grant,
        &slug,
    )
    .await?;
    Ok(ok(outcome))
}

/// `GET /api/destinations/{slug}/trips`
pub async fn destination_trips_handler(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<ApiJson<Vec<DestinationTrip>>, AppError> {
    let trips = process_destination_trips(
        state.stores.destinations.as_ref(),
        state.stores.destination_trips.as_ref(),
        &slug,
    )
    .await?;
    Ok(ok(trips))
}

/// `POST /api/destination-trips` (admin)
pub async fn create_destination_trip_handler(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<Value>,
) -> Result<(StatusCode, ApiJson<DestinationTrip>), AppError> {
    let grant = session.require_admin()?;
    let trip = process_create_destination_trip(
        state.stores.destinations.as_ref(),
        state.stores.destination_trips.as_ref(),
        &grant,
        body,
    )
    .await?;
    Ok((StatusCode::CREATED, ok(trip)))
}

/// `PUT /api/destination-trips/{slug}` (admin)
pub async fn update_destination_trip_handler(
    State(state): State<AppState>,
    session: Session,
    Path(slug): Path<String>,
    Json(patch): Json<Value>,
) -> Result<ApiJson<DestinationTrip>, AppError> {
    let grant = session.require_admin()?;
    let trip = process_update_destination_trip(
        state.stores.destinations.as_ref(),
        state.stores.destination_trips.as_ref(),
        &grant,
        &slug,
        patch,
    )
    .await?;
    Ok(ok(trip))
}

/// `GET /api/admin/reconciliation` (admin)
pub async fn list_reconciliation_handler(
    State(state): State<AppState>,
    session: Session,
) -> Result<ApiJson<Vec<CascadeFailure>>, AppError> {
    let grant = session.require_admin()?;
    let failures =
        process_list_reconciliation(state.stores.cascade_failures.as_ref(), &grant).await?;
    Ok(ok(failures))
}

/// `POST /api/admin/reconciliation/{id}/retry` (admin)
pub async fn retry_reconciliation_handler(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
) -> Result<ApiJson<RetryOutcome>, AppError> {
    let grant = session.require_admin()?;
    let outcome = process_retry(
        state.stores.cascade_failures.as_ref(),
        state.stores.destination_trips.as_ref(),
        &grant,
        &id,
    )
    .await?;
    Ok(ok(outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryRepository;
    use crate::db::testing::MockDestinationTripStore;
    use serde_json::json;

    struct Fixture {
        destinations: MemoryRepository<Destination>,
        trips: MemoryRepository<DestinationTrip>,
        failures: MemoryRepository<CascadeFailure>,
        grant: AdminGrant,
    }

    async fn fixture() -> Fixture {
        let f = Fixture {
            destinations: MemoryRepository::new(),
            trips: MemoryRepository::new(),
            failures: MemoryRepository::new(),
            grant: AdminGrant::for_tests(),
        };
        for name in ["Bali", "Goa"] {
            create_record::<Destination>(&f.destinations, json!({ "name": name }))
                .await
                .unwrap();
        }
        for (title, parent) in [
            ("Ubud Retreat", "bali"),
            ("Nusa Penida Day Trip", "bali"),
            ("Old Goa Walk", "goa"),
        ] {
            process_create_destination_trip(
                &f.destinations,
                &f.trips,
                &f.grant,
                json!({ "title": title, "destinationSlug": parent }),
            )
            .await
            .unwrap();
        }
        f
    }

    async fn trips_of(f: &Fixture, parent: &str) -> Vec<DestinationTrip> {
        f.trips
            .list(&Filter::new().eq(PARENT_FIELD, parent))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_delete_cascades_to_trips() {
        let f = fixture().await;
        let outcome =
            process_delete_destination(&f.destinations, &f.trips, &f.failures, &f.grant, "bali")
                .await
                .unwrap();

        assert_eq!(outcome.record.deleted, "bali");
        assert!(!outcome.cascade_failed);
        assert_eq!(outcome.affected_trips, 2);
        assert!(trips_of(&f, "bali").await.is_empty());
        assert_eq!(trips_of(&f, "goa").await.len(), 1);
    }

    #[tokio::test]
    async fn test_rename_repoints_trips() {
        let f = fixture().await;
        let outcome = process_update_destination(
            &f.destinations,
            &f.trips,
            &f.failures,
            &f.grant,
            "bali",
            json!({ "slug": "Bali Island", "popular": true }),
        )
        .await
        .unwrap();

        assert_eq!(outcome.record.slug, "bali-island");
        assert!(outcome.record.popular);
        assert_eq!(outcome.affected_trips, 2);
        assert!(trips_of(&f, "bali").await.is_empty());
        assert_eq!(trips_of(&f, "bali-island").await.len(), 2);
    }

    #[tokio::test]
    async fn test_update_without_rename_leaves_trips() {
        let f = fixture().await;
        let outcome = process_update_destination(
            &f.destinations,
            &f.trips,
            &f.failures,
            &f.grant,
            "goa",
            json!({ "description": "Beaches and forts" }),
        )
        .await
        .unwrap();
        assert_eq!(outcome.affected_trips, 0);
        assert!(!outcome.cascade_failed);
        assert_eq!(trips_of(&f, "goa").await.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_cascade_is_recorded_and_retried() {
        let f = fixture().await;

        let mut broken = MockDestinationTripStore::new();
        broken
            .expect_delete_where()
            .times(1)
            .returning(|_| Err(AppError::Database("connection reset".into())));

        let outcome =
            process_delete_destination(&f.destinations, &broken, &f.failures, &f.grant, "bali")
                .await
                .unwrap();
        assert!(outcome.cascade_failed);
        assert!(!f.destinations.exists("bali").await.unwrap());

        let pending = process_list_reconciliation(&f.failures, &f.grant).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].parent_slug, "bali");
        assert_eq!(pending[0].action, CascadeAction::Delete);
        assert!(pending[0].error.contains("connection reset"));

        // Orphans are still there until the retry runs.
        assert_eq!(trips_of(&f, "bali").await.len(), 2);

        let retried = process_retry(&f.failures, &f.trips, &f.grant, &pending[0].id)
            .await
            .unwrap();
        assert_eq!(retried.affected_trips, 2);
        assert!(trips_of(&f, "bali").await.is_empty());
        assert!(process_list_reconciliation(&f.failures, &f.grant)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_failed_retry_keeps_record() {
        let f = fixture().await;

        let mut broken = MockDestinationTripStore::new();
        broken
            .expect_set_where()
            .times(2)
            .returning(|_, _, _| Err(AppError::Database("timeout".into())));

        let outcome = process_update_destination(
            &f.destinations,
            &broken,
            &f.failures,
            &f.grant,
            "goa",
            json!({ "slug": "north-goa" }),
        )
        .await
        .unwrap();
        assert!(outcome.cascade_failed);
        assert_eq!(outcome.record.slug, "north-goa");

        let pending = process_list_reconciliation(&f.failures, &f.grant).await.unwrap();
        assert_eq!(pending[0].action, CascadeAction::Rename);
        assert_eq!(pending[0].new_slug.as_deref(), Some("north-goa"));

        let retry = process_retry(&f.failures, &broken, &f.grant, &pending[0].id).await;
        assert!(matches!(retry, Err(AppError::Database(_))));
        assert_eq!(
            process_list_reconciliation(&f.failures, &f.grant)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_trip_requires_existing_parent() {
        let f = fixture().await;
        let orphan = process_create_destination_trip(
            &f.destinations,
            &f.trips,
            &f.grant,
            json!({ "title": "Lost", "destinationSlug": "atlantis" }),
        )
        .await;
        assert!(matches!(orphan, Err(AppError::BadRequest(_))));

        let missing = process_create_destination_trip(
            &f.destinations,
            &f.trips,
            &f.grant,
            json!({ "title": "Lost" }),
        )
        .await;
        assert!(matches!(missing, Err(AppError::BadRequest(_))));

        let moved = process_update_destination_trip(
            &f.destinations,
            &f.trips,
            &f.grant,
            "old-goa-walk",
            json!({ "destinationSlug": "atlantis" }),
        )
        .await;
        assert!(matches!(moved, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_parent_reference_is_slugified() {
        let f = fixture().await;
        let trip = process_create_destination_trip(
            &f.destinations,
            &f.trips,
            &f.grant,
            json!({ "title": "Tegallalang Rice Terraces", "destinationSlug": " Bali " }),
        )
        .await
        .unwrap();
        assert_eq!(trip.destination_slug, "bali");
        assert_eq!(trips_of(&f, "bali").await.len(), 3);

        let moved = process_update_destination_trip(
            &f.destinations,
            &f.trips,
            &f.grant,
            "tegallalang-rice-terraces",
            json!({ "destinationSlug": "  GOA" }),
        )
        .await
        .unwrap();
        assert_eq!(moved.destination_slug, "goa");

        let outcome =
            process_delete_destination(&f.destinations, &f.trips, &f.failures, &f.grant, "goa")
                .await
                .unwrap();
        assert_eq!(outcome.affected_trips, 2);
        assert!(trips_of(&f, "goa").await.is_empty());
    }

    #[tokio::test]
    async fn test_destination_trips_listing() {
        let f = fixture().await;
        let bali = process_destination_trips(&f.destinations, &f.trips, "bali")
            .await
            .unwrap();
        assert_eq!(bali.len(), 2);
        assert!(bali.iter().all(|t| t.destination_slug == "bali"));

        let unknown = process_destination_trips(&f.destinations, &f.trips, "atlantis").await;
        assert!(matches!(unknown, Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_outcome_flattens_record() {
        let outcome = CascadeOutcome {
            record: Deleted {
                deleted: "bali".to_string(),
            },
            cascade_failed: true,
            affected_trips: 0,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(
            json,
            json!({ "deleted": "bali", "cascadeFailed": true, "affectedTrips": 0 })
        );
    }
}
