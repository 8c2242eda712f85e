use serde_json::Value;

use crate::api::catalog::{create_record, CatalogRecord};
use crate::db::repository::{Filter, Repository};
use crate::db::stores::Stores;
use crate::error::AppError;

/// Sample content embedded into the binary.
const DESTINATIONS: &str = include_str!("../demo_data/destinations.json");
const DESTINATION_TRIPS: &str = include_str!("../demo_data/destination_trips.json");
const PACKAGES: &str = include_str!("../demo_data/packages.json");
const RESORTS: &str = include_str!("../demo_data/resorts.json");
const TRIPS: &str = include_str!("../demo_data/trips.json");
const TESTIMONIALS: &str = include_str!("../demo_data/testimonials.json");

/// Fill each empty catalog collection with the embedded sample content.
///
/// Collections that already hold records are left alone. Failures are logged
/// and skipped so a partial seed never blocks startup.
pub async fn seed_demo_data(stores: &Stores) {
    tracing::info!("Starting demo data seeding...");

    let mut seeded = 0;
    seeded += seed(stores.destinations.as_ref(), DESTINATIONS).await;
    seeded += seed(stores.destination_trips.as_ref(), DESTINATION_TRIPS).await;
    seeded += seed(stores.packages.as_ref(), PACKAGES).await;
    seeded += seed(stores.resorts.as_ref(), RESORTS).await;
    seeded += seed(stores.trips.as_ref(), TRIPS).await;
    seeded += seed(stores.testimonials.as_ref(), TESTIMONIALS).await;

    tracing::info!("Demo data seeding complete, {} records created", seeded);
}

async fn seed<T: CatalogRecord>(store: &dyn Repository<T>, raw: &str) -> usize {
    match store.list(&Filter::new()).await {
        Ok(existing) if !existing.is_empty() => {
            tracing::info!("'{}' already has data, skipping.", T::COLLECTION);
            return 0;
        }
        Err(e) => {
            tracing::error!("Failed to check '{}' before seeding: {}", T::COLLECTION, e);
            return 0;
        }
        Ok(_) => {}
    }

    let items = match parse_items(raw) {
        Ok(items) => items,
        Err(e) => {
            tracing::error!("Invalid demo data for '{}': {}", T::COLLECTION, e);
            return 0;
        }
    };

    let mut created = 0;
    for item in items {
        match create_record(store, item).await {
            Ok(_) => created += 1,
            Err(e) => tracing::error!("Failed to seed {}: {}", T::KIND, e),
        }
    }
    created
}

fn parse_items(raw: &str) -> Result<Vec<Value>, AppError> {
    Ok(serde_json::from_str(raw)?)
}
