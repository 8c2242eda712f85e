use axum::extract::{Query, State};
use serde::{Deserialize, Serialize};

use crate::api::response::{ok, ApiJson};
use crate::app::AppState;
use crate::db::models::{Package, Resort, Trip};
use crate::db::repository::Repository;
use crate::error::AppError;

/// Hits fetched from each collection.
pub const PER_COLLECTION_LIMIT: usize = 10;

/// Hits kept in the merged `all` list.
pub const MERGED_LIMIT: usize = 12;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Package,
    Resort,
    Trip,
}

/// One search result, shaped the same for every collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub category: Category,
    pub slug: String,
    pub title: String,
    pub location: String,
    pub image: Option<String>,
    pub price: Option<f64>,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    pub packages: Vec<SearchHit>,
    pub resorts: Vec<SearchHit>,
    pub trips: Vec<SearchHit>,
    pub all: Vec<SearchHit>,
    pub total: usize,
}

impl From<Package> for SearchHit {
    fn from(p: Package) -> Self {
        Self {
            category: Category::Package,
            url: format!("/packages/{}", p.slug),
            image: p.images.first().cloned(),
            slug: p.slug,
            title: p.title,
            location: p.location,
            price: p.price,
        }
    }
}

impl From<Resort> for SearchHit {
    fn from(r: Resort) -> Self {
        Self {
            category: Category::Resort,
            url: format!("/resorts/{}", r.slug),
            image: r.images.first().cloned(),
            slug: r.slug,
            title: r.name,
            location: r.location,
            price: r.price_per_night,
        }
    }
}

impl From<Trip> for SearchHit {
    fn from(t: Trip) -> Self {
        Self {
            category: Category::Trip,
            url: format!("/trips/{}", t.slug),
            image: t.images.first().cloned(),
            slug: t.slug,
            title: t.title,
            location: t.location,
            price: t.price,
        }
    }
}

async fn run_search(
    packages: &dyn Repository<Package>,
    resorts: &dyn Repository<Resort>,
    trips: &dyn Repository<Trip>,
    text: &str,
) -> Result<SearchResults, AppError> {
    let packages: Vec<SearchHit> = packages
        .search(text, PER_COLLECTION_LIMIT)
        .await?
        .into_iter()
        .map(SearchHit::from)
        .collect();
    let resorts: Vec<SearchHit> = resorts
        .search(text, PER_COLLECTION_LIMIT)
        .await?
        .into_iter()
        .map(SearchHit::from)
        .collect();
    let trips: Vec<SearchHit> = trips
        .search(text, PER_COLLECTION_LIMIT)
        .await?
        .into_iter()
        .map(SearchHit::from)
        .collect();

    let all: Vec<SearchHit> = packages
        .iter()
        .chain(resorts.iter())
        .chain(trips.iter())
        .take(MERGED_LIMIT)
        .cloned()
        .collect();

    Ok(SearchResults {
        total: all.len(),
        packages,
        resorts,
        trips,
        all,
    })
}

/// Site-wide keyword search over packages, resorts and trips.
///
/// Never fails: a blank query returns no hits without touching the stores,
/// and store errors are logged and reported as an empty result.
pub async fn process_search(
    packages: &dyn Repository<Package>,
    resorts: &dyn Repository<Resort>,
    trips: &dyn Repository<Trip>,
    query: &str,
) -> SearchResults {
    let text = query.trim();
    if text.is_empty() {
        return SearchResults::default();
    }

    match run_search(packages, resorts, trips, text).await {
        Ok(results) => {
            tracing::debug!("Search '{}' matched {} items", text, results.total);
            results
        }
        Err(e) => {
            tracing::error!("Search '{}' failed: {}", text, e);
            SearchResults::default()
        }
    }
}

/// `GET /api/search?q=`
pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> ApiJson<SearchResults> {
    let results = process_search(
        state.stores.packages.as_ref(),
        state.stores.resorts.as_ref(),
        state.stores.trips.as_ref(),
        &params.q,
    )
    .await;
    ok(results)
}
