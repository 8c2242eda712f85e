use std::sync::Arc;

use axum::extract::FromRef;
use axum::http::{header, HeaderValue, Method, Uri};
use axum::routing::{get, post};
use axum::Router;
use axum_extra::extract::cookie::Key;
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::api::catalog::{create_handler, delete_handler, get_handler, list_handler, update_handler};
use crate::api::response::{ok, ApiJson};
use crate::api::{admin, destinations, search, stories};
use crate::auth::session;
use crate::config::{AuthSettings, ServerSettings};
use crate::db::models::{Destination, DestinationTrip, Package, Resort, Story, Testimonial, Trip};
use crate::db::stores::Stores;
use crate::error::AppError;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub stores: Stores,
    pub cookie_key: Key,
    pub auth: Arc<AuthSettings>,
}

impl AppState {
    pub fn new(stores: Stores, auth: AuthSettings) -> Self {
        Self {
            stores,
            cookie_key: session::cookie_key(auth.session_secret.as_deref()),
            auth: Arc::new(auth),
        }
    }
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_key.clone()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    pub status: String,
    pub version: String,
}

/// `GET /api/health`
pub async fn health_handler() -> ApiJson<Health> {
    ok(Health {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn not_found_handler(uri: Uri) -> AppError {
    AppError::NotFound(format!("No route for {}", uri.path()))
}

fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Ignoring invalid CORS origin '{}': {}", origin, e);
                None
            }
        })
        .collect();

    if allowed.is_empty() {
        return None;
    }

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
            .allow_credentials(true),
    )
}

/// All API routes, without state or outer layers.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/search", get(search::search_handler))
        // Destinations and their trips
        .route(
            "/api/destinations",
            get(list_handler::<Destination>).post(create_handler::<Destination>),
        )
        .route(
            "/api/destinations/{slug}",
            get(get_handler::<Destination>)
                .put(destinations::update_destination_handler)
                .delete(destinations::delete_destination_handler),
        )
        .route(
            "/api/destinations/{slug}/trips",
            get(destinations::destination_trips_handler),
        )
        .route(
            "/api/destination-trips",
            get(list_handler::<DestinationTrip>)
                .post(destinations::create_destination_trip_handler),
        )
        .route(
            "/api/destination-trips/{slug}",
            get(get_handler::<DestinationTrip>)
                .put(destinations::update_destination_trip_handler)
                .delete(delete_handler::<DestinationTrip>),
        )
        // Listings
        .route(
            "/api/packages",
            get(list_handler::<Package>).post(create_handler::<Package>),
        )
        .route(
            "/api/packages/{slug}",
            get(get_handler::<Package>)
                .put(update_handler::<Package>)
                .delete(delete_handler::<Package>),
        )
        .route(
            "/api/resorts",
            get(list_handler::<Resort>).post(create_handler::<Resort>),
        )
        .route(
            "/api/resorts/{slug}",
            get(get_handler::<Resort>)
                .put(update_handler::<Resort>)
                .delete(delete_handler::<Resort>),
        )
        .route(
            "/api/trips",
            get(list_handler::<Trip>).post(create_handler::<Trip>),
        )
        .route(
            "/api/trips/{slug}",
            get(get_handler::<Trip>)
                .put(update_handler::<Trip>)
                .delete(delete_handler::<Trip>),
        )
        // Stories
        .route(
            "/api/stories",
            get(list_handler::<Story>).post(stories::create_story_handler),
        )
        .route(
            "/api/stories/{slug}",
            get(get_handler::<Story>)
                .put(stories::update_story_handler)
                .delete(stories::delete_story_handler),
        )
        // Testimonials
        .route(
            "/api/testimonials",
            get(list_handler::<Testimonial>).post(create_handler::<Testimonial>),
        )
        .route(
            "/api/testimonials/{id}",
            get(get_handler::<Testimonial>)
                .put(update_handler::<Testimonial>)
                .delete(delete_handler::<Testimonial>),
        )
        // Accounts
        .route("/api/auth/register", post(session::register_handler))
        .route("/api/auth/login", post(session::login_handler))
        .route("/api/auth/logout", post(session::logout_handler))
        .route("/api/auth/me", get(session::me_handler))
        // Admin
        .route("/api/admin/users", get(admin::list_users_handler))
        .route(
            "/api/admin/reconciliation",
            get(destinations::list_reconciliation_handler),
        )
        .route(
            "/api/admin/reconciliation/{id}/retry",
            post(destinations::retry_reconciliation_handler),
        )
}

/// The complete application: API routes, static fallback, CORS and request
/// tracing.
pub fn router(state: AppState, server: &ServerSettings) -> Router {
    let mut app = api_routes();

    app = match &server.static_dir {
        Some(dir) => {
            tracing::info!("Serving static files from {}", dir);
            app.fallback_service(ServeDir::new(dir))
        }
        None => app.fallback(not_found_handler),
    };

    if let Some(cors) = cors_layer(&server.cors_origins) {
        app = app.layer(cors);
    }

    app.layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}
