use std::sync::Arc;

use axum::{routing::get, Router};
use sqlx::PgPool;
use tower_http::trace::TraceLayer;

use super::health::health_check;
use super::ride_events::ride_event_routes;
use super::rides::ride_routes;
use super::users::user_routes;
use crate::auth::{cors_layer, security_headers_layer, AuthService};
use crate::store::{PgStore, RideEventStore, RideStore, UserStore};

/// Production wiring: one Postgres-backed store shared by every surface.
pub fn create_routes(db: PgPool, jwt_secret: &str) -> Router {
    let store = Arc::new(PgStore::new(db));
    let auth_service = AuthService::new(jwt_secret);
    app_router(store.clone(), store.clone(), store, auth_service)
}

/// Assembles the full API against any store implementations. Tests hand in
/// an in-memory store here.
pub fn app_router(
    user_store: Arc<dyn UserStore>,
    ride_store: Arc<dyn RideStore>,
    event_store: Arc<dyn RideEventStore>,
    auth_service: AuthService,
) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/users", user_routes(user_store, auth_service.clone()))
        .nest("/api/rides", ride_routes(ride_store, auth_service.clone()))
        .nest(
            "/api/ride-events",
            ride_event_routes(event_store, auth_service),
        )
        .layer(TraceLayer::new_for_http())
        .layer(security_headers_layer())
        .layer(cors_layer())
}
