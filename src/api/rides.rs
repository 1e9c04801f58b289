use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::Json,
    routing::get,
    Router,
};
use chrono::Utc;
use serde::Deserialize;

use crate::auth::{admin_only_middleware, jwt_auth_middleware, AuthService};
use crate::models::{
    CreateRideRequest, Page, PageRequest, Ride, RideDetail, RideListItem, UpdateRideRequest,
};
use crate::services::{RideListRequest, RideService};
use crate::store::{RideFilter, RideOrdering, RideStore};

use super::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct RideListQuery {
    pub status: Option<String>,
    pub rider_email: Option<String>,
    pub ordering: Option<String>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

#[derive(Clone)]
pub struct RidesAppState {
    pub ride_service: RideService,
}

pub fn ride_routes(store: Arc<dyn RideStore>, auth_service: AuthService) -> Router {
    let shared_state = RidesAppState {
        ride_service: RideService::new(store),
    };

    Router::new()
        .route("/", get(list_rides).post(create_ride))
        .route(
            "/:ride_id",
            get(get_ride)
                .put(update_ride)
                .patch(update_ride)
                .delete(delete_ride),
        )
        // Authentication runs before the role check; route_layer wraps
        // outside-in, so the layer added last executes first.
        .route_layer(middleware::from_fn(admin_only_middleware))
        .route_layer(middleware::from_fn_with_state(
            auth_service,
            jwt_auth_middleware,
        ))
        .with_state(shared_state)
}

/// List rides with filtering, ordering and pagination
#[tracing::instrument(skip(state))]
pub async fn list_rides(
    State(state): State<RidesAppState>,
    Query(query): Query<RideListQuery>,
) -> Result<Json<Page<RideListItem>>, ApiError> {
    let page = PageRequest::new(query.page, query.page_size)?;
    let filter = RideFilter::from_params(query.status.as_deref(), query.rider_email.as_deref());
    let ordering = RideOrdering::from_params(
        query.ordering.as_deref(),
        query.latitude.as_deref(),
        query.longitude.as_deref(),
    );

    let rides = state
        .ride_service
        .list_rides(
            RideListRequest {
                filter,
                ordering,
                page,
            },
            Utc::now(),
        )
        .await?;

    Ok(Json(rides))
}

/// Get a single ride with its full event history
#[tracing::instrument(skip(state))]
pub async fn get_ride(
    State(state): State<RidesAppState>,
    Path(ride_id): Path<i64>,
) -> Result<Json<RideDetail>, ApiError> {
    let ride = state
        .ride_service
        .get_ride(ride_id, Utc::now())
        .await?
        .ok_or(ApiError::NotFound("Ride"))?;

    Ok(Json(ride))
}

/// Create a new ride
#[tracing::instrument(skip(state))]
pub async fn create_ride(
    State(state): State<RidesAppState>,
    Json(request): Json<CreateRideRequest>,
) -> Result<(StatusCode, Json<Ride>), ApiError> {
    let ride = state.ride_service.create_ride(request).await?;
    Ok((StatusCode::CREATED, Json(ride)))
}

/// Update an existing ride
#[tracing::instrument(skip(state))]
pub async fn update_ride(
    State(state): State<RidesAppState>,
    Path(ride_id): Path<i64>,
    Json(request): Json<UpdateRideRequest>,
) -> Result<Json<Ride>, ApiError> {
    let ride = state
        .ride_service
        .update_ride(ride_id, request)
        .await?
        .ok_or(ApiError::NotFound("Ride"))?;

    Ok(Json(ride))
}

/// Delete a ride and its events
#[tracing::instrument(skip(state))]
pub async fn delete_ride(
    State(state): State<RidesAppState>,
    Path(ride_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    if state.ride_service.delete_ride(ride_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("Ride"))
    }
}
