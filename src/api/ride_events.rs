use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::Json,
    routing::get,
    Router,
};
use serde::Deserialize;

use crate::auth::{admin_only_middleware, jwt_auth_middleware, AuthService};
use crate::models::{CreateRideEventRequest, Page, PageRequest, RideEvent, UpdateRideEventRequest};
use crate::services::{RideEventListRequest, RideEventService};
use crate::store::{RideEventFilter, RideEventOrdering, RideEventStore};

use super::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct RideEventListQuery {
    pub ride_id: Option<i64>,
    pub description: Option<String>,
    pub ordering: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

#[derive(Clone)]
pub struct RideEventsAppState {
    pub event_service: RideEventService,
}

pub fn ride_event_routes(store: Arc<dyn RideEventStore>, auth_service: AuthService) -> Router {
    let shared_state = RideEventsAppState {
        event_service: RideEventService::new(store),
    };

    Router::new()
        .route("/", get(list_ride_events).post(create_ride_event))
        .route(
            "/:event_id",
            get(get_ride_event)
                .put(update_ride_event)
                .patch(update_ride_event)
                .delete(delete_ride_event),
        )
        .route_layer(middleware::from_fn(admin_only_middleware))
        .route_layer(middleware::from_fn_with_state(
            auth_service,
            jwt_auth_middleware,
        ))
        .with_state(shared_state)
}

/// List ride events, newest first by default
#[tracing::instrument(skip(state))]
pub async fn list_ride_events(
    State(state): State<RideEventsAppState>,
    Query(query): Query<RideEventListQuery>,
) -> Result<Json<Page<RideEvent>>, ApiError> {
    let page = PageRequest::new(query.page, query.page_size)?;
    let filter = RideEventFilter::from_params(query.ride_id, query.description.as_deref());
    let ordering = RideEventOrdering::from_param(query.ordering.as_deref());

    let events = state
        .event_service
        .list_events(RideEventListRequest {
            filter,
            ordering,
            page,
        })
        .await?;

    Ok(Json(events))
}

#[tracing::instrument(skip(state))]
pub async fn get_ride_event(
    State(state): State<RideEventsAppState>,
    Path(event_id): Path<i64>,
) -> Result<Json<RideEvent>, ApiError> {
    let event = state
        .event_service
        .get_event(event_id)
        .await?
        .ok_or(ApiError::NotFound("Ride event"))?;

    Ok(Json(event))
}

/// Record an event against a ride. The store assigns the timestamp.
#[tracing::instrument(skip(state))]
pub async fn create_ride_event(
    State(state): State<RideEventsAppState>,
    Json(request): Json<CreateRideEventRequest>,
) -> Result<(StatusCode, Json<RideEvent>), ApiError> {
    let event = state.event_service.create_event(request).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

#[tracing::instrument(skip(state))]
pub async fn update_ride_event(
    State(state): State<RideEventsAppState>,
    Path(event_id): Path<i64>,
    Json(request): Json<UpdateRideEventRequest>,
) -> Result<Json<RideEvent>, ApiError> {
    let event = state
        .event_service
        .update_event(event_id, request)
        .await?
        .ok_or(ApiError::NotFound("Ride event"))?;

    Ok(Json(event))
}

#[tracing::instrument(skip(state))]
pub async fn delete_ride_event(
    State(state): State<RideEventsAppState>,
    Path(event_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    if state.event_service.delete_event(event_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("Ride event"))
    }
}
