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
use crate::models::{CreateUserRequest, Page, PageRequest, UpdateUserRequest, User};
use crate::services::{UserListRequest, UserService};
use crate::store::{UserFilter, UserOrdering, UserStore};

use super::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct UserListQuery {
    pub search: Option<String>,
    pub ordering: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

#[derive(Clone)]
pub struct UsersAppState {
    pub user_service: UserService,
}

pub fn user_routes(store: Arc<dyn UserStore>, auth_service: AuthService) -> Router {
    let shared_state = UsersAppState {
        user_service: UserService::new(store),
    };

    Router::new()
        .route("/", get(list_users).post(create_user))
        .route(
            "/:user_id",
            get(get_user)
                .put(update_user)
                .patch(update_user)
                .delete(delete_user),
        )
        .route_layer(middleware::from_fn(admin_only_middleware))
        .route_layer(middleware::from_fn_with_state(
            auth_service,
            jwt_auth_middleware,
        ))
        .with_state(shared_state)
}

/// List users, optionally narrowed by a name/email search term
#[tracing::instrument(skip(state))]
pub async fn list_users(
    State(state): State<UsersAppState>,
    Query(query): Query<UserListQuery>,
) -> Result<Json<Page<User>>, ApiError> {
    let page = PageRequest::new(query.page, query.page_size)?;
    let filter = UserFilter::from_params(query.search.as_deref());
    let ordering = UserOrdering::from_param(query.ordering.as_deref());

    let users = state
        .user_service
        .list_users(UserListRequest {
            filter,
            ordering,
            page,
        })
        .await?;

    Ok(Json(users))
}

#[tracing::instrument(skip(state))]
pub async fn get_user(
    State(state): State<UsersAppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<User>, ApiError> {
    let user = state
        .user_service
        .get_user(user_id)
        .await?
        .ok_or(ApiError::NotFound("User"))?;

    Ok(Json(user))
}

#[tracing::instrument(skip(state))]
pub async fn create_user(
    State(state): State<UsersAppState>,
    Json(request): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let user = state.user_service.create_user(request).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

#[tracing::instrument(skip(state))]
pub async fn update_user(
    State(state): State<UsersAppState>,
    Path(user_id): Path<i64>,
    Json(request): Json<UpdateUserRequest>,
) -> Result<Json<User>, ApiError> {
    let user = state
        .user_service
        .update_user(user_id, request)
        .await?
        .ok_or(ApiError::NotFound("User"))?;

    Ok(Json(user))
}

/// Delete a user together with their rides and those rides' events
#[tracing::instrument(skip(state))]
pub async fn delete_user(
    State(state): State<UsersAppState>,
    Path(user_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    if state.user_service.delete_user(user_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("User"))
    }
}
