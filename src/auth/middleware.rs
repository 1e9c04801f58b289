use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use tower_http::cors::{Any, CorsLayer};

use crate::auth::{extract_bearer_token, AuthError, AuthService, UserSession};
use crate::models::UserRole;

/// JWT authentication middleware
pub async fn jwt_auth_middleware(
    State(auth_service): State<AuthService>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .ok_or(AuthError::MissingAuthHeader)?;

    let token = extract_bearer_token(auth_header)?;
    let session = auth_service.validate_session(token)?;

    // Add user session to request extensions
    request.extensions_mut().insert(session);

    Ok(next.run(request).await)
}

/// Admin-only middleware. Expects jwt_auth_middleware to have run first.
pub async fn admin_only_middleware(request: Request, next: Next) -> Result<Response, AuthError> {
    let session = request
        .extensions()
        .get::<UserSession>()
        .ok_or(AuthError::InsufficientPermissions)?;

    if session.role != UserRole::Admin {
        return Err(AuthError::InsufficientPermissions);
    }

    Ok(next.run(request).await)
}

/// CORS configuration for the API
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Security headers middleware
pub fn security_headers_layer(
) -> tower_http::set_header::SetResponseHeaderLayer<axum::http::HeaderValue> {
    tower_http::set_header::SetResponseHeaderLayer::overriding(
        axum::http::header::HeaderName::from_static("x-content-type-options"),
        axum::http::HeaderValue::from_static("nosniff"),
    )
}
