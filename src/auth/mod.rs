// Authentication and authorization

pub mod errors;
pub mod jwt;
pub mod middleware;
pub mod models;
pub mod service;

pub use errors::AuthError;
pub use jwt::{extract_bearer_token, JwtService};
pub use middleware::{
    admin_only_middleware, cors_layer, jwt_auth_middleware, security_headers_layer,
};
pub use models::{Claims, UserSession};
pub use service::AuthService;
