// API routes and handlers

pub mod error;
pub mod health;
pub mod ride_events;
pub mod rides;
pub mod routes;
pub mod users;

pub use error::ApiError;
pub use routes::{app_router, create_routes};
