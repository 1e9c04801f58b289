// Business logic services

pub mod geo;
pub mod ride_event_service;
pub mod ride_service;
pub mod user_service;

pub use ride_event_service::{RideEventListRequest, RideEventService};
pub use ride_service::{RideListRequest, RideService};
pub use user_service::{UserListRequest, UserService};
