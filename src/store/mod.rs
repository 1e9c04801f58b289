// Storage traits and the predicate/ordering vocabulary shared by adapters

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{
    CreateRideEventRequest, CreateRideRequest, CreateUserRequest, Ride, RideEvent,
    RideWithParties, UpdateRideEventRequest, UpdateRideRequest, UpdateUserRequest, User,
};

pub use memory::{InjectedFailure, MemoryStore};
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("data store unavailable: {0}")]
    Unavailable(String),
    #[error("data store query failed: {0}")]
    Query(String),
    #[error("email already in use: {0}")]
    DuplicateEmail(String),
    #[error("referenced user {0} does not exist")]
    MissingUser(i64),
    #[error("referenced ride {0} does not exist")]
    MissingRide(i64),
}

/// Conjunctive ride predicate. Built once per request and handed to the
/// store, which either translates it to SQL or evaluates it in process.
///
/// The status literal is kept verbatim: a value that names no known status
/// matches nothing rather than failing the request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RideFilter {
    pub status: Option<String>,
    pub rider_email: Option<String>,
}

impl RideFilter {
    pub fn from_params(status: Option<&str>, rider_email: Option<&str>) -> Self {
        Self {
            status: status.filter(|s| !s.is_empty()).map(str::to_owned),
            rider_email: rider_email.filter(|s| !s.is_empty()).map(str::to_owned),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.rider_email.is_none()
    }

    /// In-process evaluation of the same predicate the SQL adapter builds:
    /// exact status match, case-insensitive substring on the rider email.
    pub fn matches(&self, ride: &Ride, rider: &User) -> bool {
        let status_ok = self
            .status
            .as_deref()
            .map_or(true, |wanted| ride.status.as_str() == wanted);
        let email_ok = self.rider_email.as_deref().map_or(true, |fragment| {
            rider.email.to_lowercase().contains(&fragment.to_lowercase())
        });
        status_ok && email_ok
    }
}

/// Sort order for ride listings. Distance ranks by proximity of the pickup
/// point to a reference coordinate; it never filters rows out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RideOrdering {
    PickupTimeAsc,
    PickupTimeDesc,
    Distance { latitude: f64, longitude: f64 },
}

impl RideOrdering {
    /// Resolves the ordering from raw query parameters. A complete, finite
    /// coordinate pair wins over the `ordering` literal; anything malformed
    /// falls back to newest pickup first rather than erroring.
    pub fn from_params(
        ordering: Option<&str>,
        latitude: Option<&str>,
        longitude: Option<&str>,
    ) -> Self {
        if let (Some(lat), Some(lon)) = (latitude, longitude) {
            if let (Ok(lat), Ok(lon)) = (lat.trim().parse::<f64>(), lon.trim().parse::<f64>()) {
                if lat.is_finite() && lon.is_finite() {
                    return RideOrdering::Distance {
                        latitude: lat,
                        longitude: lon,
                    };
                }
            }
        }

        match ordering {
            Some("pickup_time") => RideOrdering::PickupTimeAsc,
            _ => RideOrdering::PickupTimeDesc,
        }
    }
}

impl Default for RideOrdering {
    fn default() -> Self {
        RideOrdering::PickupTimeDesc
    }
}

/// Substring search over user name and email fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserFilter {
    pub search: Option<String>,
}

impl UserFilter {
    pub fn from_params(search: Option<&str>) -> Self {
        Self {
            search: search.filter(|s| !s.is_empty()).map(str::to_owned),
        }
    }

    pub fn matches(&self, user: &User) -> bool {
        self.search.as_deref().map_or(true, |term| {
            let term = term.to_lowercase();
            user.email.to_lowercase().contains(&term)
                || user.first_name.to_lowercase().contains(&term)
                || user.last_name.to_lowercase().contains(&term)
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserOrdering {
    IdAsc,
    IdDesc,
    EmailAsc,
    EmailDesc,
    RoleAsc,
    RoleDesc,
}

impl UserOrdering {
    pub fn from_param(ordering: Option<&str>) -> Self {
        match ordering {
            Some("id") => UserOrdering::IdAsc,
            Some("-id") => UserOrdering::IdDesc,
            Some("email") => UserOrdering::EmailAsc,
            Some("-email") => UserOrdering::EmailDesc,
            Some("role") => UserOrdering::RoleAsc,
            Some("-role") => UserOrdering::RoleDesc,
            _ => UserOrdering::IdAsc,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RideEventFilter {
    pub ride_id: Option<i64>,
    pub description: Option<String>,
}

impl RideEventFilter {
    pub fn from_params(ride_id: Option<i64>, description: Option<&str>) -> Self {
        Self {
            ride_id,
            description: description.filter(|s| !s.is_empty()).map(str::to_owned),
        }
    }

    pub fn matches(&self, event: &RideEvent) -> bool {
        let ride_ok = self.ride_id.map_or(true, |id| event.ride_id == id);
        let description_ok = self
            .description
            .as_deref()
            .map_or(true, |wanted| event.description == wanted);
        ride_ok && description_ok
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RideEventOrdering {
    CreatedAtAsc,
    CreatedAtDesc,
}

impl RideEventOrdering {
    pub fn from_param(ordering: Option<&str>) -> Self {
        match ordering {
            Some("created_at") => RideEventOrdering::CreatedAtAsc,
            _ => RideEventOrdering::CreatedAtDesc,
        }
    }
}

impl Default for RideEventOrdering {
    fn default() -> Self {
        RideEventOrdering::CreatedAtDesc
    }
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user(&self, request: CreateUserRequest) -> Result<User, StoreError>;

    async fn user_by_id(&self, id: i64) -> Result<Option<User>, StoreError>;

    async fn update_user(
        &self,
        id: i64,
        request: UpdateUserRequest,
    ) -> Result<Option<User>, StoreError>;

    /// Deletes the user and, through ownership, every ride they take part
    /// in together with those rides' events. Returns false when no such
    /// user exists.
    async fn delete_user(&self, id: i64) -> Result<bool, StoreError>;

    async fn user_page(
        &self,
        filter: &UserFilter,
        ordering: UserOrdering,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<User>, StoreError>;

    async fn count_users(&self, filter: &UserFilter) -> Result<i64, StoreError>;
}

#[async_trait]
pub trait RideStore: Send + Sync {
    /// One fetch: the requested window of rides with both parties joined
    /// in, already filtered and ordered.
    async fn ride_page(
        &self,
        filter: &RideFilter,
        ordering: &RideOrdering,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<RideWithParties>, StoreError>;

    /// One fetch: how many rides match the same predicate, ignoring the
    /// window.
    async fn count_rides(&self, filter: &RideFilter) -> Result<i64, StoreError>;

    async fn ride_by_id(&self, id: i64) -> Result<Option<RideWithParties>, StoreError>;

    /// One fetch: every event belonging to any of `ride_ids` created at or
    /// after `cutoff`, newest first.
    async fn events_since(
        &self,
        ride_ids: &[i64],
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<RideEvent>, StoreError>;

    /// One fetch: the full event history of a single ride in chronological
    /// order.
    async fn events_for_ride(&self, ride_id: i64) -> Result<Vec<RideEvent>, StoreError>;

    async fn create_ride(&self, request: CreateRideRequest) -> Result<Ride, StoreError>;

    async fn update_ride(
        &self,
        id: i64,
        request: UpdateRideRequest,
    ) -> Result<Option<Ride>, StoreError>;

    async fn delete_ride(&self, id: i64) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait RideEventStore: Send + Sync {
    async fn create_event(&self, request: CreateRideEventRequest) -> Result<RideEvent, StoreError>;

    async fn event_by_id(&self, id: i64) -> Result<Option<RideEvent>, StoreError>;

    async fn update_event(
        &self,
        id: i64,
        request: UpdateRideEventRequest,
    ) -> Result<Option<RideEvent>, StoreError>;

    async fn delete_event(&self, id: i64) -> Result<bool, StoreError>;

    async fn event_page(
        &self,
        filter: &RideEventFilter,
        ordering: RideEventOrdering,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<RideEvent>, StoreError>;

    async fn count_events(&self, filter: &RideEventFilter) -> Result<i64, StoreError>;
}
