use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};

use super::ride_event::RideEvent;
use super::user::User;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Ride {
    pub id: i64,
    pub status: RideStatus,
    pub rider_id: i64,
    pub driver_id: i64,
    pub pickup_latitude: f64,
    pub pickup_longitude: f64,
    pub dropoff_latitude: f64,
    pub dropoff_longitude: f64,
    pub pickup_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "ride_status", rename_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum RideStatus {
    EnRoute,
    Pickup,
    Dropoff,
}

impl RideStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RideStatus::EnRoute => "en-route",
            RideStatus::Pickup => "pickup",
            RideStatus::Dropoff => "dropoff",
        }
    }
}

/// A ride joined with both of its party rows, as loaded in one fetch.
#[derive(Debug, Clone)]
pub struct RideWithParties {
    pub ride: Ride,
    pub rider: User,
    pub driver: User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRideRequest {
    pub status: RideStatus,
    pub rider_id: i64,
    pub driver_id: i64,
    pub pickup_latitude: f64,
    pub pickup_longitude: f64,
    pub dropoff_latitude: f64,
    pub dropoff_longitude: f64,
    pub pickup_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateRideRequest {
    pub status: Option<RideStatus>,
    pub rider_id: Option<i64>,
    pub driver_id: Option<i64>,
    pub pickup_latitude: Option<f64>,
    pub pickup_longitude: Option<f64>,
    pub dropoff_latitude: Option<f64>,
    pub dropoff_longitude: Option<f64>,
    pub pickup_time: Option<DateTime<Utc>>,
}

/// Listing row: embedded parties plus the last-day event window, no full history.
#[derive(Debug, Clone, Serialize)]
pub struct RideListItem {
    pub id: i64,
    pub status: RideStatus,
    pub rider: User,
    pub driver: User,
    pub pickup_latitude: f64,
    pub pickup_longitude: f64,
    pub dropoff_latitude: f64,
    pub dropoff_longitude: f64,
    pub pickup_time: DateTime<Utc>,
    pub todays_ride_events: Vec<RideEvent>,
}

impl RideListItem {
    pub fn assemble(row: RideWithParties, todays_ride_events: Vec<RideEvent>) -> Self {
        let RideWithParties { ride, rider, driver } = row;
        Self {
            id: ride.id,
            status: ride.status,
            rider,
            driver,
            pickup_latitude: ride.pickup_latitude,
            pickup_longitude: ride.pickup_longitude,
            dropoff_latitude: ride.dropoff_latitude,
            dropoff_longitude: ride.dropoff_longitude,
            pickup_time: ride.pickup_time,
            todays_ride_events,
        }
    }
}

/// Detail row: everything the listing carries plus the full event history.
#[derive(Debug, Clone, Serialize)]
pub struct RideDetail {
    pub id: i64,
    pub status: RideStatus,
    pub rider: User,
    pub driver: User,
    pub pickup_latitude: f64,
    pub pickup_longitude: f64,
    pub dropoff_latitude: f64,
    pub dropoff_longitude: f64,
    pub pickup_time: DateTime<Utc>,
    pub ride_events: Vec<RideEvent>,
    pub todays_ride_events: Vec<RideEvent>,
}

impl RideDetail {
    pub fn assemble(
        row: RideWithParties,
        ride_events: Vec<RideEvent>,
        todays_ride_events: Vec<RideEvent>,
    ) -> Self {
        let RideWithParties { ride, rider, driver } = row;
        Self {
            id: ride.id,
            status: ride.status,
            rider,
            driver,
            pickup_latitude: ride.pickup_latitude,
            pickup_longitude: ride.pickup_longitude,
            dropoff_latitude: ride.dropoff_latitude,
            dropoff_longitude: ride.dropoff_longitude,
            pickup_time: ride.pickup_time,
            ride_events,
            todays_ride_events,
        }
    }
}
