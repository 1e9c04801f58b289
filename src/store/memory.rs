use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{
    CreateRideEventRequest, CreateRideRequest, CreateUserRequest, Ride, RideEvent,
    RideWithParties, UpdateRideEventRequest, UpdateRideRequest, UpdateUserRequest, User,
};
use crate::services::geo;

use super::{
    RideEventFilter, RideEventOrdering, RideEventStore, RideFilter, RideOrdering, RideStore,
    StoreError, UserFilter, UserOrdering, UserStore,
};

/// Failure to surface from every subsequent store call, for exercising the
/// degraded-store paths without a real connection.
#[derive(Debug, Clone, Copy)]
pub enum InjectedFailure {
    Unavailable,
    Query,
}

impl InjectedFailure {
    fn to_error(self) -> StoreError {
        match self {
            InjectedFailure::Unavailable => {
                StoreError::Unavailable("injected connection failure".to_string())
            }
            InjectedFailure::Query => StoreError::Query("injected query failure".to_string()),
        }
    }
}

#[derive(Default)]
struct MemoryState {
    users: BTreeMap<i64, User>,
    rides: BTreeMap<i64, Ride>,
    events: BTreeMap<i64, RideEvent>,
    next_user_id: i64,
    next_ride_id: i64,
    next_event_id: i64,
    failure: Option<InjectedFailure>,
}

impl MemoryState {
    fn fail_if_injected(&self) -> Result<(), StoreError> {
        match self.failure {
            Some(failure) => Err(failure.to_error()),
            None => Ok(()),
        }
    }

    fn joined(&self, ride: &Ride) -> Option<RideWithParties> {
        let rider = self.users.get(&ride.rider_id)?.clone();
        let driver = self.users.get(&ride.driver_id)?.clone();
        Some(RideWithParties {
            ride: ride.clone(),
            rider,
            driver,
        })
    }

    fn matching_rides(&self, filter: &RideFilter) -> Vec<RideWithParties> {
        self.rides
            .values()
            .filter_map(|ride| self.joined(ride))
            .filter(|row| filter.matches(&row.ride, &row.rider))
            .collect()
    }
}

/// In-memory adapter with the same observable behavior as the SQL one.
/// Every trait call counts as one fetch, which is what the fetch-count
/// assertions in the listing tests measure.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    fetch_count: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of store calls issued so far.
    pub fn fetches(&self) -> usize {
        self.fetch_count.load(Ordering::Relaxed)
    }

    pub fn set_failure(&self, failure: InjectedFailure) {
        self.state.lock().expect("state lock").failure = Some(failure);
    }

    pub fn clear_failure(&self) {
        self.state.lock().expect("state lock").failure = None;
    }

    /// Inserts an event with an explicit timestamp, bypassing the store
    /// clock. Fixture-only; does not count as a fetch.
    pub fn insert_event_at(
        &self,
        ride_id: i64,
        description: &str,
        created_at: DateTime<Utc>,
    ) -> RideEvent {
        let mut state = self.state.lock().expect("state lock");
        state.next_event_id += 1;
        let event = RideEvent {
            id: state.next_event_id,
            ride_id,
            description: description.to_string(),
            created_at,
        };
        state.events.insert(event.id, event.clone());
        event
    }

    fn record_fetch(&self) {
        self.fetch_count.fetch_add(1, Ordering::Relaxed);
    }
}

fn page_window<T>(rows: Vec<T>, limit: i64, offset: i64) -> Vec<T> {
    rows.into_iter()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .collect()
}

fn sort_rides(rows: &mut [RideWithParties], ordering: &RideOrdering) {
    match ordering {
        RideOrdering::PickupTimeAsc => rows.sort_by(|a, b| {
            a.ride
                .pickup_time
                .cmp(&b.ride.pickup_time)
                .then_with(|| a.ride.id.cmp(&b.ride.id))
        }),
        RideOrdering::PickupTimeDesc => rows.sort_by(|a, b| {
            b.ride
                .pickup_time
                .cmp(&a.ride.pickup_time)
                .then_with(|| a.ride.id.cmp(&b.ride.id))
        }),
        RideOrdering::Distance {
            latitude,
            longitude,
        } => {
            let key = |row: &RideWithParties| {
                geo::distance_km(
                    *latitude,
                    *longitude,
                    row.ride.pickup_latitude,
                    row.ride.pickup_longitude,
                )
            };
            rows.sort_by(|a, b| key(a).total_cmp(&key(b)).then_with(|| a.ride.id.cmp(&b.ride.id)));
        }
    }
}

#[async_trait]
impl RideStore for MemoryStore {
    async fn ride_page(
        &self,
        filter: &RideFilter,
        ordering: &RideOrdering,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<RideWithParties>, StoreError> {
        self.record_fetch();
        let state = self.state.lock().expect("state lock");
        state.fail_if_injected()?;

        let mut rows = state.matching_rides(filter);
        sort_rides(&mut rows, ordering);
        Ok(page_window(rows, limit, offset))
    }

    async fn count_rides(&self, filter: &RideFilter) -> Result<i64, StoreError> {
        self.record_fetch();
        let state = self.state.lock().expect("state lock");
        state.fail_if_injected()?;
        Ok(state.matching_rides(filter).len() as i64)
    }

    async fn ride_by_id(&self, id: i64) -> Result<Option<RideWithParties>, StoreError> {
        self.record_fetch();
        let state = self.state.lock().expect("state lock");
        state.fail_if_injected()?;
        Ok(state.rides.get(&id).and_then(|ride| state.joined(ride)))
    }

    async fn events_since(
        &self,
        ride_ids: &[i64],
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<RideEvent>, StoreError> {
        self.record_fetch();
        let state = self.state.lock().expect("state lock");
        state.fail_if_injected()?;

        let mut events: Vec<RideEvent> = state
            .events
            .values()
            .filter(|event| ride_ids.contains(&event.ride_id) && event.created_at >= cutoff)
            .cloned()
            .collect();
        events.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(events)
    }

    async fn events_for_ride(&self, ride_id: i64) -> Result<Vec<RideEvent>, StoreError> {
        self.record_fetch();
        let state = self.state.lock().expect("state lock");
        state.fail_if_injected()?;

        let mut events: Vec<RideEvent> = state
            .events
            .values()
            .filter(|event| event.ride_id == ride_id)
            .cloned()
            .collect();
        events.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(events)
    }

    async fn create_ride(&self, request: CreateRideRequest) -> Result<Ride, StoreError> {
        self.record_fetch();
        let mut state = self.state.lock().expect("state lock");
        state.fail_if_injected()?;

        if !state.users.contains_key(&request.rider_id) {
            return Err(StoreError::MissingUser(request.rider_id));
        }
        if !state.users.contains_key(&request.driver_id) {
            return Err(StoreError::MissingUser(request.driver_id));
        }

        state.next_ride_id += 1;
        let ride = Ride {
            id: state.next_ride_id,
            status: request.status,
            rider_id: request.rider_id,
            driver_id: request.driver_id,
            pickup_latitude: request.pickup_latitude,
            pickup_longitude: request.pickup_longitude,
            dropoff_latitude: request.dropoff_latitude,
            dropoff_longitude: request.dropoff_longitude,
            pickup_time: request.pickup_time,
        };
        state.rides.insert(ride.id, ride.clone());
        Ok(ride)
    }

    async fn update_ride(
        &self,
        id: i64,
        request: UpdateRideRequest,
    ) -> Result<Option<Ride>, StoreError> {
        self.record_fetch();
        let mut state = self.state.lock().expect("state lock");
        state.fail_if_injected()?;

        // The ride resolves before the new party ids, as in the SQL UPDATE.
        if !state.rides.contains_key(&id) {
            return Ok(None);
        }
        if let Some(rider_id) = request.rider_id {
            if !state.users.contains_key(&rider_id) {
                return Err(StoreError::MissingUser(rider_id));
            }
        }
        if let Some(driver_id) = request.driver_id {
            if !state.users.contains_key(&driver_id) {
                return Err(StoreError::MissingUser(driver_id));
            }
        }

        let Some(ride) = state.rides.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(status) = request.status {
            ride.status = status;
        }
        if let Some(rider_id) = request.rider_id {
            ride.rider_id = rider_id;
        }
        if let Some(driver_id) = request.driver_id {
            ride.driver_id = driver_id;
        }
        if let Some(lat) = request.pickup_latitude {
            ride.pickup_latitude = lat;
        }
        if let Some(lon) = request.pickup_longitude {
            ride.pickup_longitude = lon;
        }
        if let Some(lat) = request.dropoff_latitude {
            ride.dropoff_latitude = lat;
        }
        if let Some(lon) = request.dropoff_longitude {
            ride.dropoff_longitude = lon;
        }
        if let Some(pickup_time) = request.pickup_time {
            ride.pickup_time = pickup_time;
        }
        Ok(Some(ride.clone()))
    }

    async fn delete_ride(&self, id: i64) -> Result<bool, StoreError> {
        self.record_fetch();
        let mut state = self.state.lock().expect("state lock");
        state.fail_if_injected()?;

        let existed = state.rides.remove(&id).is_some();
        if existed {
            state.events.retain(|_, event| event.ride_id != id);
        }
        Ok(existed)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, request: CreateUserRequest) -> Result<User, StoreError> {
        self.record_fetch();
        let mut state = self.state.lock().expect("state lock");
        state.fail_if_injected()?;

        if state.users.values().any(|u| u.email == request.email) {
            return Err(StoreError::DuplicateEmail(request.email));
        }

        state.next_user_id += 1;
        let user = User {
            id: state.next_user_id,
            role: request.role,
            first_name: request.first_name,
            last_name: request.last_name,
            email: request.email,
            phone_number: request.phone_number,
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn user_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        self.record_fetch();
        let state = self.state.lock().expect("state lock");
        state.fail_if_injected()?;
        Ok(state.users.get(&id).cloned())
    }

    async fn update_user(
        &self,
        id: i64,
        request: UpdateUserRequest,
    ) -> Result<Option<User>, StoreError> {
        self.record_fetch();
        let mut state = self.state.lock().expect("state lock");
        state.fail_if_injected()?;

        if !state.users.contains_key(&id) {
            return Ok(None);
        }
        if let Some(email) = &request.email {
            if state
                .users
                .values()
                .any(|u| u.id != id && &u.email == email)
            {
                return Err(StoreError::DuplicateEmail(email.clone()));
            }
        }

        let Some(user) = state.users.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(role) = request.role {
            user.role = role;
        }
        if let Some(first_name) = request.first_name {
            user.first_name = first_name;
        }
        if let Some(last_name) = request.last_name {
            user.last_name = last_name;
        }
        if let Some(email) = request.email {
            user.email = email;
        }
        if let Some(phone_number) = request.phone_number {
            user.phone_number = phone_number;
        }
        Ok(Some(user.clone()))
    }

    async fn delete_user(&self, id: i64) -> Result<bool, StoreError> {
        self.record_fetch();
        let mut state = self.state.lock().expect("state lock");
        state.fail_if_injected()?;

        let existed = state.users.remove(&id).is_some();
        if existed {
            let orphaned: Vec<i64> = state
                .rides
                .values()
                .filter(|ride| ride.rider_id == id || ride.driver_id == id)
                .map(|ride| ride.id)
                .collect();
            state.rides.retain(|_, ride| !orphaned.contains(&ride.id));
            state
                .events
                .retain(|_, event| !orphaned.contains(&event.ride_id));
        }
        Ok(existed)
    }

    async fn user_page(
        &self,
        filter: &UserFilter,
        ordering: UserOrdering,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<User>, StoreError> {
        self.record_fetch();
        let state = self.state.lock().expect("state lock");
        state.fail_if_injected()?;

        let mut users: Vec<User> = state
            .users
            .values()
            .filter(|user| filter.matches(user))
            .cloned()
            .collect();
        match ordering {
            UserOrdering::IdAsc => users.sort_by_key(|u| u.id),
            UserOrdering::IdDesc => users.sort_by(|a, b| b.id.cmp(&a.id)),
            UserOrdering::EmailAsc => {
                users.sort_by(|a, b| a.email.cmp(&b.email).then_with(|| a.id.cmp(&b.id)))
            }
            UserOrdering::EmailDesc => {
                users.sort_by(|a, b| b.email.cmp(&a.email).then_with(|| a.id.cmp(&b.id)))
            }
            UserOrdering::RoleAsc => {
                users.sort_by(|a, b| a.role.cmp(&b.role).then_with(|| a.id.cmp(&b.id)))
            }
            UserOrdering::RoleDesc => {
                users.sort_by(|a, b| b.role.cmp(&a.role).then_with(|| a.id.cmp(&b.id)))
            }
        }
        Ok(page_window(users, limit, offset))
    }

    async fn count_users(&self, filter: &UserFilter) -> Result<i64, StoreError> {
        self.record_fetch();
        let state = self.state.lock().expect("state lock");
        state.fail_if_injected()?;
        Ok(state.users.values().filter(|user| filter.matches(user)).count() as i64)
    }
}

#[async_trait]
impl RideEventStore for MemoryStore {
    async fn create_event(&self, request: CreateRideEventRequest) -> Result<RideEvent, StoreError> {
        self.record_fetch();
        let mut state = self.state.lock().expect("state lock");
        state.fail_if_injected()?;

        if !state.rides.contains_key(&request.ride_id) {
            return Err(StoreError::MissingRide(request.ride_id));
        }

        state.next_event_id += 1;
        let event = RideEvent {
            id: state.next_event_id,
            ride_id: request.ride_id,
            description: request.description,
            created_at: Utc::now(),
        };
        state.events.insert(event.id, event.clone());
        Ok(event)
    }

    async fn event_by_id(&self, id: i64) -> Result<Option<RideEvent>, StoreError> {
        self.record_fetch();
        let state = self.state.lock().expect("state lock");
        state.fail_if_injected()?;
        Ok(state.events.get(&id).cloned())
    }

    async fn update_event(
        &self,
        id: i64,
        request: UpdateRideEventRequest,
    ) -> Result<Option<RideEvent>, StoreError> {
        self.record_fetch();
        let mut state = self.state.lock().expect("state lock");
        state.fail_if_injected()?;

        let Some(event) = state.events.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(description) = request.description {
            event.description = description;
        }
        Ok(Some(event.clone()))
    }

    async fn delete_event(&self, id: i64) -> Result<bool, StoreError> {
        self.record_fetch();
        let mut state = self.state.lock().expect("state lock");
        state.fail_if_injected()?;
        Ok(state.events.remove(&id).is_some())
    }

    async fn event_page(
        &self,
        filter: &RideEventFilter,
        ordering: RideEventOrdering,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<RideEvent>, StoreError> {
        self.record_fetch();
        let state = self.state.lock().expect("state lock");
        state.fail_if_injected()?;

        let mut events: Vec<RideEvent> = state
            .events
            .values()
            .filter(|event| filter.matches(event))
            .cloned()
            .collect();
        match ordering {
            RideEventOrdering::CreatedAtAsc => events.sort_by(|a, b| {
                a.created_at
                    .cmp(&b.created_at)
                    .then_with(|| a.id.cmp(&b.id))
            }),
            RideEventOrdering::CreatedAtDesc => events.sort_by(|a, b| {
                b.created_at
                    .cmp(&a.created_at)
                    .then_with(|| b.id.cmp(&a.id))
            }),
        }
        Ok(page_window(events, limit, offset))
    }

    async fn count_events(&self, filter: &RideEventFilter) -> Result<i64, StoreError> {
        self.record_fetch();
        let state = self.state.lock().expect("state lock");
        state.fail_if_injected()?;
        Ok(state.events.values().filter(|event| filter.matches(event)).count() as i64)
    }
}
