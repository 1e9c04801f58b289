use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::models::{
    CreateRideRequest, Page, PageRequest, Ride, RideDetail, RideEvent, RideListItem,
    UpdateRideRequest,
};
use crate::store::{RideFilter, RideOrdering, RideStore, StoreError};

/// How far back the listing's event window reaches, in hours.
const EVENT_WINDOW_HOURS: i64 = 24;

#[derive(Debug, Clone)]
pub struct RideListRequest {
    pub filter: RideFilter,
    pub ordering: RideOrdering,
    pub page: PageRequest,
}

#[derive(Clone)]
pub struct RideService {
    store: Arc<dyn RideStore>,
}

impl RideService {
    pub fn new(store: Arc<dyn RideStore>) -> Self {
        Self { store }
    }

    /// Listing pipeline. The page and the total count are fetched
    /// concurrently, then the recent events for every ride on the page are
    /// loaded in one batched call, so a listing costs three store fetches
    /// no matter how many rides it returns.
    pub async fn list_rides(
        &self,
        request: RideListRequest,
        now: DateTime<Utc>,
    ) -> Result<Page<RideListItem>, StoreError> {
        let (rows, count) = tokio::try_join!(
            self.store.ride_page(
                &request.filter,
                &request.ordering,
                request.page.limit(),
                request.page.offset(),
            ),
            self.store.count_rides(&request.filter),
        )?;

        let ride_ids: Vec<i64> = rows.iter().map(|row| row.ride.id).collect();
        let mut windows = self.recent_event_windows(&ride_ids, now).await?;

        let results = rows
            .into_iter()
            .map(|row| {
                let todays = windows.remove(&row.ride.id).unwrap_or_default();
                RideListItem::assemble(row, todays)
            })
            .collect();
        Ok(Page::new(count, &request.page, results))
    }

    /// Detail pipeline: the joined ride, its recent-event window, and its
    /// full history. Three fetches, bounded by that ride's own data.
    pub async fn get_ride(
        &self,
        id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<RideDetail>, StoreError> {
        let Some(row) = self.store.ride_by_id(id).await? else {
            return Ok(None);
        };

        let mut windows = self.recent_event_windows(&[id], now).await?;
        let todays = windows.remove(&id).unwrap_or_default();
        let history = self.store.events_for_ride(id).await?;

        Ok(Some(RideDetail::assemble(row, history, todays)))
    }

    /// Groups the last day's events by owning ride. Every requested ride
    /// gets an entry, empty when nothing qualifies. An empty id set never
    /// reaches the store.
    async fn recent_event_windows(
        &self,
        ride_ids: &[i64],
        now: DateTime<Utc>,
    ) -> Result<HashMap<i64, Vec<RideEvent>>, StoreError> {
        if ride_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let cutoff = now - Duration::hours(EVENT_WINDOW_HOURS);
        let events = self.store.events_since(ride_ids, cutoff).await?;

        let mut windows: HashMap<i64, Vec<RideEvent>> =
            ride_ids.iter().map(|id| (*id, Vec::new())).collect();
        for event in events {
            // Events for rides outside the requested set are discarded.
            if let Some(window) = windows.get_mut(&event.ride_id) {
                window.push(event);
            }
        }
        Ok(windows)
    }

    pub async fn create_ride(&self, request: CreateRideRequest) -> Result<Ride, StoreError> {
        self.store.create_ride(request).await
    }

    pub async fn update_ride(
        &self,
        id: i64,
        request: UpdateRideRequest,
    ) -> Result<Option<Ride>, StoreError> {
        self.store.update_ride(id, request).await
    }

    pub async fn delete_ride(&self, id: i64) -> Result<bool, StoreError> {
        self.store.delete_ride(id).await
    }
}
