use std::sync::Arc;

use crate::models::{CreateRideEventRequest, Page, PageRequest, RideEvent, UpdateRideEventRequest};
use crate::store::{RideEventFilter, RideEventOrdering, RideEventStore, StoreError};

#[derive(Debug, Clone)]
pub struct RideEventListRequest {
    pub filter: RideEventFilter,
    pub ordering: RideEventOrdering,
    pub page: PageRequest,
}

#[derive(Clone)]
pub struct RideEventService {
    store: Arc<dyn RideEventStore>,
}

impl RideEventService {
    pub fn new(store: Arc<dyn RideEventStore>) -> Self {
        Self { store }
    }

    pub async fn list_events(
        &self,
        request: RideEventListRequest,
    ) -> Result<Page<RideEvent>, StoreError> {
        let (events, count) = tokio::try_join!(
            self.store.event_page(
                &request.filter,
                request.ordering,
                request.page.limit(),
                request.page.offset(),
            ),
            self.store.count_events(&request.filter),
        )?;
        Ok(Page::new(count, &request.page, events))
    }

    pub async fn create_event(
        &self,
        request: CreateRideEventRequest,
    ) -> Result<RideEvent, StoreError> {
        self.store.create_event(request).await
    }

    pub async fn get_event(&self, id: i64) -> Result<Option<RideEvent>, StoreError> {
        self.store.event_by_id(id).await
    }

    pub async fn update_event(
        &self,
        id: i64,
        request: UpdateRideEventRequest,
    ) -> Result<Option<RideEvent>, StoreError> {
        self.store.update_event(id, request).await
    }

    pub async fn delete_event(&self, id: i64) -> Result<bool, StoreError> {
        self.store.delete_event(id).await
    }
}
