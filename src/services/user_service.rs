use std::sync::Arc;

use crate::models::{CreateUserRequest, Page, PageRequest, UpdateUserRequest, User};
use crate::store::{StoreError, UserFilter, UserOrdering, UserStore};

#[derive(Debug, Clone)]
pub struct UserListRequest {
    pub filter: UserFilter,
    pub ordering: UserOrdering,
    pub page: PageRequest,
}

#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn UserStore>,
}

impl UserService {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }

    pub async fn list_users(&self, request: UserListRequest) -> Result<Page<User>, StoreError> {
        let (users, count) = tokio::try_join!(
            self.store.user_page(
                &request.filter,
                request.ordering,
                request.page.limit(),
                request.page.offset(),
            ),
            self.store.count_users(&request.filter),
        )?;
        Ok(Page::new(count, &request.page, users))
    }

    pub async fn create_user(&self, request: CreateUserRequest) -> Result<User, StoreError> {
        self.store.create_user(request).await
    }

    pub async fn get_user(&self, id: i64) -> Result<Option<User>, StoreError> {
        self.store.user_by_id(id).await
    }

    pub async fn update_user(
        &self,
        id: i64,
        request: UpdateUserRequest,
    ) -> Result<Option<User>, StoreError> {
        self.store.update_user(id, request).await
    }

    /// Removing a user also removes every ride they appear on, and those
    /// rides' events, mirroring the cascade in the schema.
    pub async fn delete_user(&self, id: i64) -> Result<bool, StoreError> {
        self.store.delete_user(id).await
    }
}
