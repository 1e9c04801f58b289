use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PageError {
    #[error("page must be a positive integer, got {0}")]
    InvalidPage(i64),
    #[error("page_size must be a positive integer, got {0}")]
    InvalidPageSize(i64),
}

/// Validated pagination window. Page numbers start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: i64,
    page_size: i64,
}

impl PageRequest {
    pub const DEFAULT_PAGE_SIZE: i64 = 10;
    pub const MAX_PAGE_SIZE: i64 = 100;

    pub fn new(page: Option<i64>, page_size: Option<i64>) -> Result<Self, PageError> {
        let page = page.unwrap_or(1);
        if page < 1 {
            return Err(PageError::InvalidPage(page));
        }

        let page_size = page_size.unwrap_or(Self::DEFAULT_PAGE_SIZE);
        if page_size < 1 {
            return Err(PageError::InvalidPageSize(page_size));
        }

        Ok(Self {
            page,
            page_size: page_size.min(Self::MAX_PAGE_SIZE),
        })
    }

    pub fn page(&self) -> i64 {
        self.page
    }

    pub fn page_size(&self) -> i64 {
        self.page_size
    }

    pub fn limit(&self) -> i64 {
        self.page_size
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.page_size)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: Self::DEFAULT_PAGE_SIZE,
        }
    }
}

/// One page of results together with the total match count.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub count: i64,
    pub page: i64,
    pub page_size: i64,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(count: i64, request: &PageRequest, results: Vec<T>) -> Self {
        Self {
            count,
            page: request.page(),
            page_size: request.page_size(),
            results,
        }
    }
}
