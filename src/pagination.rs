//! Offset pagination shared by list endpoints.
//!
//! The UI's infinite-scroll lists request the next page while `has_more` is
//! true and stop otherwise.

use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_LIMIT: i64 = 20;
pub const MAX_PAGE_LIMIT: i64 = 100;

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageParams {
    pub offset: Option<i64>,
    pub limit: Option<i64>,
}

impl PageParams {
    #[must_use]
    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }

    #[must_use]
    pub fn limit(&self) -> i64 {
        self.limit
            .unwrap_or(DEFAULT_PAGE_LIMIT)
            .clamp(1, MAX_PAGE_LIMIT)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub offset: i64,
    pub limit: i64,
    pub total: i64,
    pub has_more: bool,
}

impl<T> Page<T> {
    #[must_use]
    pub fn new(items: Vec<T>, params: PageParams, total: i64) -> Self {
        let offset = params.offset();
        let returned = i64::try_from(items.len()).unwrap_or(i64::MAX);
        Self { has_more: offset.saturating_add(returned) < total, items, offset, limit: params.limit(), total }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            offset: self.offset,
            limit: self.limit,
            total: self.total,
            has_more: self.has_more,
        }
    }
}
