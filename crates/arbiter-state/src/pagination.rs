//! Page requests and pages for list queries.

use serde::Serialize;

use crate::config::WorkflowConfig;

/// A 1-based page request with a bounded size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    /// Normalize caller input: missing or zero page becomes 1, missing
    /// limit becomes the default, and the limit is capped at the maximum.
    pub fn new(page: Option<u32>, limit: Option<u32>, config: &WorkflowConfig) -> Self {
        let limit = limit
            .unwrap_or(config.default_page_size)
            .clamp(1, config.max_page_size);
        Self {
            page: page.unwrap_or(1).max(1),
            limit,
        }
    }

    /// Number of items to skip. Page 0 is treated as page 1.
    pub fn offset(&self) -> usize {
        (self.page as usize)
            .saturating_sub(1)
            .saturating_mul(self.limit as usize)
    }
}

/// One page of a larger result set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub limit: u32,
    /// Size of the full result set.
    pub total: u64,
}

impl<T> Page<T> {
    /// Slice an already ordered result set.
    pub fn from_ordered(all: Vec<T>, request: PageRequest) -> Self {
        let total = all.len() as u64;
        let items = all
            .into_iter()
            .skip(request.offset())
            .take(request.limit as usize)
            .collect();
        Self {
            items,
            page: request.page,
            limit: request.limit,
            total,
        }
    }

    /// Transform every item, keeping the paging metadata.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            limit: self.limit,
            total: self.total,
        }
    }
}
