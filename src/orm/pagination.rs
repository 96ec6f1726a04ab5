//! Offset pagination: page/limit normalization and page metadata.

use serde::Serialize;

use super::sort::SortKey;

/// Limit used when the request omits one.
pub const DEFAULT_LIMIT: i64 = 10;
/// Upper bound applied to every requested limit.
pub const MAX_LIMIT: i64 = 100;

/// Engine-wide pagination bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationOptions {
    pub default_limit: i64,
    pub max_limit: i64,
}

impl Default for PaginationOptions {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_LIMIT,
            max_limit: MAX_LIMIT,
        }
    }
}

/// A paginate call as received from the caller.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageRequest {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub sort: Vec<SortKey>,
}

impl PageRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, page: i64) -> Self {
        self.page = Some(page);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn sort(mut self, key: SortKey) -> Self {
        self.sort.push(key);
        self
    }

    /// Normalized `(page, limit)`.
    ///
    /// A missing or non-positive page becomes 1. A missing limit becomes the
    /// configured default even when a page is given; the limit is then clamped
    /// to `1..=max_limit`.
    pub fn resolve(&self, options: &PaginationOptions) -> (i64, i64) {
        let page = self.page.filter(|p| *p >= 1).unwrap_or(1);
        let limit = self
            .limit
            .unwrap_or(options.default_limit)
            .clamp(1, options.max_limit.max(1));
        (page, limit)
    }
}

/// Rows to skip for a normalized page; saturates instead of overflowing.
pub fn skip_for(page: i64, limit: i64) -> i64 {
    (page - 1).saturating_mul(limit)
}

/// `ceil(total / limit)`, 0 for an empty result.
pub fn total_pages(total_docs: i64, limit: i64) -> i64 {
    if total_docs <= 0 {
        0
    } else {
        (total_docs + limit - 1) / limit
    }
}

/// One page of documents plus totals.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResult<T> {
    pub docs: Vec<T>,
    pub total_docs: i64,
    pub total_pages: i64,
    pub page: i64,
    pub limit: i64,
    pub has_prev_page: bool,
    pub has_next_page: bool,
    pub prev_page: Option<i64>,
    pub next_page: Option<i64>,
}

impl<T> PageResult<T> {
    /// Assemble a page from the window returned by the store.
    pub fn from_window(docs: Vec<T>, total_docs: i64, page: i64, limit: i64) -> Self {
        let total_pages = total_pages(total_docs, limit);
        let has_prev_page = page > 1;
        let has_next_page = page < total_pages;
        Self {
            docs,
            total_docs,
            total_pages,
            page,
            limit,
            has_prev_page,
            has_next_page,
            prev_page: has_prev_page.then(|| page - 1),
            next_page: has_next_page.then(|| page + 1),
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PageResult<U> {
        PageResult {
            docs: self.docs.into_iter().map(f).collect(),
            total_docs: self.total_docs,
            total_pages: self.total_pages,
            page: self.page,
            limit: self.limit,
            has_prev_page: self.has_prev_page,
            has_next_page: self.has_next_page,
            prev_page: self.prev_page,
            next_page: self.next_page,
        }
    }
}
