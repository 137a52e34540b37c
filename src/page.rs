use serde::{Deserialize, Serialize};

use crate::{buildings::BuildingRecord, error::ValidationError};

pub const DEFAULT_LIMIT: i64 = 20;
pub const MIN_LIMIT: i64 = 1;
pub const MAX_LIMIT: i64 = 100;

/// A normalized limit/offset pair. Construction is the only place bounds are checked.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PageWindow {
    limit: i64,
    offset: i64,
}

impl Default for PageWindow {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

impl PageWindow {
    /// Absent values take their defaults; present values must already be in bounds.
    pub fn new(limit: Option<i64>, offset: Option<i64>) -> Result<Self, ValidationError> {
        let limit = limit.unwrap_or(DEFAULT_LIMIT);
        if !(MIN_LIMIT..=MAX_LIMIT).contains(&limit) {
            return Err(ValidationError::LimitOutOfRange {
                value: limit,
                min: MIN_LIMIT,
                max: MAX_LIMIT,
            });
        }
        let offset = offset.unwrap_or(0);
        if offset < 0 {
            return Err(ValidationError::OffsetOutOfRange { value: offset });
        }
        Ok(Self { limit, offset })
    }

    pub fn limit(&self) -> i64 {
        self.limit
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// Rows a page can hold given `total` matches: `min(limit, max(0, total - offset))`.
    pub fn expected_len(&self, total: i64) -> i64 {
        (total - self.offset).clamp(0, self.limit)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationMeta {
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
    pub has_next: bool,
    pub has_previous: bool,
}

impl PaginationMeta {
    /// Derived from the filtered count, never from the length of the returned page.
    pub fn new(total: i64, window: PageWindow) -> Self {
        let total = total.max(0);
        Self {
            total,
            limit: window.limit,
            offset: window.offset,
            has_next: window.offset.saturating_add(window.limit) < total,
            has_previous: window.offset > 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResultPage {
    pub records: Vec<BuildingRecord>,
    pub meta: PaginationMeta,
}

impl ResultPage {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}
