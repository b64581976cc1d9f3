//! Offset pagination for the catalog, order, rate history and Gullak listings.

use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use utoipa::{IntoParams, ToSchema};

pub const DEFAULT_LIMIT: i64 = 10;
pub const MAX_LIMIT: i64 = 100;

/// `?skip=&limit=` query parameters. Out-of-range values are clamped rather than rejected.
#[serde_as]
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct Pagination {
    /// Rows to skip
    #[param(default = 0, minimum = 0)]
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub skip: Option<i64>,

    /// Page size
    #[param(default = 10, minimum = 1, maximum = 100)]
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub limit: Option<i64>,
}

impl Pagination {
    pub fn skip(&self) -> i64 {
        self.skip.unwrap_or(0).max(0)
    }

    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    /// `(skip, limit)` ready for an `OFFSET`/`LIMIT` query.
    pub fn params(&self) -> (i64, i64) {
        (self.skip(), self.limit())
    }
}

/// One page of a listing. `total_count` counts every row matching the filter.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaginatedResponse<T: ToSchema> {
    pub data: Vec<T>,
    pub total_count: i64,
    pub skip: i64,
    pub limit: i64,
}

impl<T: ToSchema> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, total_count: i64, skip: i64, limit: i64) -> Self {
        Self {
            data,
            total_count,
            skip,
            limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(skip: Option<i64>, limit: Option<i64>) -> Pagination {
        Pagination { skip, limit }
    }

    #[test]
    fn test_clamping() {
        assert_eq!(Pagination::default().params(), (0, DEFAULT_LIMIT));
        assert_eq!(page(Some(-10), Some(0)).params(), (0, 1));
        assert_eq!(page(None, Some(-5)).limit(), 1);
        assert_eq!(page(None, Some(1000)).limit(), MAX_LIMIT);
        assert_eq!(page(Some(20), Some(50)).params(), (20, 50));
    }

    #[test]
    fn test_query_strings_parse_numbers() {
        let parsed: Pagination = serde_json::from_value(serde_json::json!({"skip": "30", "limit": "5"})).unwrap();
        assert_eq!(parsed.params(), (30, 5));
    }
}
