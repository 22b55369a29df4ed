use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

pub mod carts;
pub mod locations;
pub mod orders;
pub mod payments;
pub mod products;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Deserialize, IntoParams)]
pub struct PageParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl PageParams {
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }

    /// `(offset, limit)` ready to feed into a query.
    pub fn to_sql(&self) -> (i64, i64) {
        let limit = self.limit() as i64;
        ((self.page() as i64 - 1) * limit, limit)
    }
}

#[derive(Serialize, ToSchema)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub limit: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_params_are_absent() {
        let params = PageParams { page: None, limit: None };
        assert_eq!(params.to_sql(), (0, DEFAULT_PAGE_SIZE as i64));
    }

    #[test]
    fn limit_is_clamped_and_offset_follows_page() {
        let params = PageParams {
            page: Some(3),
            limit: Some(500),
        };
        assert_eq!(params.limit(), MAX_PAGE_SIZE);
        assert_eq!(params.to_sql(), (200, MAX_PAGE_SIZE as i64));
    }

    #[test]
    fn zero_page_and_limit_are_normalized() {
        let params = PageParams {
            page: Some(0),
            limit: Some(0),
        };
        assert_eq!(params.page(), 1);
        assert_eq!(params.limit(), 1);
    }
}
