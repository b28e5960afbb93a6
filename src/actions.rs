//! Store actions, one function per use case.
//!
//! Actions validate their input, talk to the database (and the payment gateway for
//! checkout) and return typed results. HTTP handlers and the CLI are thin callers.

pub mod authors;
pub mod books;
pub mod cart;
pub mod catalog;
pub mod orders;
pub mod publishers;
pub mod reviews;
pub mod users;
pub mod webhook;
pub mod wishlist;

use crate::config::StoreConfig;
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};

/// One page of a listing.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// 1-based page number.
    pub page: u32,
    /// Page size used.
    pub limit: u32,
    /// Total matching items.
    pub total: u64,
    /// Number of pages.
    pub total_pages: u64,
}

impl<T> Page<T> {
    fn new(items: Vec<T>, paging: Paging, total: u64) -> Self {
        Self {
            items,
            page: paging.page,
            limit: paging.limit,
            total,
            total_pages: total.div_ceil(u64::from(paging.limit)),
        }
    }
}

/// Listing parameters shared by every paginated endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    /// 1-based page number.
    pub page: Option<u32>,
    /// Page size.
    pub limit: Option<u32>,
    /// Free-text search.
    pub q: Option<String>,
    /// Sort field.
    pub sort: Option<String>,
    /// `asc` or `desc`.
    pub order: Option<String>,
    /// Book category filter.
    pub category: Option<String>,
    /// Author genre filter.
    pub genre: Option<String>,
    /// Author reference filter.
    pub author_id: Option<String>,
    /// Publisher reference filter.
    pub publisher_id: Option<String>,
    /// Featured flag filter.
    pub featured: Option<bool>,
    /// Order status filter.
    pub status: Option<String>,
}

#[derive(Debug, Clone, Copy)]
struct Paging {
    page: u32,
    limit: u32,
    offset: u32,
}

impl ListQuery {
    fn paging(&self, store: &StoreConfig) -> Paging {
        let max = store.max_page_size.max(1);
        let limit = self.limit.unwrap_or(store.page_size).clamp(1, max);
        let page = self.page.unwrap_or(1).max(1);
        Paging {
            page,
            limit,
            offset: (page - 1).saturating_mul(limit),
        }
    }

    /// Resolve `sort`/`order` against a whitelist.
    ///
    /// Without an explicit sort the listing is newest first.
    fn sort(&self, allowed: &[&'static str]) -> Result<(&'static str, bool)> {
        let descending = match self.order.as_deref().map(str::to_ascii_lowercase).as_deref() {
            None => None,
            Some("asc") => Some(false),
            Some("desc") => Some(true),
            Some(other) => {
                return Err(AppError::Validation(format!(
                    "order: unknown direction '{}', expected 'asc' or 'desc'",
                    other
                )));
            }
        };

        match self.sort.as_deref().filter(|s| !s.is_empty()) {
            None => Ok(("created_at", descending.unwrap_or(true))),
            Some(requested) => allowed
                .iter()
                .find(|column| **column == requested)
                .map(|column| (*column, descending.unwrap_or(false)))
                .ok_or_else(|| {
                    AppError::Validation(format!(
                        "sort: unknown field '{}', expected one of {}",
                        requested,
                        allowed.join(", ")
                    ))
                }),
        }
    }

    fn text(&self) -> Option<&str> {
        self.q.as_deref().map(str::trim).filter(|q| !q.is_empty())
    }
}

/// Featured-list size: requested or configured default, capped at the page maximum.
fn featured_limit(requested: Option<u32>, store: &StoreConfig) -> u32 {
    requested
        .unwrap_or(store.featured_limit)
        .clamp(1, store.max_page_size.max(1))
}

/// Turn an optional lookup into a not-found error.
fn found<T>(value: Option<T>, what: &str, id: &str) -> Result<T> {
    value.ok_or_else(|| AppError::NotFound(format!("{} '{}' not found", what, id)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paging_defaults_and_clamps() {
        let store = StoreConfig::default();

        let p = ListQuery::default().paging(&store);
        assert_eq!((p.page, p.limit, p.offset), (1, 12, 0));

        let q = ListQuery {
            page: Some(3),
            limit: Some(500),
            ..Default::default()
        };
        let p = q.paging(&store);
        assert_eq!((p.page, p.limit, p.offset), (3, 100, 200));

        let q = ListQuery {
            page: Some(0),
            limit: Some(0),
            ..Default::default()
        };
        let p = q.paging(&store);
        assert_eq!((p.page, p.limit), (1, 1));
    }

    #[test]
    fn test_sort_whitelist() {
        let allowed = ["title", "price"];

        assert_eq!(ListQuery::default().sort(&allowed).unwrap(), ("created_at", true));

        let q = ListQuery {
            sort: Some("price".into()),
            order: Some("DESC".into()),
            ..Default::default()
        };
        assert_eq!(q.sort(&allowed).unwrap(), ("price", true));

        let q = ListQuery {
            sort: Some("price; DROP TABLE books".into()),
            ..Default::default()
        };
        assert!(matches!(q.sort(&allowed), Err(AppError::Validation(_))));

        let q = ListQuery {
            order: Some("sideways".into()),
            ..Default::default()
        };
        assert!(q.sort(&allowed).is_err());
    }

    #[test]
    fn test_page_count() {
        let paging = Paging {
            page: 1,
            limit: 12,
            offset: 0,
        };
        assert_eq!(Page::<u8>::new(Vec::new(), paging, 0).total_pages, 0);
        assert_eq!(Page::<u8>::new(Vec::new(), paging, 12).total_pages, 1);
        assert_eq!(Page::<u8>::new(Vec::new(), paging, 13).total_pages, 2);
    }
}
