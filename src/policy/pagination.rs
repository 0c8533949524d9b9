//! Page bounds and pagination metadata

use crate::config::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, MIN_PAGE_SIZE};
use crate::policy::types::PaginationInfo;

/// Clamp a raw 1-based page number; anything below 1 becomes 1
pub fn normalize_page(page: i64) -> u32 {
    u32::try_from(page.max(1)).unwrap_or(u32::MAX)
}

/// Clamp a raw page size.
///
/// - below `MIN_PAGE_SIZE` -> `DEFAULT_PAGE_SIZE`
/// - above `MAX_PAGE_SIZE` -> `MAX_PAGE_SIZE`
pub fn normalize_page_size(page_size: i64) -> u32 {
    if page_size < i64::from(MIN_PAGE_SIZE) {
        DEFAULT_PAGE_SIZE
    } else {
        u32::try_from(page_size.min(i64::from(MAX_PAGE_SIZE))).unwrap_or(MAX_PAGE_SIZE)
    }
}

/// ceil(total_items / page_size), or 0 when the page size is 0
pub fn calculate_total_pages(total_items: u64, page_size: u32) -> u64 {
    if page_size == 0 {
        return 0;
    }
    total_items.div_ceil(u64::from(page_size))
}

impl PaginationInfo {
    pub fn new(page: u32, page_size: u32, total_items: u64) -> Self {
        Self {
            page,
            page_size,
            total_items,
            total_pages: calculate_total_pages(total_items, page_size),
        }
    }
}
