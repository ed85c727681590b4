//! Length-aware pagination

use serde::Serialize;

pub const DEFAULT_PER_PAGE: u32 = 10;

/// One page of results plus the totals needed to render pagination
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub current_page: u32,
    pub data: Vec<T>,
    pub per_page: u32,
    pub total: u64,
    pub last_page: u32,
    /// 1-based position of the first item, `None` on an empty page
    pub from: Option<u64>,
    pub to: Option<u64>,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, total: u64, current_page: u32, per_page: u32) -> Self {
        let current_page = current_page.max(1);
        let per_page = per_page.max(1);
        let last_page = total.div_ceil(per_page as u64).max(1) as u32;

        let (from, to) = if data.is_empty() {
            (None, None)
        } else {
            let from = (current_page as u64 - 1) * per_page as u64 + 1;
            (Some(from), Some(from + data.len() as u64 - 1))
        };

        Self {
            current_page,
            data,
            per_page,
            total,
            last_page,
            from,
            to,
        }
    }

    /// Row offset for a 1-based page number
    pub fn offset(page: u32, per_page: u32) -> u64 {
        (page.max(1) as u64 - 1) * per_page as u64
    }
}
