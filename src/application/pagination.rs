//! Page-number pagination helpers.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PaginationError {
    #[error("limit and page must be positive integers (limit={limit}, page={page})")]
    Invalid { limit: u64, page: u64 },
}

/// A validated 1-indexed page window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    limit: u64,
    page: u64,
    offset: u64,
}

impl PageRequest {
    pub fn new(limit: u64, page: u64) -> Result<Self, PaginationError> {
        if limit == 0 || page == 0 {
            return Err(PaginationError::Invalid { limit, page });
        }
        let offset = (page - 1)
            .checked_mul(limit)
            .ok_or(PaginationError::Invalid { limit, page })?;
        Ok(Self {
            limit,
            page,
            offset,
        })
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn page(&self) -> u64 {
        self.page
    }

    /// Rows skipped before this page: `(page - 1) * limit`.
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

/// One page of an already-fetched sequence plus the sequence length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub total: usize,
    pub limit: u64,
    pub page: u64,
}

/// Slice `data` to the requested page. Out-of-range pages are empty.
pub fn paginate<T>(data: Vec<T>, limit: u64, page: u64) -> Result<Paginated<T>, PaginationError> {
    let request = PageRequest::new(limit, page)?;
    let total = data.len();
    let skip = usize::try_from(request.offset()).unwrap_or(usize::MAX);
    let take = usize::try_from(request.limit()).unwrap_or(usize::MAX);

    Ok(Paginated {
        data: data.into_iter().skip(skip).take(take).collect(),
        total,
        limit,
        page,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_page_of_twenty_five() {
        let data: Vec<u32> = (1..=25).collect();
        let page = paginate(data, 10, 2).expect("valid page");
        assert_eq!(page.data, (11..=20).collect::<Vec<_>>());
        assert_eq!(page.total, 25);
        assert_eq!(page.limit, 10);
        assert_eq!(page.page, 2);
    }

    #[test]
    fn partial_and_out_of_range_pages() {
        let data: Vec<u32> = (1..=25).collect();
        assert_eq!(paginate(data.clone(), 10, 3).expect("page 3").data.len(), 5);

        let beyond = paginate(data, 10, 4).expect("page 4");
        assert!(beyond.data.is_empty());
        assert_eq!(beyond.total, 25);
    }

    #[test]
    fn zero_limit_or_page_is_rejected() {
        assert_eq!(
            PageRequest::new(0, 1),
            Err(PaginationError::Invalid { limit: 0, page: 1 })
        );
        assert!(PageRequest::new(10, 0).is_err());
        assert!(paginate(vec![1], 0, 1).is_err());
    }

    #[test]
    fn offset_overflow_is_rejected() {
        assert!(PageRequest::new(u64::MAX, 3).is_err());
        assert_eq!(PageRequest::new(10, 3).expect("valid").offset(), 20);
    }
}
