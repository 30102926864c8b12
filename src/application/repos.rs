//! Repository trait describing the persistence adapter.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{FieldMap, FilterSet};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("no record matched the filters")]
    NotFound,
    #[error("more than one record matched filters that must select exactly one")]
    Ambiguous,
    #[error("unknown field `{0}`")]
    UnknownField(String),
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn from_ascending(ascending: bool) -> Self {
        if ascending {
            Self::Ascending
        } else {
            Self::Descending
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ascending => "asc",
            Self::Descending => "desc",
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }
}

/// Ordering and window for a multi-row read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub order_by: String,
    pub direction: SortDirection,
    pub offset: u64,
    pub limit: u64,
}

/// Uniform interface over the relational store for one record type.
///
/// All filters are exact matches on named fields. Implementations run each
/// call in a single store transaction.
#[async_trait]
pub trait Repository<R: Send>: Send + Sync {
    async fn insert(&self, values: FieldMap) -> Result<R, RepoError>;

    /// Insert every row or none.
    async fn insert_many(&self, rows: Vec<FieldMap>) -> Result<Vec<R>, RepoError>;

    /// Exactly one match, otherwise `NotFound` or `Ambiguous`.
    async fn find_one(&self, filters: &FilterSet) -> Result<R, RepoError>;

    async fn find_many(&self, filters: &FilterSet, query: &ListQuery)
    -> Result<Vec<R>, RepoError>;

    /// Apply `values` to the single row selected by `filters`.
    ///
    /// Fields absent from `values` keep their stored value. Fails like
    /// [`find_one`](Self::find_one) when the filters do not select exactly
    /// one row.
    async fn update(&self, filters: &FilterSet, values: FieldMap) -> Result<R, RepoError>;

    /// Returns the number of rows removed; zero is not an error here.
    async fn delete(&self, filters: &FilterSet) -> Result<u64, RepoError>;

    async fn count(&self, filters: &FilterSet) -> Result<u64, RepoError>;
}
