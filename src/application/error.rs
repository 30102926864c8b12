use thiserror::Error;

use crate::application::pagination::PaginationError;
use crate::application::repos::RepoError;
use crate::domain::DomainError;

/// Failure of a cache-aside operation.
///
/// Cache adapter failures never appear here: reads degrade to a store
/// lookup and writes or invalidations degrade to a logged warning.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("key argument `{name}` is missing from the filters")]
    MissingKeyArgument { name: String },
    #[error("filter `{name}` collides with a reserved list key argument")]
    ReservedKeyArgument { name: String },
    #[error("list argument `{name}` is not part of the list key pattern")]
    UnkeyedListArgument { name: String },
    #[error("record not found")]
    RecordNotFound,
    #[error("multiple records matched filters that must select exactly one")]
    MultipleResultsAmbiguous,
    #[error("cannot sort by unknown field `{field}`")]
    InvalidSortField { field: String },
    #[error("invalid pagination: limit={limit}, page={page}")]
    InvalidPagination { limit: u64, page: u64 },
    #[error(transparent)]
    Domain(DomainError),
    #[error(transparent)]
    Store(RepoError),
}

impl From<RepoError> for EngineError {
    fn from(error: RepoError) -> Self {
        match error {
            RepoError::NotFound => Self::RecordNotFound,
            RepoError::Ambiguous => Self::MultipleResultsAmbiguous,
            other => Self::Store(other),
        }
    }
}

impl From<DomainError> for EngineError {
    fn from(error: DomainError) -> Self {
        match error {
            DomainError::MissingKeyArgument { name } => Self::MissingKeyArgument { name },
            other => Self::Domain(other),
        }
    }
}

impl From<PaginationError> for EngineError {
    fn from(error: PaginationError) -> Self {
        match error {
            PaginationError::Invalid { limit, page } => Self::InvalidPagination { limit, page },
        }
    }
}
