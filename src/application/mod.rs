//! Cache-aside engine and the store contract it drives.

pub mod engine;
pub mod entity;
pub mod error;
pub mod pagination;
pub mod repos;

pub use engine::{CacheAside, ListOptions};
pub use entity::{EntityDescriptor, EntityDescriptorBuilder, EntitySchema};
pub use error::EngineError;
pub use pagination::{PageRequest, Paginated, PaginationError, paginate};
pub use repos::{ListQuery, RepoError, Repository, SortDirection};
