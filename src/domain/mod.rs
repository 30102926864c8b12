//! Domain layer types and invariants.

pub mod error;
pub mod filters;
pub mod value;

pub use error::DomainError;
pub use filters::{FieldMap, FilterSet};
pub use value::Value;
