use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid key pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },
    #[error("key argument `{name}` is missing from the filters")]
    MissingKeyArgument { name: String },
    #[error("cache expiration must be greater than zero")]
    InvalidTtl,
}

impl DomainError {
    pub fn invalid_pattern(pattern: &str, reason: impl Into<String>) -> Self {
        Self::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.into(),
        }
    }

    pub fn missing_key_argument(name: impl Into<String>) -> Self {
        Self::MissingKeyArgument { name: name.into() }
    }
}
