//! Entity descriptors and schema bindings.

use std::time::Duration;

use serde::{Serialize, de::DeserializeOwned};

use crate::cache::{CacheConfig, KeyPattern};
use crate::domain::{DomainError, FieldMap};

/// Names the list pattern may reference in addition to caller filters.
pub const RESERVED_LIST_ARGUMENTS: [&str; 4] = ["page", "limit", "order_by", "direction"];

/// Reserved names every list pattern must key on.
const REQUIRED_LIST_ARGUMENTS: [&str; 2] = ["page", "limit"];

const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Binds one managed record type to its input, stored and response shapes.
///
/// Implemented once per entity, usually on a unit struct.
pub trait EntitySchema: Send + Sync + 'static {
    /// Store-side shape returned by the repository.
    type Record: Send + Sync + 'static;
    /// Validated creation input.
    type Create: Send + Sync;
    /// Partial update input; unset fields leave stored values unchanged.
    type Update: Send + Sync;
    /// Externally visible shape, cached as JSON.
    type Response: Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Label used in logs and metrics.
    const NAME: &'static str;
    /// Fields `get_multi` may order by.
    const FIELDS: &'static [&'static str];
    /// Ordering used when a list request names none.
    const DEFAULT_ORDER_BY: &'static str;

    fn insert_values(input: &Self::Create) -> FieldMap;

    /// Must only contain the fields that are set on `input`.
    fn update_values(input: &Self::Update) -> FieldMap;

    fn to_response(record: &Self::Record) -> Self::Response;
}

/// Immutable per-entity cache configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDescriptor {
    item_pattern: KeyPattern,
    list_pattern: KeyPattern,
    invalidate_prefix: Option<KeyPattern>,
    ttl: Duration,
}

impl EntityDescriptor {
    pub fn builder(
        item_pattern: impl Into<String>,
        list_pattern: impl Into<String>,
    ) -> EntityDescriptorBuilder {
        EntityDescriptorBuilder {
            item_pattern: item_pattern.into(),
            list_pattern: list_pattern.into(),
            invalidate_prefix: None,
            ttl: None,
            default_ttl: DEFAULT_TTL,
        }
    }

    pub fn item_pattern(&self) -> &KeyPattern {
        &self.item_pattern
    }

    pub fn list_pattern(&self) -> &KeyPattern {
        &self.list_pattern
    }

    /// `None` when no prefix invalidation is configured.
    pub fn invalidate_prefix(&self) -> Option<&KeyPattern> {
        self.invalidate_prefix.as_ref()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

#[derive(Debug, Clone)]
pub struct EntityDescriptorBuilder {
    item_pattern: String,
    list_pattern: String,
    invalidate_prefix: Option<String>,
    ttl: Option<Duration>,
    default_ttl: Duration,
}

impl EntityDescriptorBuilder {
    /// An empty pattern disables prefix invalidation.
    pub fn invalidate_prefix(mut self, pattern: impl Into<String>) -> Self {
        self.invalidate_prefix = Some(pattern.into());
        self
    }

    /// Expiration for this entity, overriding any configured default.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Take the default expiration from cache configuration. An explicit
    /// [`ttl`](Self::ttl) still wins.
    pub fn default_ttl_from(mut self, config: &CacheConfig) -> Self {
        self.default_ttl = config.default_ttl();
        self
    }

    pub fn build(self) -> Result<EntityDescriptor, DomainError> {
        let ttl = self.ttl.unwrap_or(self.default_ttl);
        if ttl.is_zero() {
            return Err(DomainError::InvalidTtl);
        }

        let item_pattern = KeyPattern::parse(self.item_pattern)?;
        let list_pattern = KeyPattern::parse(self.list_pattern)?;
        if let Some(name) = REQUIRED_LIST_ARGUMENTS
            .iter()
            .find(|name| !list_pattern.references(name))
        {
            return Err(DomainError::invalid_pattern(
                list_pattern.as_str(),
                format!("list pattern must reference `{{{name}}}`"),
            ));
        }
        let invalidate_prefix = self
            .invalidate_prefix
            .map(KeyPattern::parse)
            .transpose()?
            .filter(|pattern| !pattern.is_empty());

        Ok(EntityDescriptor {
            item_pattern,
            list_pattern,
            invalidate_prefix,
            ttl,
        })
    }
}
