//! Cache-aside orchestration.
//!
//! Reads consult the cache first and fall back to the store, writing the
//! result through on a miss. Writes go to the store first; the cache is then
//! refreshed or invalidated. The store is authoritative, so cache failures
//! never fail an operation: reads treat them as misses and writes log them.

use std::marker::PhantomData;
use std::sync::Arc;

use metrics::counter;
use serde::{Serialize, de::DeserializeOwned};
use tracing::{Instrument, debug, info_span, warn};

use crate::application::entity::{EntityDescriptor, EntitySchema, RESERVED_LIST_ARGUMENTS};
use crate::application::error::EngineError;
use crate::application::pagination::{PageRequest, Paginated, paginate};
use crate::application::repos::{ListQuery, Repository, SortDirection};
use crate::cache::{CacheStore, codec};
use crate::domain::{DomainError, FieldMap, FilterSet};

const SOURCE: &str = "application::engine::CacheAside";

pub(crate) const METRIC_CACHE_HIT: &str = "rowcache_cache_hit_total";
pub(crate) const METRIC_CACHE_MISS: &str = "rowcache_cache_miss_total";
pub(crate) const METRIC_CACHE_WRITE_FAILED: &str = "rowcache_cache_write_failed_total";
pub(crate) const METRIC_CACHE_INVALIDATED: &str = "rowcache_cache_invalidated_total";

/// Ordering and window for [`CacheAside::get_multi`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListOptions {
    pub limit: u64,
    pub page: u64,
    pub order_by: Option<String>,
    pub ascending: bool,
}

impl ListOptions {
    pub fn new(limit: u64, page: u64) -> Self {
        Self {
            limit,
            page,
            order_by: None,
            ascending: true,
        }
    }

    pub fn order_by(mut self, field: impl Into<String>) -> Self {
        self.order_by = Some(field.into());
        self
    }

    pub fn descending(mut self) -> Self {
        self.ascending = false;
        self
    }
}

impl Default for ListOptions {
    fn default() -> Self {
        Self::new(10, 1)
    }
}

#[derive(Debug, Clone, Copy)]
enum KeyKind {
    Item,
    List,
}

impl KeyKind {
    fn as_str(self) -> &'static str {
        match self {
            KeyKind::Item => "item",
            KeyKind::List => "list",
        }
    }
}

/// Cache-aside data access for one entity type.
///
/// Holds no connections: every call receives the store and cache handles it
/// should use. Cloning is cheap and clones share the descriptor.
pub struct CacheAside<S: EntitySchema> {
    descriptor: Arc<EntityDescriptor>,
    _schema: PhantomData<fn() -> S>,
}

impl<S: EntitySchema> Clone for CacheAside<S> {
    fn clone(&self) -> Self {
        Self {
            descriptor: Arc::clone(&self.descriptor),
            _schema: PhantomData,
        }
    }
}

impl<S: EntitySchema> CacheAside<S> {
    pub fn new(descriptor: EntityDescriptor) -> Self {
        Self {
            descriptor: Arc::new(descriptor),
            _schema: PhantomData,
        }
    }

    pub fn descriptor(&self) -> &EntityDescriptor {
        &self.descriptor
    }

    /// Insert a record and write its response projection through to the
    /// item key.
    pub async fn create<R, C>(
        &self,
        store: &R,
        cache: &C,
        input: &S::Create,
        filters: &FilterSet,
    ) -> Result<S::Response, EngineError>
    where
        R: Repository<S::Record> + ?Sized,
        C: CacheStore + ?Sized,
    {
        let span = info_span!("rowcache.create", entity = S::NAME);
        async move {
            let item_key = self.descriptor.item_pattern().resolve(filters)?;
            let scan = self.invalidation_scan(filters)?;

            let record = store.insert(S::insert_values(input)).await?;
            let response = S::to_response(&record);

            self.write_through(cache, &item_key, &response, KeyKind::Item)
                .await;
            if let Some(pattern) = scan {
                self.invalidate_matching(cache, &pattern).await;
            }
            Ok(response)
        }
        .instrument(span)
        .await
    }

    /// Fetch exactly one record, from cache when possible.
    pub async fn get<R, C>(
        &self,
        store: &R,
        cache: &C,
        filters: &FilterSet,
    ) -> Result<S::Response, EngineError>
    where
        R: Repository<S::Record> + ?Sized,
        C: CacheStore + ?Sized,
    {
        let span = info_span!("rowcache.get", entity = S::NAME);
        async move {
            let item_key = self.descriptor.item_pattern().resolve(filters)?;

            if let Some(cached) = self
                .read_cached::<S::Response, C>(cache, &item_key, KeyKind::Item)
                .await
            {
                return Ok(cached);
            }

            let record = store.find_one(filters).await?;
            let response = S::to_response(&record);
            self.write_through(cache, &item_key, &response, KeyKind::Item)
                .await;
            Ok(response)
        }
        .instrument(span)
        .await
    }

    /// Apply the set fields of `input` to the record selected by `filters`.
    ///
    /// The item key and every key under the invalidation prefix are dropped
    /// before the fresh projection is written back. When the update changes a
    /// field the item key is built from, the old key is only dropped.
    pub async fn update<R, C>(
        &self,
        store: &R,
        cache: &C,
        input: &S::Update,
        filters: &FilterSet,
    ) -> Result<S::Response, EngineError>
    where
        R: Repository<S::Record> + ?Sized,
        C: CacheStore + ?Sized,
    {
        let span = info_span!("rowcache.update", entity = S::NAME);
        async move {
            let item_key = self.descriptor.item_pattern().resolve(filters)?;
            let scan = self.invalidation_scan(filters)?;

            let values = S::update_values(input);
            let rekeyed = self.changes_item_key(filters, &values);

            let record = store.update(filters, values).await?;
            let response = S::to_response(&record);

            self.invalidate_key(cache, &item_key).await;
            if let Some(pattern) = scan {
                self.invalidate_matching(cache, &pattern).await;
            }

            if rekeyed {
                debug!(
                    key = %item_key,
                    "update changed an item key field; skipping write-through"
                );
            } else {
                self.write_through(cache, &item_key, &response, KeyKind::Item)
                    .await;
            }
            Ok(response)
        }
        .instrument(span)
        .await
    }

    /// Remove the matching records, then their cache entries.
    ///
    /// Cache entries are dropped even when the store matched nothing, so a
    /// stale entry for an already-deleted row cannot linger.
    pub async fn delete<R, C>(
        &self,
        store: &R,
        cache: &C,
        filters: &FilterSet,
    ) -> Result<(), EngineError>
    where
        R: Repository<S::Record> + ?Sized,
        C: CacheStore + ?Sized,
    {
        let span = info_span!("rowcache.delete", entity = S::NAME);
        async move {
            let item_key = self.descriptor.item_pattern().resolve(filters)?;
            let scan = self.invalidation_scan(filters)?;

            let removed = store.delete(filters).await?;

            self.invalidate_key(cache, &item_key).await;
            if let Some(pattern) = scan {
                self.invalidate_matching(cache, &pattern).await;
            }

            if removed == 0 {
                return Err(EngineError::RecordNotFound);
            }
            debug!(removed, "deleted records");
            Ok(())
        }
        .instrument(span)
        .await
    }

    /// Fetch one page of records, from cache when possible.
    pub async fn get_multi<R, C>(
        &self,
        store: &R,
        cache: &C,
        options: &ListOptions,
        filters: &FilterSet,
    ) -> Result<Vec<S::Response>, EngineError>
    where
        R: Repository<S::Record> + ?Sized,
        C: CacheStore + ?Sized,
    {
        let span = info_span!(
            "rowcache.get_multi",
            entity = S::NAME,
            limit = options.limit,
            page = options.page
        );
        async move {
            let request = PageRequest::new(options.limit, options.page)?;
            let order_by = options
                .order_by
                .as_deref()
                .unwrap_or(S::DEFAULT_ORDER_BY);
            if !S::FIELDS.iter().any(|field| *field == order_by) {
                return Err(EngineError::InvalidSortField {
                    field: order_by.to_string(),
                });
            }
            let direction = SortDirection::from_ascending(options.ascending);

            if let Some(name) = RESERVED_LIST_ARGUMENTS
                .iter()
                .find(|name| filters.contains(name))
            {
                return Err(EngineError::ReservedKeyArgument {
                    name: (*name).to_string(),
                });
            }
            self.check_list_key_covers(filters, order_by, direction)?;

            let key_args = filters
                .clone()
                .with("page", request.page())
                .with("limit", request.limit())
                .with("order_by", order_by)
                .with("direction", direction.as_str());
            let list_key = self.descriptor.list_pattern().resolve(&key_args)?;

            if let Some(cached) = self
                .read_cached::<Vec<S::Response>, C>(cache, &list_key, KeyKind::List)
                .await
            {
                return Ok(cached);
            }

            let query = ListQuery {
                order_by: order_by.to_string(),
                direction,
                offset: request.offset(),
                limit: request.limit(),
            };
            let records = store.find_many(filters, &query).await?;
            let responses: Vec<S::Response> = records.iter().map(S::to_response).collect();

            self.write_through(cache, &list_key, &responses, KeyKind::List)
                .await;
            Ok(responses)
        }
        .instrument(span)
        .await
    }

    /// Insert every instance in one store operation.
    ///
    /// No item keys are populated; list pages under the invalidation prefix
    /// are dropped because their membership changed.
    pub async fn create_multi<R, C>(
        &self,
        store: &R,
        cache: &C,
        instances: &[S::Create],
        filters: &FilterSet,
    ) -> Result<Vec<S::Response>, EngineError>
    where
        R: Repository<S::Record> + ?Sized,
        C: CacheStore + ?Sized,
    {
        let span = info_span!(
            "rowcache.create_multi",
            entity = S::NAME,
            count = instances.len()
        );
        async move {
            let scan = self.invalidation_scan(filters)?;
            if instances.is_empty() {
                return Ok(Vec::new());
            }

            let rows: Vec<FieldMap> = instances.iter().map(S::insert_values).collect();
            let records = store.insert_many(rows).await?;

            if let Some(pattern) = scan {
                self.invalidate_matching(cache, &pattern).await;
            }
            Ok(records.iter().map(S::to_response).collect())
        }
        .instrument(span)
        .await
    }

    /// Count matching records. Never cached.
    pub async fn count<R>(&self, store: &R, filters: &FilterSet) -> Result<u64, EngineError>
    where
        R: Repository<S::Record> + ?Sized,
    {
        let span = info_span!("rowcache.count", entity = S::NAME);
        async move {
            let total = store.count(filters).await?;
            debug!(total, "counted records");
            Ok(total)
        }
        .instrument(span)
        .await
    }

    /// Slice an already-fetched sequence into a page envelope.
    pub fn paginate<T>(
        &self,
        data: Vec<T>,
        limit: u64,
        page: u64,
    ) -> Result<Paginated<T>, EngineError> {
        Ok(paginate(data, limit, page)?)
    }

    fn invalidation_scan(&self, filters: &FilterSet) -> Result<Option<String>, DomainError> {
        self.descriptor
            .invalidate_prefix()
            .map(|pattern| {
                pattern
                    .resolve_glob(filters)
                    .map(|prefix| format!("{prefix}*"))
            })
            .transpose()
    }

    /// Every argument that changes the result of a list query must appear in
    /// the list key, or two different queries would share one cached page.
    fn check_list_key_covers(
        &self,
        filters: &FilterSet,
        order_by: &str,
        direction: SortDirection,
    ) -> Result<(), EngineError> {
        let pattern = self.descriptor.list_pattern();
        let unkeyed = filters
            .fields()
            .find(|name| !pattern.references(name))
            .or_else(|| {
                (order_by != S::DEFAULT_ORDER_BY && !pattern.references("order_by"))
                    .then_some("order_by")
            })
            .or_else(|| {
                (direction != SortDirection::Ascending && !pattern.references("direction"))
                    .then_some("direction")
            });

        match unkeyed {
            Some(name) => Err(EngineError::UnkeyedListArgument {
                name: name.to_string(),
            }),
            None => Ok(()),
        }
    }

    fn changes_item_key(&self, filters: &FilterSet, values: &FieldMap) -> bool {
        self.descriptor
            .item_pattern()
            .placeholders()
            .into_iter()
            .any(|name| match values.get(name) {
                Some(updated) => filters.get(name) != Some(updated),
                None => false,
            })
    }

    async fn read_cached<T, C>(&self, cache: &C, key: &str, kind: KeyKind) -> Option<T>
    where
        T: DeserializeOwned,
        C: CacheStore + ?Sized,
    {
        let found = match cache.get(key).await {
            Ok(found) => found,
            Err(err) => {
                warn!(
                    source = SOURCE,
                    key,
                    error = %err,
                    "cache read failed; falling back to store"
                );
                None
            }
        };

        let decoded = found.and_then(|bytes| match codec::decode::<T>(&bytes) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(
                    source = SOURCE,
                    key,
                    error = %err,
                    "discarding undecodable cache entry"
                );
                None
            }
        });

        let metric = if decoded.is_some() {
            METRIC_CACHE_HIT
        } else {
            METRIC_CACHE_MISS
        };
        counter!(metric, "entity" => S::NAME, "kind" => kind.as_str()).increment(1);
        debug!(key, kind = kind.as_str(), hit = decoded.is_some(), "cache lookup");
        decoded
    }

    async fn write_through<T, C>(&self, cache: &C, key: &str, value: &T, kind: KeyKind)
    where
        T: Serialize + ?Sized,
        C: CacheStore + ?Sized,
    {
        let result = match codec::encode(value) {
            Ok(bytes) => cache
                .set(key, bytes, self.descriptor.ttl())
                .await
                .map_err(|err| err.to_string()),
            Err(err) => Err(err.to_string()),
        };

        if let Err(error) = result {
            counter!(METRIC_CACHE_WRITE_FAILED, "entity" => S::NAME, "kind" => kind.as_str())
                .increment(1);
            warn!(source = SOURCE, key, %error, "cache write-through failed");
        }
    }

    async fn invalidate_key<C>(&self, cache: &C, key: &str)
    where
        C: CacheStore + ?Sized,
    {
        match cache.delete(key).await {
            Ok(()) => {
                counter!(METRIC_CACHE_INVALIDATED, "entity" => S::NAME, "kind" => "item")
                    .increment(1);
            }
            Err(err) => {
                warn!(source = SOURCE, key, error = %err, "cache invalidation failed");
            }
        }
    }

    async fn invalidate_matching<C>(&self, cache: &C, pattern: &str)
    where
        C: CacheStore + ?Sized,
    {
        match cache.delete_matching(pattern).await {
            Ok(removed) => {
                counter!(METRIC_CACHE_INVALIDATED, "entity" => S::NAME, "kind" => "prefix")
                    .increment(removed);
                debug!(pattern, removed, "invalidated keys under prefix");
            }
            Err(err) => {
                warn!(
                    source = SOURCE,
                    pattern,
                    error = %err,
                    "prefix invalidation failed"
                );
            }
        }
    }
}
