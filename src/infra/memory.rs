//! In-process store adapter.
//!
//! Rows are kept as [`FieldMap`]s and materialized into records through
//! serde, so any `Deserialize` record type works without a database.

use std::marker::PhantomData;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use time::OffsetDateTime;

use crate::application::repos::{ListQuery, RepoError, Repository, SortDirection};
use crate::cache::{rw_read, rw_write};
use crate::domain::{FieldMap, FilterSet, Value};

const SOURCE: &str = "infra::memory::MemoryRepository";

type DefaultsHook = Arc<dyn Fn(&mut FieldMap) + Send + Sync>;

#[derive(Default)]
struct Rows {
    rows: Vec<FieldMap>,
    next_id: i64,
}

pub struct MemoryRepository<R> {
    table: String,
    id_column: Option<String>,
    unique: Vec<String>,
    touch_column: Option<String>,
    defaults: Option<DefaultsHook>,
    state: RwLock<Rows>,
    _record: PhantomData<fn() -> R>,
}

impl<R> MemoryRepository<R> {
    /// An empty table that assigns sequential integer `id`s.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            id_column: Some("id".to_string()),
            unique: Vec::new(),
            touch_column: None,
            defaults: None,
            state: RwLock::new(Rows {
                rows: Vec::new(),
                next_id: 1,
            }),
            _record: PhantomData,
        }
    }

    /// Column assigned from the sequence when an insert omits it; `None`
    /// disables id assignment.
    pub fn id_column(mut self, column: Option<&str>) -> Self {
        self.id_column = column.map(str::to_string);
        self
    }

    pub fn unique(mut self, column: impl Into<String>) -> Self {
        self.unique.push(column.into());
        self
    }

    /// Column set to the current time on every update that does not assign it.
    pub fn touch_column(mut self, column: impl Into<String>) -> Self {
        self.touch_column = Some(column.into());
        self
    }

    /// Hook run on every inserted row before uniqueness is checked.
    pub fn with_defaults<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut FieldMap) + Send + Sync + 'static,
    {
        self.defaults = Some(Arc::new(hook));
        self
    }

    /// Snapshot of the stored rows in insertion order.
    pub fn rows(&self) -> Vec<FieldMap> {
        rw_read(&self.state, SOURCE, "rows").rows.clone()
    }

    pub fn len(&self) -> usize {
        rw_read(&self.state, SOURCE, "len").rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn prepare(&self, state: &mut Rows, mut row: FieldMap) -> FieldMap {
        if let Some(id) = self.id_column.as_deref()
            && !row.contains(id)
        {
            row.insert(id, state.next_id);
            state.next_id += 1;
        }
        if let Some(hook) = self.defaults.as_ref() {
            hook(&mut row);
        }
        row
    }

    /// Reject `row` if it repeats a unique value held by any row in `others`.
    fn check_unique<'a>(
        &self,
        row: &FieldMap,
        others: impl Iterator<Item = &'a FieldMap> + Clone,
    ) -> Result<(), RepoError> {
        for column in &self.unique {
            let Some(value) = row.get(column).filter(|value| !value.is_null()) else {
                continue;
            };
            if others.clone().any(|other| other.get(column) == Some(value)) {
                return Err(RepoError::Duplicate {
                    constraint: format!("{}_{}_key", self.table, column),
                });
            }
        }
        Ok(())
    }
}

fn materialize<R: DeserializeOwned>(row: &FieldMap) -> Result<R, RepoError> {
    let object: serde_json::Map<String, serde_json::Value> = row
        .iter()
        .map(|(field, value)| (field.to_string(), value.to_json()))
        .collect();
    serde_json::from_value(serde_json::Value::Object(object)).map_err(RepoError::from_persistence)
}

fn matching_indices(rows: &[FieldMap], filters: &FilterSet) -> Vec<usize> {
    rows.iter()
        .enumerate()
        .filter(|(_, row)| filters.matches(row))
        .map(|(index, _)| index)
        .collect()
}

fn single_index(indices: &[usize]) -> Result<usize, RepoError> {
    match indices {
        [] => Err(RepoError::NotFound),
        [index] => Ok(*index),
        _ => Err(RepoError::Ambiguous),
    }
}

#[async_trait]
impl<R> Repository<R> for MemoryRepository<R>
where
    R: DeserializeOwned + Send + 'static,
{
    async fn insert(&self, values: FieldMap) -> Result<R, RepoError> {
        let mut state = rw_write(&self.state, SOURCE, "insert");
        let next_id = state.next_id;
        let row = self.prepare(&mut state, values);
        let checked = self
            .check_unique(&row, state.rows.iter())
            .and_then(|()| materialize(&row));
        match checked {
            Ok(record) => {
                state.rows.push(row);
                Ok(record)
            }
            Err(err) => {
                state.next_id = next_id;
                Err(err)
            }
        }
    }

    async fn insert_many(&self, rows: Vec<FieldMap>) -> Result<Vec<R>, RepoError> {
        let mut state = rw_write(&self.state, SOURCE, "insert_many");
        let next_id = state.next_id;

        let mut staged: Vec<FieldMap> = Vec::with_capacity(rows.len());
        let mut records = Vec::with_capacity(rows.len());
        for values in rows {
            let row = self.prepare(&mut state, values);
            let checked = self
                .check_unique(&row, state.rows.iter().chain(staged.iter()))
                .and_then(|()| materialize(&row));
            match checked {
                Ok(record) => {
                    records.push(record);
                    staged.push(row);
                }
                Err(err) => {
                    state.next_id = next_id;
                    return Err(err);
                }
            }
        }

        state.rows.extend(staged);
        Ok(records)
    }

    async fn find_one(&self, filters: &FilterSet) -> Result<R, RepoError> {
        let state = rw_read(&self.state, SOURCE, "find_one");
        let index = single_index(&matching_indices(&state.rows, filters))?;
        materialize(&state.rows[index])
    }

    async fn find_many(
        &self,
        filters: &FilterSet,
        query: &ListQuery,
    ) -> Result<Vec<R>, RepoError> {
        let state = rw_read(&self.state, SOURCE, "find_many");
        let mut matched: Vec<&FieldMap> =
            state.rows.iter().filter(|row| filters.matches(row)).collect();

        let column = query.order_by.as_str();
        matched.sort_by(|a, b| {
            let a = a.get(column).unwrap_or(&Value::Null);
            let b = b.get(column).unwrap_or(&Value::Null);
            match query.direction {
                SortDirection::Ascending => a.sort_cmp(b),
                SortDirection::Descending => b.sort_cmp(a),
            }
        });

        let skip = usize::try_from(query.offset).unwrap_or(usize::MAX);
        let take = usize::try_from(query.limit).unwrap_or(usize::MAX);
        matched
            .into_iter()
            .skip(skip)
            .take(take)
            .map(materialize)
            .collect()
    }

    async fn update(&self, filters: &FilterSet, values: FieldMap) -> Result<R, RepoError> {
        let mut state = rw_write(&self.state, SOURCE, "update");
        let index = single_index(&matching_indices(&state.rows, filters))?;

        let mut row = state.rows[index].clone();
        for (field, value) in values.iter() {
            row.insert(field, value.clone());
        }
        if let Some(touch) = self.touch_column.as_deref()
            && !values.contains(touch)
        {
            row.insert(touch, OffsetDateTime::now_utc());
        }

        let others = state
            .rows
            .iter()
            .enumerate()
            .filter(|(other, _)| *other != index)
            .map(|(_, other)| other);
        self.check_unique(&row, others)?;

        let record = materialize(&row)?;
        state.rows[index] = row;
        Ok(record)
    }

    async fn delete(&self, filters: &FilterSet) -> Result<u64, RepoError> {
        if filters.is_empty() {
            return Err(RepoError::invalid_input(
                "refusing to delete without filters",
            ));
        }
        let mut state = rw_write(&self.state, SOURCE, "delete");
        let before = state.rows.len();
        state.rows.retain(|row| !filters.matches(row));
        Ok((before - state.rows.len()) as u64)
    }

    async fn count(&self, filters: &FilterSet) -> Result<u64, RepoError> {
        let state = rw_read(&self.state, SOURCE, "count");
        Ok(state.rows.iter().filter(|row| filters.matches(row)).count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Tag {
        id: i64,
        slug: String,
        label: Option<String>,
    }

    fn tags() -> MemoryRepository<Tag> {
        MemoryRepository::new("tags").unique("slug")
    }

    fn tag(slug: &str) -> FieldMap {
        FieldMap::new().with("slug", slug).with("label", Value::Null)
    }

    #[tokio::test]
    async fn insert_assigns_sequential_ids() {
        let repo = tags();
        let first = repo.insert(tag("rust")).await.expect("insert");
        let second = repo.insert(tag("sql")).await.expect("insert");
        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(second.label, None);
    }

    #[tokio::test]
    async fn unique_columns_reject_duplicates() {
        let repo = tags();
        repo.insert(tag("rust")).await.expect("insert");
        let err = repo.insert(tag("rust")).await.expect_err("duplicate");
        assert!(matches!(err, RepoError::Duplicate { constraint } if constraint == "tags_slug_key"));
        assert_eq!(repo.len(), 1);

        let next = repo.insert(tag("sql")).await.expect("insert");
        assert_eq!(next.id, 2);
    }

    #[tokio::test]
    async fn insert_many_is_all_or_nothing() {
        let repo = tags();
        repo.insert(tag("rust")).await.expect("insert");
        let err = repo
            .insert_many(vec![tag("sql"), tag("rust")])
            .await
            .expect_err("batch contains a duplicate");
        assert!(matches!(err, RepoError::Duplicate { .. }));
        assert_eq!(repo.len(), 1);

        let created = repo
            .insert_many(vec![tag("sql"), tag("go")])
            .await
            .expect("batch");
        assert_eq!(created.iter().map(|t| t.id).collect::<Vec<_>>(), vec![2, 3]);
    }

    #[tokio::test]
    async fn find_one_distinguishes_none_one_and_many() {
        let repo = tags();
        repo.insert_many(vec![tag("a"), tag("b")]).await.expect("batch");

        let found = repo
            .find_one(&FilterSet::new().with("slug", "b"))
            .await
            .expect("one");
        assert_eq!(found.slug, "b");
        assert!(matches!(
            repo.find_one(&FilterSet::new().with("slug", "z")).await,
            Err(RepoError::NotFound)
        ));
        assert!(matches!(
            repo.find_one(&FilterSet::new().with("label", Value::Null)).await,
            Err(RepoError::Ambiguous)
        ));
    }

    #[tokio::test]
    async fn find_many_orders_and_windows() {
        let repo = tags();
        repo.insert_many(vec![tag("c"), tag("a"), tag("b")])
            .await
            .expect("batch");
        let query = ListQuery {
            order_by: "slug".into(),
            direction: SortDirection::Descending,
            offset: 1,
            limit: 5,
        };
        let page = repo.find_many(&FilterSet::new(), &query).await.expect("list");
        let slugs: Vec<_> = page.into_iter().map(|t| t.slug).collect();
        assert_eq!(slugs, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn update_applies_only_supplied_fields() {
        let repo = tags();
        repo.insert(tag("rust").with("label", "Rust"))
            .await
            .expect("insert");
        let updated = repo
            .update(
                &FilterSet::new().with("slug", "rust"),
                FieldMap::new().with("slug", "rustlang"),
            )
            .await
            .expect("update");
        assert_eq!(updated.slug, "rustlang");
        assert_eq!(updated.label.as_deref(), Some("Rust"));
    }

    #[tokio::test]
    async fn delete_requires_filters_and_reports_count() {
        let repo = tags();
        repo.insert_many(vec![tag("a"), tag("b")]).await.expect("batch");
        assert!(matches!(
            repo.delete(&FilterSet::new()).await,
            Err(RepoError::InvalidInput { .. })
        ));
        assert_eq!(
            repo.delete(&FilterSet::new().with("slug", "a"))
                .await
                .expect("delete"),
            1
        );
        assert_eq!(
            repo.delete(&FilterSet::new().with("slug", "a"))
                .await
                .expect("delete"),
            0
        );
        assert_eq!(repo.count(&FilterSet::new()).await.expect("count"), 1);
    }
}
