//! Postgres-backed repository implementation.

mod table;
mod util;

pub use table::PgTable;
pub use util::map_sqlx_error;

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{
    FromRow,
    postgres::{PgPool, PgPoolOptions, PgRow},
    query,
};
use tracing::{debug, instrument};

use crate::application::repos::{ListQuery, RepoError, Repository};
use crate::domain::{FieldMap, FilterSet};

use util::convert_count;

/// Open a connection pool.
pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await
}

pub async fn health_check(pool: &PgPool) -> Result<(), sqlx::Error> {
    query("SELECT 1").execute(pool).await.map(|_| ())
}

/// Store adapter for one table whose rows decode into `R`.
///
/// Every statement is generated with [`sqlx::QueryBuilder`]; field names are
/// validated against the table's declared columns and values are always
/// bound, never interpolated.
pub struct PgRepository<R> {
    pool: PgPool,
    table: Arc<PgTable>,
    _record: PhantomData<fn() -> R>,
}

impl<R> Clone for PgRepository<R> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            table: Arc::clone(&self.table),
            _record: PhantomData,
        }
    }
}

impl<R> PgRepository<R> {
    pub fn new(pool: PgPool, table: PgTable) -> Self {
        Self {
            pool,
            table: Arc::new(table),
            _record: PhantomData,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn table(&self) -> &PgTable {
        &self.table
    }
}

fn exactly_one<R>(mut rows: Vec<R>) -> Result<R, RepoError> {
    match rows.len() {
        0 => Err(RepoError::NotFound),
        1 => rows.pop().ok_or(RepoError::NotFound),
        _ => Err(RepoError::Ambiguous),
    }
}

#[async_trait]
impl<R> Repository<R> for PgRepository<R>
where
    R: for<'r> FromRow<'r, PgRow> + Send + Unpin + 'static,
{
    #[instrument(skip_all, fields(table = %self.table.name()))]
    async fn insert(&self, values: FieldMap) -> Result<R, RepoError> {
        let mut qb = self.table.insert_query(&values)?;
        qb.build_query_as::<R>()
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }

    #[instrument(skip_all, fields(table = %self.table.name(), rows = rows.len()))]
    async fn insert_many(&self, rows: Vec<FieldMap>) -> Result<Vec<R>, RepoError> {
        let mut builders = Vec::with_capacity(rows.len());
        for values in &rows {
            builders.push(self.table.insert_query(values)?);
        }

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        let mut records = Vec::with_capacity(builders.len());
        for mut qb in builders {
            let record = qb
                .build_query_as::<R>()
                .fetch_one(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
            records.push(record);
        }
        tx.commit().await.map_err(map_sqlx_error)?;

        debug!(inserted = records.len(), "inserted rows");
        Ok(records)
    }

    #[instrument(skip_all, fields(table = %self.table.name()))]
    async fn find_one(&self, filters: &FilterSet) -> Result<R, RepoError> {
        let mut qb = self.table.select_one_query(filters, false)?;
        let rows = qb
            .build_query_as::<R>()
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        exactly_one(rows)
    }

    #[instrument(skip_all, fields(table = %self.table.name(), order_by = %query.order_by))]
    async fn find_many(
        &self,
        filters: &FilterSet,
        query: &ListQuery,
    ) -> Result<Vec<R>, RepoError> {
        let mut qb = self.table.select_many_query(filters, query)?;
        qb.build_query_as::<R>()
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }

    #[instrument(skip_all, fields(table = %self.table.name()))]
    async fn update(&self, filters: &FilterSet, values: FieldMap) -> Result<R, RepoError> {
        let mut update = if self.table.writes_anything(&values) {
            Some(self.table.update_query(filters, &values)?)
        } else {
            None
        };
        let mut lock = self.table.select_one_query(filters, true)?;

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        let current = lock
            .build_query_as::<R>()
            .fetch_all(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        let current = exactly_one(current)?;

        let record = match update.as_mut() {
            Some(qb) => qb
                .build_query_as::<R>()
                .fetch_one(&mut *tx)
                .await
                .map_err(map_sqlx_error)?,
            None => current,
        };
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(record)
    }

    #[instrument(skip_all, fields(table = %self.table.name()))]
    async fn delete(&self, filters: &FilterSet) -> Result<u64, RepoError> {
        let mut qb = self.table.delete_query(filters)?;
        let result = qb
            .build()
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    #[instrument(skip_all, fields(table = %self.table.name()))]
    async fn count(&self, filters: &FilterSet) -> Result<u64, RepoError> {
        let mut qb = self.table.count_query(filters)?;
        let count: i64 = qb
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        convert_count(count)
    }
}
