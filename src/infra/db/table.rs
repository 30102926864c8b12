//! Table descriptions and SQL fragments shared by the Postgres repository.

use sqlx::{Postgres, QueryBuilder};

use crate::application::repos::{ListQuery, RepoError};
use crate::domain::{FieldMap, FilterSet, Value};

use super::util::quote_ident;

/// The columns one repository may read, filter, order and write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PgTable {
    name: String,
    columns: Vec<String>,
    touch_column: Option<String>,
}

impl PgTable {
    pub fn new<I, S>(name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            touch_column: None,
        }
    }

    /// Column set to `now()` on every update that does not assign it.
    pub fn touch_column(mut self, column: impl Into<String>) -> Self {
        self.touch_column = Some(column.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|candidate| candidate == column)
    }

    fn check(&self, column: &str) -> Result<(), RepoError> {
        if self.has_column(column) {
            Ok(())
        } else {
            Err(RepoError::UnknownField(column.to_string()))
        }
    }

    fn check_all<'a>(&self, fields: impl IntoIterator<Item = &'a str>) -> Result<(), RepoError> {
        fields.into_iter().try_for_each(|field| self.check(field))
    }

    fn quoted_name(&self) -> String {
        quote_ident(&self.name)
    }

    pub(crate) fn insert_query(
        &self,
        values: &FieldMap,
    ) -> Result<QueryBuilder<'static, Postgres>, RepoError> {
        self.check_all(values.fields())?;

        let mut qb = QueryBuilder::new(format!("INSERT INTO {}", self.quoted_name()));
        if values.is_empty() {
            qb.push(" DEFAULT VALUES");
        } else {
            qb.push(" (");
            let mut columns = qb.separated(", ");
            for field in values.fields() {
                columns.push(quote_ident(field));
            }
            qb.push(") VALUES (");
            for (index, (_, value)) in values.iter().enumerate() {
                if index > 0 {
                    qb.push(", ");
                }
                push_value(&mut qb, value);
            }
            qb.push(")");
        }
        qb.push(" RETURNING *");
        Ok(qb)
    }

    /// `SELECT *` limited to two rows, enough to tell one match from many.
    pub(crate) fn select_one_query(
        &self,
        filters: &FilterSet,
        lock: bool,
    ) -> Result<QueryBuilder<'static, Postgres>, RepoError> {
        let mut qb = self.select_query(filters)?;
        qb.push(" LIMIT 2");
        if lock {
            qb.push(" FOR UPDATE");
        }
        Ok(qb)
    }

    pub(crate) fn select_many_query(
        &self,
        filters: &FilterSet,
        query: &ListQuery,
    ) -> Result<QueryBuilder<'static, Postgres>, RepoError> {
        self.check(&query.order_by)?;
        let limit = i64::try_from(query.limit)
            .map_err(|_| RepoError::invalid_input("limit exceeds supported range"))?;
        let offset = i64::try_from(query.offset)
            .map_err(|_| RepoError::invalid_input("offset exceeds supported range"))?;

        let mut qb = self.select_query(filters)?;
        qb.push(" ORDER BY ");
        qb.push(quote_ident(&query.order_by));
        qb.push(" ");
        qb.push(query.direction.as_sql());
        qb.push(" LIMIT ");
        qb.push_bind(limit);
        qb.push(" OFFSET ");
        qb.push_bind(offset);
        Ok(qb)
    }

    pub(crate) fn update_query(
        &self,
        filters: &FilterSet,
        values: &FieldMap,
    ) -> Result<QueryBuilder<'static, Postgres>, RepoError> {
        self.check_all(values.fields())?;

        let mut qb = QueryBuilder::new(format!("UPDATE {} SET ", self.quoted_name()));
        let mut first = true;
        for (field, value) in values.iter() {
            if !first {
                qb.push(", ");
            }
            first = false;
            qb.push(quote_ident(field));
            qb.push(" = ");
            push_value(&mut qb, value);
        }
        if let Some(touch) = self.touch_column.as_deref()
            && !values.contains(touch)
        {
            if !first {
                qb.push(", ");
            }
            qb.push(quote_ident(touch));
            qb.push(" = now()");
        }
        self.push_where(&mut qb, filters)?;
        qb.push(" RETURNING *");
        Ok(qb)
    }

    /// Whether an update with `values` changes anything at all.
    pub(crate) fn writes_anything(&self, values: &FieldMap) -> bool {
        !values.is_empty() || self.touch_column.is_some()
    }

    pub(crate) fn delete_query(
        &self,
        filters: &FilterSet,
    ) -> Result<QueryBuilder<'static, Postgres>, RepoError> {
        if filters.is_empty() {
            return Err(RepoError::invalid_input(
                "refusing to delete without filters",
            ));
        }
        let mut qb = QueryBuilder::new(format!("DELETE FROM {}", self.quoted_name()));
        self.push_where(&mut qb, filters)?;
        Ok(qb)
    }

    pub(crate) fn count_query(
        &self,
        filters: &FilterSet,
    ) -> Result<QueryBuilder<'static, Postgres>, RepoError> {
        let mut qb = QueryBuilder::new(format!("SELECT COUNT(*) FROM {}", self.quoted_name()));
        self.push_where(&mut qb, filters)?;
        Ok(qb)
    }

    fn select_query(&self, filters: &FilterSet) -> Result<QueryBuilder<'static, Postgres>, RepoError> {
        let mut qb = QueryBuilder::new(format!("SELECT * FROM {}", self.quoted_name()));
        self.push_where(&mut qb, filters)?;
        Ok(qb)
    }

    fn push_where(
        &self,
        qb: &mut QueryBuilder<'static, Postgres>,
        filters: &FilterSet,
    ) -> Result<(), RepoError> {
        self.check_all(filters.fields())?;

        for (index, (field, value)) in filters.iter().enumerate() {
            qb.push(if index == 0 { " WHERE " } else { " AND " });
            qb.push(quote_ident(field));
            if value.is_null() {
                qb.push(" IS NULL");
            } else {
                qb.push(" = ");
                push_value(qb, value);
            }
        }
        Ok(())
    }
}

fn push_value(qb: &mut QueryBuilder<'static, Postgres>, value: &Value) {
    match value {
        Value::Null => {
            qb.push("NULL");
        }
        Value::Bool(value) => {
            qb.push_bind(*value);
        }
        Value::Int(value) => {
            qb.push_bind(*value);
        }
        Value::Float(value) => {
            qb.push_bind(*value);
        }
        Value::Text(value) => {
            qb.push_bind(value.clone());
        }
        Value::Uuid(value) => {
            qb.push_bind(*value);
        }
        Value::Timestamp(value) => {
            qb.push_bind(*value);
        }
    }
}
