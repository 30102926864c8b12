//! Ordered field → value mappings.

use super::value::Value;

/// An insertion-ordered mapping from field name to expected value.
///
/// Used both to parameterize cache key templates and to constrain store
/// queries. Re-inserting an existing field replaces the value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSet {
    entries: Vec<(String, Value)>,
}

/// Store-side insert or partial-update values share the filter shape.
pub type FieldMap = FilterSet;

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        let field = field.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(name, _)| *name == field) {
            Some((_, existing)) => *existing = value,
            None => self.entries.push((field, value)),
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        let index = self.entries.iter().position(|(name, _)| name == field)?;
        Some(self.entries.remove(index).1)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when every entry of `self` is present in `row` with an equal value.
    pub fn matches(&self, row: &FilterSet) -> bool {
        self.iter()
            .all(|(field, expected)| row.get(field).unwrap_or(&Value::Null) == expected)
    }
}

impl<K, V> FromIterator<(K, V)> for FilterSet
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut filters = FilterSet::new();
        for (field, value) in iter {
            filters.insert(field, value);
        }
        filters
    }
}

impl IntoIterator for FilterSet {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reinsert_replaces_in_place() {
        let mut filters = FilterSet::new().with("a", 1).with("b", 2);
        filters.insert("a", 3);

        let fields: Vec<_> = filters.fields().collect();
        assert_eq!(fields, vec!["a", "b"]);
        assert_eq!(filters.get("a"), Some(&Value::Int(3)));
    }

    #[test]
    fn matches_treats_missing_row_fields_as_null() {
        let row = FilterSet::new().with("email", "a@example.com");
        assert!(FilterSet::new().with("email", "a@example.com").matches(&row));
        assert!(FilterSet::new().with("bio", Value::Null).matches(&row));
        assert!(!FilterSet::new().with("email", "b@example.com").matches(&row));
        assert!(FilterSet::new().matches(&row));
    }

    #[test]
    fn collects_from_pairs() {
        let filters: FilterSet = [("id", 7), ("org", 2)].into_iter().collect();
        assert_eq!(filters.len(), 2);
        assert!(filters.contains("org"));
    }
}
