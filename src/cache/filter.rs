//! Filtered views over a stored list.
//!
//! A [`FilteredList`] owns no members. Every read walks its base list and
//! keeps the records matching the [`Filter`], so consumed payloads show up
//! as soon as they land in the base list.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tokio::sync::watch;

use super::entity::{EntityRecord, EntityRef, FieldValue};
use super::fetch::PendingLoad;
use super::list::{ListRef, ListView};
use super::load_state::{LoadState, wait_settled};

#[derive(Debug, Clone)]
pub enum FilterValue {
    /// Matches plain fields by JSON equality.
    Value(Value),
    /// Matches link fields pointing at the same `(type, id)`.
    Entity(EntityRef),
    /// Matches when any member matches.
    OneOf(Vec<FilterValue>),
}

impl FilterValue {
    pub fn matches(&self, field: Option<&FieldValue>) -> bool {
        match self {
            Self::OneOf(options) => options.iter().any(|option| option.matches(field)),
            Self::Value(expected) => match field {
                Some(FieldValue::Value(actual)) => actual == expected,
                None => expected.is_null(),
                Some(_) => false,
            },
            Self::Entity(expected) => match field {
                Some(FieldValue::Link(link)) => link.points_to(expected),
                Some(FieldValue::Links(links)) => links.iter().any(|link| link.points_to(expected)),
                _ => false,
            },
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Value(value) => value.clone(),
            Self::Entity(record) => Value::String(record.id().to_owned()),
            Self::OneOf(options) => options.iter().map(FilterValue::to_json).collect(),
        }
    }
}

impl From<Value> for FilterValue {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<&EntityRef> for FilterValue {
    fn from(record: &EntityRef) -> Self {
        Self::Entity(EntityRef::clone(record))
    }
}

/// Conjunction of per-field conditions.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    terms: BTreeMap<String, FilterValue>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, FilterValue::Value(value.into()))
    }

    pub fn entity(self, field: impl Into<String>, record: &EntityRef) -> Self {
        self.with(field, FilterValue::from(record))
    }

    pub fn one_of(
        self,
        field: impl Into<String>,
        options: impl IntoIterator<Item = FilterValue>,
    ) -> Self {
        self.with(field, FilterValue::OneOf(options.into_iter().collect()))
    }

    pub fn with(mut self, field: impl Into<String>, value: FilterValue) -> Self {
        self.terms.insert(field.into(), value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn matches(&self, record: &EntityRecord) -> bool {
        self.terms
            .iter()
            .all(|(field, value)| value.matches(record.field(field).as_ref()))
    }

    /// Serialized form; entities collapse to their ids.
    pub fn to_json(&self) -> Value {
        let object: Map<String, Value> = self
            .terms
            .iter()
            .map(|(field, value)| (field.clone(), value.to_json()))
            .collect();
        Value::Object(object)
    }

    /// Deterministic list name for this filter.
    pub fn list_name(&self) -> String {
        self.to_json().to_string()
    }
}

#[derive(Debug, Clone)]
pub struct FilteredList {
    name: String,
    base: ListRef,
    filter: Filter,
}

impl FilteredList {
    pub fn new(name: impl Into<String>, base: ListRef, filter: Filter) -> Self {
        Self {
            name: name.into(),
            base,
            filter,
        }
    }

    pub fn base(&self) -> &ListRef {
        &self.base
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    pub async fn settled(&self) -> LoadState {
        wait_settled(self.subscribe(), || self.load_state()).await
    }
}

impl ListView for FilteredList {
    fn name(&self) -> &str {
        &self.name
    }

    fn load_state(&self) -> LoadState {
        self.base.load_state()
    }

    fn total(&self) -> usize {
        self.models().len()
    }

    fn models(&self) -> Vec<EntityRef> {
        self.base
            .models()
            .into_iter()
            .filter(|record| self.filter.matches(record))
            .collect()
    }

    fn invalid_models(&self) -> Vec<Value> {
        self.base.invalid_models()
    }

    fn load_list(&self) -> PendingLoad {
        self.base.load_list()
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        self.base.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::cache::entity::{EntityLink, EntityRecord, FieldSet};
    use crate::cache::list::ModelList;

    fn user(id: &str) -> EntityRef {
        EntityRecord::new("User", id, FieldSet::new())
    }

    fn post(id: &str, status: &str, author: &EntityRef) -> EntityRef {
        let mut fields = FieldSet::new();
        fields.insert("status".into(), json!(status).into());
        fields.insert("author".into(), FieldValue::Link(EntityLink::new(author)));
        fields.insert(
            "reviewers".into(),
            FieldValue::Links(vec![EntityLink::new(author)]),
        );
        let record = EntityRecord::new("Post", id, FieldSet::new());
        record.merge_fields(fields);
        record
    }

    #[test]
    fn entity_terms_match_links_by_type_and_id() {
        let ada = user("ada");
        let bob = user("bob");
        let draft = post("1", "draft", &ada);

        assert!(Filter::new().entity("author", &ada).matches(&draft));
        assert!(Filter::new().entity("reviewers", &ada).matches(&draft));
        assert!(!Filter::new().entity("author", &bob).matches(&draft));
        // A different record with the same identity still matches.
        assert!(Filter::new().entity("author", &user("ada")).matches(&draft));
    }

    #[test]
    fn one_of_and_plain_values() {
        let ada = user("ada");
        let draft = post("1", "draft", &ada);

        let statuses = Filter::new().one_of(
            "status",
            [FilterValue::from(json!("draft")), json!("review").into()],
        );
        assert!(statuses.matches(&draft));
        assert!(!Filter::new().eq("status", "published").matches(&draft));
        assert!(Filter::new().eq("missing", Value::Null).matches(&draft));
    }

    #[test]
    fn list_name_is_stable_json() {
        let ada = user("ada");
        let filter = Filter::new()
            .eq("status", "draft")
            .entity("author", &ada)
            .one_of("tag", [json!("a").into(), json!("b").into()]);

        assert_eq!(
            filter.list_name(),
            r#"{"author":"ada","status":"draft","tag":["a","b"]}"#
        );
    }

    #[test]
    fn filtered_view_recomputes_from_base() {
        let ada = user("ada");
        let bob = user("bob");
        let base = ModelList::new("all", None, None);
        let filtered = FilteredList::new("by-ada", Arc::clone(&base), Filter::new().entity("author", &ada));

        base.place(vec![(0, post("1", "draft", &bob))], Vec::new());
        assert_eq!(filtered.total(), 0);

        base.unshift_if_absent(&post("2", "draft", &ada));
        let ids: Vec<_> = filtered.models().iter().map(|m| m.id().to_owned()).collect();
        assert_eq!(ids, vec!["2"]);
    }

}
