use std::fmt;
use std::ops::Deref;

use super::entity::{EntityRecord, EntityRef};
use super::store::CompletenessCheck;

/// A record paired with its store's completeness predicate, for picking
/// between a placeholder and a full rendering.
#[derive(Clone)]
pub struct OptionalModel {
    record: EntityRef,
    is_full: CompletenessCheck,
}

impl OptionalModel {
    pub fn new(record: EntityRef, is_full: CompletenessCheck) -> Self {
        Self { record, is_full }
    }

    pub fn record(&self) -> &EntityRef {
        &self.record
    }

    pub fn into_record(self) -> EntityRef {
        self.record
    }

    pub fn is_full(&self) -> bool {
        (self.is_full)(&self.record)
    }

    pub fn fold<R>(
        &self,
        on_empty: impl FnOnce(&EntityRecord) -> R,
        on_full: impl FnOnce(&EntityRecord) -> R,
    ) -> R {
        if self.is_full() {
            on_full(&self.record)
        } else {
            on_empty(&self.record)
        }
    }

    pub fn on_full<R>(&self, f: impl FnOnce(&EntityRecord) -> R) -> Option<R> {
        self.is_full().then(|| f(&self.record))
    }

    pub fn on_empty<R>(&self, f: impl FnOnce(&EntityRecord) -> R) -> Option<R> {
        (!self.is_full()).then(|| f(&self.record))
    }
}

impl Deref for OptionalModel {
    type Target = EntityRecord;

    fn deref(&self) -> &EntityRecord {
        &self.record
    }
}

impl fmt::Debug for OptionalModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptionalModel")
            .field("record", &self.record)
            .field("is_full", &self.is_full())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::cache::entity::FieldSet;

    #[test]
    fn selects_branch_from_predicate() {
        let record = EntityRecord::new("Post", "1", FieldSet::new());
        let model = OptionalModel::new(
            Arc::clone(&record),
            Arc::new(|record: &EntityRecord| record.value("title").is_some_and(|t| !t.is_null())),
        );

        assert_eq!(model.fold(|_| "skeleton", |_| "full"), "skeleton");
        assert_eq!(model.on_full(|r| r.id().to_owned()), None);

        let mut fields = FieldSet::new();
        fields.insert("title".into(), json!("Hello").into());
        record.merge_fields(fields);

        assert_eq!(model.on_full(|r| r.value("title")), Some(Some(json!("Hello"))));
        assert_eq!(model.on_empty(|_| ()), None);
        assert_eq!(model.id(), "1");
    }
}
