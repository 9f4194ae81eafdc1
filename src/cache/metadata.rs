//! Field metadata describing how a model type is shaped on the wire.

use serde::{Deserialize, Serialize};

use super::entity::{FieldSet, FieldValue};

/// Accepted JSON shape of a field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
    /// Id of another entity, resolved to a record reference.
    Link,
    /// Array of entity ids.
    LinkList,
    Null,
    Any,
}

impl FieldKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
            Self::Link => "link",
            Self::LinkList => "link_list",
            Self::Null => "null",
            Self::Any => "any",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMeta {
    pub name: String,
    /// Key in backend payloads when it differs from `name`.
    #[serde(default)]
    pub api_field: Option<String>,
    pub kinds: Vec<FieldKind>,
    /// Target model type for `link` and `link_list` fields.
    #[serde(default)]
    pub sub_type: Option<String>,
    #[serde(default)]
    pub required: bool,
}

impl FieldMeta {
    pub fn new(name: impl Into<String>, kinds: impl IntoIterator<Item = FieldKind>) -> Self {
        Self {
            name: name.into(),
            api_field: None,
            kinds: kinds.into_iter().collect(),
            sub_type: None,
            required: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn api_field(mut self, key: impl Into<String>) -> Self {
        self.api_field = Some(key.into());
        self
    }

    pub fn links_to(mut self, model_type: impl Into<String>) -> Self {
        self.sub_type = Some(model_type.into());
        self
    }

    pub fn api_key(&self) -> &str {
        self.api_field.as_deref().unwrap_or(&self.name)
    }

    pub fn accepts_null(&self) -> bool {
        self.kinds
            .iter()
            .any(|kind| matches!(kind, FieldKind::Null | FieldKind::Any))
    }

    pub fn is_link(&self) -> bool {
        self.kinds
            .iter()
            .any(|kind| matches!(kind, FieldKind::Link | FieldKind::LinkList))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub model_type: String,
    #[serde(default)]
    pub fields: Vec<FieldMeta>,
}

impl ModelMetadata {
    pub fn new(model_type: impl Into<String>) -> Self {
        Self {
            model_type: model_type.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, field: FieldMeta) -> Self {
        self.fields.push(field);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldMeta> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Fields stored on a record; `id` lives on the record itself.
    pub fn data_fields(&self) -> impl Iterator<Item = &FieldMeta> {
        self.fields.iter().filter(|field| field.name != "id")
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &FieldMeta> {
        self.data_fields().filter(|field| field.required)
    }

    /// Field set of a freshly created record: every known field is `null`.
    pub fn empty_fields(&self) -> FieldSet {
        self.data_fields()
            .map(|field| (field.name.clone(), FieldValue::null()))
            .collect()
    }
}
