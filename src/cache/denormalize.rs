//! Turning raw backend payloads into record field sets.

use std::sync::Weak;

use serde_json::Value;

use super::entity::{EntityLink, EntityRef, FieldSet, FieldValue, LinkLookup};
use super::error::{FieldError, UnknownTypeError};
use super::metadata::{FieldKind, FieldMeta, ModelMetadata};

/// Resolves link ids to shared records during denormalization.
pub trait LinkResolver {
    fn resolve_link(&self, model_type: &str, id: &str) -> Result<EntityRef, UnknownTypeError>;

    fn is_known_type(&self, model_type: &str) -> bool;

    /// Lookup attached to every resolved link so it can follow the
    /// identity map later.
    fn link_lookup(&self) -> Option<Weak<dyn LinkLookup>> {
        None
    }
}

/// Result of a denormalization pass: the valid part of the payload plus
/// every field that failed.
#[derive(Debug, Default)]
pub struct Denormalized {
    pub value: FieldSet,
    pub errors: Vec<FieldError>,
}

impl Denormalized {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

pub trait Denormalizer: Send + Sync {
    fn denormalize(
        &self,
        raw: &Value,
        metadata: &ModelMetadata,
        links: &dyn LinkResolver,
    ) -> Denormalized;
}

/// Validates payloads against [`ModelMetadata`] field kinds.
#[derive(Debug, Default, Clone, Copy)]
pub struct SchemaDenormalizer;

impl Denormalizer for SchemaDenormalizer {
    fn denormalize(
        &self,
        raw: &Value,
        metadata: &ModelMetadata,
        links: &dyn LinkResolver,
    ) -> Denormalized {
        let mut result = Denormalized::default();

        let Some(object) = raw.as_object() else {
            result.errors.push(FieldError::new(
                "",
                format!("expected object, got {}", json_type(raw)),
            ));
            return result;
        };

        if !object.get("id").is_some_and(Value::is_string) {
            result
                .errors
                .push(FieldError::new("id", "missing string id"));
        }

        for field in metadata.data_fields() {
            let raw_value = object.get(field.api_key()).unwrap_or(&Value::Null);
            match decode_field(field, raw_value, links) {
                Ok(value) => {
                    result.value.insert(field.name.clone(), value);
                }
                Err(message) => result.errors.push(FieldError::new(&field.name, message)),
            }
        }

        result
    }
}

fn decode_field(
    field: &FieldMeta,
    raw: &Value,
    links: &dyn LinkResolver,
) -> Result<FieldValue, String> {
    if raw.is_null() {
        return if field.required && !field.accepts_null() {
            Err("required field is missing".to_owned())
        } else {
            Ok(FieldValue::null())
        };
    }

    for kind in &field.kinds {
        if let Some(decoded) = decode_as(*kind, field, raw, links) {
            return decoded;
        }
    }

    let expected = field
        .kinds
        .iter()
        .map(|kind| kind.as_str())
        .collect::<Vec<_>>()
        .join(" | ");
    Err(format!("expected {expected}, got {}", json_type(raw)))
}

/// `None` when `raw` does not have the shape of `kind`.
fn decode_as(
    kind: FieldKind,
    field: &FieldMeta,
    raw: &Value,
    links: &dyn LinkResolver,
) -> Option<Result<FieldValue, String>> {
    let plain = || Some(Ok(FieldValue::Value(raw.clone())));
    match kind {
        FieldKind::Any => plain(),
        FieldKind::String if raw.is_string() => plain(),
        FieldKind::Number if raw.is_number() => plain(),
        FieldKind::Integer if raw.is_i64() || raw.is_u64() => plain(),
        FieldKind::Boolean if raw.is_boolean() => plain(),
        FieldKind::Object if raw.is_object() => plain(),
        FieldKind::Array if raw.is_array() => plain(),
        FieldKind::Link => {
            let id = link_id(raw)?;
            match linked_type(field, links) {
                Some(model_type) => Some(
                    resolve(links, model_type, &id).map(FieldValue::Link),
                ),
                None => plain(),
            }
        }
        FieldKind::LinkList => {
            let ids = raw
                .as_array()?
                .iter()
                .map(link_id)
                .collect::<Option<Vec<_>>>()?;
            match linked_type(field, links) {
                Some(model_type) => Some(
                    ids.iter()
                        .map(|id| resolve(links, model_type, id))
                        .collect::<Result<Vec<_>, _>>()
                        .map(FieldValue::Links),
                ),
                None => plain(),
            }
        }
        _ => None,
    }
}

fn linked_type<'a>(field: &'a FieldMeta, links: &dyn LinkResolver) -> Option<&'a str> {
    field
        .sub_type
        .as_deref()
        .filter(|model_type| links.is_known_type(model_type))
}

fn resolve(links: &dyn LinkResolver, model_type: &str, id: &str) -> Result<EntityLink, String> {
    let record = links
        .resolve_link(model_type, id)
        .map_err(|error| error.to_string())?;
    let link = EntityLink::new(&record);
    Ok(match links.link_lookup() {
        Some(lookup) => link.with_lookup(lookup),
        None => link,
    })
}

fn link_id(raw: &Value) -> Option<String> {
    match raw {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

fn json_type(raw: &Value) -> &'static str {
    match raw {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
