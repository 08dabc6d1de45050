use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single property value. Raw source text is resolved into one of these
/// variants exactly once, at transformation time; downstream code never
/// re-inspects strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        PropValue::Str(value.to_string())
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        PropValue::Str(value)
    }
}

impl From<i64> for PropValue {
    fn from(value: i64) -> Self {
        PropValue::Int(value)
    }
}

impl From<bool> for PropValue {
    fn from(value: bool) -> Self {
        PropValue::Bool(value)
    }
}

impl<T: Into<PropValue>> From<Option<T>> for PropValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(PropValue::Null)
    }
}

pub type PropMap = BTreeMap<String, PropValue>;

/// A typed node identified by `(label, key)`. Two entities with the same
/// label and natural key collapse to one store node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub label: String,
    pub key: String,
    pub props: PropMap,
}

impl Entity {
    pub fn new(label: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            key: key.into(),
            props: PropMap::new(),
        }
    }

    pub fn with_prop(mut self, name: impl Into<String>, value: impl Into<PropValue>) -> Self {
        self.props.insert(name.into(), value.into());
        self
    }

    pub fn entity_ref(&self) -> EntityRef {
        EntityRef {
            label: self.label.clone(),
            key: self.key.clone(),
        }
    }
}

/// Reference to an entity by natural key, used as a relationship endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub label: String,
    pub key: String,
}

impl EntityRef {
    pub fn new(label: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            key: key.into(),
        }
    }
}

/// A typed edge between two entity references.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub rel_type: String,
    pub from: EntityRef,
    pub to: EntityRef,
    pub props: PropMap,
}

impl Relationship {
    pub fn new(rel_type: impl Into<String>, from: EntityRef, to: EntityRef) -> Self {
        Self {
            rel_type: rel_type.into(),
            from,
            to,
            props: PropMap::new(),
        }
    }

    pub fn with_prop(mut self, name: impl Into<String>, value: impl Into<PropValue>) -> Self {
        self.props.insert(name.into(), value.into());
        self
    }
}

/// Everything one source row transforms into: the row's own entity,
/// the shared entities it references, and the edges between them.
#[derive(Debug, Clone, Default)]
pub struct EntitySet {
    pub primary: Option<Entity>,
    pub references: Vec<Entity>,
    pub relationships: Vec<Relationship>,
}

impl EntitySet {
    pub fn new(primary: Entity) -> Self {
        Self {
            primary: Some(primary),
            references: Vec::new(),
            relationships: Vec::new(),
        }
    }

    pub fn add_reference(&mut self, entity: Entity) {
        self.references.push(entity);
    }

    pub fn add_relationship(&mut self, rel: Relationship) {
        self.relationships.push(rel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prop_values_serialize_untagged() {
        let entity = Entity::new("Person", "p-1")
            .with_prop("name", "Ada")
            .with_prop("age", 36i64)
            .with_prop("active", true)
            .with_prop("middle_name", Option::<String>::None);

        let json = serde_json::to_value(&entity.props).unwrap();
        assert_eq!(json["name"], "Ada");
        assert_eq!(json["age"], 36);
        assert_eq!(json["active"], true);
        assert!(json["middle_name"].is_null());
    }

    #[test]
    fn entity_ref_round_trip() {
        let entity = Entity::new("City", "berlin");
        let entity_ref = entity.entity_ref();
        assert_eq!(entity_ref, EntityRef::new("City", "berlin"));
    }
}
