//! Field type metadata extracted from engine mappings.

use std::collections::HashMap;

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{QueryError, QueryResult};

/// Primitive type tag of a mapped field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// Analyzed full-text field.
    Text,
    /// Exact-value string field.
    Keyword,
    /// Any integer or floating point type.
    Numeric,
    /// `date` or `date_nanos`.
    Date,
    /// `boolean`.
    Boolean,
    /// Object container (only recorded when declared with an explicit type).
    Object,
    /// Nested document container.
    Nested,
    /// `ip`.
    Ip,
    /// `geo_point`.
    GeoPoint,
    /// Any other engine type, kept verbatim.
    Other(String),
}

impl FieldType {
    /// Maps an engine type name to a tag.
    pub fn from_engine(tag: &str) -> Self {
        match tag {
            "text" | "match_only_text" => FieldType::Text,
            "keyword" | "constant_keyword" | "wildcard" => FieldType::Keyword,
            "long" | "integer" | "short" | "byte" | "double" | "float" | "half_float"
            | "scaled_float" | "unsigned_long" => FieldType::Numeric,
            "date" | "date_nanos" => FieldType::Date,
            "boolean" => FieldType::Boolean,
            "object" => FieldType::Object,
            "nested" => FieldType::Nested,
            "ip" => FieldType::Ip,
            "geo_point" => FieldType::GeoPoint,
            other => FieldType::Other(other.to_string()),
        }
    }

    /// Returns the tag name.
    pub fn as_str(&self) -> &str {
        match self {
            FieldType::Text => "text",
            FieldType::Keyword => "keyword",
            FieldType::Numeric => "numeric",
            FieldType::Date => "date",
            FieldType::Boolean => "boolean",
            FieldType::Object => "object",
            FieldType::Nested => "nested",
            FieldType::Ip => "ip",
            FieldType::GeoPoint => "geo_point",
            FieldType::Other(tag) => tag,
        }
    }

    /// Returns true for types that numeric aggregations accept.
    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldType::Numeric | FieldType::Date)
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for FieldType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Field name to type, for one index.
///
/// Nested properties are flattened to dotted paths and multi-fields are
/// recorded as `<field>.<sub>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldTypeMap {
    fields: HashMap<String, FieldType>,
}

impl FieldTypeMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field.
    pub fn insert(&mut self, name: impl Into<String>, field_type: FieldType) {
        self.fields.insert(name.into(), field_type);
    }

    /// Returns the type of a field.
    pub fn get(&self, name: &str) -> Option<&FieldType> {
        self.fields.get(name)
    }

    /// Returns true if the field is mapped.
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Field names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.fields.keys().cloned().collect();
        names.sort();
        names
    }

    /// Iterates over `(name, type)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldType)> {
        self.fields.iter()
    }

    /// Number of mapped fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if no fields are mapped.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Extracts the field types of `doc_type` in `index` from a mapping
    /// response.
    ///
    /// Both the typeless layout (`{idx: {mappings: {properties}}}`) and the
    /// typed layout (`{idx: {mappings: {<type>: {properties}}}}`) are
    /// accepted. When the response is keyed by a concrete index behind an
    /// alias, the first entry is used.
    pub fn from_mapping_response(response: &Value, index: &str, doc_type: &str) -> QueryResult<Self> {
        let root = response.as_object().ok_or_else(|| QueryError::Decode {
            message: format!("mapping response for '{}' is not an object", index),
        })?;

        let index_entry = root
            .get(index)
            .or_else(|| root.values().next())
            .ok_or_else(|| QueryError::Decode {
                message: format!("mapping response has no entry for '{}'", index),
            })?;

        let mappings = index_entry.get("mappings").ok_or_else(|| QueryError::Decode {
            message: format!("mapping for '{}' has no 'mappings' section", index),
        })?;

        let properties = mappings
            .get("properties")
            .or_else(|| mappings.get(doc_type).and_then(|t| t.get("properties")))
            .and_then(|p| p.as_object());

        let mut map = FieldTypeMap::new();
        match properties {
            Some(properties) => collect_properties(properties, None, &mut map),
            // An index with no documents yet has an empty mapping.
            None if mappings.as_object().is_some_and(|m| m.is_empty()) => {}
            None => {
                return Err(QueryError::Decode {
                    message: format!(
                        "mapping for '{}' has no properties for type '{}'",
                        index, doc_type
                    ),
                });
            }
        }
        Ok(map)
    }
}

impl FromIterator<(String, FieldType)> for FieldTypeMap {
    fn from_iter<I: IntoIterator<Item = (String, FieldType)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

fn collect_properties(properties: &Map<String, Value>, prefix: Option<&str>, map: &mut FieldTypeMap) {
    for (name, definition) in properties {
        let path = match prefix {
            Some(prefix) => format!("{}.{}", prefix, name),
            None => name.clone(),
        };

        if let Some(tag) = definition.get("type").and_then(|t| t.as_str()) {
            map.insert(path.clone(), FieldType::from_engine(tag));
        }

        if let Some(children) = definition.get("properties").and_then(|p| p.as_object()) {
            collect_properties(children, Some(&path), map);
        }

        if let Some(multi_fields) = definition.get("fields").and_then(|f| f.as_object()) {
            for (sub, sub_definition) in multi_fields {
                if let Some(tag) = sub_definition.get("type").and_then(|t| t.as_str()) {
                    map.insert(format!("{}.{}", path, sub), FieldType::from_engine(tag));
                }
            }
        }
    }
}

/// Field listing for one configured index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexFields {
    /// Index name.
    pub index: String,
    /// Document type.
    #[serde(rename = "type")]
    pub doc_type: String,
    /// Field names, sorted.
    pub fields: Vec<String>,
}
