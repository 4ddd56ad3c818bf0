//! Metadata stored with each vector

use crate::error::{Error, Result};
use crate::models::ChunkMetadata;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{ListValue, Struct, Value as QdrantValue};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Payload key holding the chunk id (Qdrant point ids must be UUIDs)
pub const CHUNK_ID_KEY: &str = "chunk_id";

/// JSON object stored alongside a vector.
///
/// Holds the tagged chunk metadata plus `weight`, `text`, `indexed_at` and
/// `embedding_model` once the chunk has been indexed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(pub Map<String, Value>);

impl Payload {
    /// Start a payload from chunk metadata
    pub fn from_metadata(metadata: &ChunkMetadata) -> Result<Self> {
        match serde_json::to_value(metadata)? {
            Value::Object(map) => Ok(Self(map)),
            other => Err(Error::Metadata(format!(
                "chunk metadata serialized to a non-object: {}",
                other
            ))),
        }
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(Value::as_f64)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    pub fn get_str_list(&self, key: &str) -> Vec<String> {
        self.0
            .get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// `statute` or `judicial`
    pub fn chunk_type(&self) -> Option<&str> {
        self.get_str("type")
    }

    /// Stored authority weight; unweighted records count as 1.0
    pub fn weight(&self) -> f64 {
        self.get_f64("weight").unwrap_or(1.0)
    }

    pub fn text(&self) -> &str {
        self.get_str("text").unwrap_or_default()
    }

    pub fn chunk_id(&self) -> Option<&str> {
        self.get_str(CHUNK_ID_KEY)
    }

    /// Decode the tagged chunk metadata; extra indexing keys are ignored
    pub fn to_metadata(&self) -> Result<ChunkMetadata> {
        serde_json::from_value(Value::Object(self.0.clone()))
            .map_err(|e| Error::Metadata(e.to_string()))
    }

    /// Convert to Qdrant payload format
    pub fn to_qdrant_payload(&self) -> HashMap<String, QdrantValue> {
        self.0
            .iter()
            .map(|(k, v)| (k.clone(), json_to_qdrant_value(v)))
            .collect()
    }

    /// Build from a Qdrant payload
    pub fn from_qdrant_payload(map: HashMap<String, QdrantValue>) -> Self {
        Self(
            map.into_iter()
                .map(|(k, v)| (k, json_from_qdrant_value(v)))
                .collect(),
        )
    }
}

/// Convert serde_json Value to a Qdrant value
pub fn json_to_qdrant_value(value: &Value) -> QdrantValue {
    let kind = match value {
        Value::Null => Kind::NullValue(0),
        Value::Bool(b) => Kind::BoolValue(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Kind::IntegerValue(i),
            None => Kind::DoubleValue(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => Kind::StringValue(s.clone()),
        Value::Array(items) => Kind::ListValue(ListValue {
            values: items.iter().map(json_to_qdrant_value).collect(),
        }),
        Value::Object(map) => Kind::StructValue(Struct {
            fields: map
                .iter()
                .map(|(k, v)| (k.clone(), json_to_qdrant_value(v)))
                .collect(),
        }),
    };
    QdrantValue { kind: Some(kind) }
}

/// Convert Qdrant value to serde_json Value
pub fn json_from_qdrant_value(v: QdrantValue) -> Value {
    match v.kind {
        Some(Kind::NullValue(_)) => Value::Null,
        Some(Kind::BoolValue(b)) => Value::Bool(b),
        Some(Kind::IntegerValue(i)) => Value::Number(i.into()),
        Some(Kind::DoubleValue(d)) => serde_json::Number::from_f64(d)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Some(Kind::StringValue(s)) => Value::String(s),
        Some(Kind::ListValue(list)) => Value::Array(
            list.values
                .into_iter()
                .map(json_from_qdrant_value)
                .collect(),
        ),
        Some(Kind::StructValue(s)) => Value::Object(
            s.fields
                .into_iter()
                .map(|(k, v)| (k, json_from_qdrant_value(v)))
                .collect(),
        ),
        None => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{JudicialMetadata, JudicialSubtype};

    fn judicial() -> ChunkMetadata {
        ChunkMetadata::Judicial(JudicialMetadata {
            subtype: JudicialSubtype::Principle,
            case_id: "22 Cdo 1/2020".to_string(),
            court: "Nejvyšší soud".to_string(),
            date: "2020-01-01".to_string(),
            section: None,
            statute_refs: vec!["§1089".to_string(), "§992".to_string()],
            is_binding: true,
            en_banc: false,
            citation_count: 4,
            overruled: false,
            cites: vec![],
            weight: Some(7.25),
        })
    }

    #[test]
    fn test_payload_accessors() {
        let mut payload = Payload::from_metadata(&judicial()).unwrap();
        payload.insert("text", "Oprávněná držba ...");
        payload.insert(CHUNK_ID_KEY, "decision_22_Cdo_1/2020_principle");

        assert_eq!(payload.chunk_type(), Some("judicial"));
        assert_eq!(payload.weight(), 7.25);
        assert_eq!(payload.get_str_list("statute_refs"), vec!["§1089", "§992"]);
        assert_eq!(payload.chunk_id(), Some("decision_22_Cdo_1/2020_principle"));
        assert_eq!(payload.to_metadata().unwrap(), judicial());
    }

    #[test]
    fn test_qdrant_conversion_preserves_types() {
        let mut payload = Payload::from_metadata(&judicial()).unwrap();
        payload.insert("weight", 0.011108996538242306);

        let back = Payload::from_qdrant_payload(payload.to_qdrant_payload());
        assert_eq!(back.weight(), 0.011108996538242306);
        assert_eq!(back.get_str_list("statute_refs"), vec!["§1089", "§992"]);
        assert_eq!(back.get_bool("is_binding"), Some(true));
        assert_eq!(back.get("citation_count").and_then(Value::as_i64), Some(4));
    }
}
