use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Field map of a document or patch, excluding the reserved `_id`/`_rev` keys.
pub type Fields = Map<String, JsonValue>;

/// A stored document.
///
/// Serializes to the CouchDB wire shape: a flat JSON object with the reserved
/// `_id` and `_rev` keys next to the user fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "_id")]
    pub id: String,

    /// Revision token assigned by the store on every successful write.
    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,

    #[serde(flatten)]
    pub fields: Fields,
}

impl Document {
    /// An empty document carrying only its id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            rev: None,
            fields: Fields::new(),
        }
    }

    pub fn with_rev(mut self, rev: impl Into<String>) -> Self {
        self.rev = Some(rev.into());
        self
    }

    /// Set a field (builder style)
    pub fn set(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.fields.get(key)
    }

    /// Parses a document from a JSON value, e.g. one read from a file.
    pub fn from_json(value: JsonValue) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }

    pub fn to_json(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or(JsonValue::Null)
    }
}

/// A partial update addressed to one document.
///
/// The `rev` slot only exists so that a patch carrying `_rev` can be parsed
/// and rejected; patches are always applied against the latest revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    #[serde(rename = "_id")]
    pub id: String,

    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,

    #[serde(flatten)]
    pub fields: Fields,
}

impl Patch {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            rev: None,
            fields: Fields::new(),
        }
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Marks a field for removal under the default overlay patcher.
    pub fn unset(mut self, key: impl Into<String>) -> Self {
        self.fields.insert(key.into(), JsonValue::Null);
        self
    }

    pub fn from_json(value: JsonValue) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }
}
