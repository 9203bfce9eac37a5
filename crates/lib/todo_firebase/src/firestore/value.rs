//! Firestore REST document encoding.
//!
//! Field values travel as single-key objects (`{"stringValue": "..."}`).
//! Only the value kinds a task document can hold are decoded strictly;
//! anything else is kept as raw JSON and ignored.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use todo_core::backend::StoreError;
use todo_core::models::{NewTask, Task, TaskPatch};

pub const FIELD_TEXT: &str = "text";
pub const FIELD_COMPLETED: &str = "completed";

/// A typed Firestore field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    #[serde(rename = "stringValue")]
    String(String),
    #[serde(rename = "booleanValue")]
    Boolean(bool),
    /// Integers are carried as decimal strings.
    #[serde(rename = "integerValue")]
    Integer(String),
    #[serde(rename = "doubleValue")]
    Double(f64),
    #[serde(rename = "timestampValue")]
    Timestamp(String),
    #[serde(rename = "nullValue")]
    Null(()),
    #[serde(untagged)]
    Other(serde_json::Value),
}

impl Value {
    fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

pub type Fields = BTreeMap<String, Value>;

/// A document as returned by the REST API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Full resource name, `projects/../documents/{collection}/{id}`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default)]
    pub fields: Fields,
}

impl Document {
    /// Trailing path segment of the resource name.
    pub fn id(&self) -> Option<&str> {
        self.name.rsplit('/').next().filter(|id| !id.is_empty())
    }
}

/// Fields for a new task document.
pub fn encode_new_task(task: &NewTask, owner_field: &str) -> Document {
    let mut fields = Fields::new();
    fields.insert(FIELD_TEXT.into(), Value::String(task.text.clone()));
    fields.insert(FIELD_COMPLETED.into(), Value::Boolean(task.completed));
    fields.insert(owner_field.into(), Value::String(task.owner_id.clone()));
    Document {
        name: String::new(),
        fields,
    }
}

/// Fields and update mask for a partial update.
pub fn encode_patch(patch: &TaskPatch) -> (Document, Vec<&'static str>) {
    let mut fields = Fields::new();
    let mut mask = Vec::new();
    if let Some(completed) = patch.completed {
        fields.insert(FIELD_COMPLETED.into(), Value::Boolean(completed));
        mask.push(FIELD_COMPLETED);
    }
    (
        Document {
            name: String::new(),
            fields,
        },
        mask,
    )
}

/// Decode a task document. A missing `completed` reads as `false`.
pub fn decode_task(doc: &Document, owner_field: &str) -> Result<Task, StoreError> {
    let id = doc
        .id()
        .ok_or_else(|| StoreError::Decode(format!("document without a name: {doc:?}")))?;
    let text = required_str(doc, id, FIELD_TEXT)?;
    let owner_id = required_str(doc, id, owner_field)?;
    let completed = match doc.fields.get(FIELD_COMPLETED) {
        None => false,
        Some(value) => value.as_bool().ok_or_else(|| {
            StoreError::Decode(format!("{id}: `{FIELD_COMPLETED}` is not a boolean"))
        })?,
    };
    Ok(Task {
        id: id.to_string(),
        text,
        completed,
        owner_id,
    })
}

fn required_str(doc: &Document, id: &str, field: &str) -> Result<String, StoreError> {
    doc.fields
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| StoreError::Decode(format!("{id}: missing string field `{field}`")))
}
