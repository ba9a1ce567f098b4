//! Result records and their validation.
//!
//! Parsing and validation are separate steps: the extractor turns text into
//! [`serde_json::Value`]s, and [`validate`] decides whether a value is a
//! renderable [`ResultRecord`]. A record that fails validation is dropped on its
//! own and never fails the stream.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// One completed unit of work, ready to render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    /// Unit id, `1..=expected`.
    #[serde(rename = "iteration")]
    pub unit_id: u64,

    /// Reference to the generated image.
    #[serde(rename = "image_url")]
    pub payload_url: String,

    /// Text describing the image.
    pub description: String,

    /// Prompt the image generator actually used, when the server reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revised_prompt: Option<String>,

    /// Server-side completion time, passed through as sent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// Why a record was dropped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordRejection {
    #[error("record is not an object")]
    NotAnObject,

    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("field `{0}` is empty")]
    EmptyField(&'static str),

    #[error("field `{field}` has the wrong type (expected {expected})")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
}

/// Validate one element of a message's `results` array.
pub fn validate(value: &Value) -> Result<ResultRecord, RecordRejection> {
    let object = value.as_object().ok_or(RecordRejection::NotAnObject)?;

    let unit_id = match object.get("iteration") {
        None | Some(Value::Null) => return Err(RecordRejection::MissingField("iteration")),
        Some(Value::Number(n)) => match n.as_u64() {
            Some(0) => return Err(RecordRejection::EmptyField("iteration")),
            Some(id) => id,
            None => {
                return Err(RecordRejection::WrongType {
                    field: "iteration",
                    expected: "positive integer",
                })
            }
        },
        Some(_) => {
            return Err(RecordRejection::WrongType {
                field: "iteration",
                expected: "positive integer",
            })
        }
    };

    let payload_url = required_string(object, "image_url")?;
    let description = required_string(object, "description")?;

    Ok(ResultRecord {
        unit_id,
        payload_url,
        description,
        revised_prompt: optional_string(object, "revised_prompt"),
        timestamp: optional_string(object, "timestamp"),
    })
}

fn required_string(
    object: &serde_json::Map<String, Value>,
    field: &'static str,
) -> Result<String, RecordRejection> {
    match object.get(field) {
        None | Some(Value::Null) => Err(RecordRejection::MissingField(field)),
        Some(Value::String(s)) if s.is_empty() => Err(RecordRejection::EmptyField(field)),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(RecordRejection::WrongType {
            field,
            expected: "string",
        }),
    }
}

fn optional_string(object: &serde_json::Map<String, Value>, field: &str) -> Option<String> {
    object
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
