use std::fmt;

use serde::{Deserialize, Serialize};

use super::validator::NotionType;

/// A logged value. Serialized untagged so the service sees plain JSON scalars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl ParameterValue {
    /// Reads a command-line style value: integer, then float, then boolean,
    /// otherwise text.
    pub fn infer(raw: &str) -> Self {
        if let Ok(i) = raw.parse::<i64>() {
            ParameterValue::Integer(i)
        } else if let Ok(x) = raw.parse::<f64>() {
            ParameterValue::Float(x)
        } else if let Ok(b) = raw.parse::<bool>() {
            ParameterValue::Boolean(b)
        } else {
            ParameterValue::Text(raw.to_string())
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Boolean(b) => write!(f, "{}", b),
            ParameterValue::Integer(i) => write!(f, "{}", i),
            ParameterValue::Float(x) => write!(f, "{}", x),
            ParameterValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for ParameterValue {
    fn from(value: bool) -> Self {
        ParameterValue::Boolean(value)
    }
}

impl From<i64> for ParameterValue {
    fn from(value: i64) -> Self {
        ParameterValue::Integer(value)
    }
}

impl From<i32> for ParameterValue {
    fn from(value: i32) -> Self {
        ParameterValue::Integer(value.into())
    }
}

impl From<u32> for ParameterValue {
    fn from(value: u32) -> Self {
        ParameterValue::Integer(value.into())
    }
}

impl From<f64> for ParameterValue {
    fn from(value: f64) -> Self {
        ParameterValue::Float(value)
    }
}

impl From<f32> for ParameterValue {
    fn from(value: f32) -> Self {
        ParameterValue::Float(value.into())
    }
}

impl From<String> for ParameterValue {
    fn from(value: String) -> Self {
        ParameterValue::Text(value)
    }
}

impl From<&str> for ParameterValue {
    fn from(value: &str) -> Self {
        ParameterValue::Text(value.to_string())
    }
}

/// One observation waiting for delivery.
///
/// Records are values: the worker never mutates a queued record, a retry
/// replaces it with [`ParameterRecord::retried`].
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterRecord {
    pub name: String,
    pub value: ParameterValue,
    pub notion_type: Option<NotionType>,
    pub retry_count: u32,
}

impl ParameterRecord {
    pub fn new(name: impl Into<String>, value: impl Into<ParameterValue>, notion_type: Option<NotionType>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            notion_type,
            retry_count: 0,
        }
    }

    pub fn retried(self) -> Self {
        Self {
            retry_count: self.retry_count + 1,
            ..self
        }
    }
}

/// Wire shape of one element of a parameter batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterPayload {
    pub parameter_name: String,
    pub parameter_value: ParameterValue,
    pub notion_type: Option<NotionType>,
}

impl From<&ParameterRecord> for ParameterPayload {
    fn from(record: &ParameterRecord) -> Self {
        Self {
            parameter_name: record.name.clone(),
            parameter_value: record.value.clone(),
            notion_type: record.notion_type,
        }
    }
}
