//! Structured manager decisions and their wire schemas
//!
//! Every manager decision is requested from the model as a small JSON object
//! of the form `{"result": ..., "reason": "..."}`. [`ResponseSchema`] describes
//! what is requested; [`parse_reply`] turns the raw reply back into a typed
//! result, failing with [`CouncilError::SchemaViolation`] when it does not fit.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{CouncilError, Result};
use crate::transcript::ChatMessage;

/// Yes/no decision with the model's justification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BooleanResult {
    pub result: bool,
    pub reason: String,
}

impl BooleanResult {
    pub fn new(result: bool, reason: impl Into<String>) -> Self {
        Self {
            result,
            reason: reason.into(),
        }
    }
}

/// Free-text decision with the model's justification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringResult {
    pub result: String,
    pub reason: String,
}

/// Final answer message produced when the discussion is over
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResult {
    pub result: ChatMessage,
    pub reason: String,
}

/// Any outcome a group chat manager can produce
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Answer to "request user input?" or "terminate?"
    Boolean(BooleanResult),
    /// Name of the next participant
    Selection(StringResult),
    /// Filtered final result
    Final(MessageResult),
}

impl From<BooleanResult> for Decision {
    fn from(value: BooleanResult) -> Self {
        Decision::Boolean(value)
    }
}

impl From<StringResult> for Decision {
    fn from(value: StringResult) -> Self {
        Decision::Selection(value)
    }
}

impl From<MessageResult> for Decision {
    fn from(value: MessageResult) -> Self {
        Decision::Final(value)
    }
}

/// Shape the model is constrained to when answering a decision prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSchema {
    /// `{"result": bool, "reason": string}`
    Boolean,
    /// `{"result": string, "reason": string}`
    String,
}

impl ResponseSchema {
    pub fn name(&self) -> &'static str {
        match self {
            ResponseSchema::Boolean => "BooleanResult",
            ResponseSchema::String => "StringResult",
        }
    }

    /// JSON schema for the `result`/`reason` object
    pub fn json_schema(&self) -> serde_json::Value {
        let result_type = match self {
            ResponseSchema::Boolean => "boolean",
            ResponseSchema::String => "string",
        };
        json!({
            "type": "object",
            "properties": {
                "result": { "type": result_type },
                "reason": { "type": "string" }
            },
            "required": ["result", "reason"],
            "additionalProperties": false
        })
    }

    /// OpenAI-style `response_format` value requesting this schema
    pub fn response_format(&self) -> serde_json::Value {
        json!({
            "type": "json_schema",
            "json_schema": {
                "name": self.name(),
                "strict": true,
                "schema": self.json_schema()
            }
        })
    }
}

/// Parse a raw model reply into the expected structured result
pub fn parse_reply<T: DeserializeOwned>(raw: &str) -> Result<T> {
    serde_json::from_str(raw.trim()).map_err(|source| CouncilError::SchemaViolation {
        raw: raw.to_string(),
        source,
    })
}
