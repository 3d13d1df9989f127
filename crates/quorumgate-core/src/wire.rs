//! Outbound request shapes for the consensus backends.
//!
//! The socket record is `operation|details`, where `details` is a list of
//! `key=value` pairs joined by `;`. Values are percent-escaped for the bytes
//! that carry framing meaning, so a path can never break the record apart.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::GateError;
use crate::types::{InterceptedCall, OperationKind};

/// Upper bound on an encoded socket record, in bytes.
pub const MAX_RECORD_LEN: usize = 4096;

/// One operation, ready to be submitted for a verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusRequest {
    pub id: Uuid,
    pub kind: OperationKind,
    pub resource: String,
    /// Classification tag of the rule that made this call sensitive.
    pub class: String,
    pub fields: Vec<(String, String)>,
}

impl ConsensusRequest {
    pub fn from_call(call: &InterceptedCall, class: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: call.kind,
            resource: call.resource.describe(),
            class: class.to_string(),
            fields: call
                .metadata
                .fields()
                .into_iter()
                .map(|(key, value)| (key.to_string(), value))
                .collect(),
        }
    }

    /// Renders the lightweight socket record, rejecting anything over
    /// [`MAX_RECORD_LEN`].
    pub fn encode_record(&self) -> Result<String, GateError> {
        let mut details = format!("resource={};class={}", escape(&self.resource), escape(&self.class));
        for (key, value) in &self.fields {
            details.push(';');
            details.push_str(&escape(key));
            details.push('=');
            details.push_str(&escape(value));
        }
        let record = format!("{}|{}", self.kind.as_str(), details);
        if record.len() > MAX_RECORD_LEN {
            return Err(GateError::Encoding(format!(
                "record is {} bytes, limit {MAX_RECORD_LEN}",
                record.len()
            )));
        }
        Ok(record)
    }

    /// Parameters for the structured RPC call.
    pub fn rpc_params(&self) -> Value {
        let metadata: serde_json::Map<String, Value> = self
            .fields
            .iter()
            .map(|(key, value)| (key.clone(), Value::String(value.clone())))
            .collect();
        let flags = self
            .fields
            .iter()
            .find(|(key, _)| key == "flags")
            .and_then(|(_, value)| value.parse::<i64>().ok())
            .unwrap_or(0);
        json!({
            "request_id": self.id.to_string(),
            "operation": self.kind.as_str(),
            "resource": self.resource,
            "flags": flags,
            "metadata": metadata,
            "class": self.class,
        })
    }
}

/// For/against tally reported by a structured backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Votes {
    pub votes_for: u32,
    pub votes_against: u32,
}

impl Votes {
    pub fn total(&self) -> u32 {
        self.votes_for.saturating_add(self.votes_against)
    }
}

/// A verdict as received from a backend, consumed once by the decision engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusResponse {
    pub approved: bool,
    pub votes: Option<Votes>,
    pub reason: Option<String>,
}

impl ConsensusResponse {
    pub fn approved() -> Self {
        Self {
            approved: true,
            votes: None,
            reason: None,
        }
    }

    pub fn denied(reason: impl Into<String>) -> Self {
        Self {
            approved: false,
            votes: None,
            reason: Some(reason.into()),
        }
    }
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '%' | '|' | ';' | '=' | '\n' | '\r' | '\0' => {
                let mut buf = [0u8; 4];
                for byte in ch.encode_utf8(&mut buf).bytes() {
                    out.push_str(&format!("%{byte:02X}"));
                }
            }
            _ => out.push(ch),
        }
    }
    out
}
