//! Structured JSON-RPC 2.0 backend over a single HTTP exchange.
//!
//! The exchange runs on the calling thread through a blocking `ureq` agent.
//! The gate's own network calls are themselves intercepted, and only work
//! done on the thread that holds the re-entrancy flag is exempt from gating,
//! so no client that hands I/O to a background runtime can be used here.

use std::error::Error as StdError;
use std::io::{ErrorKind, Read};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use quorumgate_core::config::TransportConfig;
use quorumgate_core::{ConsensusRequest, ConsensusResponse, TransportError, Votes};

use crate::ConsensusTransport;

/// Largest HTTP response body accepted from the decision service.
const RESPONSE_LIMIT: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct RpcTransport {
    endpoint: String,
    method: String,
    timeout: Duration,
}

#[derive(Debug, Serialize)]
struct RpcCall<'a> {
    jsonrpc: &'static str,
    id: String,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcReply {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcFault>,
}

#[derive(Debug, Deserialize)]
struct RpcFault {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

impl RpcTransport {
    pub fn new(endpoint: impl Into<String>, method: impl Into<String>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            method: method.into(),
            timeout,
        }
    }

    pub fn from_config(config: &TransportConfig) -> Self {
        Self::new(config.rpc_endpoint.clone(), config.rpc_method.clone(), config.timeout())
    }

    fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }

    /// One agent per request: no pooled connections, no redirects, and one
    /// deadline covering connect, send and receive.
    fn agent(&self) -> ureq::Agent {
        ureq::AgentBuilder::new()
            .timeout(self.timeout)
            .redirects(0)
            .max_idle_connections(0)
            .build()
    }
}

impl ConsensusTransport for RpcTransport {
    fn name(&self) -> &'static str {
        "rpc"
    }

    fn request(&self, request: &ConsensusRequest) -> Result<ConsensusResponse, TransportError> {
        let timeout_ms = self.timeout_ms();
        let call = RpcCall {
            jsonrpc: "2.0",
            id: request.id.to_string(),
            method: &self.method,
            params: request.rpc_params(),
        };
        let payload = serde_json::to_vec(&call)
            .map_err(|err| TransportError::Protocol(format!("serialize request: {err}")))?;

        let response = self
            .agent()
            .post(&self.endpoint)
            .set("Content-Type", "application/json")
            .set("Accept", "application/json")
            .send_bytes(&payload)
            .map_err(|err| exchange_error(err, timeout_ms))?;
        if response.status() != 200 {
            return Err(TransportError::Protocol(format!(
                "HTTP status {}",
                response.status()
            )));
        }

        let mut body = Vec::new();
        response
            .into_reader()
            .take(RESPONSE_LIMIT as u64 + 1)
            .read_to_end(&mut body)
            .map_err(|err| TransportError::from_io(&err, timeout_ms))?;
        if body.len() > RESPONSE_LIMIT {
            return Err(TransportError::Protocol(format!(
                "response exceeds {RESPONSE_LIMIT} bytes"
            )));
        }

        let response = parse_verdict(&body, &call.id)?;
        tracing::debug!(
            request_id = %request.id,
            approved = response.approved,
            "rpc verdict received"
        );
        Ok(response)
    }
}

fn exchange_error(err: ureq::Error, timeout_ms: u64) -> TransportError {
    match err {
        ureq::Error::Status(code, _) => TransportError::Protocol(format!("HTTP status {code}")),
        ureq::Error::Transport(transport) => {
            if timed_out(&transport) {
                return TransportError::Timeout(timeout_ms);
            }
            match transport.kind() {
                ureq::ErrorKind::InvalidUrl
                | ureq::ErrorKind::UnknownScheme
                | ureq::ErrorKind::Dns
                | ureq::ErrorKind::ConnectionFailed => {
                    TransportError::Unavailable(transport.to_string())
                }
                _ => TransportError::Protocol(transport.to_string()),
            }
        }
    }
}

/// Whether any I/O error in the chain is a deadline expiry.
fn timed_out(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(err) = current {
        if let Some(io) = err.downcast_ref::<std::io::Error>() {
            if matches!(io.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) {
                return true;
            }
        }
        current = err.source();
    }
    false
}

/// Interprets a JSON-RPC reply. Anything that is not a well-formed reply to
/// this request is a protocol error; a reply without a boolean `approved`
/// flag is a denial.
fn parse_verdict(body: &[u8], request_id: &str) -> Result<ConsensusResponse, TransportError> {
    let reply: RpcReply = serde_json::from_slice(body)
        .map_err(|err| TransportError::Protocol(format!("invalid JSON-RPC reply: {err}")))?;

    match &reply.id {
        Some(Value::String(id)) if id == request_id => {}
        Some(other) => {
            return Err(TransportError::Protocol(format!(
                "reply id {other} does not match request {request_id}"
            )))
        }
        None => return Err(TransportError::Protocol("reply carries no id".to_string())),
    }

    if let Some(fault) = reply.error {
        return Ok(ConsensusResponse::denied(format!(
            "backend error {}: {}",
            fault.code, fault.message
        )));
    }

    let result = match reply.result {
        Some(Value::Object(result)) => result,
        Some(_) => return Err(TransportError::Protocol("result is not an object".to_string())),
        None => return Err(TransportError::Protocol("reply has no result".to_string())),
    };

    let count = |key: &str| {
        result
            .get(key)
            .and_then(Value::as_u64)
            .map(|value| value.min(u32::MAX as u64) as u32)
    };
    let votes = match (count("votes_for"), count("votes_against")) {
        (None, None) => None,
        (votes_for, votes_against) => Some(Votes {
            votes_for: votes_for.unwrap_or(0),
            votes_against: votes_against.unwrap_or(0),
        }),
    };
    let reason = result
        .get("reason")
        .and_then(Value::as_str)
        .filter(|reason| !reason.is_empty())
        .map(str::to_string);

    let response = match result.get("approved").and_then(Value::as_bool) {
        Some(approved) => ConsensusResponse { approved, votes, reason },
        None => ConsensusResponse {
            approved: false,
            votes,
            reason: Some(reason.unwrap_or_else(|| "approved flag missing".to_string())),
        },
    };
    Ok(response)
}
