//! Authentication and authorization middleware.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use sha2::{Digest, Sha256};
use tracing::Instrument;
use uuid::Uuid;

/// Maximum length for trace IDs.
/// Longer trace IDs are truncated to prevent log bloat and potential log injection.
const MAX_TRACE_ID_LEN: usize = 128;

/// Trace ID for request correlation.
#[derive(Clone, Debug)]
pub struct TraceId(pub String);

impl TraceId {
    /// Generate a new random trace ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create a trace ID from a client-provided value, sanitized for logging.
    pub fn from_client(value: &str) -> Self {
        // Limit by character count, not bytes, to stay on UTF-8 boundaries;
        // then keep only printable ASCII for log safety.
        let sanitized: String = value
            .chars()
            .take(MAX_TRACE_ID_LEN)
            .filter(|c| c.is_ascii_graphic() || *c == ' ')
            .collect();

        if sanitized.is_empty() {
            Self::new()
        } else {
            Self(sanitized)
        }
    }

    /// Get the trace ID as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity established by a valid bearer token.
///
/// Operators drive the read and admin endpoints; agents may only begin
/// carves, and each agent token is bound to one host id. Block uploads are
/// authenticated by session id instead and carry no bearer token at all.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Caller {
    Operator,
    Agent { host_id: i64 },
}

/// Authenticated request extension.
#[derive(Clone, Debug)]
pub struct AuthenticatedCaller {
    pub caller: Caller,
}

impl AuthenticatedCaller {
    /// Require the operator identity.
    pub fn require_operator(&self) -> ApiResult<()> {
        match self.caller {
            Caller::Operator => Ok(()),
            Caller::Agent { .. } => Err(ApiError::Forbidden(
                "operator token required".to_string(),
            )),
        }
    }

    /// Require an agent identity and return the bound host id.
    pub fn require_agent(&self) -> ApiResult<i64> {
        match self.caller {
            Caller::Agent { host_id } => Ok(host_id),
            Caller::Operator => Err(ApiError::Forbidden(
                "agent token required".to_string(),
            )),
        }
    }
}

/// Extract bearer token from Authorization header.
/// Per RFC 6750, the "Bearer" scheme is case-insensitive.
fn extract_bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            if v.len() >= 7 && v[..7].eq_ignore_ascii_case("bearer ") {
                Some(&v[7..])
            } else {
                None
            }
        })
}

/// Extract trace ID from X-Trace-Id header or generate a new one.
fn extract_or_generate_trace_id(req: &Request) -> TraceId {
    req.headers()
        .get("x-trace-id")
        .and_then(|v| v.to_str().ok())
        .map(TraceId::from_client)
        .unwrap_or_else(TraceId::new)
}

/// Hash a token for configuration lookup.
fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Authentication middleware that resolves bearer tokens and sets up trace
/// context. Requests without a recognized token still pass through; handlers
/// that need an identity check for the [`AuthenticatedCaller`] extension.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let trace_id = extract_or_generate_trace_id(&req);
    let trace_id_str = trace_id.0.clone();
    req.extensions_mut().insert(trace_id);

    if let Some(token_str) = extract_bearer_token(&req) {
        let token_hash = hash_token(token_str);
        let auth = &state.config.auth;

        let caller = if token_hash == auth.operator_token_hash {
            Some(Caller::Operator)
        } else {
            auth.agents
                .iter()
                .find(|agent| agent.token_hash == token_hash)
                .map(|agent| Caller::Agent {
                    host_id: agent.host_id,
                })
        };

        if let Some(caller) = caller {
            req.extensions_mut().insert(AuthenticatedCaller { caller });
        }
    }

    let response = next
        .run(req)
        .instrument(tracing::info_span!("request", trace_id = %trace_id_str))
        .await;

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_id_sanitizes_client_values() {
        let id = TraceId::from_client("abc\ndef\x07ghi");
        assert_eq!(id.as_str(), "abcdefghi");

        let long = "x".repeat(500);
        assert_eq!(TraceId::from_client(&long).as_str().len(), MAX_TRACE_ID_LEN);

        // All-garbage input falls back to a generated id.
        assert!(!TraceId::from_client("\x01\x02").as_str().is_empty());
    }

    #[test]
    fn token_hash_is_sha256_hex() {
        assert_eq!(
            hash_token("test-operator-token"),
            "21a41ec35ffe053418f5ebab652c9b4cb07a643a9100640d18b635e0df503928"
        );
    }

    #[test]
    fn operator_cannot_act_as_agent() {
        let op = AuthenticatedCaller {
            caller: Caller::Operator,
        };
        assert!(op.require_operator().is_ok());
        assert!(op.require_agent().is_err());

        let agent = AuthenticatedCaller {
            caller: Caller::Agent { host_id: 7 },
        };
        assert_eq!(agent.require_agent().unwrap(), 7);
        assert!(agent.require_operator().is_err());
    }
}
