//! Access tokens and gateway tickets.
//!
//! Both are issued by the platform's account service and written to the
//! shared key-value store. This service only reads them; the `store_*`
//! helpers exist for that issuer and for tests.

use serde::{Deserialize, Serialize};

use crate::db::kv::KeyValueStore;
use crate::error::ApiError;

// ---------------------------------------------------------------------------
// Opaque token generation
// ---------------------------------------------------------------------------

/// Generate an opaque random token with the given prefix.
pub fn generate_opaque_token(prefix: &str, bytes: usize) -> String {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use rand::Rng;
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill(&mut buf[..]);
    format!("{}_{}", prefix, URL_SAFE_NO_PAD.encode(&buf))
}

/// Identity carried by both access tokens and gateway tickets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenIdentity {
    pub user_id: String,
    pub display_name: String,
}

fn encode(identity: &TokenIdentity) -> Result<String, ApiError> {
    serde_json::to_string(identity).map_err(|_| ApiError::internal("serialization"))
}

fn decode(raw: &str) -> Result<TokenIdentity, ApiError> {
    serde_json::from_str(raw).map_err(|_| ApiError::internal("corrupt token data"))
}

// ---------------------------------------------------------------------------
// Access token (HTTP bearer), 1-hour TTL
// ---------------------------------------------------------------------------

pub const ACCESS_TOKEN_TTL_SECS: u64 = 3600;

fn access_key(token: &str) -> String {
    format!("nikah:at:{token}")
}

pub fn generate_access_token() -> String {
    generate_opaque_token("nat", 32)
}

pub async fn store_access_token(
    kv: &dyn KeyValueStore,
    token: &str,
    identity: &TokenIdentity,
) -> Result<(), ApiError> {
    kv.set_ex(&access_key(token), &encode(identity)?, ACCESS_TOKEN_TTL_SECS)
        .await
}

pub async fn lookup_access_token(
    kv: &dyn KeyValueStore,
    token: &str,
) -> Result<Option<TokenIdentity>, ApiError> {
    kv.get(&access_key(token))
        .await?
        .map(|v| decode(&v))
        .transpose()
}

// ---------------------------------------------------------------------------
// Gateway ticket, 30-second TTL, single-use
// ---------------------------------------------------------------------------

pub const WS_TICKET_TTL_SECS: u64 = 30;

fn ticket_key(ticket: &str) -> String {
    format!("nikah:wst:{ticket}")
}

pub fn generate_ws_ticket() -> String {
    generate_opaque_token("wst", 32)
}

pub async fn store_ws_ticket(
    kv: &dyn KeyValueStore,
    ticket: &str,
    identity: &TokenIdentity,
) -> Result<(), ApiError> {
    kv.set_ex(&ticket_key(ticket), &encode(identity)?, WS_TICKET_TTL_SECS)
        .await
}

/// Validate and consume a ticket. A ticket can only be redeemed once.
pub async fn consume_ws_ticket(
    kv: &dyn KeyValueStore,
    ticket: &str,
) -> Result<Option<TokenIdentity>, ApiError> {
    kv.take(&ticket_key(ticket))
        .await?
        .map(|v| decode(&v))
        .transpose()
}
