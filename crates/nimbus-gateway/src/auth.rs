//! Bearer-token authentication with scoped access.
//!
//! Tokens are opaque uuids minted by `POST /api/auth/token` against the
//! configured shared secret. Each token carries a scope list; protected
//! handlers require one scope, answering 401 for an unknown or expired
//! token and 403 when the token lacks the scope.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Instant;

/// Default token lifetime: 30 minutes.
pub const DEFAULT_TTL_SECS: u64 = 1800;

/// Every scope a token may carry.
pub const ALL_SCOPES: &[&str] = &[
    "conversation:read",
    "conversation:write",
    "memory:read",
    "memory:write",
    "config:read",
    "config:write",
];

/// Outcome of checking a token against a required scope.
#[derive(Debug, PartialEq, Eq)]
pub enum TokenCheck {
    Ok,
    /// Unknown or expired token.
    Invalid,
    /// Valid token without the required scope.
    Forbidden,
}

/// Metadata for an issued API token.
#[derive(Clone)]
pub struct TokenInfo {
    pub created_at: Instant,
    pub ttl_secs: u64,
    pub scopes: Vec<String>,
}

/// In-memory token store for API authentication.
pub struct TokenStore {
    tokens: RwLock<HashMap<String, TokenInfo>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self {
            tokens: RwLock::new(HashMap::new()),
        }
    }

    /// Mint a token carrying `scopes`, valid for `ttl_secs`.
    pub fn generate_token(&self, scopes: Vec<String>, ttl_secs: u64) -> String {
        let token = uuid::Uuid::new_v4().to_string();
        let info = TokenInfo {
            created_at: Instant::now(),
            ttl_secs,
            scopes,
        };
        self.tokens.write().unwrap().insert(token.clone(), info);
        token
    }

    /// Check `token` for `scope`.
    pub fn check(&self, token: &str, scope: &str) -> TokenCheck {
        let tokens = self.tokens.read().unwrap();
        match tokens.get(token) {
            Some(info) if info.created_at.elapsed().as_secs() < info.ttl_secs => {
                if info.scopes.iter().any(|s| s == scope) {
                    TokenCheck::Ok
                } else {
                    TokenCheck::Forbidden
                }
            }
            _ => TokenCheck::Invalid,
        }
    }
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new()
    }
}
