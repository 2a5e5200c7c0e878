//! Request/response DTOs.

use serde::{Deserialize, Serialize};

use fleetgate_auth::TokenPair;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// "DPoP" when the access token is bound to a proof key, else "Bearer".
    pub token_type: &'static str,
    pub expires_in: u64,
}

impl TokenResponse {
    pub fn from_pair(pair: TokenPair, bound: bool) -> Self {
        Self {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            token_type: if bound { "DPoP" } else { "Bearer" },
            expires_in: pair.expires_in,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ContextSwitchRequest {
    pub organization_id: i64,
}

#[derive(Debug, Serialize)]
pub struct ContextSwitchResponse {
    pub access_token: String,
    pub organization_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct RoleChangeRequest {
    pub user_id: i64,
    pub role_id: i32,
    pub organization_id: Option<i64>,
}
