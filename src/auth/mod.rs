//! Access-token sign-in.
//!
//! The chat front-end does not own credentials. A user pastes an access
//! token issued elsewhere, the auth endpoint validates it and returns the
//! user profile, and the token is then sent as a bearer token on backend
//! requests.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::client::BackendClient;
use crate::error::{GysError, Result};

pub mod store;

pub use store::SessionStore;

/// Auth endpoint response body.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub message: String,
    pub data: AuthData,
    #[serde(default)]
    pub expired_at: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthData {
    pub user: AuthUserRecord,
}

/// User record as the auth endpoint spells it.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthUserRecord {
    pub users_id: String,
    pub users_name: String,
    pub users_email: String,
}

/// Signed-in user profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    pub name: String,
    pub email: String,
}

impl From<AuthUserRecord> for AuthUser {
    fn from(u: AuthUserRecord) -> Self {
        Self {
            id: u.users_id,
            name: u.users_name,
            email: u.users_email,
        }
    }
}

/// A validated token and the user it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedInSession {
    pub access_token: String,
    pub user: AuthUser,
    /// Token expiry as reported by the auth endpoint, verbatim.
    #[serde(default)]
    pub expired_at: Option<String>,
    /// Unix seconds when the token was validated.
    pub signed_in_at: i64,
}

/// Validate `token` against the configured auth endpoint.
///
/// # Errors
///
/// `Unauthorized` for an empty or rejected token, `Config` when no auth URL
/// is configured, `Http` on transport failure.
pub async fn sign_in(client: &BackendClient, token: &str) -> Result<SignedInSession> {
    let token = token.trim();
    if token.is_empty() {
        return Err(GysError::Unauthorized("Access token is empty".into()));
    }
    let auth_url = client
        .auth_url()
        .ok_or_else(|| GysError::Config("No auth_url configured (set GYS_AUTH_URL)".into()))?;

    let resp = client
        .http()
        .post(auth_url)
        .json(&serde_json::json!({ "access_token": token }))
        .send()
        .await?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        warn!(status = status.as_u16(), "Access token rejected");
        return Err(GysError::Unauthorized(format!(
            "Auth endpoint returned HTTP {}: {}",
            status.as_u16(),
            body
        )));
    }

    let body = resp.text().await?;
    let parsed: AuthResponse = serde_json::from_str(&body)?;
    let user = AuthUser::from(parsed.data.user);
    info!(user_id = %user.id, "Signed in");

    Ok(SignedInSession {
        access_token: token.to_string(),
        user,
        expired_at: parsed.expired_at,
        signed_in_at: chrono::Utc::now().timestamp(),
    })
}
