use crate::config::ProviderData;
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Authenticated user's identity as tracked by the proxy
///
/// Owned by the host session layer. Providers fill it in on redeem and
/// update it on enrichment and refresh; persistence is not their concern.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionState {
    /// Access token issued by the identity provider
    pub access_token: String,
    /// Raw ID token (JWT), if the provider returned one
    pub id_token: String,
    /// Refresh token, if the provider returned one
    pub refresh_token: String,
    /// When the session was created or last refreshed
    pub created_at: Option<DateTime<Utc>>,
    /// When the access token expires
    pub expires_on: Option<DateTime<Utc>>,
    /// Email address
    pub email: String,
    /// User identifier or display name
    pub user: String,
    /// Group or role memberships
    pub groups: Vec<String>,
    /// Preferred username claim, if any
    pub preferred_username: String,
}

impl SessionState {
    /// Returns true once `expires_on` is in the past
    pub fn is_expired(&self) -> bool {
        self.expires_on
            .map(|expires_on| expires_on < Utc::now())
            .unwrap_or(false)
    }

    /// Time elapsed since the session was created
    pub fn age(&self) -> Option<Duration> {
        self.created_at.map(|created_at| Utc::now() - created_at)
    }
}

/// Capability set of an identity provider, as driven by the proxy pipeline
///
/// Per login the host calls `login_url`, `redeem` and `enrich_session` in
/// order, then `validate_session` / `refresh_session` for the lifetime of the
/// session. Bearer-token requests use `create_session_from_token` instead.
///
/// Dropping a returned future cancels the outbound calls it was making.
#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    /// Static provider configuration
    fn data(&self) -> &ProviderData;

    /// Build the URL the user agent is redirected to for login
    ///
    /// Returns an empty string when the provider has no login endpoint
    /// configured. Hosts must treat an empty URL as a configuration error
    /// and refuse to redirect.
    fn login_url(
        &self,
        redirect_uri: &str,
        state: &str,
        nonce: &str,
        extra_params: &[(String, String)],
    ) -> String;

    /// Exchange an authorization code for a new session
    async fn redeem(
        &self,
        redirect_url: &str,
        code: &str,
        code_verifier: &str,
    ) -> Result<SessionState>;

    /// Fill in user attributes after the session was redeemed
    async fn enrich_session(&self, session: &mut SessionState) -> Result<()>;

    /// Check whether the session is still valid
    async fn validate_session(&self, session: &SessionState) -> bool;

    /// Refresh the session tokens; `Ok(false)` means there was nothing to refresh
    async fn refresh_session(&self, session: &mut SessionState) -> Result<bool>;

    /// Build a session from a bearer token presented on a request
    async fn create_session_from_token(&self, token: &str) -> Result<SessionState>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_without_expiry_never_expires() {
        let session = SessionState::default();
        assert!(!session.is_expired());
        assert!(session.age().is_none());
    }

    #[test]
    fn test_session_expiry() {
        let session = SessionState {
            expires_on: Some(Utc::now() - Duration::minutes(1)),
            created_at: Some(Utc::now() - Duration::hours(1)),
            ..Default::default()
        };
        assert!(session.is_expired());
        assert!(session.age().expect("created_at is set") >= Duration::hours(1));
    }
}
