//! NGIC NIS identity provider
//!
//! NIS speaks plain OpenID Connect for login, token redemption, validation
//! and refresh. User attributes are not taken from the ID token: they come
//! from the NIS profile endpoint, queried with the session's access token
//! right after redemption.

use crate::config::{OidcOptions, ProviderData};
use crate::errors::ProviderError;
use crate::merge::merge_non_blank;
use crate::oidc::OidcProvider;
use crate::requests;
use crate::types::{Provider, SessionState};
use anyhow::{Result, anyhow};
use serde::{Deserialize, Deserializer};
use std::sync::Arc;

/// Display name of the NIS provider
pub const NIS_PROVIDER_NAME: &str = "NGIC NIS";

/// Scopes requested from NIS unless configured otherwise
pub const NIS_DEFAULT_SCOPE: &str = "openid email profile";

/// Decodes `null` like an absent field
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// User info payload returned by the NIS profile endpoint
///
/// Only `name`, `email` and `groups` are mapped into the session. The
/// directory attributes are decoded so they are available to callers
/// inspecting the payload, but nothing consumes them yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NisUserInfo {
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub email: String,
    #[serde(rename = "groups", deserialize_with = "null_as_default")]
    pub roles: Vec<String>,
    #[serde(rename = "employee_num", deserialize_with = "null_as_default")]
    pub employee_number: String,
    #[serde(rename = "SAMAccountName", deserialize_with = "null_as_default")]
    pub sam_account_name: String,
    #[serde(rename = "GivenName", deserialize_with = "null_as_default")]
    pub given_name: String,
    #[serde(rename = "Surname", deserialize_with = "null_as_default")]
    pub surname: String,
    #[serde(deserialize_with = "null_as_default")]
    pub sub: String,
}

/// NIS provider: a generic OIDC provider whose enrichment step reads the
/// NIS profile endpoint
///
/// Every other operation is forwarded to the base provider.
pub struct NisProvider {
    data: ProviderData,
    base: Arc<dyn Provider>,
    http_client: reqwest::Client,
}

impl std::fmt::Debug for NisProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NisProvider")
            .field("data", &self.data)
            .finish()
    }
}

impl NisProvider {
    /// Create a NIS provider on top of a generic OIDC provider built from
    /// the same configuration
    pub fn new(mut data: ProviderData, options: OidcOptions) -> Self {
        data.set_provider_defaults(NIS_PROVIDER_NAME, NIS_DEFAULT_SCOPE);
        let base = Arc::new(OidcProvider::new(data.clone(), options));
        Self::from_parts(data, base)
    }

    /// Decorate an existing base provider
    pub fn with_base(mut data: ProviderData, base: Arc<dyn Provider>) -> Self {
        data.set_provider_defaults(NIS_PROVIDER_NAME, NIS_DEFAULT_SCOPE);
        Self::from_parts(data, base)
    }

    fn from_parts(data: ProviderData, base: Arc<dyn Provider>) -> Self {
        Self {
            data,
            base,
            http_client: reqwest::Client::new(),
        }
    }

    /// Fetch the user info of the session's owner from the profile endpoint
    pub async fn user_info(&self, session: &SessionState) -> Result<NisUserInfo> {
        let profile_url = self
            .data
            .profile_url
            .as_ref()
            .ok_or_else(|| anyhow!("profile URL is not configured"))?;
        requests::get_json(
            &self.http_client,
            profile_url,
            &session.access_token,
            self.data.http_timeout(),
        )
        .await
    }
}

#[async_trait::async_trait]
impl Provider for NisProvider {
    fn data(&self) -> &ProviderData {
        &self.data
    }

    fn login_url(
        &self,
        redirect_uri: &str,
        state: &str,
        nonce: &str,
        extra_params: &[(String, String)],
    ) -> String {
        self.base.login_url(redirect_uri, state, nonce, extra_params)
    }

    async fn redeem(
        &self,
        redirect_url: &str,
        code: &str,
        code_verifier: &str,
    ) -> Result<SessionState> {
        self.base.redeem(redirect_url, code, code_verifier).await
    }

    async fn enrich_session(&self, session: &mut SessionState) -> Result<()> {
        let user_info = self.user_info(session).await.map_err(|e| {
            log::warn!("{}: user info fetch failed: {e}", self.data.provider_name);
            ProviderError::UserInfoFetch(e)
        })?;

        let user_updated = merge_non_blank(&mut session.user, user_info.name);
        let email_updated = merge_non_blank(&mut session.email, user_info.email);
        let groups_updated = merge_non_blank(&mut session.groups, user_info.roles);
        log::debug!(
            "{}: enriched session user={user_updated} email={email_updated} groups={groups_updated}",
            self.data.provider_name
        );
        Ok(())
    }

    async fn validate_session(&self, session: &SessionState) -> bool {
        self.base.validate_session(session).await
    }

    async fn refresh_session(&self, session: &mut SessionState) -> Result<bool> {
        // an error, or nothing to refresh, is the base provider's answer as is
        let refreshed = self.base.refresh_session(session).await?;
        Ok(refreshed)
    }

    async fn create_session_from_token(&self, token: &str) -> Result<SessionState> {
        self.base
            .create_session_from_token(token)
            .await
            .map_err(|e| ProviderError::SessionCreation(e).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_info_ignores_unknown_and_missing_fields() {
        let info: NisUserInfo = serde_json::from_str(
            r#"{"name": "Jane Doe", "groups": ["admin"], "SAMAccountName": "jdoe", "extra": 1}"#,
        )
        .expect("payload should decode");
        assert_eq!(info.name, "Jane Doe");
        assert_eq!(info.email, "");
        assert_eq!(info.roles, vec!["admin"]);
        assert_eq!(info.sam_account_name, "jdoe");
        assert_eq!(info.employee_number, "");
    }

    #[test]
    fn test_user_info_directory_fields() {
        let info: NisUserInfo = serde_json::from_str(
            r#"{"employee_num": "00042", "GivenName": "Jane", "Surname": "Doe", "sub": "abc"}"#,
        )
        .expect("payload should decode");
        assert_eq!(info.employee_number, "00042");
        assert_eq!(info.given_name, "Jane");
        assert_eq!(info.surname, "Doe");
        assert_eq!(info.sub, "abc");
        assert!(info.roles.is_empty());
    }

    #[test]
    fn test_user_info_null_fields() {
        let info: NisUserInfo =
            serde_json::from_str(r#"{"name": null, "email": "jane@x.com", "groups": null}"#)
                .expect("payload should decode");
        assert_eq!(info.name, "");
        assert_eq!(info.email, "jane@x.com");
        assert!(info.roles.is_empty());
    }

    #[test]
    fn test_defaults_keep_explicit_configuration() {
        let data = ProviderData {
            provider_name: "Corporate SSO".to_string(),
            ..Default::default()
        };
        let provider = NisProvider::new(data, OidcOptions::default());
        assert_eq!(provider.data().provider_name, "Corporate SSO");
        assert_eq!(provider.data().scope, NIS_DEFAULT_SCOPE);
    }
}
