use anyhow::{Result, anyhow};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

const DEFAULT_JWKS_REFRESH_INTERVAL_SECS: u64 = 3600;
const DEFAULT_EMAIL_CLAIM: &str = "email";
const DEFAULT_GROUPS_CLAIM: &str = "groups";
const DEFAULT_USER_ID_CLAIM: &str = "sub";

/// Environment variable holding the JSON provider configuration
pub const PROVIDER_CONFIG_ENV: &str = "AUTHPROXY_PROVIDER_CONFIG";

/// Static identity provider metadata
///
/// Fixed when a provider is constructed and read-only afterwards.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProviderData {
    /// Display name of the provider
    pub provider_name: String,
    /// OAuth client id
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: String,
    /// Space separated scopes requested at login
    pub scope: String,
    /// Authorization endpoint
    pub login_url: Option<Url>,
    /// Token endpoint
    pub redeem_url: Option<Url>,
    /// User info / profile endpoint
    pub profile_url: Option<Url>,
    /// Endpoint used to check that an access token is still accepted
    pub validate_url: Option<Url>,
    /// Issuer of the ID tokens, compared verbatim with the `iss` claim
    /// (e.g., <https://idp.example.com>)
    pub issuer_url: Option<String>,
    /// JSON Web Key Set endpoint; discovered from `issuer_url` when absent
    pub jwks_url: Option<Url>,
    /// Per-request deadline for outbound HTTP calls, in seconds
    pub http_timeout_secs: Option<u64>,
}

impl std::fmt::Debug for ProviderData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderData")
            .field("provider_name", &self.provider_name)
            .field("client_id", &self.client_id)
            .field("client_secret", &"(not printed)")
            .field("scope", &self.scope)
            .field("login_url", &self.login_url.as_ref().map(Url::as_str))
            .field("redeem_url", &self.redeem_url.as_ref().map(Url::as_str))
            .field("profile_url", &self.profile_url.as_ref().map(Url::as_str))
            .field("validate_url", &self.validate_url.as_ref().map(Url::as_str))
            .field("issuer_url", &self.issuer_url)
            .field("jwks_url", &self.jwks_url.as_ref().map(Url::as_str))
            .field("http_timeout_secs", &self.http_timeout_secs)
            .finish()
    }
}

impl ProviderData {
    /// Fill in the name and scope a provider falls back to when the
    /// configuration leaves them empty
    pub fn set_provider_defaults(&mut self, name: &str, scope: &str) {
        if self.provider_name.is_empty() {
            self.provider_name = name.to_string();
        }
        if self.scope.is_empty() {
            self.scope = scope.to_string();
        }
    }

    /// Deadline applied to each outbound request, if configured
    pub fn http_timeout(&self) -> Option<Duration> {
        self.http_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

/// Options specific to OpenID Connect providers
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OidcOptions {
    /// Do not send a nonce with the login request
    pub skip_nonce: bool,
    /// Claim holding the user's email (default: "email")
    pub email_claim: String,
    /// Claim holding the user's groups (default: "groups")
    pub groups_claim: String,
    /// Claim holding the user id (default: "sub")
    pub user_id_claim: String,
    /// Audiences accepted besides the client id
    pub extra_audiences: Vec<String>,
    /// JWKS refresh interval in seconds (default: 3600 = 1 hour)
    pub jwks_refresh_interval_secs: u64,
}

impl Default for OidcOptions {
    fn default() -> Self {
        Self {
            skip_nonce: false,
            email_claim: DEFAULT_EMAIL_CLAIM.to_string(),
            groups_claim: DEFAULT_GROUPS_CLAIM.to_string(),
            user_id_claim: DEFAULT_USER_ID_CLAIM.to_string(),
            extra_audiences: Vec::new(),
            jwks_refresh_interval_secs: DEFAULT_JWKS_REFRESH_INTERVAL_SECS,
        }
    }
}

/// Complete provider configuration: which provider to build, and with what
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Provider kind, e.g. "oidc" or "nis"
    pub provider: String,
    /// Provider metadata
    pub data: ProviderData,
    /// OIDC options
    pub oidc: OidcOptions,
}

impl ProviderConfig {
    /// Parse a provider configuration from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| anyhow!("Failed to parse provider configuration: {e:?}"))
    }

    /// Load the provider configuration from `AUTHPROXY_PROVIDER_CONFIG`
    pub fn from_env() -> Result<Self> {
        let json = std::env::var(PROVIDER_CONFIG_ENV)
            .map_err(|_| anyhow!("{PROVIDER_CONFIG_ENV} environment variable not set"))?;
        Self::from_json(&json)
    }
}
