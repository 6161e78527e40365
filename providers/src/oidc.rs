use crate::config::{OidcOptions, ProviderData};
use crate::jwks::{JwksCache, JwksSource};
use crate::merge::merge_non_blank;
use crate::requests;
use crate::types::{Provider, SessionState};
use anyhow::{Result, anyhow};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, Validation, decode, decode_header};
use openidconnect::IssuerUrl;
use serde::Deserialize;
use serde_json::{Map, Value};

const OIDC_PROVIDER_NAME: &str = "OpenID Connect";
const OIDC_DEFAULT_SCOPE: &str = "openid email profile";

type Claims = Map<String, Value>;

/// Token endpoint response (RFC 6749 section 5.1)
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

fn claim_string(claims: &Claims, name: &str) -> String {
    claims
        .get(name)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Groups may be published as an array of strings or as a single string
fn claim_strings(claims: &Claims, name: &str) -> Vec<String> {
    match claims.get(name) {
        Some(Value::Array(values)) => values
            .iter()
            .filter_map(Value::as_str)
            .map(String::from)
            .collect(),
        Some(Value::String(value)) if !value.is_empty() => vec![value.clone()],
        _ => Vec::new(),
    }
}

fn audience_contains(claims: &Claims, accepted: &[&str]) -> bool {
    match claims.get("aud") {
        Some(Value::String(aud)) => accepted.contains(&aud.as_str()),
        Some(Value::Array(auds)) => auds
            .iter()
            .filter_map(Value::as_str)
            .any(|aud| accepted.contains(&aud)),
        _ => false,
    }
}

fn claim_expiry(claims: &Claims) -> Option<DateTime<Utc>> {
    claims
        .get("exp")
        .and_then(Value::as_i64)
        .and_then(|exp| DateTime::from_timestamp(exp, 0))
}

/// Generic OpenID Connect provider
///
/// Redeems authorization codes at the token endpoint and builds sessions from
/// RS256 ID tokens verified against the issuer's cached JWKS. Specialized
/// providers wrap it and override individual steps.
pub struct OidcProvider {
    data: ProviderData,
    options: OidcOptions,
    http_client: reqwest::Client,
    jwks: Option<JwksCache>,
}

impl std::fmt::Debug for OidcProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OidcProvider")
            .field("data", &self.data)
            .field("options", &self.options)
            .finish()
    }
}

impl OidcProvider {
    /// Create a new OIDC provider
    ///
    /// Never fails: a missing or unusable key source surfaces as an error
    /// from the operations that verify tokens.
    pub fn new(mut data: ProviderData, options: OidcOptions) -> Self {
        data.set_provider_defaults(OIDC_PROVIDER_NAME, OIDC_DEFAULT_SCOPE);

        // no redirects: token and key endpoints are configured, not followed
        let http_client = match reqwest::ClientBuilder::new()
            .redirect(reqwest::redirect::Policy::none())
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                log::warn!(
                    "{}: failed to build HTTP client, falling back to defaults (redirects followed): {e}",
                    data.provider_name
                );
                reqwest::Client::default()
            }
        };

        let source = match (&data.jwks_url, &data.issuer_url) {
            (Some(jwks_url), _) => Some(JwksSource::Url(jwks_url.clone())),
            (None, Some(issuer)) => match IssuerUrl::new(issuer.clone()) {
                Ok(issuer_url) => Some(JwksSource::Discover(issuer_url)),
                Err(e) => {
                    log::warn!("invalid issuer URL '{issuer}': {e}");
                    None
                }
            },
            (None, None) => None,
        };
        let jwks_ttl = std::time::Duration::from_secs(options.jwks_refresh_interval_secs);
        let jwks = source.map(|source| JwksCache::new(source, http_client.clone(), jwks_ttl));

        Self {
            data,
            options,
            http_client,
            jwks,
        }
    }

    /// Verify an ID token and return its claims
    ///
    /// Checks the RS256 signature with the key named by the `kid` header,
    /// the issuer (when configured), the audience and the expiration.
    async fn verify_id_token(&self, token: &str) -> Result<Claims> {
        let header = decode_header(token).map_err(|e| anyhow!("Invalid JWT header: {e:?}"))?;
        let kid = header
            .kid
            .ok_or_else(|| anyhow!("JWT missing kid (key ID) in header"))?;

        let jwks = self
            .jwks
            .as_ref()
            .ok_or_else(|| anyhow!("neither jwks_url nor issuer_url is configured"))?;
        let decoding_key = jwks.decoding_key(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        // audience may be a string or an array, checked below
        validation.validate_aud = false;
        if let Some(issuer) = &self.data.issuer_url {
            validation.set_issuer(&[issuer]);
        }

        let claims = decode::<Claims>(token, &decoding_key, &validation)
            .map_err(|e| anyhow!("Token validation failed: {e:?}"))?
            .claims;

        let accepted: Vec<&str> = std::iter::once(self.data.client_id.as_str())
            .chain(self.options.extra_audiences.iter().map(String::as_str))
            .collect();
        if !audience_contains(&claims, &accepted) {
            return Err(anyhow!("Invalid audience"));
        }

        Ok(claims)
    }

    /// Copy identity claims into the session, leaving absent ones untouched
    fn apply_claims(&self, claims: &Claims, session: &mut SessionState) {
        merge_non_blank(
            &mut session.email,
            claim_string(claims, &self.options.email_claim),
        );
        let user = claim_string(claims, &self.options.user_id_claim);
        if !merge_non_blank(&mut session.user, user) {
            merge_non_blank(&mut session.user, claim_string(claims, "sub"));
        }
        merge_non_blank(
            &mut session.groups,
            claim_strings(claims, &self.options.groups_claim),
        );
        merge_non_blank(
            &mut session.preferred_username,
            claim_string(claims, "preferred_username"),
        );
    }

    async fn post_token(&self, params: &[(&str, &str)]) -> Result<TokenResponse> {
        let redeem_url = self
            .data
            .redeem_url
            .as_ref()
            .ok_or_else(|| anyhow!("redeem URL is not configured"))?;

        let mut request = self.http_client.post(redeem_url.as_str()).form(params);
        if let Some(timeout) = self.data.http_timeout() {
            request = request.timeout(timeout);
        }
        let response = request
            .send()
            .await
            .map_err(|e| anyhow!("token request to {redeem_url} failed: {e}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            return Err(anyhow!(
                "token request failed with status {status}: {}",
                requests::body_excerpt(&body)
            ));
        }

        response
            .json()
            .await
            .map_err(|e| anyhow!("failed to parse token response: {e}"))
    }

    fn token_expiry(now: DateTime<Utc>, expires_in: Option<i64>) -> Option<DateTime<Utc>> {
        expires_in.map(|secs| now + Duration::seconds(secs))
    }
}

#[async_trait::async_trait]
impl Provider for OidcProvider {
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
        let Some(login_url) = &self.data.login_url else {
            log::warn!("{}: login URL is not configured", self.data.provider_name);
            return String::new();
        };

        let mut url = login_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &self.data.client_id)
                .append_pair("redirect_uri", redirect_uri)
                .append_pair("scope", &self.data.scope)
                .append_pair("state", state);
            if !self.options.skip_nonce && !nonce.is_empty() {
                query.append_pair("nonce", nonce);
            }
            for (key, value) in extra_params {
                query.append_pair(key, value);
            }
        }
        url.to_string()
    }

    async fn redeem(
        &self,
        redirect_url: &str,
        code: &str,
        code_verifier: &str,
    ) -> Result<SessionState> {
        let mut params = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_url),
            ("client_id", self.data.client_id.as_str()),
            ("client_secret", self.data.client_secret.as_str()),
        ];
        if !code_verifier.is_empty() {
            params.push(("code_verifier", code_verifier));
        }

        let now = Utc::now();
        let tokens = self.post_token(&params).await?;
        let id_token = tokens
            .id_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| anyhow!("token response did not contain an id_token"))?;
        let claims = self.verify_id_token(&id_token).await?;

        let mut session = SessionState {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token.unwrap_or_default(),
            created_at: Some(now),
            expires_on: Self::token_expiry(now, tokens.expires_in)
                .or_else(|| claim_expiry(&claims)),
            ..Default::default()
        };
        self.apply_claims(&claims, &mut session);
        session.id_token = id_token;
        Ok(session)
    }

    async fn enrich_session(&self, session: &mut SessionState) -> Result<()> {
        let Some(profile_url) = &self.data.profile_url else {
            if session.email.is_empty() {
                return Err(anyhow!(
                    "id_token did not contain an email and profile URL is not defined"
                ));
            }
            return Ok(());
        };

        let profile: Claims = requests::get_json(
            &self.http_client,
            profile_url,
            &session.access_token,
            self.data.http_timeout(),
        )
        .await?;

        if session.email.is_empty() {
            merge_non_blank(
                &mut session.email,
                claim_string(&profile, &self.options.email_claim),
            );
        }
        merge_non_blank(
            &mut session.groups,
            claim_strings(&profile, &self.options.groups_claim),
        );
        Ok(())
    }

    async fn validate_session(&self, session: &SessionState) -> bool {
        if let Err(e) = self.verify_id_token(&session.id_token).await {
            log::warn!("id_token verification failed: {e}");
            return false;
        }
        match &self.data.validate_url {
            Some(validate_url) => {
                requests::check_status(
                    &self.http_client,
                    validate_url,
                    &session.access_token,
                    self.data.http_timeout(),
                )
                .await
            }
            None => true,
        }
    }

    async fn refresh_session(&self, session: &mut SessionState) -> Result<bool> {
        if session.refresh_token.is_empty() {
            return Ok(false);
        }

        let now = Utc::now();
        let tokens = self
            .post_token(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", session.refresh_token.as_str()),
                ("client_id", self.data.client_id.as_str()),
                ("client_secret", self.data.client_secret.as_str()),
            ])
            .await?;

        let mut expires_on = Self::token_expiry(now, tokens.expires_in);
        if let Some(id_token) = tokens.id_token.filter(|token| !token.is_empty()) {
            let claims = self.verify_id_token(&id_token).await?;
            self.apply_claims(&claims, session);
            expires_on = expires_on.or_else(|| claim_expiry(&claims));
            session.id_token = id_token;
        }
        session.access_token = tokens.access_token;
        merge_non_blank(
            &mut session.refresh_token,
            tokens.refresh_token.unwrap_or_default(),
        );
        session.created_at = Some(now);
        session.expires_on = expires_on;

        log::debug!(
            "{}: refreshed session for {}",
            self.data.provider_name,
            session.email
        );
        Ok(true)
    }

    async fn create_session_from_token(&self, token: &str) -> Result<SessionState> {
        let claims = self.verify_id_token(token).await?;
        let mut session = SessionState {
            access_token: token.to_string(),
            id_token: token.to_string(),
            created_at: Some(Utc::now()),
            expires_on: claim_expiry(&claims),
            ..Default::default()
        };
        self.apply_claims(&claims, &mut session);
        Ok(session)
    }
}
