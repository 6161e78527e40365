use anyhow::{Result, anyhow};
use base64::Engine;
use moka::future::Cache;
use openidconnect::core::{CoreJsonWebKey, CoreJsonWebKeySet, CoreProviderMetadata};
use openidconnect::{IssuerUrl, JsonWebKey};
use rsa::pkcs1::EncodeRsaPublicKey;
use rsa::{BigUint, RsaPublicKey};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use url::Url;

/// Shortest delay between two refetches forced by an unknown `kid`
pub const MIN_FORCED_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Where the signing keys of an issuer are published
#[derive(Debug, Clone)]
pub enum JwksSource {
    /// JWKS endpoint configured explicitly
    Url(Url),
    /// JWKS endpoint found through OIDC discovery on the issuer
    Discover(IssuerUrl),
}

async fn fetch_jwks(
    http_client: &reqwest::Client,
    source: &JwksSource,
) -> Result<CoreJsonWebKeySet> {
    let jwks_url = match source {
        JwksSource::Url(url) => url.clone(),
        JwksSource::Discover(issuer_url) => {
            let metadata = CoreProviderMetadata::discover_async(issuer_url.clone(), http_client)
                .await
                .map_err(|e| {
                    anyhow!(
                        "Failed to discover OIDC metadata from {}: {e:?}",
                        issuer_url
                    )
                })?;
            metadata.jwks_uri().url().clone()
        }
    };

    http_client
        .get(jwks_url.as_str())
        .send()
        .await
        .map_err(|e| anyhow!("Failed to fetch JWKS from {jwks_url}: {e:?}"))?
        .error_for_status()
        .map_err(|e| anyhow!("Failed to fetch JWKS from {jwks_url}: {e:?}"))?
        .json()
        .await
        .map_err(|e| anyhow!("Failed to parse JWKS: {e:?}"))
}

/// JWKS cache for an OIDC issuer
///
/// Keys expire after the configured TTL. A `kid` missing from the cached set
/// forces a refetch so that rotated keys are picked up before the TTL. Forced
/// refetches happen at most once per [`MIN_FORCED_REFRESH_INTERVAL`]; other
/// unknown `kid`s are rejected from the cached set.
pub struct JwksCache {
    source: JwksSource,
    http_client: reqwest::Client,
    cache: Cache<String, Arc<CoreJsonWebKeySet>>,
    last_forced_refresh: Mutex<Option<Instant>>,
}

impl JwksCache {
    pub fn new(source: JwksSource, http_client: reqwest::Client, ttl: Duration) -> Self {
        let cache = Cache::builder().time_to_live(ttl).build();
        Self {
            source,
            http_client,
            cache,
            last_forced_refresh: Mutex::new(None),
        }
    }

    /// Claim the right to force a refetch, if the last one is old enough
    fn try_begin_forced_refresh(&self) -> bool {
        let Ok(mut last) = self.last_forced_refresh.lock() else {
            return false;
        };
        let now = Instant::now();
        if last.is_some_and(|at| now.duration_since(at) < MIN_FORCED_REFRESH_INTERVAL) {
            return false;
        }
        *last = Some(now);
        true
    }

    async fn get(&self) -> Result<Arc<CoreJsonWebKeySet>> {
        let source = self.source.clone();
        let http_client = self.http_client.clone();
        self.cache
            .try_get_with("jwks".to_string(), async move {
                fetch_jwks(&http_client, &source).await.map(Arc::new)
            })
            .await
            .map_err(|e| anyhow!("Failed to fetch JWKS: {e:?}"))
    }

    fn find(jwks: &CoreJsonWebKeySet, kid: &str) -> Option<CoreJsonWebKey> {
        jwks.keys()
            .iter()
            .find(|k| k.key_id().map(|id| id.as_str()) == Some(kid))
            .cloned()
    }

    /// Decoding key for the given key id
    pub async fn decoding_key(&self, kid: &str) -> Result<jsonwebtoken::DecodingKey> {
        let jwks = self.get().await?;
        let key = match Self::find(&jwks, kid) {
            Some(key) => key,
            None if self.try_begin_forced_refresh() => {
                self.cache.invalidate("jwks").await;
                let jwks = self.get().await?;
                Self::find(&jwks, kid)
                    .ok_or_else(|| anyhow!("Key with kid '{kid}' not found in JWKS"))?
            }
            None => return Err(anyhow!("Key with kid '{kid}' not found in JWKS")),
        };
        jwk_to_decoding_key(&key)
    }
}

/// Convert an RSA JWK to a DecodingKey for jsonwebtoken
pub fn jwk_to_decoding_key(jwk: &CoreJsonWebKey) -> Result<jsonwebtoken::DecodingKey> {
    let jwk_json =
        serde_json::to_value(jwk).map_err(|e| anyhow!("Failed to serialize JWK: {e:?}"))?;

    let n = jwk_json
        .get("n")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("JWK missing 'n' parameter"))?;
    let e = jwk_json
        .get("e")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("JWK missing 'e' parameter"))?;

    let n_bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(n.as_bytes())
        .map_err(|e| anyhow!("Failed to decode 'n': {e:?}"))?;
    let e_bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(e.as_bytes())
        .map_err(|e| anyhow!("Failed to decode 'e': {e:?}"))?;

    let public_key = RsaPublicKey::new(
        BigUint::from_bytes_be(&n_bytes),
        BigUint::from_bytes_be(&e_bytes),
    )
    .map_err(|e| anyhow!("Failed to create RSA public key: {e:?}"))?;

    let pem = public_key
        .to_pkcs1_pem(rsa::pkcs1::LineEnding::LF)
        .map_err(|e| anyhow!("Failed to encode public key as PEM: {e:?}"))?;

    jsonwebtoken::DecodingKey::from_rsa_pem(pem.as_bytes())
        .map_err(|e| anyhow!("Failed to create decoding key: {e:?}"))
}
