#![allow(dead_code)]

use authproxy_providers::config::ProviderData;
use base64::Engine;
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rsa::RsaPrivateKey;
use rsa::pkcs1::{EncodeRsaPrivateKey, EncodeRsaPublicKey};
use rsa::traits::PublicKeyParts;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TEST_CLIENT_ID: &str = "authproxy";
pub const TEST_CLIENT_SECRET: &str = "authproxy-secret";
pub const TEST_KID: &str = "test-key-1";

/// Test ID token claims
#[derive(Debug, Serialize, Deserialize)]
pub struct TestClaims {
    /// Subject (user ID)
    pub sub: String,
    /// Issuer
    pub iss: String,
    /// Audience
    pub aud: String,
    /// Email
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Groups
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<String>>,
    /// Expiration time (seconds since Unix epoch)
    pub exp: i64,
    /// Issued at (seconds since Unix epoch)
    pub iat: i64,
}

/// Test key pair for signing/verifying tokens
pub struct TestKeyPair {
    pub encoding_key: EncodingKey,
    pub decoding_key: DecodingKey,
    pub public_key_pem: String,
    /// Public key as an RSA JWK
    pub jwk: Value,
}

impl TestKeyPair {
    /// Generate a new RSA key pair for testing
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let private_key =
            RsaPrivateKey::new(&mut rng, 2048).expect("failed to generate RSA private key");
        let public_key = private_key.to_public_key();

        let private_pem = private_key
            .to_pkcs1_pem(rsa::pkcs1::LineEnding::LF)
            .expect("failed to encode private key as PEM");
        let public_pem = public_key
            .to_pkcs1_pem(rsa::pkcs1::LineEnding::LF)
            .expect("failed to encode public key as PEM");

        let encoding_key = EncodingKey::from_rsa_pem(private_pem.as_bytes())
            .expect("failed to create encoding key");
        let decoding_key = DecodingKey::from_rsa_pem(public_pem.as_bytes())
            .expect("failed to create decoding key");

        let b64 = base64::engine::general_purpose::URL_SAFE_NO_PAD;
        let jwk = json!({
            "kty": "RSA",
            "use": "sig",
            "alg": "RS256",
            "kid": TEST_KID,
            "n": b64.encode(public_key.n().to_bytes_be()),
            "e": b64.encode(public_key.e().to_bytes_be()),
        });

        Self {
            encoding_key,
            decoding_key,
            public_key_pem: public_pem.to_string(),
            jwk,
        }
    }

    /// JSON Web Key Set publishing this key
    pub fn jwks(&self) -> Value {
        json!({ "keys": [self.jwk] })
    }

    /// Create a signed ID token with the given claims
    pub fn create_token(&self, claims: TestClaims) -> String {
        self.create_token_with_kid(claims, TEST_KID)
    }

    /// Create a signed ID token whose header names the given key id
    pub fn create_token_with_kid(&self, claims: TestClaims, kid: &str) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(kid.to_string());
        encode(&header, &claims, &self.encoding_key).expect("failed to encode token")
    }

    /// Verify a token and extract claims
    pub fn verify_token(&self, token: &str) -> Result<TestClaims, jsonwebtoken::errors::Error> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = true;
        validation.validate_aud = false;

        let token_data = decode::<TestClaims>(token, &self.decoding_key, &validation)?;
        Ok(token_data.claims)
    }
}

pub fn claims_expiring_in(
    issuer: &str,
    audience: &str,
    subject: &str,
    email: Option<&str>,
    expires_in: Duration,
) -> TestClaims {
    let now = Utc::now();
    TestClaims {
        sub: subject.to_string(),
        iss: issuer.to_string(),
        aud: audience.to_string(),
        email: email.map(String::from),
        groups: None,
        exp: (now + expires_in).timestamp(),
        iat: now.timestamp(),
    }
}

/// Create a valid ID token
pub fn create_valid_token(
    keypair: &TestKeyPair,
    issuer: &str,
    audience: &str,
    subject: &str,
    email: Option<&str>,
) -> String {
    keypair.create_token(claims_expiring_in(
        issuer,
        audience,
        subject,
        email,
        Duration::hours(1),
    ))
}

/// Create a valid ID token carrying a groups claim
pub fn create_token_with_groups(
    keypair: &TestKeyPair,
    issuer: &str,
    subject: &str,
    groups: &[&str],
) -> String {
    let mut claims = claims_expiring_in(
        issuer,
        TEST_CLIENT_ID,
        subject,
        None,
        Duration::hours(1),
    );
    claims.groups = Some(groups.iter().map(|g| g.to_string()).collect());
    keypair.create_token(claims)
}

/// Create an ID token that expired an hour ago
pub fn create_expired_token(
    keypair: &TestKeyPair,
    issuer: &str,
    audience: &str,
    subject: &str,
) -> String {
    keypair.create_token(claims_expiring_in(
        issuer,
        audience,
        subject,
        None,
        Duration::hours(-1),
    ))
}

/// Create a valid ID token for another audience
pub fn create_wrong_audience_token(
    keypair: &TestKeyPair,
    issuer: &str,
    audience: &str,
    subject: &str,
) -> String {
    create_valid_token(
        keypair,
        issuer,
        &format!("wrong-{audience}"),
        subject,
        None,
    )
}

/// Serve the key pair's JWKS at `/jwks`
pub async fn mount_jwks(server: &MockServer, keypair: &TestKeyPair) {
    Mock::given(method("GET"))
        .and(path("/jwks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(keypair.jwks()))
        .mount(server)
        .await;
}

/// Provider configuration pointing every endpoint at the mock server
pub fn provider_data(server: &MockServer) -> ProviderData {
    let endpoint = |p: &str| -> Option<Url> {
        Some(Url::parse(&format!("{}{p}", server.uri())).expect("valid URL"))
    };
    ProviderData {
        client_id: TEST_CLIENT_ID.to_string(),
        client_secret: TEST_CLIENT_SECRET.to_string(),
        issuer_url: Some(server.uri()),
        login_url: endpoint("/authorize"),
        redeem_url: endpoint("/token"),
        profile_url: endpoint("/userinfo"),
        jwks_url: endpoint("/jwks"),
        ..Default::default()
    }
}
