//! Identity providers for the authenticating proxy
//!
//! A provider drives one identity backend through the proxy's login
//! pipeline: building the login URL, redeeming the authorization code,
//! enriching, validating and refreshing the resulting session.
//!
//! - **OIDC**: generic OpenID Connect provider with JWKS caching
//! - **NIS**: NGIC NIS, an OIDC provider whose user attributes come from the
//!   NIS profile endpoint
//!
//! # Example: NIS provider
//!
//! ```rust,no_run
//! use authproxy_providers::config::{OidcOptions, ProviderData};
//! use authproxy_providers::nis::NisProvider;
//! use authproxy_providers::types::Provider;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let data = ProviderData {
//!     client_id: "proxy".to_string(),
//!     client_secret: "secret".to_string(),
//!     issuer_url: Some("https://nis.example.com".to_string()),
//!     login_url: Some("https://nis.example.com/authorize".parse()?),
//!     redeem_url: Some("https://nis.example.com/token".parse()?),
//!     profile_url: Some("https://nis.example.com/userinfo".parse()?),
//!     ..Default::default()
//! };
//! let provider = NisProvider::new(data, OidcOptions::default());
//!
//! let mut session = provider
//!     .redeem("https://proxy.example.com/oauth2/callback", "code", "")
//!     .await?;
//! provider.enrich_session(&mut session).await?;
//! println!("logged in: {} {:?}", session.user, session.groups);
//! # Ok(())
//! # }
//! ```

/// Session model and provider trait
pub mod types;

/// Provider configuration
pub mod config;

/// Errors added by providers on top of their base provider
pub mod errors;

/// Non-destructive merge of user attributes
pub mod merge;

/// Authenticated JSON requests
pub mod requests;

/// JWKS fetching and caching
pub mod jwks;

/// Generic OpenID Connect provider
pub mod oidc;

/// NGIC NIS provider
pub mod nis;

/// Provider construction from configuration
pub mod default_provider;
