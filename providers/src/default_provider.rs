//! Provider construction from configuration.
//!
//! The proxy selects its identity provider by name; this module maps that
//! name to an implementation.

use crate::config::{OidcOptions, ProviderConfig, ProviderData};
use crate::nis::NisProvider;
use crate::oidc::OidcProvider;
use crate::types::Provider;
use anyhow::bail;
use log::info;
use std::sync::Arc;

/// Builds the provider registered under `kind` ("oidc" or "nis", case-insensitive).
pub fn new_provider(
    kind: &str,
    data: ProviderData,
    options: OidcOptions,
) -> anyhow::Result<Arc<dyn Provider>> {
    let provider: Arc<dyn Provider> = match kind.to_ascii_lowercase().as_str() {
        "oidc" => Arc::new(OidcProvider::new(data, options)),
        "nis" => Arc::new(NisProvider::new(data, options)),
        other => bail!("unknown provider type '{other}'"),
    };
    info!(
        "identity provider: {} (client_id={})",
        provider.data().provider_name,
        provider.data().client_id
    );
    Ok(provider)
}

/// Builds the provider described by a parsed configuration.
pub fn from_config(config: ProviderConfig) -> anyhow::Result<Arc<dyn Provider>> {
    new_provider(&config.provider, config.data, config.oidc)
}

/// Builds the provider described by `AUTHPROXY_PROVIDER_CONFIG`.
///
/// # Example
///
/// ```rust,no_run
/// use authproxy_providers::default_provider::provider_from_env;
///
/// # fn example() -> anyhow::Result<()> {
/// let provider = provider_from_env()?;
/// println!("using {}", provider.data().provider_name);
/// # Ok(())
/// # }
/// ```
pub fn provider_from_env() -> anyhow::Result<Arc<dyn Provider>> {
    from_config(ProviderConfig::from_env()?)
}
