//! Errors raised by the providers themselves
//!
//! Failures coming from a base provider are forwarded as they are; only the
//! steps a provider adds on top are reported with these types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    /// Profile endpoint could not be reached, answered with an error status,
    /// or returned a payload that does not decode
    #[error("failed to retrieve user info")]
    UserInfoFetch(#[source] anyhow::Error),

    /// Base provider could not turn a bearer token into a session
    #[error("could not create session from token")]
    SessionCreation(#[source] anyhow::Error),
}
