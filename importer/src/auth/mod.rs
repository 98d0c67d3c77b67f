//! Client-credentials authentication.
//!
//! - [`TokenFetcher`] - performs one token request (HTTP in production, fakes in tests)
//! - [`ClientCredentialsClient`] - the reqwest implementation
//! - [`TokenManager`] - caches the token and serialises refreshes

mod client;
mod token_manager;

pub use client::ClientCredentialsClient;
pub use token_manager::{
    AccessToken, TokenManager, TokenState, DEFAULT_REFRESH_MARGIN_SECS, DEFAULT_TOKEN_TIMEOUT,
};

use async_trait::async_trait;

use crate::api::TokenResponse;
use crate::error::AuthResult;

/// Exchanges client credentials for a token.
///
/// Implementations perform exactly one request per call and never retry.
#[async_trait]
pub trait TokenFetcher: Send + Sync {
    async fn request_token(&self) -> AuthResult<TokenResponse>;
}
