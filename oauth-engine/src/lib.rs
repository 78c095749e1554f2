//! # OAuth Engine
//!
//! An authorization-code + PKCE token lifecycle engine: client registration,
//! authorization code issuance, code-for-token exchange, refresh token
//! rotation, revocation and introspection.
//!
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::new_without_default)]
//! ## Quick Start
//!
//! ```rust,ignore
//! use oauth_engine::{AuthorizeRequest, Client, OAuthConfig, OAuthServer, TokenRequest};
//!
//! let server = OAuthServer::in_memory(OAuthConfig::default())?;
//!
//! server.registry.register(&Client::new(
//!     "cid12345",
//!     "secretpass",
//!     vec!["https://cb/x".to_string()],
//!     vec!["read".to_string(), "write".to_string()],
//! )).await?;
//!
//! // GET /authorize
//! let request = AuthorizeRequest::from_query(
//!     "client_id=cid12345&redirect_uri=https://cb/x&response_type=code&scope=read&state=abcdef",
//! )?;
//! let redirect = server.authorization.authorize(&request).await?;
//! println!("302 Location: {}", redirect.location());
//!
//! // POST /token
//! let body = format!(
//!     "grant_type=authorization_code&code={}&redirect_uri=https://cb/x\
//!      &client_id=cid12345&client_secret=secretpass",
//!     redirect.code
//! );
//! let tokens = server.token.token(&TokenRequest::from_form(&body)?).await?;
//! println!("{}", serde_json::to_string(&tokens)?);
//! ```
//!
//! ## Core Features
//!
//! - **Single-use codes**: exchanges take the code atomically, a replay is `invalid_grant`
//! - **PKCE**: `S256` and `plain`, constant-time comparison
//! - **Refresh rotation**: the old refresh token is removed as the new pair is stored
//! - **Client binding**: codes and tokens are never honored for another client
//! - **Pluggable storage**: [`OAuthStorage`] trait with an in-memory backend
//!
//! ## Rendering errors
//!
//! Engine errors are values. [`AuthorizeError::location`] gives the error
//! redirect for `/authorize` failures after the redirect URI is trusted;
//! everything else maps to a JSON body through [`OAuthError::to_response`]
//! and [`OAuthError::status_code`].

pub mod config;
pub mod oauth;

pub use config::{ConfigError, OAuthConfig};
pub use oauth::{
    AccessToken, AuthorizationCode, AuthorizationEngine, AuthorizeError, AuthorizeRedirect,
    AuthorizeRequest, Client, ClientCredentials, ClientRegistry, ErrorResponse,
    InMemoryOAuthStorage, IntrospectionResponse, OAuthError, OAuthServer, OAuthStorage,
    PkceMethod, PkceVerifier, RefreshToken, RevocationRequest, StorageError, TokenEngine,
    TokenRequest, TokenResponse,
};

/// Create an in-memory server with default configuration
pub fn create_in_memory_server() -> Result<OAuthServer, ConfigError> {
    OAuthServer::in_memory(OAuthConfig::default())
}
