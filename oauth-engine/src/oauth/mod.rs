//! OAuth 2.0 Authorization Code Grant with PKCE
//!
//! Token lifecycle engine following:
//! - RFC 6749: The OAuth 2.0 Authorization Framework (authorization code grant)
//! - RFC 7636: Proof Key for Code Exchange (`S256` and `plain`)
//! - RFC 7009: Token Revocation
//! - RFC 7662: Token Introspection
//!
//! HTTP routing and TLS stay with the caller; the engines take parsed
//! requests and return typed responses or errors.

pub mod authorize;
pub mod codes;
pub mod error;
pub mod models;
pub mod pkce;
pub mod random;
pub mod registration;
pub mod request;
pub mod scope;
pub mod storage;
pub mod token;
pub mod tokens;
pub mod user;

pub use authorize::{AuthorizationEngine, AuthorizeError, AuthorizeRedirect};
pub use codes::{AuthorizationCodeStore, CodeGrant};
pub use error::{ErrorResponse, OAuthError, StorageError};
pub use models::{
    AccessToken, AuthorizationCode, Client, CodeChallenge, IntrospectionResponse, RefreshToken,
    TokenKind, TokenResponse,
};
pub use pkce::{PkceMethod, PkceVerifier, s256_challenge};
pub use random::{RandomTokenGenerator, TokenGenerator};
pub use registration::ClientRegistry;
pub use request::{AuthorizeRequest, ClientCredentials, RevocationRequest, TokenRequest};
pub use storage::{InMemoryOAuthStorage, OAuthStorage};
pub use token::TokenEngine;
pub use tokens::{TokenPolicy, TokenStore};
pub use user::{FixedUserResolver, UserResolver};

use crate::config::{ConfigError, OAuthConfig};
use std::sync::Arc;
use tracing::info;

/// Registry and both engines wired over one storage backend.
#[derive(Clone)]
pub struct OAuthServer {
    pub registry: ClientRegistry,
    pub authorization: AuthorizationEngine,
    pub token: TokenEngine,
}

impl OAuthServer {
    /// Volatile in-memory server with the fixed demo user.
    pub fn in_memory(config: OAuthConfig) -> Result<Self, ConfigError> {
        let users = Arc::new(FixedUserResolver::new(config.demo_user_id.clone()));
        Self::with_storage(
            config,
            Arc::new(InMemoryOAuthStorage::new()),
            Arc::new(RandomTokenGenerator::new()),
            users,
        )
    }

    pub fn with_storage(
        config: OAuthConfig,
        storage: Arc<dyn OAuthStorage>,
        generator: Arc<dyn TokenGenerator>,
        users: Arc<dyn UserResolver>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let registry = ClientRegistry::new(storage.clone());
        let codes = AuthorizationCodeStore::new(
            storage.clone(),
            generator.clone(),
            config.authorization_code_lifetime(),
            config.code_length,
        );
        let tokens = TokenStore::new(
            storage,
            generator,
            TokenPolicy {
                access_lifetime: config.access_token_lifetime(),
                refresh_lifetime: config.refresh_token_lifetime(),
                token_length: config.token_length,
            },
        );

        info!(
            code_lifetime_secs = config.authorization_code_lifetime_secs,
            access_lifetime_secs = config.access_token_lifetime_secs,
            refresh_lifetime_secs = config.refresh_token_lifetime_secs,
            "OAuth engine initialized"
        );

        Ok(Self {
            authorization: AuthorizationEngine::new(
                registry.clone(),
                codes.clone(),
                users,
                config.max_state_length,
            ),
            token: TokenEngine::new(registry.clone(), codes, tokens),
            registry,
        })
    }
}
