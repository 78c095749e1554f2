//! Authorization Code Store
//!
//! Issues short-lived codes and consumes them exactly once.

use crate::oauth::error::StorageError;
use crate::oauth::models::{AuthorizationCode, CodeChallenge};
use crate::oauth::random::TokenGenerator;
use crate::oauth::storage::OAuthStorage;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::debug;

/// Parameters bound into a new authorization code
#[derive(Debug, Clone)]
pub struct CodeGrant {
    pub client_id: String,
    pub user_id: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub code_challenge: Option<CodeChallenge>,
}

#[derive(Clone)]
pub struct AuthorizationCodeStore {
    storage: Arc<dyn OAuthStorage>,
    generator: Arc<dyn TokenGenerator>,
    lifetime: Duration,
    code_length: usize,
}

impl AuthorizationCodeStore {
    pub fn new(
        storage: Arc<dyn OAuthStorage>,
        generator: Arc<dyn TokenGenerator>,
        lifetime: Duration,
        code_length: usize,
    ) -> Self {
        Self {
            storage,
            generator,
            lifetime,
            code_length,
        }
    }

    /// Generate and store a new code bound to `grant`.
    pub async fn issue_code(&self, grant: CodeGrant) -> Result<AuthorizationCode, StorageError> {
        let code = self
            .generator
            .generate(self.code_length)
            .map_err(|e| StorageError::Backend(e.error_description().to_string()))?;
        let now = Utc::now();

        let auth_code = AuthorizationCode {
            code,
            client_id: grant.client_id,
            user_id: grant.user_id,
            redirect_uri: grant.redirect_uri,
            scopes: grant.scopes,
            code_challenge: grant.code_challenge,
            expires_at: now + self.lifetime,
            created_at: now,
        };

        self.storage.save_authorization_code(&auth_code).await?;

        debug!(
            client_id = %auth_code.client_id,
            user_id = %auth_code.user_id,
            pkce = auth_code.code_challenge.is_some(),
            "Issued authorization code"
        );
        Ok(auth_code)
    }

    /// Remove and return a code.
    ///
    /// The entry is deleted whether or not it has expired, so it can never be
    /// consumed a second time.
    pub async fn consume_code(&self, code: &str) -> Result<AuthorizationCode, StorageError> {
        let auth_code = self.storage.take_authorization_code(code).await?;

        if auth_code.is_expired_at(Utc::now()) {
            debug!(client_id = %auth_code.client_id, "Authorization code expired");
            return Err(StorageError::Expired);
        }

        Ok(auth_code)
    }
}
