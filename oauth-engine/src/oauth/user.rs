//! Resource owner resolution for the authorize step

use async_trait::async_trait;

use crate::oauth::error::OAuthError;

/// Resolves the user on whose behalf an authorization code is issued.
#[async_trait]
pub trait UserResolver: Send + Sync {
    async fn resolve_user(&self, client_id: &str) -> Result<String, OAuthError>;
}

/// Always resolves the same identity. Real login and consent are out of scope.
#[derive(Debug, Clone)]
pub struct FixedUserResolver {
    user_id: String,
}

impl FixedUserResolver {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

#[async_trait]
impl UserResolver for FixedUserResolver {
    async fn resolve_user(&self, _client_id: &str) -> Result<String, OAuthError> {
        Ok(self.user_id.clone())
    }
}
