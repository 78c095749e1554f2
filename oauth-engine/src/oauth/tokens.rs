//! Token Store
//!
//! Issues, validates, rotates and revokes opaque access and refresh tokens.
//!
//! Multi-entry mutations (issuing a pair, rotating, revoking) run under the
//! write side of a gate; access-token validation takes the read side. A
//! reader therefore never observes a rotation halfway through.

use crate::oauth::error::StorageError;
use crate::oauth::models::{AccessToken, RefreshToken, TokenKind};
use crate::oauth::random::TokenGenerator;
use crate::oauth::storage::OAuthStorage;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Short non-secret prefix of a token for log correlation.
pub(crate) fn fingerprint(token: &str) -> &str {
    let end = token
        .char_indices()
        .nth(6)
        .map(|(i, _)| i)
        .unwrap_or(token.len());
    &token[..end]
}

/// Lifetimes and length used when minting tokens
#[derive(Debug, Clone, Copy)]
pub struct TokenPolicy {
    pub access_lifetime: Duration,
    pub refresh_lifetime: Duration,
    pub token_length: usize,
}

#[derive(Clone)]
pub struct TokenStore {
    storage: Arc<dyn OAuthStorage>,
    generator: Arc<dyn TokenGenerator>,
    policy: TokenPolicy,
    gate: Arc<RwLock<()>>,
}

impl TokenStore {
    pub fn new(
        storage: Arc<dyn OAuthStorage>,
        generator: Arc<dyn TokenGenerator>,
        policy: TokenPolicy,
    ) -> Self {
        Self {
            storage,
            generator,
            policy,
            gate: Arc::new(RwLock::new(())),
        }
    }

    pub fn policy(&self) -> &TokenPolicy {
        &self.policy
    }

    /// Mint and store a new access/refresh pair.
    pub async fn issue_token_pair(
        &self,
        client_id: &str,
        user_id: &str,
        scopes: &[String],
    ) -> Result<(AccessToken, RefreshToken), StorageError> {
        let (access_value, refresh_value) = self.generate_values()?;

        let _guard = self.gate.write().await;
        self.store_pair(access_value, refresh_value, client_id, user_id, scopes)
            .await
    }

    /// Exchange a refresh token for a new pair, invalidating it.
    pub async fn rotate_refresh_token(
        &self,
        old_token: &str,
    ) -> Result<(AccessToken, RefreshToken), StorageError> {
        self.rotate(old_token, None).await
    }

    /// Like [`rotate_refresh_token`](Self::rotate_refresh_token), but a token
    /// bound to a different client is reported as `NotFound` and left untouched.
    pub async fn rotate_refresh_token_for_client(
        &self,
        old_token: &str,
        client_id: &str,
    ) -> Result<(AccessToken, RefreshToken), StorageError> {
        self.rotate(old_token, Some(client_id)).await
    }

    async fn rotate(
        &self,
        old_token: &str,
        expected_client: Option<&str>,
    ) -> Result<(AccessToken, RefreshToken), StorageError> {
        // Generate before taking the old entry so a generator failure leaves it intact
        let (access_value, refresh_value) = self.generate_values()?;

        let _guard = self.gate.write().await;

        let current = self.storage.get_refresh_token(old_token).await?;
        if let Some(client_id) = expected_client {
            if current.client_id != client_id {
                debug!(
                    token = %fingerprint(old_token),
                    "Refresh token presented by a different client"
                );
                return Err(StorageError::NotFound);
            }
        }

        let old = self.storage.take_refresh_token(old_token).await?;
        if old.is_expired_at(Utc::now()) {
            debug!(client_id = %old.client_id, "Refresh token expired");
            return Err(StorageError::Expired);
        }

        let stored = self
            .store_pair(
                access_value,
                refresh_value,
                &old.client_id,
                &old.user_id,
                &old.scopes,
            )
            .await;
        let pair = match stored {
            Ok(pair) => pair,
            Err(e) => {
                // No new pair was issued, so the presented token stays valid
                if let Err(restore) = self.storage.save_refresh_token(&old).await {
                    warn!(
                        client_id = %old.client_id,
                        error = %restore,
                        "Failed to restore refresh token after aborted rotation"
                    );
                }
                return Err(e);
            }
        };

        info!(
            client_id = %old.client_id,
            old = %fingerprint(old_token),
            new = %fingerprint(&pair.1.token),
            "Rotated refresh token"
        );
        Ok(pair)
    }

    /// Look up an access token, treating an expired one as invalid.
    pub async fn validate_access_token(&self, token: &str) -> Result<AccessToken, StorageError> {
        let _guard = self.gate.read().await;
        let access = self.storage.get_access_token(token).await?;
        if access.is_expired_at(Utc::now()) {
            return Err(StorageError::Expired);
        }
        Ok(access)
    }

    /// Look up a refresh token without consuming it.
    pub async fn lookup_refresh_token(&self, token: &str) -> Result<RefreshToken, StorageError> {
        let _guard = self.gate.read().await;
        let refresh = self.storage.get_refresh_token(token).await?;
        if refresh.is_expired_at(Utc::now()) {
            return Err(StorageError::Expired);
        }
        Ok(refresh)
    }

    /// Delete one token. Access and refresh entries are independent, so
    /// revoking one never touches its pair.
    pub async fn revoke(&self, token: &str, kind: TokenKind) -> Result<(), StorageError> {
        let _guard = self.gate.write().await;
        self.delete(token, kind).await?;
        info!(token = %fingerprint(token), kind = ?kind, "Revoked token");
        Ok(())
    }

    /// Delete a token only if it is bound to `client_id`; otherwise `NotFound`.
    pub async fn revoke_for_client(
        &self,
        token: &str,
        kind: TokenKind,
        client_id: &str,
    ) -> Result<(), StorageError> {
        let _guard = self.gate.write().await;

        let owner = match kind {
            TokenKind::Access => self.storage.get_access_token(token).await?.client_id,
            TokenKind::Refresh => self.storage.get_refresh_token(token).await?.client_id,
        };
        if owner != client_id {
            return Err(StorageError::NotFound);
        }

        self.delete(token, kind).await?;
        info!(client_id = %client_id, token = %fingerprint(token), kind = ?kind, "Revoked token");
        Ok(())
    }

    /// Drop every expired code and token.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StorageError> {
        let _guard = self.gate.write().await;
        let removed = self.storage.cleanup_expired(now).await?;
        debug!(removed, "Purged expired entries");
        Ok(removed)
    }

    async fn delete(&self, token: &str, kind: TokenKind) -> Result<(), StorageError> {
        match kind {
            TokenKind::Access => self.storage.delete_access_token(token).await,
            TokenKind::Refresh => self.storage.delete_refresh_token(token).await,
        }
    }

    fn generate_values(&self) -> Result<(String, String), StorageError> {
        let generate = || {
            self.generator
                .generate(self.policy.token_length)
                .map_err(|e| StorageError::Backend(e.error_description().to_string()))
        };
        Ok((generate()?, generate()?))
    }

    async fn store_pair(
        &self,
        access_value: String,
        refresh_value: String,
        client_id: &str,
        user_id: &str,
        scopes: &[String],
    ) -> Result<(AccessToken, RefreshToken), StorageError> {
        let now = Utc::now();

        let access = AccessToken {
            token: access_value,
            client_id: client_id.to_string(),
            user_id: user_id.to_string(),
            scopes: scopes.to_vec(),
            expires_at: now + self.policy.access_lifetime,
            created_at: now,
        };
        let refresh = RefreshToken {
            token: refresh_value,
            client_id: client_id.to_string(),
            user_id: user_id.to_string(),
            scopes: scopes.to_vec(),
            expires_at: now + self.policy.refresh_lifetime,
            created_at: now,
        };

        self.storage.save_access_token(&access).await?;
        if let Err(e) = self.storage.save_refresh_token(&refresh).await {
            // Keep the pair all-or-nothing
            let _ = self.storage.delete_access_token(&access.token).await;
            return Err(e);
        }

        debug!(client_id = %client_id, user_id = %user_id, "Issued token pair");
        Ok((access, refresh))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::models::{AuthorizationCode, Client};
    use crate::oauth::random::RandomTokenGenerator;
    use crate::oauth::storage::InMemoryOAuthStorage;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// In-memory storage whose access-token writes fail while `down` is set.
    #[derive(Default)]
    struct FlakyStorage {
        inner: InMemoryOAuthStorage,
        down: AtomicBool,
    }

    #[async_trait]
    impl OAuthStorage for FlakyStorage {
        async fn insert_client(&self, client: &Client) -> Result<(), StorageError> {
            self.inner.insert_client(client).await
        }
        async fn get_client(&self, client_id: &str) -> Result<Client, StorageError> {
            self.inner.get_client(client_id).await
        }
        async fn save_authorization_code(
            &self,
            code: &AuthorizationCode,
        ) -> Result<(), StorageError> {
            self.inner.save_authorization_code(code).await
        }
        async fn take_authorization_code(
            &self,
            code: &str,
        ) -> Result<AuthorizationCode, StorageError> {
            self.inner.take_authorization_code(code).await
        }
        async fn save_access_token(&self, token: &AccessToken) -> Result<(), StorageError> {
            if self.down.load(Ordering::SeqCst) {
                return Err(StorageError::Backend("down".to_string()));
            }
            self.inner.save_access_token(token).await
        }
        async fn get_access_token(&self, token: &str) -> Result<AccessToken, StorageError> {
            self.inner.get_access_token(token).await
        }
        async fn delete_access_token(&self, token: &str) -> Result<(), StorageError> {
            self.inner.delete_access_token(token).await
        }
        async fn save_refresh_token(&self, token: &RefreshToken) -> Result<(), StorageError> {
            self.inner.save_refresh_token(token).await
        }
        async fn get_refresh_token(&self, token: &str) -> Result<RefreshToken, StorageError> {
            self.inner.get_refresh_token(token).await
        }
        async fn take_refresh_token(&self, token: &str) -> Result<RefreshToken, StorageError> {
            self.inner.take_refresh_token(token).await
        }
        async fn delete_refresh_token(&self, token: &str) -> Result<(), StorageError> {
            self.inner.delete_refresh_token(token).await
        }
        async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<usize, StorageError> {
            self.inner.cleanup_expired(now).await
        }
    }

    fn policy() -> TokenPolicy {
        TokenPolicy {
            access_lifetime: Duration::hours(1),
            refresh_lifetime: Duration::days(30),
            token_length: 64,
        }
    }

    fn store_with(policy: TokenPolicy) -> TokenStore {
        TokenStore::new(
            Arc::new(InMemoryOAuthStorage::new()),
            Arc::new(RandomTokenGenerator),
            policy,
        )
    }

    fn scopes() -> Vec<String> {
        vec!["read".to_string(), "write".to_string()]
    }

    #[test]
    fn test_fingerprint() {
        assert_eq!(fingerprint("abcdefghij"), "abcdef");
        assert_eq!(fingerprint("abc"), "abc");
    }

    #[tokio::test]
    async fn test_issue_pair_and_validate() {
        let store = store_with(policy());
        let (access, refresh) = store
            .issue_token_pair("cid12345", "demo-user", &scopes())
            .await
            .unwrap();

        assert_ne!(access.token, refresh.token);
        assert_eq!(access.token.len(), 64);
        assert_eq!(access.lifetime_secs(), 3600);
        assert_eq!(refresh.expires_at - refresh.created_at, Duration::days(30));

        let validated = store.validate_access_token(&access.token).await.unwrap();
        assert_eq!(validated, access);
    }

    #[tokio::test]
    async fn test_rotation_invalidates_old_token() {
        let store = store_with(policy());
        let (old_access, old_refresh) = store
            .issue_token_pair("cid12345", "demo-user", &scopes())
            .await
            .unwrap();

        let (new_access, new_refresh) = store
            .rotate_refresh_token(&old_refresh.token)
            .await
            .unwrap();
        assert_ne!(new_refresh.token, old_refresh.token);
        assert_ne!(new_access.token, old_access.token);
        assert_eq!(new_refresh.scopes, scopes());
        assert_eq!(new_refresh.client_id, "cid12345");

        assert_eq!(
            store.rotate_refresh_token(&old_refresh.token).await,
            Err(StorageError::NotFound)
        );
        assert!(store.rotate_refresh_token(&new_refresh.token).await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_rotation_keeps_old_token() {
        let storage = Arc::new(FlakyStorage::default());
        let store = TokenStore::new(storage.clone(), Arc::new(RandomTokenGenerator), policy());
        let (_, refresh) = store
            .issue_token_pair("cid12345", "demo-user", &scopes())
            .await
            .unwrap();

        storage.down.store(true, Ordering::SeqCst);
        assert_eq!(
            store.rotate_refresh_token(&refresh.token).await,
            Err(StorageError::Backend("down".to_string()))
        );
        assert_eq!(store.lookup_refresh_token(&refresh.token).await.unwrap(), refresh);

        storage.down.store(false, Ordering::SeqCst);
        let (_, rotated) = store.rotate_refresh_token(&refresh.token).await.unwrap();
        assert_ne!(rotated.token, refresh.token);
        assert!(store.lookup_refresh_token(&refresh.token).await.is_err());
    }

    #[tokio::test]
    async fn test_rotation_for_other_client_leaves_token_intact() {
        let store = store_with(policy());
        let (_, refresh) = store
            .issue_token_pair("client-aaa", "demo-user", &scopes())
            .await
            .unwrap();

        assert_eq!(
            store
                .rotate_refresh_token_for_client(&refresh.token, "client-bbb")
                .await,
            Err(StorageError::NotFound)
        );
        assert!(
            store
                .rotate_refresh_token_for_client(&refresh.token, "client-aaa")
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_expired_tokens() {
        let store = store_with(TokenPolicy {
            access_lifetime: Duration::zero(),
            refresh_lifetime: Duration::zero(),
            token_length: 64,
        });
        let (access, refresh) = store
            .issue_token_pair("cid12345", "demo-user", &scopes())
            .await
            .unwrap();

        assert_eq!(
            store.validate_access_token(&access.token).await,
            Err(StorageError::Expired)
        );
        assert_eq!(
            store.rotate_refresh_token(&refresh.token).await,
            Err(StorageError::Expired)
        );
    }

    #[tokio::test]
    async fn test_revocation_is_independent_per_kind() {
        let store = store_with(policy());
        let (access, refresh) = store
            .issue_token_pair("cid12345", "demo-user", &scopes())
            .await
            .unwrap();

        store.revoke(&access.token, TokenKind::Access).await.unwrap();
        assert_eq!(
            store.validate_access_token(&access.token).await,
            Err(StorageError::NotFound)
        );
        assert!(store.lookup_refresh_token(&refresh.token).await.is_ok());

        assert_eq!(
            store.revoke(&access.token, TokenKind::Access).await,
            Err(StorageError::NotFound)
        );
        // A refresh value is not an access token
        assert_eq!(
            store.revoke(&refresh.token, TokenKind::Access).await,
            Err(StorageError::NotFound)
        );
    }

    #[tokio::test]
    async fn test_revoke_for_client_checks_binding() {
        let store = store_with(policy());
        let (access, _) = store
            .issue_token_pair("client-aaa", "demo-user", &scopes())
            .await
            .unwrap();

        assert_eq!(
            store
                .revoke_for_client(&access.token, TokenKind::Access, "client-bbb")
                .await,
            Err(StorageError::NotFound)
        );
        assert!(store.validate_access_token(&access.token).await.is_ok());

        store
            .revoke_for_client(&access.token, TokenKind::Access, "client-aaa")
            .await
            .unwrap();
        assert!(store.validate_access_token(&access.token).await.is_err());
    }
}
