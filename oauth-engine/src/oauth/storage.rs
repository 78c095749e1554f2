//! OAuth Storage Backend
//!
//! Per-collection get/put/delete primitives for clients, authorization codes,
//! access tokens and refresh tokens. Expiry is not interpreted here; the
//! stores built on top evaluate it at the moment of use.
//!
//! The in-memory implementation can be swapped for a persistent backend
//! without touching the engines.

use crate::oauth::error::StorageError;
use crate::oauth::models::{AccessToken, AuthorizationCode, Client, RefreshToken};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use tokio::sync::RwLock;

/// OAuth storage backend trait
///
/// `take_*` methods remove and return an entry in one step; a given entry is
/// returned by at most one caller.
#[async_trait]
pub trait OAuthStorage: Send + Sync {
    // Client operations
    /// Insert a client, failing with `AlreadyExists` if the id is taken.
    async fn insert_client(&self, client: &Client) -> Result<(), StorageError>;
    async fn get_client(&self, client_id: &str) -> Result<Client, StorageError>;

    // Authorization code operations
    async fn save_authorization_code(&self, code: &AuthorizationCode) -> Result<(), StorageError>;
    async fn take_authorization_code(&self, code: &str) -> Result<AuthorizationCode, StorageError>;

    // Access token operations
    async fn save_access_token(&self, token: &AccessToken) -> Result<(), StorageError>;
    async fn get_access_token(&self, token: &str) -> Result<AccessToken, StorageError>;
    async fn delete_access_token(&self, token: &str) -> Result<(), StorageError>;

    // Refresh token operations
    async fn save_refresh_token(&self, token: &RefreshToken) -> Result<(), StorageError>;
    async fn get_refresh_token(&self, token: &str) -> Result<RefreshToken, StorageError>;
    async fn take_refresh_token(&self, token: &str) -> Result<RefreshToken, StorageError>;
    async fn delete_refresh_token(&self, token: &str) -> Result<(), StorageError>;

    /// Drop codes and tokens that expired at or before `now`; returns how many were removed.
    async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<usize, StorageError>;
}

/// In-memory OAuth storage implementation
///
/// Thread-safe in-memory storage using one `RwLock` per collection.
#[derive(Clone, Default)]
pub struct InMemoryOAuthStorage {
    clients: Arc<RwLock<HashMap<String, Client>>>,
    authorization_codes: Arc<RwLock<HashMap<String, AuthorizationCode>>>,
    access_tokens: Arc<RwLock<HashMap<String, AccessToken>>>,
    refresh_tokens: Arc<RwLock<HashMap<String, RefreshToken>>>,
}

impl InMemoryOAuthStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OAuthStorage for InMemoryOAuthStorage {
    async fn insert_client(&self, client: &Client) -> Result<(), StorageError> {
        let mut clients = self.clients.write().await;
        match clients.entry(client.client_id.clone()) {
            Entry::Occupied(_) => Err(StorageError::AlreadyExists(client.client_id.clone())),
            Entry::Vacant(slot) => {
                slot.insert(client.clone());
                Ok(())
            }
        }
    }

    async fn get_client(&self, client_id: &str) -> Result<Client, StorageError> {
        let clients = self.clients.read().await;
        clients.get(client_id).cloned().ok_or(StorageError::NotFound)
    }

    async fn save_authorization_code(&self, code: &AuthorizationCode) -> Result<(), StorageError> {
        let mut codes = self.authorization_codes.write().await;
        codes.insert(code.code.clone(), code.clone());
        Ok(())
    }

    async fn take_authorization_code(&self, code: &str) -> Result<AuthorizationCode, StorageError> {
        let mut codes = self.authorization_codes.write().await;
        codes.remove(code).ok_or(StorageError::NotFound)
    }

    async fn save_access_token(&self, token: &AccessToken) -> Result<(), StorageError> {
        let mut tokens = self.access_tokens.write().await;
        tokens.insert(token.token.clone(), token.clone());
        Ok(())
    }

    async fn get_access_token(&self, token: &str) -> Result<AccessToken, StorageError> {
        let tokens = self.access_tokens.read().await;
        tokens.get(token).cloned().ok_or(StorageError::NotFound)
    }

    async fn delete_access_token(&self, token: &str) -> Result<(), StorageError> {
        let mut tokens = self.access_tokens.write().await;
        tokens.remove(token).map(|_| ()).ok_or(StorageError::NotFound)
    }

    async fn save_refresh_token(&self, token: &RefreshToken) -> Result<(), StorageError> {
        let mut tokens = self.refresh_tokens.write().await;
        tokens.insert(token.token.clone(), token.clone());
        Ok(())
    }

    async fn get_refresh_token(&self, token: &str) -> Result<RefreshToken, StorageError> {
        let tokens = self.refresh_tokens.read().await;
        tokens.get(token).cloned().ok_or(StorageError::NotFound)
    }

    async fn take_refresh_token(&self, token: &str) -> Result<RefreshToken, StorageError> {
        let mut tokens = self.refresh_tokens.write().await;
        tokens.remove(token).ok_or(StorageError::NotFound)
    }

    async fn delete_refresh_token(&self, token: &str) -> Result<(), StorageError> {
        let mut tokens = self.refresh_tokens.write().await;
        tokens.remove(token).map(|_| ()).ok_or(StorageError::NotFound)
    }

    async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<usize, StorageError> {
        let mut removed = 0;

        {
            let mut codes = self.authorization_codes.write().await;
            let before = codes.len();
            codes.retain(|_, code| !code.is_expired_at(now));
            removed += before - codes.len();
        }

        {
            let mut tokens = self.access_tokens.write().await;
            let before = tokens.len();
            tokens.retain(|_, token| !token.is_expired_at(now));
            removed += before - tokens.len();
        }

        {
            let mut tokens = self.refresh_tokens.write().await;
            let before = tokens.len();
            tokens.retain(|_, token| !token.is_expired_at(now));
            removed += before - tokens.len();
        }

        Ok(removed)
    }
}
