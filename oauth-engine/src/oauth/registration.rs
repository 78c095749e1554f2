//! Client Registry
//!
//! Validates client metadata at registration time and authenticates clients
//! at the token endpoint.

use crate::oauth::error::{OAuthError, StorageError};
use crate::oauth::models::Client;
use crate::oauth::scope::validate_scopes;
use crate::oauth::storage::OAuthStorage;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::{Arc, LazyLock};
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};
use url::Url;

/// Minimum accepted client secret length
pub const MIN_SECRET_LENGTH: usize = 8;

const UNKNOWN_CLIENT_SECRET: &str = "unknown-client-placeholder-secret";

static CLIENT_ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]{8,32}$").expect("client id pattern is valid"));

/// Whether `client_id` has the registrable shape (8-32 chars of `[a-zA-Z0-9_-]`).
pub fn is_valid_client_id(client_id: &str) -> bool {
    CLIENT_ID_PATTERN.is_match(client_id)
}

/// Validate a redirect URI.
///
/// Requirements:
/// - absolute `http` or `https` URL with a host
/// - no embedded userinfo
/// - no fragment (RFC 6749 Section 3.1.2)
pub fn is_valid_redirect_uri(uri: &str) -> bool {
    let Ok(url) = Url::parse(uri) else {
        return false;
    };

    matches!(url.scheme(), "http" | "https")
        && url.host_str().is_some_and(|host| !host.is_empty())
        && url.username().is_empty()
        && url.password().is_none()
        && url.fragment().is_none()
}

/// Check every registration rule for a client.
pub fn validate_client(client: &Client) -> Result<(), OAuthError> {
    if !is_valid_client_id(&client.client_id) {
        return Err(OAuthError::invalid_client(
            "client_id must be 8-32 characters of [a-zA-Z0-9_-]",
        ));
    }

    if client.client_secret.chars().count() < MIN_SECRET_LENGTH {
        return Err(OAuthError::invalid_client(format!(
            "client_secret must be at least {} characters",
            MIN_SECRET_LENGTH
        )));
    }

    if client.redirect_uris.is_empty() {
        return Err(OAuthError::invalid_client(
            "At least one redirect_uri is required",
        ));
    }

    for (i, uri) in client.redirect_uris.iter().enumerate() {
        if !is_valid_redirect_uri(uri) {
            return Err(OAuthError::invalid_client(format!(
                "Invalid redirect_uri: {}. Must be an absolute http(s) URL with a host",
                uri
            )));
        }
        if client.redirect_uris[..i].contains(uri) {
            return Err(OAuthError::invalid_client(format!(
                "Duplicate redirect_uri: {}",
                uri
            )));
        }
    }

    if client.allowed_scopes.is_empty() {
        return Err(OAuthError::invalid_client("At least one scope is required"));
    }

    validate_scopes(&client.allowed_scopes)
        .map_err(|e| OAuthError::invalid_client(e.error_description()))
}

/// Registered client applications
#[derive(Clone)]
pub struct ClientRegistry {
    storage: Arc<dyn OAuthStorage>,
}

impl ClientRegistry {
    pub fn new(storage: Arc<dyn OAuthStorage>) -> Self {
        Self { storage }
    }

    /// Validate and store a client. Duplicate ids are rejected, never overwritten.
    pub async fn register(&self, client: &Client) -> Result<(), OAuthError> {
        if let Err(e) = validate_client(client) {
            warn!(client_id = %client.client_id, error = %e, "Client registration rejected");
            return Err(e);
        }

        self.storage.insert_client(client).await.map_err(|e| match e {
            StorageError::AlreadyExists(id) => {
                warn!(client_id = %id, "Client already registered");
                OAuthError::DuplicateClient(format!("Client already registered: {}", id))
            }
            other => OAuthError::from(other),
        })?;

        info!(
            client_id = %client.client_id,
            redirect_uris = client.redirect_uris.len(),
            scopes = %client.allowed_scopes.join(" "),
            "Registered OAuth client"
        );
        Ok(())
    }

    /// Fetch a copy of a registered client.
    pub async fn lookup(&self, client_id: &str) -> Result<Client, OAuthError> {
        self.storage.get_client(client_id).await.map_err(|e| match e {
            StorageError::NotFound => {
                OAuthError::NotFound(format!("Unknown client: {}", client_id))
            }
            other => OAuthError::from(other),
        })
    }

    /// Authenticate a client by id and secret.
    ///
    /// Secrets are compared as SHA-256 digests in constant time so neither
    /// content nor length leaks through timing.
    pub async fn validate_credentials(&self, client_id: &str, client_secret: &str) -> bool {
        let client = self.storage.get_client(client_id).await.ok();
        if client.is_none() {
            debug!(client_id = %client_id, "Credential check for unknown client");
        }

        // Unknown ids hash a placeholder so they cost the same as a wrong secret
        let stored = client
            .as_ref()
            .map_or(UNKNOWN_CLIENT_SECRET, |c| c.client_secret.as_str());
        let expected = Sha256::digest(stored.as_bytes());
        let presented = Sha256::digest(client_secret.as_bytes());
        let matches: bool = expected.as_slice().ct_eq(presented.as_slice()).into();
        matches && client.is_some()
    }
}
