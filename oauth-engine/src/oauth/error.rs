//! OAuth Error Taxonomy
//!
//! Engine-level errors are a closed set of kinds. The transport layer renders
//! them into the protocol-correct shape (JSON body or error redirect) using
//! [`OAuthError::error_code`], [`OAuthError::status_code`] and
//! [`OAuthError::to_response`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced by the authorization and token engines.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OAuthError {
    /// A required parameter is missing, repeated, or malformed.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Unknown client or bad client credentials.
    #[error("Invalid client: {0}")]
    InvalidClient(String),

    /// Code or refresh token is unknown, expired, consumed, bound to another
    /// client or redirect URI, or failed PKCE verification.
    #[error("Invalid grant: {0}")]
    InvalidGrant(String),

    /// Requested scope is empty, unknown, duplicated, or not allowed for the client.
    #[error("Invalid scope: {0}")]
    InvalidScope(String),

    /// The `response_type` is not `code`.
    #[error("Unsupported response type: {0}")]
    UnsupportedResponseType(String),

    /// The `grant_type` is not implemented by this engine.
    #[error("Unsupported grant type: {0}")]
    UnsupportedGrantType(String),

    /// A client with the same id is already registered.
    #[error("Duplicate client: {0}")]
    DuplicateClient(String),

    /// The referenced registry entry does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Internal failure, such as an exhausted randomness source.
    #[error("Server error: {0}")]
    ServerError(String),
}

impl OAuthError {
    pub fn invalid_request(description: impl Into<String>) -> Self {
        Self::InvalidRequest(description.into())
    }

    pub fn invalid_client(description: impl Into<String>) -> Self {
        Self::InvalidClient(description.into())
    }

    pub fn invalid_grant(description: impl Into<String>) -> Self {
        Self::InvalidGrant(description.into())
    }

    pub fn invalid_scope(description: impl Into<String>) -> Self {
        Self::InvalidScope(description.into())
    }

    pub fn unsupported_response_type(description: impl Into<String>) -> Self {
        Self::UnsupportedResponseType(description.into())
    }

    pub fn unsupported_grant_type(description: impl Into<String>) -> Self {
        Self::UnsupportedGrantType(description.into())
    }

    pub fn server_error(description: impl Into<String>) -> Self {
        Self::ServerError(description.into())
    }

    /// RFC 6749 error code carried in the `error` field.
    pub fn error_code(&self) -> &'static str {
        match self {
            OAuthError::InvalidRequest(_) => "invalid_request",
            OAuthError::InvalidClient(_) => "invalid_client",
            OAuthError::InvalidGrant(_) => "invalid_grant",
            OAuthError::InvalidScope(_) => "invalid_scope",
            OAuthError::UnsupportedResponseType(_) => "unsupported_response_type",
            OAuthError::UnsupportedGrantType(_) => "unsupported_grant_type",
            OAuthError::DuplicateClient(_) => "invalid_request",
            OAuthError::NotFound(_) => "invalid_request",
            OAuthError::ServerError(_) => "server_error",
        }
    }

    /// HTTP status a transport should use when rendering this error as JSON.
    pub fn status_code(&self) -> u16 {
        match self {
            OAuthError::InvalidClient(_) => 401,
            OAuthError::NotFound(_) => 404,
            OAuthError::DuplicateClient(_) => 409,
            OAuthError::ServerError(_) => 500,
            _ => 400,
        }
    }

    /// Human readable description carried in `error_description`.
    pub fn error_description(&self) -> &str {
        match self {
            OAuthError::InvalidRequest(msg)
            | OAuthError::InvalidClient(msg)
            | OAuthError::InvalidGrant(msg)
            | OAuthError::InvalidScope(msg)
            | OAuthError::UnsupportedResponseType(msg)
            | OAuthError::UnsupportedGrantType(msg)
            | OAuthError::DuplicateClient(msg)
            | OAuthError::NotFound(msg)
            | OAuthError::ServerError(msg) => msg,
        }
    }

    /// Build the RFC 6749 Section 5.2 error body.
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.error_code().to_string(),
            error_description: Some(self.error_description().to_string()),
        }
    }
}

/// Error response body (RFC 6749 Section 5.2)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

/// Errors returned by [`OAuthStorage`](crate::oauth::storage::OAuthStorage) backends
/// and the stores built on top of them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("Entry not found")]
    NotFound,

    #[error("Entry expired")]
    Expired,

    #[error("Entry already exists: {0}")]
    AlreadyExists(String),

    #[error("Storage error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Map a lookup failure at the token endpoint.
    ///
    /// Missing and expired entries collapse into the same `invalid_grant` so a
    /// caller cannot tell them apart.
    pub fn into_grant_error(self) -> OAuthError {
        match self {
            StorageError::NotFound | StorageError::Expired => {
                OAuthError::invalid_grant("Grant is invalid, expired, or was already used")
            }
            StorageError::AlreadyExists(_) | StorageError::Backend(_) => {
                OAuthError::server_error(self.to_string())
            }
        }
    }
}

impl From<StorageError> for OAuthError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound => OAuthError::NotFound("Entry not found".to_string()),
            StorageError::Expired => OAuthError::invalid_grant("Entry expired"),
            StorageError::AlreadyExists(id) => OAuthError::DuplicateClient(id),
            StorageError::Backend(msg) => OAuthError::ServerError(msg),
        }
    }
}
