//! Token Endpoint
//!
//! Handles the `authorization_code` and `refresh_token` grants, token
//! revocation (RFC 7009) and introspection (RFC 7662).
//!
//! Every grant failure after client authentication is reported with the same
//! `invalid_grant` description, so a caller cannot tell a consumed code from a
//! client mismatch or a failed PKCE check.

use crate::oauth::codes::AuthorizationCodeStore;
use crate::oauth::error::{OAuthError, StorageError};
use crate::oauth::models::{IntrospectionResponse, TokenKind, TokenResponse};
use crate::oauth::pkce::PkceVerifier;
use crate::oauth::registration::ClientRegistry;
use crate::oauth::request::{ClientCredentials, RevocationRequest, TokenRequest};
use crate::oauth::tokens::{TokenStore, fingerprint};
use chrono::Utc;
use tracing::{debug, info, warn};

fn rejected_grant() -> OAuthError {
    StorageError::NotFound.into_grant_error()
}

/// Orchestrates the `/token` step.
#[derive(Clone)]
pub struct TokenEngine {
    registry: ClientRegistry,
    codes: AuthorizationCodeStore,
    tokens: TokenStore,
}

impl TokenEngine {
    pub fn new(
        registry: ClientRegistry,
        codes: AuthorizationCodeStore,
        tokens: TokenStore,
    ) -> Self {
        Self {
            registry,
            codes,
            tokens,
        }
    }

    /// Underlying token store, for resource servers validating access tokens.
    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    /// Dispatch a token request on its `grant_type`.
    pub async fn token(&self, request: &TokenRequest) -> Result<TokenResponse, OAuthError> {
        let grant_type = request
            .grant_type
            .as_deref()
            .ok_or_else(|| OAuthError::invalid_request("grant_type is required"))?;

        let result = match grant_type {
            "authorization_code" => self.authorization_code_grant(request).await,
            "refresh_token" => self.refresh_token_grant(request).await,
            other => Err(OAuthError::unsupported_grant_type(format!(
                "grant_type '{}' not supported",
                other
            ))),
        };

        if let Err(e) = &result {
            warn!(
                grant_type = %grant_type,
                client_id = request.client_id.as_deref().unwrap_or(""),
                error = e.error_code(),
                "Token request rejected: {}",
                e.error_description()
            );
        }
        result
    }

    async fn authenticate(&self, credentials: ClientCredentials) -> Result<String, OAuthError> {
        if self
            .registry
            .validate_credentials(&credentials.client_id, &credentials.client_secret)
            .await
        {
            Ok(credentials.client_id)
        } else {
            Err(OAuthError::invalid_client("Client authentication failed"))
        }
    }

    async fn authorization_code_grant(
        &self,
        request: &TokenRequest,
    ) -> Result<TokenResponse, OAuthError> {
        let client_id = self.authenticate(request.credentials()?).await?;

        let code = request
            .code
            .as_deref()
            .ok_or_else(|| OAuthError::invalid_request("code is required"))?;
        let redirect_uri = request
            .redirect_uri
            .as_deref()
            .ok_or_else(|| OAuthError::invalid_request("redirect_uri is required"))?;

        let auth_code = self
            .codes
            .consume_code(code)
            .await
            .map_err(StorageError::into_grant_error)?;

        if auth_code.client_id != client_id {
            debug!(client_id = %client_id, "Authorization code issued to a different client");
            return Err(rejected_grant());
        }

        if auth_code.redirect_uri != redirect_uri {
            debug!(client_id = %client_id, "redirect_uri does not match the authorization request");
            return Err(rejected_grant());
        }

        // Codes issued without a challenge skip verification
        if let Some(challenge) = &auth_code.code_challenge {
            let verified = request.code_verifier.as_deref().is_some_and(|verifier| {
                PkceVerifier::verify_with(verifier, &challenge.challenge, challenge.method)
            });
            if !verified {
                debug!(
                    client_id = %client_id,
                    method = %challenge.method,
                    "PKCE verification failed"
                );
                return Err(rejected_grant());
            }
        }

        let (access, refresh) = self
            .tokens
            .issue_token_pair(&client_id, &auth_code.user_id, &auth_code.scopes)
            .await?;

        info!(
            client_id = %client_id,
            user_id = %auth_code.user_id,
            scope = %auth_code.scopes.join(" "),
            "Exchanged authorization code for tokens"
        );
        Ok(TokenResponse::from_pair(&access, &refresh))
    }

    async fn refresh_token_grant(
        &self,
        request: &TokenRequest,
    ) -> Result<TokenResponse, OAuthError> {
        let client_id = self.authenticate(request.credentials()?).await?;

        let refresh_token = request
            .refresh_token
            .as_deref()
            .ok_or_else(|| OAuthError::invalid_request("refresh_token is required"))?;

        let (access, refresh) = self
            .tokens
            .rotate_refresh_token_for_client(refresh_token, &client_id)
            .await
            .map_err(StorageError::into_grant_error)?;

        // Checked again before the new pair leaves the engine
        if access.client_id != client_id || refresh.client_id != client_id {
            warn!(client_id = %client_id, "Rotated pair bound to a different client");
            return Err(rejected_grant());
        }

        Ok(TokenResponse::from_pair(&access, &refresh))
    }

    /// Revoke a token (RFC 7009).
    ///
    /// The hinted kind is tried first, then the other. Unknown tokens and
    /// tokens owned by another client succeed silently.
    pub async fn revoke(&self, request: &RevocationRequest) -> Result<(), OAuthError> {
        let client_id = self.authenticate(request.credentials()?).await?;

        let token = request
            .token
            .as_deref()
            .ok_or_else(|| OAuthError::invalid_request("token is required"))?;

        // Unrecognized hints are ignored
        let first = request
            .token_type_hint
            .as_deref()
            .and_then(TokenKind::from_hint)
            .unwrap_or(TokenKind::Access);

        for kind in [first, first.other()] {
            match self.tokens.revoke_for_client(token, kind, &client_id).await {
                Ok(()) => return Ok(()),
                Err(StorageError::NotFound) => continue,
                Err(e) => return Err(OAuthError::server_error(e.to_string())),
            }
        }

        debug!(
            client_id = %client_id,
            token = %fingerprint(token),
            "Revocation of unknown token ignored"
        );
        Ok(())
    }

    /// Describe an access token (RFC 7662). Unknown and expired tokens are inactive.
    pub async fn introspect(&self, token: &str) -> IntrospectionResponse {
        match self.tokens.validate_access_token(token).await {
            Ok(access) => IntrospectionResponse::from_access_token(&access),
            Err(_) => IntrospectionResponse::inactive(),
        }
    }

    /// Drop expired codes and tokens, returning how many were removed.
    pub async fn purge_expired(&self) -> Result<usize, OAuthError> {
        Ok(self.tokens.purge_expired(Utc::now()).await?)
    }
}
