//! Authorization Endpoint with optional PKCE
//!
//! Validates an `/authorize` request in a fixed order and issues an
//! authorization code. Failures detected before the redirect URI is trusted
//! are returned as [`AuthorizeError::Direct`] and must be rendered as a JSON
//! body; later failures are delivered to the client through an error redirect.

use crate::oauth::codes::{AuthorizationCodeStore, CodeGrant};
use crate::oauth::error::OAuthError;
use crate::oauth::models::CodeChallenge;
use crate::oauth::pkce::PkceMethod;
use crate::oauth::registration::{ClientRegistry, is_valid_client_id, is_valid_redirect_uri};
use crate::oauth::request::AuthorizeRequest;
use crate::oauth::scope::parse_scope;
use crate::oauth::user::UserResolver;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

/// Whether `state` is 1..=`max_length` RFC 3986 unreserved characters.
pub fn is_valid_state(state: &str, max_length: usize) -> bool {
    !state.is_empty()
        && state.len() <= max_length
        && state
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~'))
}

/// Append parameters to a redirect URI, keeping any query it already has.
fn append_query(redirect_uri: &str, pairs: &[(&str, &str)]) -> String {
    match Url::parse(redirect_uri) {
        Ok(mut url) => {
            url.query_pairs_mut().extend_pairs(pairs);
            url.into()
        }
        // Only registered, already-validated URIs reach this point
        Err(_) => redirect_uri.to_string(),
    }
}

/// Successful authorization: where to send the user agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizeRedirect {
    pub redirect_uri: String,
    pub code: String,
    pub state: String,
}

impl AuthorizeRedirect {
    /// `redirect_uri?code=<code>&state=<state>`
    pub fn location(&self) -> String {
        append_query(
            &self.redirect_uri,
            &[("code", self.code.as_str()), ("state", self.state.as_str())],
        )
    }
}

/// Rejected authorization request
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthorizeError {
    /// The redirect URI is not trusted; render as a JSON error body.
    #[error(transparent)]
    Direct(OAuthError),

    /// Deliver the error to the client's registered redirect URI.
    #[error("{error}")]
    Redirect {
        redirect_uri: String,
        error: OAuthError,
        state: Option<String>,
    },
}

impl AuthorizeError {
    pub fn error(&self) -> &OAuthError {
        match self {
            AuthorizeError::Direct(error) | AuthorizeError::Redirect { error, .. } => error,
        }
    }

    /// Error redirect target (RFC 6749 Section 4.1.2.1), `None` for direct errors.
    pub fn location(&self) -> Option<String> {
        match self {
            AuthorizeError::Direct(_) => None,
            AuthorizeError::Redirect {
                redirect_uri,
                error,
                state,
            } => {
                let mut pairs = vec![
                    ("error", error.error_code()),
                    ("error_description", error.error_description()),
                ];
                if let Some(state) = state {
                    pairs.push(("state", state.as_str()));
                }
                Some(append_query(redirect_uri, &pairs))
            }
        }
    }
}

/// Orchestrates the `/authorize` step.
#[derive(Clone)]
pub struct AuthorizationEngine {
    registry: ClientRegistry,
    codes: AuthorizationCodeStore,
    users: Arc<dyn UserResolver>,
    max_state_length: usize,
}

impl AuthorizationEngine {
    pub fn new(
        registry: ClientRegistry,
        codes: AuthorizationCodeStore,
        users: Arc<dyn UserResolver>,
        max_state_length: usize,
    ) -> Self {
        Self {
            registry,
            codes,
            users,
            max_state_length,
        }
    }

    /// Validate `request` and issue an authorization code.
    pub async fn authorize(
        &self,
        request: &AuthorizeRequest,
    ) -> Result<AuthorizeRedirect, AuthorizeError> {
        let result = self.process(request).await;
        if let Err(e) = &result {
            warn!(
                client_id = request.client_id.as_deref().unwrap_or(""),
                error = e.error().error_code(),
                redirect = matches!(e, AuthorizeError::Redirect { .. }),
                "Authorization request rejected: {}",
                e.error().error_description()
            );
        }
        result
    }

    async fn process(
        &self,
        request: &AuthorizeRequest,
    ) -> Result<AuthorizeRedirect, AuthorizeError> {
        // 1. Client
        let client_id = request
            .client_id
            .as_deref()
            .ok_or_else(|| direct(OAuthError::invalid_request("client_id is required")))?;
        if !is_valid_client_id(client_id) {
            return Err(direct(OAuthError::invalid_request("Malformed client_id")));
        }
        let client = self.registry.lookup(client_id).await.map_err(direct)?;

        // 2. Redirect URI, checked before it is trusted for error delivery
        let redirect_uri = request
            .redirect_uri
            .as_deref()
            .ok_or_else(|| direct(OAuthError::invalid_request("redirect_uri is required")))?;
        if !is_valid_redirect_uri(redirect_uri) || !client.has_redirect_uri(redirect_uri) {
            return Err(direct(OAuthError::invalid_request(
                "redirect_uri is not registered for this client",
            )));
        }

        // Invalid state is never echoed back
        let echo_state = request
            .state
            .as_deref()
            .filter(|s| is_valid_state(s, self.max_state_length))
            .map(str::to_string);
        let redirect = |error: OAuthError| AuthorizeError::Redirect {
            redirect_uri: redirect_uri.to_string(),
            error,
            state: echo_state.clone(),
        };

        // 3. Scope
        let scope = request
            .scope
            .as_deref()
            .ok_or_else(|| redirect(OAuthError::invalid_scope("scope is required")))?;
        let scopes = parse_scope(scope).map_err(redirect)?;
        if let Some(denied) = scopes.iter().find(|s| !client.allows_scope(s)) {
            return Err(redirect(OAuthError::invalid_scope(format!(
                "Scope not allowed for this client: {}",
                denied
            ))));
        }

        // 4. State
        let Some(state) = echo_state.clone() else {
            return Err(redirect(OAuthError::invalid_request(format!(
                "state is required: 1-{} characters of [A-Za-z0-9-._~]",
                self.max_state_length
            ))));
        };

        // 5. Response type
        match request.response_type.as_deref() {
            Some("code") => {}
            Some(other) => {
                return Err(redirect(OAuthError::unsupported_response_type(format!(
                    "response_type '{}' is not supported",
                    other
                ))));
            }
            None => {
                return Err(redirect(OAuthError::unsupported_response_type(
                    "response_type is required",
                )));
            }
        }

        let code_challenge = Self::code_challenge(request).map_err(redirect)?;

        // 6. User
        let user_id = self.users.resolve_user(&client.client_id).await.map_err(redirect)?;

        // 7. Code
        let issued = self
            .codes
            .issue_code(CodeGrant {
                client_id: client.client_id.clone(),
                user_id,
                redirect_uri: redirect_uri.to_string(),
                scopes,
                code_challenge,
            })
            .await
            .map_err(|e| redirect(OAuthError::server_error(e.to_string())))?;

        info!(
            client_id = %issued.client_id,
            user_id = %issued.user_id,
            scope = %issued.scopes.join(" "),
            pkce = issued.code_challenge.as_ref().map(|c| c.method.as_str()).unwrap_or("none"),
            "Authorization code issued"
        );

        // 8. Redirect
        Ok(AuthorizeRedirect {
            redirect_uri: issued.redirect_uri,
            code: issued.code,
            state,
        })
    }

    /// A challenge without a method defaults to `plain` (RFC 7636 Section 4.3).
    fn code_challenge(request: &AuthorizeRequest) -> Result<Option<CodeChallenge>, OAuthError> {
        match (
            request.code_challenge.as_deref(),
            request.code_challenge_method.as_deref(),
        ) {
            (None, None) => Ok(None),
            (None, Some(_)) => Err(OAuthError::invalid_request(
                "code_challenge_method sent without code_challenge",
            )),
            (Some(challenge), method) => {
                let method = match method {
                    None => PkceMethod::Plain,
                    Some(m) => PkceMethod::parse(m).ok_or_else(|| {
                        OAuthError::invalid_request(format!(
                            "Unsupported code_challenge_method: {}",
                            m
                        ))
                    })?,
                };
                Ok(Some(CodeChallenge {
                    challenge: challenge.to_string(),
                    method,
                }))
            }
        }
    }
}

fn direct(error: OAuthError) -> AuthorizeError {
    AuthorizeError::Direct(error)
}
