//! Endpoint request parameters
//!
//! Parses `application/x-www-form-urlencoded` query strings and bodies into
//! typed requests. A parameter sent more than once is rejected, and a
//! parameter sent with an empty value is treated as omitted (RFC 6749
//! Section 3.1).

use crate::oauth::error::OAuthError;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Decode form input into a name/value map.
fn parse_params(input: &str) -> Result<HashMap<String, String>, OAuthError> {
    let input = input.strip_prefix('?').unwrap_or(input);
    let mut params = HashMap::new();

    for pair in input.split('&').filter(|pair| !pair.is_empty()) {
        let (raw_name, raw_value) = pair.split_once('=').unwrap_or((pair, ""));
        let (Some(name), Some(value)) = (form_decode(raw_name), form_decode(raw_value)) else {
            return Err(OAuthError::invalid_request(format!(
                "Malformed encoding in parameter: {}",
                raw_name
            )));
        };
        if name.is_empty() {
            return Err(OAuthError::invalid_request("Parameter without a name"));
        }
        if params.contains_key(&name) {
            return Err(OAuthError::invalid_request(format!(
                "Parameter included more than once: {}",
                name
            )));
        }
        params.insert(name, value);
    }

    params.retain(|_, value| !value.is_empty());
    Ok(params)
}

/// Decode one `application/x-www-form-urlencoded` component, or `None` if
/// the percent-decoded bytes are not UTF-8.
fn form_decode(raw: &str) -> Option<String> {
    urlencoding::decode(&raw.replace('+', " "))
        .ok()
        .map(|decoded| decoded.into_owned())
}

/// Authorization request (RFC 6749 Section 4.1.1, RFC 7636 Section 4.3)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorizeRequest {
    pub response_type: Option<String>,
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub scope: Option<String>,
    pub state: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
}

impl AuthorizeRequest {
    /// Parse the query component of an `/authorize` URL (leading `?` optional).
    pub fn from_query(query: &str) -> Result<Self, OAuthError> {
        let mut params = parse_params(query)?;
        Ok(Self {
            response_type: params.remove("response_type"),
            client_id: params.remove("client_id"),
            redirect_uri: params.remove("redirect_uri"),
            scope: params.remove("scope"),
            state: params.remove("state"),
            code_challenge: params.remove("code_challenge"),
            code_challenge_method: params.remove("code_challenge_method"),
        })
    }
}

/// Token request (RFC 6749 Sections 4.1.3 and 6)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenRequest {
    pub grant_type: Option<String>,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub code_verifier: Option<String>,
    pub refresh_token: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl TokenRequest {
    pub fn from_form(body: &str) -> Result<Self, OAuthError> {
        let mut params = parse_params(body)?;
        Ok(Self {
            grant_type: params.remove("grant_type"),
            code: params.remove("code"),
            redirect_uri: params.remove("redirect_uri"),
            code_verifier: params.remove("code_verifier"),
            refresh_token: params.remove("refresh_token"),
            client_id: params.remove("client_id"),
            client_secret: params.remove("client_secret"),
        })
    }

    /// Merge credentials from an `Authorization` header into the request.
    pub fn with_authorization_header(mut self, header: Option<&str>) -> Result<Self, OAuthError> {
        let credentials =
            ClientCredentials::resolve(header, self.client_id.take(), self.client_secret.take())?;
        self.client_id = Some(credentials.client_id);
        self.client_secret = Some(credentials.client_secret);
        Ok(self)
    }

    pub(crate) fn credentials(&self) -> Result<ClientCredentials, OAuthError> {
        ClientCredentials::resolve(None, self.client_id.clone(), self.client_secret.clone())
    }
}

/// Revocation request (RFC 7009 Section 2.1)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RevocationRequest {
    pub token: Option<String>,
    pub token_type_hint: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl RevocationRequest {
    pub fn from_form(body: &str) -> Result<Self, OAuthError> {
        let mut params = parse_params(body)?;
        Ok(Self {
            token: params.remove("token"),
            token_type_hint: params.remove("token_type_hint"),
            client_id: params.remove("client_id"),
            client_secret: params.remove("client_secret"),
        })
    }

    pub fn with_authorization_header(mut self, header: Option<&str>) -> Result<Self, OAuthError> {
        let credentials =
            ClientCredentials::resolve(header, self.client_id.take(), self.client_secret.take())?;
        self.client_id = Some(credentials.client_id);
        self.client_secret = Some(credentials.client_secret);
        Ok(self)
    }

    pub(crate) fn credentials(&self) -> Result<ClientCredentials, OAuthError> {
        ClientCredentials::resolve(None, self.client_id.clone(), self.client_secret.clone())
    }
}

/// Client id and secret presented at the token endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl ClientCredentials {
    /// Decode an `Authorization: Basic` header value (RFC 6749 Section 2.3.1).
    ///
    /// Id and secret are form-urlencoded before being joined with `:`.
    pub fn from_basic_auth(header: &str) -> Result<Self, OAuthError> {
        let (scheme, encoded) = header
            .trim()
            .split_once(' ')
            .ok_or_else(|| OAuthError::invalid_client("Malformed Authorization header"))?;

        if !scheme.eq_ignore_ascii_case("basic") {
            return Err(OAuthError::invalid_client(format!(
                "Unsupported authentication scheme: {}",
                scheme
            )));
        }

        let decoded = STANDARD
            .decode(encoded.trim())
            .map_err(|_| OAuthError::invalid_client("Malformed Basic credentials"))?;
        let decoded = String::from_utf8(decoded)
            .map_err(|_| OAuthError::invalid_client("Malformed Basic credentials"))?;

        let (id, secret) = decoded
            .split_once(':')
            .ok_or_else(|| OAuthError::invalid_client("Malformed Basic credentials"))?;

        match (form_decode(id), form_decode(secret)) {
            (Some(client_id), Some(client_secret)) => Ok(Self {
                client_id,
                client_secret,
            }),
            _ => Err(OAuthError::invalid_client("Malformed Basic credentials")),
        }
    }

    /// Pick credentials from either the header or the body, never both.
    pub fn resolve(
        header: Option<&str>,
        body_id: Option<String>,
        body_secret: Option<String>,
    ) -> Result<Self, OAuthError> {
        match header {
            Some(header) => {
                if body_id.is_some() || body_secret.is_some() {
                    return Err(OAuthError::invalid_request(
                        "Client credentials sent in both the header and the body",
                    ));
                }
                Self::from_basic_auth(header)
            }
            None => match (body_id, body_secret) {
                (Some(client_id), Some(client_secret)) => Ok(Self {
                    client_id,
                    client_secret,
                }),
                _ => Err(OAuthError::invalid_client("Client authentication required")),
            },
        }
    }
}
