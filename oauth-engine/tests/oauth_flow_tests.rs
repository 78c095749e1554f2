//! Full authorization code flow integration tests
//!
//! Drives the engines through the same query strings and form bodies an HTTP
//! front end would pass them.

use oauth_engine::oauth::pkce::s256_challenge;
use oauth_engine::{
    AuthorizeError, AuthorizeRequest, Client, OAuthConfig, OAuthError, OAuthServer,
    RevocationRequest, TokenRequest, TokenResponse,
};
use std::collections::HashMap;
use url::Url;

const REDIRECT: &str = "https%3A%2F%2Fcb%2Fx";

/// Server with client `cid12345` registered
async fn test_server(config: OAuthConfig) -> OAuthServer {
    let server = OAuthServer::in_memory(config).unwrap();
    server
        .registry
        .register(&Client::new(
            "cid12345",
            "secretpass",
            vec!["https://cb/x".to_string()],
            vec!["read".to_string(), "write".to_string()],
        ))
        .await
        .unwrap();
    server
}

async fn register(server: &OAuthServer, client_id: &str) {
    server
        .registry
        .register(&Client::new(
            client_id,
            "secretpass",
            vec!["https://cb/x".to_string()],
            vec!["read".to_string(), "write".to_string()],
        ))
        .await
        .unwrap();
}

/// Run `/authorize` and return the parameters of the redirect location
async fn authorize(
    server: &OAuthServer,
    query: &str,
) -> Result<HashMap<String, String>, AuthorizeError> {
    let request = AuthorizeRequest::from_query(query).unwrap();
    let redirect = server.authorization.authorize(&request).await?;
    let location = Url::parse(&redirect.location()).unwrap();
    Ok(location.query_pairs().into_owned().collect())
}

async fn authorize_code(server: &OAuthServer, client_id: &str, extra: &str) -> String {
    let query = format!(
        "client_id={}&redirect_uri={}&response_type=code&scope=read&state=abcdef{}",
        client_id, REDIRECT, extra
    );
    authorize(server, &query).await.unwrap()["code"].clone()
}

async fn post_token(server: &OAuthServer, body: &str) -> Result<TokenResponse, OAuthError> {
    server.token.token(&TokenRequest::from_form(body).unwrap()).await
}

fn code_body(code: &str, client_id: &str) -> String {
    format!(
        "grant_type=authorization_code&code={}&redirect_uri={}&client_id={}&client_secret=secretpass",
        code, REDIRECT, client_id
    )
}

fn refresh_body(refresh_token: &str, client_id: &str) -> String {
    format!(
        "grant_type=refresh_token&refresh_token={}&client_id={}&client_secret=secretpass",
        refresh_token, client_id
    )
}

#[tokio::test]
async fn test_complete_flow() {
    // 1. Register
    let server = test_server(OAuthConfig::default()).await;

    // 2. Authorize
    let params = authorize(
        &server,
        "client_id=cid12345&redirect_uri=https://cb/x&response_type=code&scope=read&state=abcdef",
    )
    .await
    .unwrap();
    assert_eq!(params["state"], "abcdef");
    let code = params["code"].clone();
    assert!(!code.is_empty());

    // 3. Exchange
    let tokens = post_token(&server, &code_body(&code, "cid12345")).await.unwrap();
    assert!(!tokens.access_token.is_empty());
    assert!(!tokens.refresh_token.is_empty());
    assert_eq!(tokens.expires_in, 3600);
    assert_eq!(tokens.token_type, "Bearer");
    assert_eq!(tokens.scope, "read");

    let json = serde_json::to_value(&tokens).unwrap();
    assert_eq!(json["expires_in"], 3600);
    assert_eq!(json["token_type"], "Bearer");

    // 4. Replay
    let err = post_token(&server, &code_body(&code, "cid12345")).await.unwrap_err();
    assert_eq!(err.error_code(), "invalid_grant");
    assert_eq!(err.status_code(), 400);

    // 5. Refresh, then reuse of the old refresh token
    let rotated = post_token(&server, &refresh_body(&tokens.refresh_token, "cid12345"))
        .await
        .unwrap();
    assert_ne!(rotated.refresh_token, tokens.refresh_token);
    assert_ne!(rotated.access_token, tokens.access_token);

    let err = post_token(&server, &refresh_body(&tokens.refresh_token, "cid12345"))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "invalid_grant");

    // The rotated refresh token still works
    assert!(
        post_token(&server, &refresh_body(&rotated.refresh_token, "cid12345"))
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn test_pkce_s256_flow() {
    let server = test_server(OAuthConfig::default()).await;
    let challenge = format!(
        "&code_challenge={}&code_challenge_method=S256",
        s256_challenge("verifier123")
    );

    let code = authorize_code(&server, "cid12345", &challenge).await;
    let body = format!("{}&code_verifier=verifier123", code_body(&code, "cid12345"));
    assert!(post_token(&server, &body).await.is_ok());

    let code = authorize_code(&server, "cid12345", &challenge).await;
    let body = format!("{}&code_verifier=wrong", code_body(&code, "cid12345"));
    let err = post_token(&server, &body).await.unwrap_err();
    assert_eq!(err.error_code(), "invalid_grant");

    // A failed verification still consumes the code
    let body = format!("{}&code_verifier=verifier123", code_body(&code, "cid12345"));
    assert_eq!(
        post_token(&server, &body).await.unwrap_err().error_code(),
        "invalid_grant"
    );
}

#[tokio::test]
async fn test_pkce_plain_flow() {
    let server = test_server(OAuthConfig::default()).await;
    let code = authorize_code(
        &server,
        "cid12345",
        "&code_challenge=plain-verifier-value&code_challenge_method=plain",
    )
    .await;

    let body = format!("{}&code_verifier=plain-verifier-value", code_body(&code, "cid12345"));
    assert!(post_token(&server, &body).await.is_ok());
}

#[tokio::test]
async fn test_code_bound_to_client() {
    let server = test_server(OAuthConfig::default()).await;
    register(&server, "client-b1").await;

    let code = authorize_code(&server, "cid12345", "").await;
    let err = post_token(&server, &code_body(&code, "client-b1")).await.unwrap_err();
    assert_eq!(err.error_code(), "invalid_grant");
}

#[tokio::test]
async fn test_refresh_token_bound_to_client() {
    let server = test_server(OAuthConfig::default()).await;
    register(&server, "client-b1").await;

    let code = authorize_code(&server, "cid12345", "").await;
    let tokens = post_token(&server, &code_body(&code, "cid12345")).await.unwrap();

    let err = post_token(&server, &refresh_body(&tokens.refresh_token, "client-b1"))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "invalid_grant");

    // Client A's token was not burned by client B's attempt
    assert!(
        post_token(&server, &refresh_body(&tokens.refresh_token, "cid12345"))
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn test_scope_fidelity() {
    let server = test_server(OAuthConfig::default()).await;
    let params = authorize(
        &server,
        "client_id=cid12345&redirect_uri=https://cb/x&response_type=code&scope=write%20read&state=abcdef",
    )
    .await
    .unwrap();

    let tokens = post_token(&server, &code_body(&params["code"], "cid12345"))
        .await
        .unwrap();
    assert_eq!(tokens.scope, "write read");

    let introspection = server.token.introspect(&tokens.access_token).await;
    assert_eq!(introspection.scope.as_deref(), Some("write read"));
    assert_eq!(introspection.sub.as_deref(), Some("demo-user"));

    let rotated = post_token(&server, &refresh_body(&tokens.refresh_token, "cid12345"))
        .await
        .unwrap();
    assert_eq!(rotated.scope, "write read");
}

#[tokio::test]
async fn test_expired_code_behaves_like_unknown() {
    let config = OAuthConfig {
        authorization_code_lifetime_secs: 0,
        ..Default::default()
    };
    let server = test_server(config).await;

    let code = authorize_code(&server, "cid12345", "").await;
    let expired = post_token(&server, &code_body(&code, "cid12345")).await.unwrap_err();
    let unknown = post_token(&server, &code_body("never-issued", "cid12345"))
        .await
        .unwrap_err();
    assert_eq!(expired, unknown);
}

#[tokio::test]
async fn test_expired_tokens() {
    let config = OAuthConfig {
        access_token_lifetime_secs: 0,
        refresh_token_lifetime_secs: 0,
        ..Default::default()
    };
    let server = test_server(config).await;

    let code = authorize_code(&server, "cid12345", "").await;
    let tokens = post_token(&server, &code_body(&code, "cid12345")).await.unwrap();
    assert_eq!(tokens.expires_in, 0);

    assert!(!server.token.introspect(&tokens.access_token).await.active);
    let err = post_token(&server, &refresh_body(&tokens.refresh_token, "cid12345"))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "invalid_grant");
}

#[tokio::test]
async fn test_purge_expired() {
    let config = OAuthConfig {
        authorization_code_lifetime_secs: 0,
        access_token_lifetime_secs: 0,
        refresh_token_lifetime_secs: 0,
        ..Default::default()
    };
    let server = test_server(config).await;

    authorize_code(&server, "cid12345", "").await;
    let tokens = server
        .token
        .tokens()
        .issue_token_pair("cid12345", "demo-user", &["read".to_string()])
        .await
        .unwrap();
    assert_eq!(tokens.0.client_id, "cid12345");

    assert_eq!(server.token.purge_expired().await.unwrap(), 3);
    assert_eq!(server.token.purge_expired().await.unwrap(), 0);
}

#[tokio::test]
async fn test_authorize_error_redirects() {
    let server = test_server(OAuthConfig::default()).await;

    let err = authorize(
        &server,
        "client_id=cid12345&redirect_uri=https://cb/x&response_type=token&scope=read&state=abcdef",
    )
    .await
    .unwrap_err();
    let location = Url::parse(&err.location().unwrap()).unwrap();
    let params: HashMap<String, String> = location.query_pairs().into_owned().collect();
    assert_eq!(params["error"], "unsupported_response_type");
    assert_eq!(params["state"], "abcdef");
    assert!(params.contains_key("error_description"));

    // Unregistered redirect URI is never used for delivery
    let err = authorize(
        &server,
        "client_id=cid12345&redirect_uri=https://attacker.example/cb&response_type=code&scope=read&state=abcdef",
    )
    .await
    .unwrap_err();
    assert!(err.location().is_none());
    assert_eq!(err.error().status_code(), 400);
    let body = serde_json::to_value(err.error().to_response()).unwrap();
    assert_eq!(body["error"], "invalid_request");

    // Unknown client
    let err = authorize(
        &server,
        "client_id=nobody123&redirect_uri=https://cb/x&response_type=code&scope=read&state=abcdef",
    )
    .await
    .unwrap_err();
    assert_eq!(err.error().status_code(), 404);
}

#[tokio::test]
async fn test_token_request_errors() {
    let server = test_server(OAuthConfig::default()).await;

    let err = post_token(
        &server,
        "grant_type=password&client_id=cid12345&client_secret=secretpass",
    )
    .await
    .unwrap_err();
    assert_eq!(err.error_code(), "unsupported_grant_type");

    let err = post_token(
        &server,
        "grant_type=authorization_code&client_id=cid12345&client_secret=secretpass",
    )
    .await
    .unwrap_err();
    assert_eq!(err.error_code(), "invalid_request");

    let err = post_token(
        &server,
        "grant_type=authorization_code&code=x&redirect_uri=https://cb/x&client_id=cid12345&client_secret=nope",
    )
    .await
    .unwrap_err();
    assert_eq!(err.error_code(), "invalid_client");
    assert_eq!(err.status_code(), 401);

    assert!(matches!(
        TokenRequest::from_form("grant_type=a&grant_type=b"),
        Err(OAuthError::InvalidRequest(_))
    ));
}

#[tokio::test]
async fn test_basic_auth_token_request() {
    use base64::{Engine as _, engine::general_purpose::STANDARD};

    let server = test_server(OAuthConfig::default()).await;
    let code = authorize_code(&server, "cid12345", "").await;

    let header = format!("Basic {}", STANDARD.encode("cid12345:secretpass"));
    let body = format!(
        "grant_type=authorization_code&code={}&redirect_uri={}",
        code, REDIRECT
    );
    let request = TokenRequest::from_form(&body)
        .unwrap()
        .with_authorization_header(Some(&header))
        .unwrap();
    assert!(server.token.token(&request).await.is_ok());
}

#[tokio::test]
async fn test_revocation() {
    let server = test_server(OAuthConfig::default()).await;
    let code = authorize_code(&server, "cid12345", "").await;
    let tokens = post_token(&server, &code_body(&code, "cid12345")).await.unwrap();

    let body = format!(
        "token={}&token_type_hint=refresh_token&client_id=cid12345&client_secret=secretpass",
        tokens.refresh_token
    );
    server
        .token
        .revoke(&RevocationRequest::from_form(&body).unwrap())
        .await
        .unwrap();

    // Refresh token gone, access token untouched
    let err = post_token(&server, &refresh_body(&tokens.refresh_token, "cid12345"))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "invalid_grant");
    assert!(server.token.introspect(&tokens.access_token).await.active);

    // Revoking again is still a success
    server
        .token
        .revoke(&RevocationRequest::from_form(&body).unwrap())
        .await
        .unwrap();

    // Bad credentials are not silent
    let body = format!(
        "token={}&client_id=cid12345&client_secret=wrongpass",
        tokens.access_token
    );
    let err = server
        .token
        .revoke(&RevocationRequest::from_form(&body).unwrap())
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "invalid_client");
}
