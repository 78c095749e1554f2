//! Walks the full authorization code flow against an in-memory engine
//!
//! register -> authorize -> token -> refresh -> revoke, printing each
//! response as JSON.

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use oauth_engine::{
    AuthorizeRequest, Client, OAuthConfig, OAuthServer, RevocationRequest, TokenRequest,
    oauth::pkce::s256_challenge,
};
use std::path::PathBuf;
use std::process;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "oauth-flow")]
#[command(about = "Drive the OAuth authorization code flow end to end")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// JSON configuration file
    #[arg(short, long, global = true, env = "OAUTH_ENGINE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the demo flow
    Demo {
        /// PKCE code verifier; omit to run without PKCE
        #[arg(long)]
        code_verifier: Option<String>,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let result = match load_config(cli.config.as_ref()) {
        Ok(config) => match cli.command {
            Some(Commands::Config) => show_config(&config),
            Some(Commands::Demo { code_verifier }) => run_demo(config, code_verifier).await,
            None => run_demo(config, Some("verifier123".to_string())).await,
        },
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        error!("Operation failed: {:#}", e);
        process::exit(1);
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<OAuthConfig> {
    let Some(path) = path else {
        return Ok(OAuthConfig::default());
    };

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let config = OAuthConfig::from_json_str(&contents)
        .with_context(|| format!("Invalid configuration in {}", path.display()))?;
    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

fn show_config(config: &OAuthConfig) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

async fn run_demo(config: OAuthConfig, code_verifier: Option<String>) -> Result<()> {
    let server = OAuthServer::in_memory(config)?;

    println!("▶ Register client");
    server
        .registry
        .register(&Client::new(
            "cid12345",
            "secretpass",
            vec!["https://cb/x".to_string()],
            vec!["read".to_string(), "write".to_string()],
        ))
        .await?;
    println!("  registered cid12345");

    println!("▶ Authorize");
    let mut query = String::from(
        "client_id=cid12345&redirect_uri=https%3A%2F%2Fcb%2Fx&response_type=code&scope=read+write&state=abcdef",
    );
    if let Some(verifier) = &code_verifier {
        query.push_str(&format!(
            "&code_challenge={}&code_challenge_method=S256",
            s256_challenge(verifier)
        ));
    }
    let redirect = server
        .authorization
        .authorize(&AuthorizeRequest::from_query(&query)?)
        .await
        .map_err(|e| anyhow!("authorize failed: {}", e))?;
    println!("  302 Location: {}", redirect.location());

    println!("▶ Exchange code");
    let mut body = format!(
        "grant_type=authorization_code&code={}&redirect_uri=https%3A%2F%2Fcb%2Fx&client_id=cid12345&client_secret=secretpass",
        redirect.code
    );
    if let Some(verifier) = &code_verifier {
        body.push_str(&format!("&code_verifier={}", verifier));
    }
    let tokens = server.token.token(&TokenRequest::from_form(&body)?).await?;
    println!("  {}", serde_json::to_string(&tokens)?);

    println!("▶ Replay code");
    match server.token.token(&TokenRequest::from_form(&body)?).await {
        Ok(_) => return Err(anyhow!("authorization code was accepted twice")),
        Err(e) => println!("  {}", serde_json::to_string(&e.to_response())?),
    }

    println!("▶ Refresh");
    let body = format!(
        "grant_type=refresh_token&refresh_token={}&client_id=cid12345&client_secret=secretpass",
        tokens.refresh_token
    );
    let rotated = server.token.token(&TokenRequest::from_form(&body)?).await?;
    println!("  {}", serde_json::to_string(&rotated)?);

    println!("▶ Revoke");
    let body = format!(
        "token={}&token_type_hint=access_token&client_id=cid12345&client_secret=secretpass",
        rotated.access_token
    );
    server
        .token
        .revoke(&RevocationRequest::from_form(&body)?)
        .await?;
    let introspection = server.token.introspect(&rotated.access_token).await;
    println!("  {}", serde_json::to_string(&introspection)?);

    Ok(())
}
