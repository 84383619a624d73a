// src/auth.rs
//! One-off OAuth code flow that mints a permanent Reddit refresh token.
//!
//! The user opens the printed URL, approves the app, and pastes back the
//! `http://localhost:8080/?state=...&code=...` URL the browser lands on.

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use url::Url;

use crate::config::app::RedditCredentials;
use crate::publish::reddit::REDDIT_AUTH_BASE;

pub const REDIRECT_URI: &str = "http://localhost:8080";
pub const SCOPES: &[&str] = &["identity", "submit", "read", "flair"];
pub const AUTH_STATE: &str = "cs2poster-auth";

pub fn authorize_url(client_id: &str) -> Result<Url> {
    let mut url = Url::parse(&format!("{REDDIT_AUTH_BASE}/api/v1/authorize"))?;
    url.query_pairs_mut()
        .append_pair("client_id", client_id)
        .append_pair("response_type", "code")
        .append_pair("state", AUTH_STATE)
        .append_pair("redirect_uri", REDIRECT_URI)
        .append_pair("duration", "permanent")
        .append_pair("scope", &SCOPES.join(" "));
    Ok(url)
}

/// Pull the authorization `code` out of the pasted redirect URL.
pub fn code_from_redirect(pasted: &str) -> Result<String> {
    let pasted = pasted.trim();
    if pasted.is_empty() {
        bail!("no redirect URL provided");
    }
    let url = Url::parse(pasted).with_context(|| format!("not a valid URL: {pasted:?}"))?;

    let mut code = None;
    let mut state = None;
    for (k, v) in url.query_pairs() {
        match k.as_ref() {
            "error" => bail!("authorization was refused: {v}"),
            "code" => code = Some(v.trim().to_string()),
            "state" => state = Some(v.into_owned()),
            _ => {}
        }
    }
    if let Some(s) = state.filter(|s| s != AUTH_STATE) {
        bail!("state mismatch in redirect URL (got {s:?})");
    }
    code.filter(|c| !c.is_empty())
        .ok_or_else(|| anyhow!("redirect URL has no `code` parameter; paste the full URL"))
}

#[derive(Debug, Deserialize)]
struct CodeExchange {
    refresh_token: Option<String>,
    error: Option<String>,
}

/// Trade an authorization code for a refresh token.
pub async fn exchange_code(creds: &RedditCredentials, code: &str) -> Result<String> {
    let client = reqwest::Client::builder()
        .user_agent(creds.user_agent.clone())
        .build()?;
    let resp = client
        .post(format!("{REDDIT_AUTH_BASE}/api/v1/access_token"))
        .basic_auth(&creds.client_id, Some(&creds.client_secret))
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", REDIRECT_URI),
        ])
        .send()
        .await
        .context("token request failed")?;
    let status = resp.status();
    let body: CodeExchange = resp
        .json()
        .await
        .with_context(|| format!("unexpected token response (HTTP {status})"))?;
    match (body.refresh_token, body.error) {
        (Some(rt), _) => Ok(rt),
        (None, Some(err)) => bail!("token exchange refused: {err}"),
        (None, None) => bail!("token response (HTTP {status}) carried no refresh_token"),
    }
}

/// Interactive flow behind `auth refresh-token`.
pub async fn run_refresh_token_flow(creds: &RedditCredentials) -> Result<String> {
    let url = authorize_url(&creds.client_id)?;
    tracing::info!(redirect_uri = REDIRECT_URI, "make sure the Reddit app uses exactly this redirect URI");

    let mut stdout = tokio::io::stdout();
    stdout
        .write_all(
            format!(
                "\nOpen this URL in your browser and allow access:\n\n  {url}\n\n\
                 Then paste the full URL you were redirected to ({REDIRECT_URI}/...):\n> "
            )
            .as_bytes(),
        )
        .await?;
    stdout.flush().await?;

    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("reading redirect URL from stdin")?;

    let code = code_from_redirect(&line)?;
    let token = exchange_code(creds, &code).await?;
    tracing::info!("obtained refresh token");
    Ok(token)
}
