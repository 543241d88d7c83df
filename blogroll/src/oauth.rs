// Copyright (C) 2025-2026 Michael Herstine <sp1ff@pobox.com>
//
// This file is part of blogroll.
//
// blogroll is free software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// blogroll is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without
// even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with blogroll.  If not,
// see <http://www.gnu.org/licenses/>.

//! # OAuth login
//!
//! The second issuance path for the session credential. The provider itself is an external
//! collaborator hidden behind [IdentityProvider], which demands exactly one interesting
//! operation: exchange external proof (the authorization code from the provider's callback) for
//! a stable external-identity id plus profile fields. Everything else-- finding or creating the
//! local user, minting the token, setting the cookie-- is the same regardless of provider, and
//! converges on the same cookie the password path sets.
//!
//! A user who first arrives this way gets a *generated* username (see
//! [generated_username](crate::entities::generated_username)) & no password credential.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect},
    routing::get,
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use snafu::prelude::*;
use tracing::{error, info, warn};
use url::Url;

use crate::{
    authn::session_cookie,
    blogroll::Blogroll,
    counter_add,
    entities::{User, Username},
    http::ErrorResponseBody,
    metrics::{self, Sort},
    signing_keys,
    storage::{self, Backend as StorageBackend},
    token::{self, mint_token},
};

type StdResult<T, E> = std::result::Result<T, E>;

type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                        IdentityProvider                                        //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// What an external provider can tell us about a principal: a stable identifier in the
/// provider's namespace, and a human-readable display name
#[derive(Clone, Debug)]
pub struct ExternalIdentity {
    pub id: String,
    pub display_name: String,
}

/// A pluggable identity-resolution capability
///
/// Implementations own all provider-specific plumbing; the rest of the crate knows only this
/// interface.
#[async_trait]
pub trait IdentityProvider {
    /// Where to send the browser to begin the flow
    fn authorize_url(&self) -> Url;
    /// Exchange the callback's authorization code for a stable external identity
    async fn exchange(&self, code: &str) -> StdResult<ExternalIdentity, BoxedError>;
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                             Google                                             //
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Clone, Debug, Deserialize)]
pub struct GoogleConfig {
    #[serde(rename = "client-id")]
    pub client_id: String,
    #[serde(rename = "client-secret")]
    pub client_secret: SecretString,
    #[serde(rename = "redirect-uri")]
    pub redirect_uri: Url,
}

/// The Google implementation of [IdentityProvider]: standard OAuth 2.0 authorization-code flow
/// against Google's endpoints, then one userinfo fetch
pub struct Google {
    config: GoogleConfig,
    http: reqwest::Client,
}

impl Google {
    pub fn new(config: GoogleConfig) -> Google {
        Google {
            config,
            http: reqwest::Client::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GoogleTokenRsp {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    sub: String,
    name: Option<String>,
}

#[async_trait]
impl IdentityProvider for Google {
    fn authorize_url(&self) -> Url {
        Url::parse_with_params(
            "https://accounts.google.com/o/oauth2/v2/auth",
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", "openid profile email"),
            ],
        )
        .unwrap(/* known good */)
    }

    async fn exchange(&self, code: &str) -> StdResult<ExternalIdentity, BoxedError> {
        let token = self
            .http
            .post("https://oauth2.googleapis.com/token")
            .form(&[
                ("code", code),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.expose_secret()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json::<GoogleTokenRsp>()
            .await?;

        let info = self
            .http
            .get("https://openidconnect.googleapis.com/v1/userinfo")
            .bearer_auth(&token.access_token)
            .send()
            .await?
            .error_for_status()?
            .json::<GoogleUserInfo>()
            .await?;

        let display_name = info.name.unwrap_or_else(|| info.sub.clone());
        Ok(ExternalIdentity {
            id: info.sub,
            display_name,
        })
    }
}

/// The no-op implementation, installed when no provider is configured
pub struct Disabled {
    /// Where to bounce a hopeful caller (the client origin)
    pub fallback: Url,
}

#[async_trait]
impl IdentityProvider for Disabled {
    fn authorize_url(&self) -> Url {
        self.fallback.clone()
    }
    async fn exchange(&self, _code: &str) -> StdResult<ExternalIdentity, BoxedError> {
        Err("OAuth login is not configured on this instance".into())
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                       module Error type                                        //
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Failed to create user: {source}"))]
    AddUser { source: storage::Error },
    #[snafu(display("While exchanging the authorization code, {source}"))]
    Exchange { source: BoxedError },
    #[snafu(display("The callback carried no authorization code"))]
    NoCode,
    #[snafu(display("No signing keys available: {source}"))]
    NoKeys { source: signing_keys::Error },
    #[snafu(display("Failed to lookup user: {source}"))]
    Storage { source: storage::Error },
    #[snafu(display("Failed to mint a token for user {username}: {source}"))]
    Token {
        username: Username,
        #[snafu(source(from(token::Error, Box::new)))]
        source: Box<token::Error>,
    },
}

impl Error {
    pub fn as_status_and_msg(&self) -> (StatusCode, String) {
        match self {
            Error::Exchange { source } => (
                StatusCode::UNAUTHORIZED,
                format!("Authentication failed: {}", source),
            ),
            Error::NoCode => (
                StatusCode::BAD_REQUEST,
                "no authorization code".to_string(),
            ),
            Error::AddUser { source } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to create user: {}", source),
            ),
            Error::NoKeys { source } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!(
                    "No signing keys found ({}); did you configure the program?",
                    source
                ),
            ),
            Error::Storage { source } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Internal server error: {}", source),
            ),
            Error::Token {
                username, source, ..
            } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to mint a token for {}: {}", username, source),
            ),
        }
    }
}

impl axum::response::IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let (code, msg) = self.as_status_and_msg();
        (code, Json(ErrorResponseBody { error: msg })).into_response()
    }
}

type Result<T> = std::result::Result<T, Error>;

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                     `GET /api/auth/google`                                     //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Kick-off the flow: bounce the browser to the provider's authorization endpoint
async fn begin(State(state): State<Arc<Blogroll>>) -> axum::response::Response {
    Redirect::to(state.identity.authorize_url().as_str()).into_response()
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                `GET /api/auth/google/callback`                                 //
////////////////////////////////////////////////////////////////////////////////////////////////////

inventory::submit! { metrics::Registration::new("oauth.logins.successful", Sort::IntegralCounter) }
inventory::submit! { metrics::Registration::new("oauth.logins.failures", Sort::IntegralCounter) }

#[derive(Clone, Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
}

/// Find the local user claiming `identity`, or mint a fresh one
async fn find_or_create_user(
    storage: &(dyn StorageBackend + Send + Sync),
    identity: &ExternalIdentity,
) -> Result<User> {
    if let Some(user) = storage
        .user_for_external_id(&identity.id)
        .await
        .context(StorageSnafu)?
    {
        return Ok(user);
    }

    info!("Creating a new user for external identity {}", identity.id);
    // The generated username carries a random discriminator, so a collision is both unlikely &
    // transient; retry a few times rather than fail the login.
    let mut last_err = None;
    for _attempt in 0..3 {
        let user = User::new_external(&identity.id, &identity.display_name);
        match storage.add_user(&user).await {
            Ok(_) => return Ok(user),
            Err(storage::Error::UsernameClaimed { username }) => {
                warn!("Generated username {} is claimed; trying another", username);
                last_err = Some(storage::Error::UsernameClaimed { username });
            }
            Err(err) => return Err(Error::AddUser { source: err }),
        }
    }
    Err(Error::AddUser {
        source: last_err.unwrap(/* known good: the loop ran */),
    })
}

/// The provider's servers redirect the user here; both login & signup terminate by setting the
/// same session cookie the password path sets, then bouncing the browser back to the client.
async fn callback(
    State(state): State<Arc<Blogroll>>,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> axum::response::Response {
    async fn callback1(state: &Blogroll, params: &CallbackParams) -> Result<String> {
        let code = params.code.as_deref().ok_or(Error::NoCode)?;
        let identity = state
            .identity
            .exchange(code)
            .await
            .map_err(|source| Error::Exchange { source })?;
        let user = find_or_create_user(state.storage.as_ref(), &identity).await?;
        let (keyid, signing_key) = state.signing_keys.current().context(NoKeysSnafu)?;
        mint_token(
            user.username(),
            &user.id(),
            &keyid,
            &signing_key,
            &state.token_lifetime,
        )
        .context(TokenSnafu {
            username: user.username().clone(),
        })
    }

    match callback1(&state, &params).await {
        Ok(token) => {
            counter_add!(state.instruments, "oauth.logins.successful", 1, &[]);
            let jar = jar.add(session_cookie(&state, token));
            (jar, Redirect::to(state.client_origin.as_str())).into_response()
        }
        // A failed or abandoned flow bounces back to the client, sans cookie
        Err(err @ (Error::Exchange { .. } | Error::NoCode)) => {
            error!("OAuth login failed: {}", err);
            counter_add!(state.instruments, "oauth.logins.failures", 1, &[]);
            Redirect::to(state.client_origin.as_str()).into_response()
        }
        Err(err) => {
            error!("{:#?}", err);
            counter_add!(state.instruments, "oauth.logins.failures", 1, &[]);
            err.into_response()
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                           Public API                                           //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Return a router for the OAuth API
pub fn make_router(state: Arc<Blogroll>) -> Router<Arc<Blogroll>> {
    Router::new()
        .route("/google", get(begin))
        .route("/google/callback", get(callback))
        .with_state(state)
}
