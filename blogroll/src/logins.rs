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

//! # Login API
//!
//! Password login, logout & session status. Login vends the session JWT (see
//! [token](crate::token)) in an HTTP-only cookie; logout clears the cookie & nothing else--
//! sessions are stateless, there is no server-side revocation list, and a token extracted from a
//! pre-existing cookie remains technically valid until natural expiry. Acceptable, given that the
//! cookie is the only transport the client ever uses.

use std::sync::Arc;

use axum::{
    extract::{rejection::ExtensionRejection, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use opentelemetry::KeyValue;
use secrecy::SecretString;
use serde::Deserialize;
use snafu::prelude::*;
use tracing::{error, info};

use crate::{
    authn::{self, check_password, session_cookie, SESSION_COOKIE},
    blogroll::Blogroll,
    counter_add,
    entities::{User, Username},
    http::ErrorResponseBody,
    metrics::{self, Sort},
    signing_keys,
    token::{self, mint_token},
    views::{self, ShapedUser},
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("{username} is not a valid username"))]
    BadUsername {
        username: String,
        source: crate::entities::Error,
    },
    #[snafu(display("Invalid credentials: {source}"))]
    InvalidCredentials { source: authn::Error },
    #[snafu(display("No signing keys available: {source}"))]
    NoKeys { source: signing_keys::Error },
    #[snafu(display("Failed to mint a token for user {username}: {source}"))]
    Token {
        username: Username,
        #[snafu(source(from(token::Error, Box::new)))]
        source: Box<token::Error>,
    },
    #[snafu(display("Unauthorized"))]
    Unauthenticated,
}

impl Error {
    pub fn as_status_and_msg(&self) -> (StatusCode, String) {
        match self {
            // Authorization failure-- don't tell a potential attacker the way in which they
            // failed; a malformed username reads the same as an unknown one
            Error::BadUsername { .. } => (
                StatusCode::UNAUTHORIZED,
                "invalid username or password".to_string(),
            ),
            Error::InvalidCredentials { .. } => (
                StatusCode::UNAUTHORIZED,
                "invalid username or password".to_string(),
            ),
            Error::Unauthenticated => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            // Internal failure-- own up to it:
            Error::NoKeys { source } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!(
                    "No signing keys found ({}); did you configure the program?",
                    source
                ),
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

type StdResult<T, E> = std::result::Result<T, E>;

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                       `POST /api/login`                                        //
////////////////////////////////////////////////////////////////////////////////////////////////////

inventory::submit! { metrics::Registration::new("user.logins.successful", Sort::IntegralCounter) }
inventory::submit! { metrics::Registration::new("user.logins.failures", Sort::IntegralCounter) }

#[derive(Clone, Debug, Deserialize)]
struct LoginReq {
    username: String,
    password: SecretString,
}

/// Login as an existing user
///
/// On success, this endpoint sets the session cookie & returns the user. Note the username is
/// taken as free text: a malformed username is indistinguishable, from the caller's perspective,
/// from an unknown one.
async fn login(
    State(state): State<Arc<Blogroll>>,
    jar: CookieJar,
    Json(login_req): Json<LoginReq>,
) -> axum::response::Response {
    async fn login1(
        state: &Blogroll,
        username: &str,
        password: &SecretString,
    ) -> Result<(String, ShapedUser)> {
        let username = Username::new(username).context(BadUsernameSnafu {
            username: username.to_owned(),
        })?;
        let user = check_password(state.storage.as_ref(), &username, password)
            .await
            .context(InvalidCredentialsSnafu)?;
        let (keyid, signing_key) = state.signing_keys.current().context(NoKeysSnafu)?;
        let token = mint_token(
            &username,
            &user.id(),
            &keyid,
            &signing_key,
            &state.token_lifetime,
        )
        .context(TokenSnafu {
            username: username.clone(),
        })?;
        Ok((token, views::shape_user(&user)))
    }

    match login1(&state, &login_req.username, &login_req.password).await {
        Ok((token, user)) => {
            info!("Logged-in user {}", login_req.username);
            counter_add!(
                state.instruments,
                "user.logins.successful",
                1,
                &[KeyValue::new("username", login_req.username.to_string())]
            );
            let jar = jar.add(session_cookie(&state, token));
            (StatusCode::OK, jar, Json(user)).into_response()
        }
        Err(err) => {
            error!("Login failed for {}: {:?}", login_req.username, err);
            counter_add!(
                state.instruments,
                "user.logins.failures",
                1,
                &[KeyValue::new("username", login_req.username.to_string())]
            );
            err.into_response()
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                   `POST /api/login/logout`                                     //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Clear the session cookie; 204
async fn logout(jar: CookieJar) -> axum::response::Response {
    let jar = jar.remove(Cookie::build((SESSION_COOKIE, "")).path("/"));
    (StatusCode::NO_CONTENT, jar).into_response()
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                    `GET /api/login/status`                                     //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Return the current session's user
async fn status(
    user: StdResult<Extension<User>, ExtensionRejection>,
) -> axum::response::Response {
    match user {
        Ok(Extension(user)) => (StatusCode::OK, Json(views::shape_user(&user))).into_response(),
        Err(_) => Error::Unauthenticated.into_response(),
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                           Public API                                           //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Return a router for the Login API
pub fn make_router(state: Arc<Blogroll>) -> Router<Arc<Blogroll>> {
    Router::new()
        .route("/", post(login))
        .route("/logout", post(logout))
        .route("/status", get(status))
        .with_state(state)
}
