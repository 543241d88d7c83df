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

//! # blogroll session resolution
//!
//! The session credential is a JWT in an HTTP-only cookie (see [token](crate::token)). All
//! protected routes resolve it the same way: read the cookie, verify signature & expiry, resolve
//! the user id to a *live* user record, and attach the resolved [User] to the request's
//! extensions. Handlers then receive identity as an explicit `Extension<User>` parameter--
//! never as ambient state.
//!
//! A missing cookie is not an error here: the request proceeds un-authenticated and each handler
//! decides whether that's acceptable (the read-only blog endpoints say yes, everything else 401s
//! through the `Extension` rejection). An *invalid* credential, on the other hand, fails the
//! request on the spot.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use secrecy::SecretString;
use snafu::{prelude::*, Backtrace};
use tracing::{debug, error, info};

use crate::{
    blogroll::Blogroll,
    counter_add,
    entities::{self, User, UserId, Username},
    http::ErrorResponseBody,
    metrics::{self, Sort},
    signing_keys::SigningKeys,
    storage::{self, Backend as StorageBackend},
    token::{self, verify_token},
};

pub const SESSION_COOKIE: &str = "token";

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Incorrect password for {username}"))]
    BadPassword {
        username: Username,
        #[snafu(source(from(entities::Error, Box::new)))]
        source: Box<entities::Error>,
    },
    #[snafu(display("No session cookie accompanied this request"))]
    NoCookie { backtrace: Backtrace },
    #[snafu(display("Failed to verify token: {source}"))]
    Token {
        #[snafu(source(from(token::Error, Box::new)))]
        source: Box<token::Error>,
    },
    #[snafu(display("Unknown username {username}"))]
    UnknownUser { username: Username },
    #[snafu(display("Failed to lookup user: {source}"))]
    User { source: storage::Error },
    #[snafu(display("The session names user {user_id}, who no longer exists"))]
    UserGone {
        user_id: UserId,
        backtrace: Backtrace,
    },
}

impl Error {
    pub fn as_status_and_msg(&self) -> (StatusCode, String) {
        match self {
            // Authentication failures-- don't tell a potential attacker the way in which they
            // failed, beyond what the client needs to render
            Error::BadPassword { .. } => (
                StatusCode::UNAUTHORIZED,
                "invalid username or password".to_string(),
            ),
            Error::NoCookie { .. } => (StatusCode::UNAUTHORIZED, "token missing".to_string()),
            Error::Token { .. } => (
                StatusCode::UNAUTHORIZED,
                "token invalid or expired".to_string(),
            ),
            Error::UnknownUser { .. } => (
                StatusCode::UNAUTHORIZED,
                "invalid username or password".to_string(),
            ),
            Error::UserGone { .. } => (StatusCode::UNAUTHORIZED, "user not found".to_string()),
            // Internal failure-- own up to it:
            Error::User { source } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Internal server error looking-up user: {}", source),
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
//                                Authentication Utility Functions                                //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Authenticate a user by [Username] and password. On success, return the full [User]; on failure
/// return error.
pub async fn check_password(
    storage: &(dyn StorageBackend + Send + Sync),
    username: &Username,
    password: &SecretString,
) -> Result<User> {
    let user = storage
        .user_for_name(username.as_ref())
        .await
        .context(UserSnafu)?
        .context(UnknownUserSnafu {
            username: username.clone(),
        })?;
    user.check_password(password).context(BadPasswordSnafu {
        username: username.clone(),
    })?;
    Ok(user)
}

/// Resolve a session cookie to a live [User]
pub async fn check_cookie(
    jar: &CookieJar,
    storage: &(dyn StorageBackend + Send + Sync),
    keys: &SigningKeys,
) -> Result<User> {
    let cookie = jar.get(SESSION_COOKIE).context(NoCookieSnafu)?;
    let (_username, user_id) = verify_token(cookie.value(), keys).context(TokenSnafu)?;
    storage
        .user_for_id(&user_id)
        .await
        .context(UserSnafu)?
        .context(UserGoneSnafu { user_id })
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                          the cookie                                            //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Build the session cookie carrying `token`
///
/// HTTP-only (no script access), SameSite=Lax, Secure per configuration. Nb. the cookie's
/// Max-Age (24 hours, by default) deliberately exceeds the token's lifetime (one hour): a
/// replayed cookie bearing an expired token simply fails verification above.
pub fn session_cookie(state: &Blogroll, token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .http_only(true)
        .secure(state.secure_cookies)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(time::Duration::seconds(state.cookie_lifetime.num_seconds()))
        .build()
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                          middleware                                            //
////////////////////////////////////////////////////////////////////////////////////////////////////

inventory::submit! { metrics::Registration::new("authn.successes", Sort::IntegralCounter) }
inventory::submit! { metrics::Registration::new("authn.failures", Sort::IntegralCounter) }

/// Authenticate a request
///
/// Insert the resolved [User] into the request's extensions on success. On a *missing* cookie, we
/// let the request go through un-authenticated, so handlers of protected routes can't use the
/// bare [Extension] extractor-- they take `Result<Extension<User>, ExtensionRejection>` and map
/// the rejection to a 401.
///
/// [Extension]: axum::Extension
///
/// This function leverages axum's support for function-based [middleware]: an async fn taking
/// zero or more `FromRequestParts` extractors, the request, and [Next], returning something that
/// implements `IntoResponse`.
///
/// [middleware]: https://docs.rs/axum/latest/axum/middleware/index.html
/// [Next]: axum::middleware::Next
pub async fn authenticate(
    State(state): State<Arc<Blogroll>>,
    jar: CookieJar,
    mut request: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    match check_cookie(&jar, state.storage.as_ref(), &state.signing_keys).await {
        Ok(user) => {
            debug!("blogroll authorized user {}", user.id());
            request.extensions_mut().insert(user);
            counter_add!(state.instruments, "authn.successes", 1, &[]);
            next.run(request).await
        }
        Err(Error::NoCookie { .. }) => {
            info!("This request carried no session cookie.");
            next.run(request).await
        }
        // I want to be careful about what sort of information we reveal to our caller...
        Err(err) => {
            error!("blogroll failed to authenticate this request: {:?}", err);
            counter_add!(state.instruments, "authn.failures", 1, &[]);
            err.into_response()
        }
    }
}
