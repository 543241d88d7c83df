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

//! # User API
//!
//! Sign-up, the user listing, public profiles, and owner-only profile mutation (bio, avatar,
//! deletion). Follow/unfollow lives in [follows](crate::follows), though it's mounted under the
//! same `/api/users` prefix.

use std::sync::Arc;

use axum::{
    extract::{rejection::ExtensionRejection, Multipart, Path, State},
    http::{header::CONTENT_TYPE, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Extension, Json, Router,
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use snafu::{prelude::*, Backtrace};
use tower_http::{cors::CorsLayer, set_header::SetResponseHeaderLayer};
use tracing::{error, info};

use crate::{
    blogroll::Blogroll,
    counter_add,
    entities::{self, Bio, User, UserId, Username},
    http::ErrorResponseBody,
    metrics::{self, Sort},
    storage::{self, Backend as StorageBackend},
    uploads,
    views::{self, ListedUser, PublicProfile, ShapedUser},
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Failed to add user: {source}"))]
    AddUser { source: storage::Error },
    #[snafu(display("invalid id"))]
    BadId {
        text: String,
        source: uuid::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("{source}"))]
    BadBio { source: entities::Error },
    #[snafu(display("{source}"))]
    BadUsername {
        username: String,
        source: entities::Error,
    },
    #[snafu(display("Only the owner may modify a profile"))]
    Forbidden { backtrace: Backtrace },
    #[snafu(display("While reading the multipart body, {source}"))]
    Multipart {
        source: axum::extract::multipart::MultipartError,
    },
    #[snafu(display("The multipart body carried no `avatar` field"))]
    NoAvatar { backtrace: Backtrace },
    #[snafu(display("User not found"))]
    NoSuchUser { id: UserId },
    #[snafu(display("Failed to lookup user: {source}"))]
    Storage { source: storage::Error },
    #[snafu(display("Unauthorized"))]
    Unauthenticated,
    #[snafu(display("Failed to create user: {source}"))]
    UserSignup { source: entities::Error },
    #[snafu(display("Failed to write the avatar: {source}"))]
    WriteAvatar { source: uploads::Error },
}

impl Error {
    pub fn as_status_and_msg(&self) -> (StatusCode, String) {
        match self {
            ////////////////////////////////////////////////////////////////////////////////////////
            // Broken requests-- tell the caller how to fix it
            ////////////////////////////////////////////////////////////////////////////////////////
            Error::BadId { .. } => (StatusCode::BAD_REQUEST, "invalid id".to_string()),
            Error::BadBio { source } => (StatusCode::BAD_REQUEST, format!("{}", source)),
            Error::BadUsername { source, .. } => (StatusCode::BAD_REQUEST, format!("{}", source)),
            Error::Multipart { source } => (StatusCode::BAD_REQUEST, format!("{}", source)),
            Error::NoAvatar { .. } => (
                StatusCode::BAD_REQUEST,
                "avatar field missing".to_string(),
            ),
            Error::UserSignup { source } => (StatusCode::BAD_REQUEST, format!("{}", source)),
            Error::AddUser { source } => match source {
                storage::Error::UsernameClaimed { .. } => (
                    StatusCode::BAD_REQUEST,
                    "expected `username` to be unique".to_string(),
                ),
                err => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Failed to add user: {}", err),
                ),
            },
            ////////////////////////////////////////////////////////////////////////////////////////
            // Authorization failures
            ////////////////////////////////////////////////////////////////////////////////////////
            Error::Forbidden { .. } => (
                StatusCode::FORBIDDEN,
                "only the owner may modify this profile".to_string(),
            ),
            Error::Unauthenticated => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            ////////////////////////////////////////////////////////////////////////////////////////
            // The entity just isn't there
            ////////////////////////////////////////////////////////////////////////////////////////
            Error::NoSuchUser { .. } => (StatusCode::NOT_FOUND, "User not found".to_string()),
            ////////////////////////////////////////////////////////////////////////////////////////
            // Internal failure-- own up to it:
            ////////////////////////////////////////////////////////////////////////////////////////
            Error::Storage { source } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Internal server error: {}", source),
            ),
            Error::WriteAvatar { source } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to write the avatar: {}", source),
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

/// Unwrap the identity attached by the session middleware, or fail with `Unauthenticated`
fn require_user(user: StdResult<Extension<User>, ExtensionRejection>) -> Result<User> {
    user.map(|Extension(user)| user)
        .map_err(|_| Error::Unauthenticated)
}

fn parse_user_id(text: &str) -> Result<UserId> {
    UserId::from_raw_string(text).context(BadIdSnafu {
        text: text.to_owned(),
    })
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                        `POST /api/users`                                       //
////////////////////////////////////////////////////////////////////////////////////////////////////

inventory::submit! { metrics::Registration::new("user.signups.successful", Sort::IntegralCounter) }
inventory::submit! { metrics::Registration::new("user.signups.failures", Sort::IntegralCounter) }

#[derive(Clone, Debug, Deserialize)]
struct SignupReq {
    username: String,
    password: SecretString,
    name: Option<String>,
}

/// Sign up as a new user
///
/// Parameters:
///
/// - username: blogroll usernames consist of alphanumeric characters and '-', '_' & '.', three
///   to sixty-four of them; the username must be unique, and the request fails with 400 if not.
///
/// - password: arbitrary UTF-8 text longer than three characters; blogroll stores only an
///   Argon2id hash of the salted password
///
/// - name: the user's display name (optional; defaults to the username)
///
/// Unlike most other endpoints in this API, there is no authentication on this method.
async fn signup(
    State(state): State<Arc<Blogroll>>,
    Json(signup_req): Json<SignupReq>,
) -> axum::response::Response {
    async fn signup1(signup_req: &SignupReq, state: &Blogroll) -> Result<ShapedUser> {
        let username =
            Username::new(&signup_req.username).context(BadUsernameSnafu {
                username: signup_req.username.clone(),
            })?;
        let user = User::new(&username, &signup_req.password, signup_req.name.as_deref())
            .context(UserSignupSnafu)?;
        state.storage.add_user(&user).await.context(AddUserSnafu)?;
        Ok(views::shape_user(&user))
    }

    match signup1(&signup_req, &state).await {
        Ok(rsp) => {
            info!("Created user {}", signup_req.username);
            counter_add!(state.instruments, "user.signups.successful", 1, &[]);
            (StatusCode::CREATED, Json(rsp)).into_response()
        }
        Err(Error::AddUser {
            source: storage::Error::UsernameClaimed { username },
        }) => {
            info!("Username {} already claimed", username);
            counter_add!(state.instruments, "user.signups.failures", 1, &[]);
            (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponseBody {
                    error: "expected `username` to be unique".to_owned(),
                }),
            )
                .into_response()
        }
        Err(err) => {
            info!("Signup failed: {}", err);
            counter_add!(state.instruments, "user.signups.failures", 1, &[]);
            err.into_response()
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                        `GET /api/users`                                        //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// List all users, with their authored blogs resolved to display shape
async fn list(State(state): State<Arc<Blogroll>>) -> axum::response::Response {
    async fn list1(state: &Blogroll) -> Result<Vec<ListedUser>> {
        let storage: &(dyn StorageBackend + Send + Sync) = state.storage.as_ref();
        let mut listed = Vec::new();
        for user in storage.get_users().await.context(StorageSnafu)? {
            listed.push(
                views::resolve_listed_user(storage, &user)
                    .await
                    .context(StorageSnafu)?,
            );
        }
        Ok(listed)
    }

    match list1(&state).await {
        Ok(rsp) => (StatusCode::OK, Json(rsp)).into_response(),
        Err(err) => {
            error!("{:#?}", err);
            err.into_response()
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                     `GET /api/users/{id}`                                      //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Public profile projection: no credential material, no edge sets-- just what anyone may see
async fn profile(
    State(state): State<Arc<Blogroll>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    async fn profile1(state: &Blogroll, id: &str) -> Result<PublicProfile> {
        let id = parse_user_id(id)?;
        let storage: &(dyn StorageBackend + Send + Sync) = state.storage.as_ref();
        let user = storage
            .user_for_id(&id)
            .await
            .context(StorageSnafu)?
            .context(NoSuchUserSnafu { id })?;
        views::resolve_profile(storage, &user)
            .await
            .context(StorageSnafu)
    }

    match profile1(&state, &id).await {
        Ok(rsp) => (StatusCode::OK, Json(rsp)).into_response(),
        Err(err) => err.into_response(),
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                     `PUT /api/users/{id}`                                      //
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Clone, Debug, Deserialize, Serialize)]
struct UpdateBioReq {
    bio: String,
}

/// Update a user's bio; owner-only
async fn update_bio(
    State(state): State<Arc<Blogroll>>,
    Path(id): Path<String>,
    user: StdResult<Extension<User>, ExtensionRejection>,
    Json(req): Json<UpdateBioReq>,
) -> axum::response::Response {
    async fn update_bio1(
        state: &Blogroll,
        id: &str,
        actor: User,
        req: &UpdateBioReq,
    ) -> Result<ShapedUser> {
        let id = parse_user_id(id)?;
        ensure!(actor.id() == id, ForbiddenSnafu);
        let bio = Bio::new(&req.bio).context(BadBioSnafu)?;
        let mut actor = actor;
        actor.set_bio(bio);
        state
            .storage
            .update_user(&actor)
            .await
            .context(StorageSnafu)?;
        Ok(views::shape_user(&actor))
    }

    let actor = match require_user(user) {
        Ok(actor) => actor,
        Err(err) => return err.into_response(),
    };
    match update_bio1(&state, &id, actor, &req).await {
        Ok(rsp) => (StatusCode::OK, Json(rsp)).into_response(),
        Err(err) => err.into_response(),
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                  `PUT /api/users/{id}/avatar`                                  //
////////////////////////////////////////////////////////////////////////////////////////////////////

inventory::submit! { metrics::Registration::new("user.avatars.uploaded", Sort::IntegralCounter) }

/// Update a user's avatar; multipart, field `avatar`; owner-only
///
/// The file is written to disk before the user record is updated, so a stored avatar reference
/// always names a real file.
async fn update_avatar(
    State(state): State<Arc<Blogroll>>,
    Path(id): Path<String>,
    user: StdResult<Extension<User>, ExtensionRejection>,
    mut multipart: Multipart,
) -> axum::response::Response {
    async fn update_avatar1(
        state: &Blogroll,
        id: &str,
        actor: User,
        multipart: &mut Multipart,
    ) -> Result<ShapedUser> {
        let id = parse_user_id(id)?;
        ensure!(actor.id() == id, ForbiddenSnafu);

        let mut avatar: Option<(Option<String>, Vec<u8>)> = None;
        while let Some(field) = multipart.next_field().await.context(MultipartSnafu)? {
            if field.name() == Some("avatar") {
                let file_name = field.file_name().map(|s| s.to_string());
                let bytes = field.bytes().await.context(MultipartSnafu)?;
                avatar = Some((file_name, bytes.to_vec()));
            }
        }
        let (file_name, bytes) = avatar.context(NoAvatarSnafu)?;
        let name = uploads::save_upload(
            &state.uploads.join("avatars"),
            file_name.as_deref(),
            &bytes,
        )
        .await
        .context(WriteAvatarSnafu)?;

        let mut actor = actor;
        actor.set_avatar(format!("/avatars/{}", name));
        state
            .storage
            .update_user(&actor)
            .await
            .context(StorageSnafu)?;
        Ok(views::shape_user(&actor))
    }

    let actor = match require_user(user) {
        Ok(actor) => actor,
        Err(err) => return err.into_response(),
    };
    match update_avatar1(&state, &id, actor, &mut multipart).await {
        Ok(rsp) => {
            counter_add!(state.instruments, "user.avatars.uploaded", 1, &[]);
            (StatusCode::OK, Json(rsp)).into_response()
        }
        Err(err) => {
            error!("{:#?}", err);
            err.into_response()
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                    `DELETE /api/users/{id}`                                    //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Delete a user; owner-only; 204 on success
///
/// No cascade: the departed user's blogs, comments & notifications survive them, and the shapers
/// drop the dangling references on display.
async fn delete(
    State(state): State<Arc<Blogroll>>,
    Path(id): Path<String>,
    user: StdResult<Extension<User>, ExtensionRejection>,
) -> axum::response::Response {
    async fn delete1(state: &Blogroll, id: &str, actor: &User) -> Result<()> {
        let id = parse_user_id(id)?;
        ensure!(actor.id() == id, ForbiddenSnafu);
        state.storage.delete_user(&id).await.context(StorageSnafu)
    }

    let actor = match require_user(user) {
        Ok(actor) => actor,
        Err(err) => return err.into_response(),
    };
    match delete1(&state, &id, &actor).await {
        Ok(_) => {
            info!("Deleted user {}", actor.username());
            StatusCode::NO_CONTENT.into_response()
        }
        Err(err) => err.into_response(),
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                           Public API                                           //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Return a router for the User API
///
/// The returned [Router] will presumably be merged with others.
pub fn make_router(state: Arc<Blogroll>) -> Router<Arc<Blogroll>> {
    Router::new()
        .route("/", post(signup).get(list))
        .route("/{id}", get(profile).put(update_bio).delete(delete))
        .route("/{id}/avatar", put(update_avatar))
        // All responses are JSON; add the appropriate Content-Type header (but leave the existing
        // Content-Type header should a handler set it specially).
        .layer(SetResponseHeaderLayer::if_not_present(
            CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        ))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
