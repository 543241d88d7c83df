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

//! # The social graph
//!
//! A follow is a directed edge between two users, recorded on *both* user documents: the actor
//! appears in the target's follower set & the target in the actor's following set. The two
//! writes are not wrapped in a transaction (the storage layer offers none); they are instead
//! individually idempotent set operations, issued target-first, so that a crash between them
//! leaves at worst an asymmetric edge that a retry of the same request will repair.
//!
//! Self-follows are rejected outright, which also guarantees the invariant that no user ever
//! appears in their own follower/following sets.

use std::sync::Arc;

use axum::{
    extract::{rejection::ExtensionRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Extension, Json, Router,
};
use chrono::Utc;
use snafu::{prelude::*, Backtrace};
use tracing::{debug, error, info};

use crate::{
    blogroll::Blogroll,
    counter_add,
    entities::{Notification, NotificationKind, User, UserId},
    http::ErrorResponseBody,
    metrics::{self, Sort},
    storage::{self, Backend as StorageBackend},
    views::{self, FollowTarget},
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("invalid id"))]
    BadId {
        text: String,
        source: uuid::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("User not found"))]
    NoSuchUser { id: UserId },
    #[snafu(display("You cannot follow yourself."))]
    SelfFollow { backtrace: Backtrace },
    #[snafu(display("{source}"))]
    Storage { source: storage::Error },
    #[snafu(display("Unauthorized"))]
    Unauthenticated,
}

impl Error {
    pub fn as_status_and_msg(&self) -> (StatusCode, String) {
        match self {
            Error::BadId { .. } => (StatusCode::BAD_REQUEST, "invalid id".to_string()),
            Error::NoSuchUser { .. } => (StatusCode::NOT_FOUND, "User not found".to_string()),
            Error::SelfFollow { .. } => (
                StatusCode::BAD_REQUEST,
                "You cannot follow yourself.".to_string(),
            ),
            Error::Storage { source } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Internal server error: {}", source),
            ),
            Error::Unauthenticated => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
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
//                                 `POST /api/users/{id}/follow`                                  //
////////////////////////////////////////////////////////////////////////////////////////////////////

inventory::submit! { metrics::Registration::new("follows.successful", Sort::IntegralCounter) }
inventory::submit! { metrics::Registration::new("follows.failures", Sort::IntegralCounter) }
inventory::submit! { metrics::Registration::new("unfollows.successful", Sort::IntegralCounter) }

/// Follow a user
///
/// Fails with 400 on a self-follow & 404 if the target doesn't exist. Idempotent: following
/// someone you already follow is a no-op (no duplicate edge-- set semantics, checked by
/// value-equality on id). Emits a `follow` notification to the target, *after* both edge writes
/// have landed, & returns the target with both edge sets resolved to display shape.
async fn follow(
    State(state): State<Arc<Blogroll>>,
    Path(id): Path<String>,
    user: StdResult<Extension<User>, ExtensionRejection>,
) -> axum::response::Response {
    async fn follow1(state: &Blogroll, target_id: &str, mut actor: User) -> Result<FollowTarget> {
        let target_id = parse_user_id(target_id)?;
        ensure!(actor.id() != target_id, SelfFollowSnafu);

        let storage: &(dyn StorageBackend + Send + Sync) = state.storage.as_ref();
        let mut target = storage
            .user_for_id(&target_id)
            .await
            .context(StorageSnafu)?
            .context(NoSuchUserSnafu { id: target_id })?;

        // Two independent writes, in intent one edge; target-first, each one an idempotent
        // set-union, so the sequence is safe to retry from the top.
        target.add_follower(actor.id());
        storage.update_user(&target).await.context(StorageSnafu)?;
        actor.add_following(target_id);
        storage.update_user(&actor).await.context(StorageSnafu)?;

        // Notify last: never notify about an edge that wasn't recorded. The actor == target
        // case was excluded above.
        storage
            .add_notification(&Notification::new(
                &target.id(),
                &actor.id(),
                NotificationKind::Follow,
                None,
                Utc::now(),
            ))
            .await
            .context(StorageSnafu)?;

        debug!("{} now follows {}", actor.username(), target.username());
        views::resolve_follow_target(storage, &target)
            .await
            .context(StorageSnafu)
    }

    let actor = match require_user(user) {
        Ok(actor) => actor,
        Err(err) => return err.into_response(),
    };
    match follow1(&state, &id, actor).await {
        Ok(rsp) => {
            counter_add!(state.instruments, "follows.successful", 1, &[]);
            (StatusCode::OK, Json(rsp)).into_response()
        }
        Err(err) => {
            info!("Follow failed: {}", err);
            counter_add!(state.instruments, "follows.failures", 1, &[]);
            err.into_response()
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                `DELETE /api/users/{id}/follow`                                 //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Unfollow a user
///
/// Fails with 404 if the target doesn't exist. Removing an absent edge is a no-op, not an
/// error-- the inverse of the follow operation, which leaves both sets exactly as they were
/// before the follow. No notification (nobody wants to hear about this one).
async fn unfollow(
    State(state): State<Arc<Blogroll>>,
    Path(id): Path<String>,
    user: StdResult<Extension<User>, ExtensionRejection>,
) -> axum::response::Response {
    async fn unfollow1(state: &Blogroll, target_id: &str, mut actor: User) -> Result<FollowTarget> {
        let target_id = parse_user_id(target_id)?;
        let storage: &(dyn StorageBackend + Send + Sync) = state.storage.as_ref();
        let mut target = storage
            .user_for_id(&target_id)
            .await
            .context(StorageSnafu)?
            .context(NoSuchUserSnafu { id: target_id })?;

        target.remove_follower(&actor.id());
        storage.update_user(&target).await.context(StorageSnafu)?;
        actor.remove_following(&target_id);
        storage.update_user(&actor).await.context(StorageSnafu)?;

        debug!("{} no longer follows {}", actor.username(), target.username());
        views::resolve_follow_target(storage, &target)
            .await
            .context(StorageSnafu)
    }

    let actor = match require_user(user) {
        Ok(actor) => actor,
        Err(err) => return err.into_response(),
    };
    match unfollow1(&state, &id, actor).await {
        Ok(rsp) => {
            counter_add!(state.instruments, "unfollows.successful", 1, &[]);
            (StatusCode::OK, Json(rsp)).into_response()
        }
        Err(err) => {
            error!("Unfollow failed: {}", err);
            err.into_response()
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                           Public API                                           //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Return a router for the social graph; mounted under the same prefix as the User API
pub fn make_router(state: Arc<Blogroll>) -> Router<Arc<Blogroll>> {
    Router::new()
        .route("/{id}/follow", post(follow).delete(unfollow))
        .with_state(state)
}
