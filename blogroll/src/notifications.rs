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

//! # Notification API
//!
//! Notifications are an append-only log written as a side-effect of the like/comment/follow
//! operations; this module only reads them back (newest first, sender & blog resolved to display
//! shape) and flips their read flags. Nothing here ever deletes one.

use std::sync::Arc;

use axum::{
    extract::{rejection::ExtensionRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
    Extension, Json, Router,
};
use snafu::{prelude::*, Backtrace};
use tracing::error;

use crate::{
    blogroll::Blogroll,
    entities::{NotificationId, User},
    http::ErrorResponseBody,
    storage::{self, Backend as StorageBackend},
    views::{self, ShapedNotification},
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("invalid id"))]
    BadId {
        text: String,
        source: uuid::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Only the recipient may mark a notification read"))]
    Forbidden { backtrace: Backtrace },
    #[snafu(display("Notification not found"))]
    NoSuchNotification { id: NotificationId },
    #[snafu(display("{source}"))]
    Storage { source: storage::Error },
    #[snafu(display("Unauthorized"))]
    Unauthenticated,
}

impl Error {
    pub fn as_status_and_msg(&self) -> (StatusCode, String) {
        match self {
            Error::BadId { .. } => (StatusCode::BAD_REQUEST, "invalid id".to_string()),
            Error::Forbidden { .. } => (
                StatusCode::FORBIDDEN,
                "only the recipient may mark a notification read".to_string(),
            ),
            Error::NoSuchNotification { .. } => (
                StatusCode::NOT_FOUND,
                "Notification not found".to_string(),
            ),
            Error::Storage { source } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to fetch notifications: {}", source),
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

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                    `GET /api/notifications`                                    //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// All of the session user's notifications, newest first
async fn list(
    State(state): State<Arc<Blogroll>>,
    user: StdResult<Extension<User>, ExtensionRejection>,
) -> axum::response::Response {
    async fn list1(state: &Blogroll, actor: &User) -> Result<Vec<ShapedNotification>> {
        let storage: &(dyn StorageBackend + Send + Sync) = state.storage.as_ref();
        let mut notifications = storage
            .notifications_for_recipient(&actor.id())
            .await
            .context(StorageSnafu)?;
        notifications.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        let mut shaped = Vec::with_capacity(notifications.len());
        for notification in &notifications {
            shaped.push(
                views::resolve_notification(storage, notification)
                    .await
                    .context(StorageSnafu)?,
            );
        }
        Ok(shaped)
    }

    let actor = match require_user(user) {
        Ok(actor) => actor,
        Err(err) => return err.into_response(),
    };
    match list1(&state, &actor).await {
        Ok(rsp) => (StatusCode::OK, Json(rsp)).into_response(),
        Err(err) => {
            error!("Error fetching notifications: {:#?}", err);
            err.into_response()
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                               `PUT /api/notifications/{id}/read`                               //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Flip one notification's read flag; recipient-only
async fn mark_read(
    State(state): State<Arc<Blogroll>>,
    Path(id): Path<String>,
    user: StdResult<Extension<User>, ExtensionRejection>,
) -> axum::response::Response {
    async fn mark_read1(state: &Blogroll, id: &str, actor: &User) -> Result<ShapedNotification> {
        let id = NotificationId::from_raw_string(id).context(BadIdSnafu {
            text: id.to_owned(),
        })?;
        let storage: &(dyn StorageBackend + Send + Sync) = state.storage.as_ref();
        let mut notification = storage
            .notification_for_id(&id)
            .await
            .context(StorageSnafu)?
            .context(NoSuchNotificationSnafu { id })?;
        ensure!(notification.recipient() == actor.id(), ForbiddenSnafu);
        notification.mark_read();
        storage
            .update_notification(&notification)
            .await
            .context(StorageSnafu)?;
        views::resolve_notification(storage, &notification)
            .await
            .context(StorageSnafu)
    }

    let actor = match require_user(user) {
        Ok(actor) => actor,
        Err(err) => return err.into_response(),
    };
    match mark_read1(&state, &id, &actor).await {
        Ok(rsp) => (StatusCode::OK, Json(rsp)).into_response(),
        Err(err) => {
            error!("Error marking notification read: {:#?}", err);
            err.into_response()
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                           Public API                                           //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Return a router for the Notification API
pub fn make_router(state: Arc<Blogroll>) -> Router<Arc<Blogroll>> {
    Router::new()
        .route("/", get(list))
        .route("/{id}/read", put(mark_read))
        .with_state(state)
}
