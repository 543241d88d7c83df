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

//! # storage
//!
//! Abstractions for the blogroll storage layer.
//!
//! The service stores one collection per entity (users, blogs, comments, notifications) in a
//! document store; application code writes to this generic API & a particular implementation
//! ([dynamodb](crate::dynamodb) or [memory](crate::memory)) is chosen at startup according to
//! configuration.
//!
//! A note on atomicity: there are none. Every method on [Backend] is a single-document (or
//! single-collection) operation; multi-document updates (the two halves of a follow edge, a
//! like plus its notification) are issued by the caller as an ordered sequence of individually
//! idempotent writes. A crash mid-sequence can leave a transiently inconsistent edge; that is
//! accepted here rather than designed around.

use async_trait::async_trait;
use snafu::prelude::*;

use crate::entities::{
    Blog, BlogId, Comment, CommentId, Notification, NotificationId, User, UserId, Username,
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Username {username} is already claimed"))]
    UsernameClaimed { username: Username },
    #[snafu(display("{source}"))]
    Backend {
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
}

impl Error {
    pub fn new(err: impl std::error::Error + Send + Sync + 'static) -> Error {
        Error::Backend {
            source: Box::new(err),
        }
    }
}

type Result<T> = std::result::Result<T, Error>;

#[async_trait]
pub trait Backend {
    ////////////////////////////////////////////////////////////////////////////////////////////////
    // users
    ////////////////////////////////////////////////////////////////////////////////////////////////

    /// Add a [User]; fails with [Error::UsernameClaimed] if the username is taken
    async fn add_user(&self, user: &User) -> Result<()>;
    /// Upsert a [User] in toto (bio/avatar updates, edge updates, authored-blog updates)
    ///
    /// A full-document put keyed by id; writing the same document twice is idempotent, which is
    /// what makes the follow operation's two-write sequence safe to retry.
    async fn update_user(&self, user: &User) -> Result<()>;
    /// Remove a [User]; no cascade (their blogs & notifications dangle)
    async fn delete_user(&self, id: &UserId) -> Result<()>;
    /// Retrieve a [User] by id; None means no such user
    async fn user_for_id(&self, id: &UserId) -> Result<Option<User>>;
    /// Retrieve a [User] given a textual username; None means there is no user by that name
    async fn user_for_name(&self, name: &str) -> Result<Option<User>>;
    /// Retrieve a [User] by external-identity id; None means no user has claimed that identity
    async fn user_for_external_id(&self, external_id: &str) -> Result<Option<User>>;
    /// Retrieve all users, in no particular order
    async fn get_users(&self) -> Result<Vec<User>>;

    ////////////////////////////////////////////////////////////////////////////////////////////////
    // blogs
    ////////////////////////////////////////////////////////////////////////////////////////////////

    /// Add a [Blog]
    async fn add_blog(&self, blog: &Blog) -> Result<()>;
    /// Upsert a [Blog] in toto (likes, comment membership, field edits)
    async fn update_blog(&self, blog: &Blog) -> Result<()>;
    /// Remove a [Blog]; no cascade (its comments & notifications dangle)
    async fn delete_blog(&self, id: &BlogId) -> Result<()>;
    /// Retrieve a [Blog] by id; None means no such blog
    async fn blog_for_id(&self, id: &BlogId) -> Result<Option<Blog>>;
    /// Retrieve all blogs, in no particular order; ordering (newest-first, trending) is derived
    /// per-request in application code
    async fn get_blogs(&self) -> Result<Vec<Blog>>;

    ////////////////////////////////////////////////////////////////////////////////////////////////
    // comments
    ////////////////////////////////////////////////////////////////////////////////////////////////

    /// Add a [Comment]; comments are append-only
    async fn add_comment(&self, comment: &Comment) -> Result<()>;
    /// Retrieve a [Comment] by id; None means no such comment
    async fn comment_for_id(&self, id: &CommentId) -> Result<Option<Comment>>;

    ////////////////////////////////////////////////////////////////////////////////////////////////
    // notifications
    ////////////////////////////////////////////////////////////////////////////////////////////////

    /// Append a [Notification]
    async fn add_notification(&self, notification: &Notification) -> Result<()>;
    /// Upsert a [Notification] (in practice: flipping the read flag)
    async fn update_notification(&self, notification: &Notification) -> Result<()>;
    /// Retrieve a [Notification] by id
    async fn notification_for_id(&self, id: &NotificationId) -> Result<Option<Notification>>;
    /// Retrieve all of `recipient`'s notifications, in no particular order
    async fn notifications_for_recipient(&self, recipient: &UserId) -> Result<Vec<Notification>>;
}
