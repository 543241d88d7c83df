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

//! # memory
//!
//! In-memory [Storage] implementation: one [HashMap] per collection behind an async [RwLock].
//! State dies with the process; useful for local development & indispensable for the integration
//! tests, which drive the full router against it.
//!
//! [Storage]: crate::storage

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    entities::{Blog, BlogId, Comment, CommentId, Notification, NotificationId, User, UserId},
    storage,
};

type Result<T> = std::result::Result<T, storage::Error>;

#[derive(Default)]
pub struct Memory {
    users: RwLock<HashMap<UserId, User>>,
    blogs: RwLock<HashMap<BlogId, Blog>>,
    comments: RwLock<HashMap<CommentId, Comment>>,
    notifications: RwLock<HashMap<NotificationId, Notification>>,
}

impl Memory {
    pub fn new() -> Memory {
        Memory::default()
    }
}

#[async_trait]
impl storage::Backend for Memory {
    async fn add_user(&self, user: &User) -> Result<()> {
        let mut users = self.users.write().await;
        if users
            .values()
            .any(|extant| extant.username() == user.username())
        {
            return Err(storage::Error::UsernameClaimed {
                username: user.username().clone(),
            });
        }
        users.insert(user.id(), user.clone());
        Ok(())
    }

    async fn update_user(&self, user: &User) -> Result<()> {
        self.users.write().await.insert(user.id(), user.clone());
        Ok(())
    }

    async fn delete_user(&self, id: &UserId) -> Result<()> {
        self.users.write().await.remove(id);
        Ok(())
    }

    async fn user_for_id(&self, id: &UserId) -> Result<Option<User>> {
        Ok(self.users.read().await.get(id).cloned())
    }

    async fn user_for_name(&self, name: &str) -> Result<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|user| user.username().as_ref() == name)
            .cloned())
    }

    async fn user_for_external_id(&self, external_id: &str) -> Result<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|user| user.external_id() == Some(external_id))
            .cloned())
    }

    async fn get_users(&self) -> Result<Vec<User>> {
        Ok(self.users.read().await.values().cloned().collect())
    }

    async fn add_blog(&self, blog: &Blog) -> Result<()> {
        self.blogs.write().await.insert(blog.id(), blog.clone());
        Ok(())
    }

    async fn update_blog(&self, blog: &Blog) -> Result<()> {
        self.blogs.write().await.insert(blog.id(), blog.clone());
        Ok(())
    }

    async fn delete_blog(&self, id: &BlogId) -> Result<()> {
        self.blogs.write().await.remove(id);
        Ok(())
    }

    async fn blog_for_id(&self, id: &BlogId) -> Result<Option<Blog>> {
        Ok(self.blogs.read().await.get(id).cloned())
    }

    async fn get_blogs(&self) -> Result<Vec<Blog>> {
        Ok(self.blogs.read().await.values().cloned().collect())
    }

    async fn add_comment(&self, comment: &Comment) -> Result<()> {
        self.comments
            .write()
            .await
            .insert(comment.id(), comment.clone());
        Ok(())
    }

    async fn comment_for_id(&self, id: &CommentId) -> Result<Option<Comment>> {
        Ok(self.comments.read().await.get(id).cloned())
    }

    async fn add_notification(&self, notification: &Notification) -> Result<()> {
        self.notifications
            .write()
            .await
            .insert(notification.id(), notification.clone());
        Ok(())
    }

    async fn update_notification(&self, notification: &Notification) -> Result<()> {
        self.notifications
            .write()
            .await
            .insert(notification.id(), notification.clone());
        Ok(())
    }

    async fn notification_for_id(&self, id: &NotificationId) -> Result<Option<Notification>> {
        Ok(self.notifications.read().await.get(id).cloned())
    }

    async fn notifications_for_recipient(&self, recipient: &UserId) -> Result<Vec<Notification>> {
        Ok(self
            .notifications
            .read()
            .await
            .values()
            .filter(|n| n.recipient() == *recipient)
            .cloned()
            .collect())
    }
}
