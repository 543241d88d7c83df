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

//! # views
//!
//! Display shapes for the blogroll entities, and the resolvers that produce them.
//!
//! The persistence types ([entities](crate::entities)) hold referential fields-- bare ids naming
//! other documents. What goes over the wire is a *shaped* representation: ids resolved to small
//! projections (a liker becomes `{id, username, name}`, a comment becomes `{id, content}`, and so
//! on), and sensitive fields (the password hash) simply absent from the shape. Keeping the
//! transforms here, decoupled from storage, means the persistence layer never has to know what the
//! client wants to see.
//!
//! A dangling reference (a liker who deleted their account, a comment lost to a partial write) is
//! dropped from the shape rather than failing the request; deletes don't cascade, so these are
//! expected.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    entities::{
        Bio, Blog, BlogId, CommentId, Notification, NotificationKind, Tagname, User, UserId,
        Username,
    },
    storage::{Backend as StorageBackend, Error as StorageError},
};

type Result<T> = std::result::Result<T, StorageError>;

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                        user projections                                        //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The smallest user projection: how a user appears when referenced from someone else's document
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct UserRef {
    pub id: UserId,
    pub username: Username,
    pub name: String,
}

impl From<&User> for UserRef {
    fn from(user: &User) -> Self {
        UserRef {
            id: user.id(),
            username: user.username().clone(),
            name: user.name().to_string(),
        }
    }
}

/// A user as returned to their owner (signup, login, session status): the full document, shy of
/// the credential fields
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapedUser {
    pub id: UserId,
    pub username: Username,
    pub name: String,
    pub bio: Bio,
    pub avatar_url: String,
    pub blogs: Vec<BlogId>,
    pub followers: Vec<UserId>,
    pub following: Vec<UserId>,
}

pub fn shape_user(user: &User) -> ShapedUser {
    ShapedUser {
        id: user.id(),
        username: user.username().clone(),
        name: user.name().to_string(),
        bio: user.bio().clone(),
        avatar_url: user.avatar().to_string(),
        blogs: user.blogs().to_vec(),
        followers: user.followers().iter().copied().collect(),
        following: user.following().iter().copied().collect(),
    }
}

/// An entry in a public profile's blog list: just enough for a card
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlogCard {
    pub id: BlogId,
    pub title: String,
    pub image_url: Option<String>,
    pub likes: usize,
    pub created_at: DateTime<Utc>,
}

/// The public profile projection served by `GET /api/users/{id}`
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicProfile {
    pub id: UserId,
    pub username: Username,
    pub name: String,
    pub bio: Bio,
    pub avatar_url: String,
    pub blogs: Vec<BlogCard>,
}

/// Resolve a user's authored-blog ids into cards, newest first
pub async fn resolve_profile(
    storage: &(dyn StorageBackend + Send + Sync),
    user: &User,
) -> Result<PublicProfile> {
    let mut cards = Vec::new();
    for id in user.blogs() {
        if let Some(blog) = storage.blog_for_id(id).await? {
            cards.push(BlogCard {
                id: blog.id(),
                title: blog.title().to_string(),
                image_url: blog.image().map(|s| s.to_string()),
                likes: blog.likes().len(),
                created_at: blog.created_at(),
            });
        }
    }
    cards.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(PublicProfile {
        id: user.id(),
        username: user.username().clone(),
        name: user.name().to_string(),
        bio: user.bio().clone(),
        avatar_url: user.avatar().to_string(),
        blogs: cards,
    })
}

/// An entry in the user listing: the user plus their blogs resolved to a small projection
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListedUser {
    pub id: UserId,
    pub username: Username,
    pub name: String,
    pub blogs: Vec<ListedBlog>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ListedBlog {
    pub id: BlogId,
    pub title: String,
    pub author: Option<String>,
    pub url: String,
}

pub async fn resolve_listed_user(
    storage: &(dyn StorageBackend + Send + Sync),
    user: &User,
) -> Result<ListedUser> {
    let mut blogs = Vec::new();
    for id in user.blogs() {
        if let Some(blog) = storage.blog_for_id(id).await? {
            blogs.push(ListedBlog {
                id: blog.id(),
                title: blog.title().to_string(),
                author: blog.author().map(|s| s.to_string()),
                url: blog.url().to_string(),
            });
        }
    }
    Ok(ListedUser {
        id: user.id(),
        username: user.username().clone(),
        name: user.name().to_string(),
        blogs,
    })
}

/// A follow target, as returned from the follow/unfollow operations: the target's record with
/// both edge sets resolved to display shape rather than raw ids
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowTarget {
    pub id: UserId,
    pub username: Username,
    pub name: String,
    pub bio: Bio,
    pub avatar_url: String,
    pub followers: Vec<UserRef>,
    pub following: Vec<UserRef>,
}

pub async fn resolve_follow_target(
    storage: &(dyn StorageBackend + Send + Sync),
    user: &User,
) -> Result<FollowTarget> {
    let mut followers = Vec::new();
    for id in user.followers() {
        if let Some(follower) = storage.user_for_id(id).await? {
            followers.push(UserRef::from(&follower));
        }
    }
    let mut following = Vec::new();
    for id in user.following() {
        if let Some(followee) = storage.user_for_id(id).await? {
            following.push(UserRef::from(&followee));
        }
    }
    Ok(FollowTarget {
        id: user.id(),
        username: user.username().clone(),
        name: user.name().to_string(),
        bio: user.bio().clone(),
        avatar_url: user.avatar().to_string(),
        followers,
        following,
    })
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                        blog projections                                        //
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CommentView {
    pub id: CommentId,
    pub content: String,
}

/// A blog as served from every blog-returning endpoint: owner, likers & comments resolved
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapedBlog {
    pub id: BlogId,
    pub title: String,
    pub author: Option<String>,
    pub url: String,
    pub image_url: Option<String>,
    pub tags: Vec<Tagname>,
    pub user: Option<UserRef>,
    pub comments: Vec<CommentView>,
    pub likes: Vec<UserRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub async fn resolve_blog(
    storage: &(dyn StorageBackend + Send + Sync),
    blog: &Blog,
) -> Result<ShapedBlog> {
    let user = storage
        .user_for_id(&blog.user())
        .await?
        .map(|owner| UserRef::from(&owner));

    let mut comments = Vec::new();
    for id in blog.comments() {
        if let Some(comment) = storage.comment_for_id(id).await? {
            comments.push(CommentView {
                id: comment.id(),
                content: comment.content().to_string(),
            });
        }
    }

    // Like order is insertion order; preserve it through resolution
    let mut likes = Vec::new();
    for id in blog.likes() {
        if let Some(liker) = storage.user_for_id(id).await? {
            likes.push(UserRef::from(&liker));
        }
    }

    let mut tags: Vec<Tagname> = blog.tags().iter().cloned().collect();
    tags.sort();

    Ok(ShapedBlog {
        id: blog.id(),
        title: blog.title().to_string(),
        author: blog.author().map(|s| s.to_string()),
        url: blog.url().to_string(),
        image_url: blog.image().map(|s| s.to_string()),
        tags,
        user,
        comments,
        likes,
        created_at: blog.created_at(),
        updated_at: blog.updated_at(),
    })
}

pub async fn resolve_blogs(
    storage: &(dyn StorageBackend + Send + Sync),
    blogs: &[Blog],
) -> Result<Vec<ShapedBlog>> {
    let mut shaped = Vec::with_capacity(blogs.len());
    for blog in blogs {
        shaped.push(resolve_blog(storage, blog).await?);
    }
    Ok(shaped)
}

/// The feed envelope: an empty following set produces an explicit signal (the message),
/// distinguishable from "you follow people, but they haven't posted"
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct FeedView {
    pub blogs: Vec<ShapedBlog>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// The trending envelope
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendingPage {
    pub blogs: Vec<ShapedBlog>,
    pub total_pages: usize,
    pub current_page: usize,
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                    notification projections                                    //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// How a sender appears inside a notification (the avatar matters here; the UI shows it)
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SenderRef {
    pub id: UserId,
    pub username: Username,
    pub name: String,
    pub avatar_url: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct BlogRef {
    pub id: BlogId,
    pub title: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapedNotification {
    pub id: crate::entities::NotificationId,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub sender: Option<SenderRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blog: Option<BlogRef>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

pub async fn resolve_notification(
    storage: &(dyn StorageBackend + Send + Sync),
    notification: &Notification,
) -> Result<ShapedNotification> {
    let sender = storage
        .user_for_id(&notification.sender())
        .await?
        .map(|sender| SenderRef {
            id: sender.id(),
            username: sender.username().clone(),
            name: sender.name().to_string(),
            avatar_url: sender.avatar().to_string(),
        });
    let blog = match notification.blog() {
        Some(id) => storage.blog_for_id(&id).await?.map(|blog| BlogRef {
            id: blog.id(),
            title: blog.title().to_string(),
        }),
        None => None,
    };
    Ok(ShapedNotification {
        id: notification.id(),
        kind: notification.kind(),
        sender,
        blog,
        read: notification.read(),
        created_at: notification.created_at(),
    })
}
