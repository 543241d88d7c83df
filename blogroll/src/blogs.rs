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

//! # Blog API
//!
//! The heart of the service: creating blogs, reading them back in their several orderings
//! (newest-first, by tag, the personalized feed, trending), and the engagement operations (the
//! like toggle & comment append) with their notification side-effects.
//!
//! The read-only endpoints are public; everything that writes demands a session. Ranking is
//! computed per request from the scanned collection-- the trending sort key (like-set
//! cardinality) is derived, never stored-- which is fine at this data scale.

use std::{collections::HashSet, sync::Arc};

use axum::{
    extract::{rejection::ExtensionRejection, Multipart, Path, Query, State},
    http::{header::CONTENT_TYPE, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, put},
    Extension, Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use snafu::{prelude::*, Backtrace};
use tower_http::{cors::CorsLayer, set_header::SetResponseHeaderLayer};
use tracing::{error, info};

use crate::{
    blogroll::Blogroll,
    counter_add,
    entities::{
        self, derive_tags, Blog, BlogId, BlogUrl, Comment, Notification, NotificationKind,
        Tagname, User, UserId,
    },
    http::ErrorResponseBody,
    metrics::{self, Sort},
    storage::{self, Backend as StorageBackend},
    uploads,
    views::{self, FeedView, ShapedBlog, TrendingPage},
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("invalid id"))]
    BadId {
        text: String,
        source: uuid::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("{source}"))]
    BadTags { source: entities::Error },
    #[snafu(display("{source}"))]
    BadUrl { source: entities::Error },
    #[snafu(display("only the owner of the blog can delete it"))]
    Forbidden { backtrace: Backtrace },
    #[snafu(display("missing required field {field}"))]
    MissingField {
        field: &'static str,
        backtrace: Backtrace,
    },
    #[snafu(display("While reading the multipart body, {source}"))]
    Multipart {
        source: axum::extract::multipart::MultipartError,
    },
    #[snafu(display("blog doesn't exist"))]
    NoSuchBlog { id: BlogId },
    #[snafu(display("{source}"))]
    Storage { source: storage::Error },
    #[snafu(display("Unauthorized"))]
    Unauthenticated,
    #[snafu(display("Failed to write the uploaded image: {source}"))]
    WriteImage { source: uploads::Error },
}

impl Error {
    pub fn as_status_and_msg(&self) -> (StatusCode, String) {
        match self {
            ////////////////////////////////////////////////////////////////////////////////////////
            // Broken requests-- tell the caller how to fix it
            ////////////////////////////////////////////////////////////////////////////////////////
            Error::BadId { .. } => (StatusCode::BAD_REQUEST, "invalid id".to_string()),
            Error::BadTags { source } => (StatusCode::BAD_REQUEST, format!("{}", source)),
            Error::BadUrl { source } => (StatusCode::BAD_REQUEST, format!("{}", source)),
            Error::MissingField { field, .. } => (
                StatusCode::BAD_REQUEST,
                format!("missing required field {}", field),
            ),
            Error::Multipart { source } => (StatusCode::BAD_REQUEST, format!("{}", source)),
            ////////////////////////////////////////////////////////////////////////////////////////
            // Authorization failures
            ////////////////////////////////////////////////////////////////////////////////////////
            // 401, not 403; the owner check predates the distinction in this API's clients
            Error::Forbidden { .. } => (
                StatusCode::UNAUTHORIZED,
                "only the owner of the blog can delete it".to_string(),
            ),
            Error::Unauthenticated => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            ////////////////////////////////////////////////////////////////////////////////////////
            // The entity just isn't there
            ////////////////////////////////////////////////////////////////////////////////////////
            Error::NoSuchBlog { .. } => {
                (StatusCode::NOT_FOUND, "blog doesn't exist".to_string())
            }
            ////////////////////////////////////////////////////////////////////////////////////////
            // Internal failure-- own up to it:
            ////////////////////////////////////////////////////////////////////////////////////////
            Error::Storage { source } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Internal server error: {}", source),
            ),
            Error::WriteImage { source } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to write the uploaded image: {}", source),
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

fn require_user(user: StdResult<Extension<User>, ExtensionRejection>) -> Result<User> {
    user.map(|Extension(user)| user)
        .map_err(|_| Error::Unauthenticated)
}

fn parse_blog_id(text: &str) -> Result<BlogId> {
    BlogId::from_raw_string(text).context(BadIdSnafu {
        text: text.to_owned(),
    })
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                       ordering & paging                                        //
////////////////////////////////////////////////////////////////////////////////////////////////////

pub const TRENDING_PAGE_SIZE: usize = 9;

/// Newest-created-first: the ordering of the main listing, tag listings & the feed
pub fn newest_first(mut blogs: Vec<Blog>) -> Vec<Blog> {
    blogs.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
    blogs
}

/// The trending ranking: like-count descending, creation time descending as the tie-break
///
/// The sort key is a set cardinality, computed here per request rather than stored. A maintained
/// counter would be called for at larger scale.
pub fn rank_trending(mut blogs: Vec<Blog>) -> Vec<Blog> {
    blogs.sort_by(|a, b| {
        b.likes()
            .len()
            .cmp(&a.likes().len())
            .then(b.created_at().cmp(&a.created_at()))
    });
    blogs
}

/// Slice out page `page` (1-based) of `items`; return it along with the total page count
pub fn paginate<T>(items: Vec<T>, page: usize, page_size: usize) -> (Vec<T>, usize) {
    let total_pages = items.len().div_ceil(page_size);
    let page = page.max(1);
    (
        items
            .into_iter()
            .skip((page - 1) * page_size)
            .take(page_size)
            .collect(),
        total_pages,
    )
}

#[cfg(test)]
mod ranking_tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn blog_with_likes(title: &str, likes: usize, minutes_ago: i64) -> Blog {
        let url = BlogUrl::new("http://x").unwrap(/* known good */);
        let mut blog = Blog::new(
            title,
            None,
            &url,
            None,
            &UserId::new(),
            HashSet::new(),
            Utc::now() - Duration::minutes(minutes_ago),
        );
        for _ in 0..likes {
            blog.toggle_like(&UserId::new());
        }
        blog
    }

    #[test]
    fn trending_breaks_ties_newest_first() {
        // like-counts [5, 5, 2, 0] with distinct creation times; the two fives tie & the tie
        // goes to the newer post
        let older_five = blog_with_likes("older-five", 5, 60);
        let newer_five = blog_with_likes("newer-five", 5, 10);
        let two = blog_with_likes("two", 2, 30);
        let zero = blog_with_likes("zero", 0, 5);

        let ranked = rank_trending(vec![
            older_five.clone(),
            zero.clone(),
            newer_five.clone(),
            two.clone(),
        ]);
        assert_eq!(
            vec!["newer-five", "older-five", "two", "zero"],
            ranked.iter().map(|b| b.title()).collect::<Vec<&str>>()
        );
    }

    #[test]
    fn pagination() {
        let blogs: Vec<usize> = (0..10).collect();
        let (page, total) = paginate(blogs.clone(), 1, TRENDING_PAGE_SIZE);
        assert_eq!(9, page.len());
        assert_eq!(2, total);
        let (page, total) = paginate(blogs.clone(), 2, TRENDING_PAGE_SIZE);
        assert_eq!(vec![9], page);
        assert_eq!(2, total);
        let (page, _) = paginate(blogs, 3, TRENDING_PAGE_SIZE);
        assert!(page.is_empty());
        let (page, total) = paginate(Vec::<usize>::new(), 1, TRENDING_PAGE_SIZE);
        assert!(page.is_empty());
        assert_eq!(0, total);
    }

    #[test]
    fn listing_is_newest_first() {
        let a = blog_with_likes("a", 0, 60);
        let b = blog_with_likes("b", 0, 30);
        let c = blog_with_likes("c", 0, 10);
        let sorted = newest_first(vec![a, c, b]);
        assert_eq!(
            vec!["c", "b", "a"],
            sorted.iter().map(|b| b.title()).collect::<Vec<&str>>()
        );
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                        `GET /api/blogs`                                        //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// List all blogs, newest first, with owner/comments/likes resolved to display shape
async fn list(State(state): State<Arc<Blogroll>>) -> axum::response::Response {
    async fn list1(state: &Blogroll) -> Result<Vec<ShapedBlog>> {
        let storage: &(dyn StorageBackend + Send + Sync) = state.storage.as_ref();
        let blogs = newest_first(storage.get_blogs().await.context(StorageSnafu)?);
        views::resolve_blogs(storage, &blogs)
            .await
            .context(StorageSnafu)
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
//                                   `GET /api/blogs/trending`                                    //
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Clone, Debug, Deserialize)]
struct TrendingParams {
    page: Option<usize>,
}

/// The ranked, paginated trending view
async fn trending(
    State(state): State<Arc<Blogroll>>,
    Query(params): Query<TrendingParams>,
) -> axum::response::Response {
    async fn trending1(state: &Blogroll, page: usize) -> Result<TrendingPage> {
        let storage: &(dyn StorageBackend + Send + Sync) = state.storage.as_ref();
        let ranked = rank_trending(storage.get_blogs().await.context(StorageSnafu)?);
        let (page_blogs, total_pages) = paginate(ranked, page, TRENDING_PAGE_SIZE);
        Ok(TrendingPage {
            blogs: views::resolve_blogs(storage, &page_blogs)
                .await
                .context(StorageSnafu)?,
            total_pages,
            current_page: page,
        })
    }

    match trending1(&state, params.page.unwrap_or(1)).await {
        Ok(rsp) => (StatusCode::OK, Json(rsp)).into_response(),
        Err(err) => {
            error!("{:#?}", err);
            err.into_response()
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                     `GET /api/blogs/feed`                                      //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The personalized feed: blogs whose owner is in the requester's following set, newest first
///
/// An empty following set is answered with an explicit empty-feed signal (the message),
/// distinguishable from "you follow people who haven't posted"; the UI renders the two
/// differently.
async fn feed(
    State(state): State<Arc<Blogroll>>,
    user: StdResult<Extension<User>, ExtensionRejection>,
) -> axum::response::Response {
    async fn feed1(state: &Blogroll, actor: &User) -> Result<FeedView> {
        if actor.following().is_empty() {
            return Ok(FeedView {
                blogs: Vec::new(),
                message: Some("You are not following anyone yet.".to_string()),
            });
        }
        let storage: &(dyn StorageBackend + Send + Sync) = state.storage.as_ref();
        let blogs = newest_first(
            storage
                .get_blogs()
                .await
                .context(StorageSnafu)?
                .into_iter()
                .filter(|blog| actor.following().contains(&blog.user()))
                .collect(),
        );
        Ok(FeedView {
            blogs: views::resolve_blogs(storage, &blogs)
                .await
                .context(StorageSnafu)?,
            message: None,
        })
    }

    let actor = match require_user(user) {
        Ok(actor) => actor,
        Err(err) => return err.into_response(),
    };
    match feed1(&state, &actor).await {
        Ok(rsp) => (StatusCode::OK, Json(rsp)).into_response(),
        Err(err) => {
            error!("{:#?}", err);
            err.into_response()
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                  `GET /api/blogs/tags/{tag}`                                   //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Case-insensitive exact tag membership, newest first
///
/// Stored tags are always lower-cased, so lower-casing the parameter suffices. A parameter that
/// can't even be refined to a [Tagname] matches nothing (rather than erroring).
async fn by_tag(
    State(state): State<Arc<Blogroll>>,
    Path(tag): Path<String>,
) -> axum::response::Response {
    async fn by_tag1(state: &Blogroll, tag: &str) -> Result<Vec<ShapedBlog>> {
        let storage: &(dyn StorageBackend + Send + Sync) = state.storage.as_ref();
        let tag = match Tagname::new(&tag.to_lowercase()) {
            Ok(tag) => tag,
            Err(_) => return Ok(Vec::new()),
        };
        let blogs = newest_first(
            storage
                .get_blogs()
                .await
                .context(StorageSnafu)?
                .into_iter()
                .filter(|blog| blog.tags().contains(&tag))
                .collect(),
        );
        views::resolve_blogs(storage, &blogs)
            .await
            .context(StorageSnafu)
    }

    match by_tag1(&state, &tag).await {
        Ok(rsp) => (StatusCode::OK, Json(rsp)).into_response(),
        Err(err) => {
            error!("{:#?}", err);
            err.into_response()
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                     `GET /api/blogs/{id}`                                      //
////////////////////////////////////////////////////////////////////////////////////////////////////

async fn get_one(
    State(state): State<Arc<Blogroll>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    async fn get_one1(state: &Blogroll, id: &str) -> Result<ShapedBlog> {
        let id = parse_blog_id(id)?;
        let storage: &(dyn StorageBackend + Send + Sync) = state.storage.as_ref();
        let blog = storage
            .blog_for_id(&id)
            .await
            .context(StorageSnafu)?
            .context(NoSuchBlogSnafu { id })?;
        views::resolve_blog(storage, &blog)
            .await
            .context(StorageSnafu)
    }

    match get_one1(&state, &id).await {
        Ok(rsp) => (StatusCode::OK, Json(rsp)).into_response(),
        Err(err) => err.into_response(),
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                       `POST /api/blogs`                                        //
////////////////////////////////////////////////////////////////////////////////////////////////////

inventory::submit! { metrics::Registration::new("blogs.created", Sort::IntegralCounter) }
inventory::submit! { metrics::Registration::new("blogs.creation.failures", Sort::IntegralCounter) }

/// Create a blog
///
/// Multipart form: `title` & `url` required (non-empty); `author` (external display name) &
/// `tags` (comma-separated; normalized per [derive_tags]) optional; `image` an optional file,
/// written to the uploads directory before the blog is persisted. The new blog's id is appended
/// to the posting user's authored list.
async fn create(
    State(state): State<Arc<Blogroll>>,
    user: StdResult<Extension<User>, ExtensionRejection>,
    mut multipart: Multipart,
) -> axum::response::Response {
    async fn create1(
        state: &Blogroll,
        mut actor: User,
        multipart: &mut Multipart,
    ) -> Result<ShapedBlog> {
        let mut title: Option<String> = None;
        let mut author: Option<String> = None;
        let mut url: Option<String> = None;
        let mut tags: Option<String> = None;
        let mut image: Option<(Option<String>, Vec<u8>)> = None;
        while let Some(field) = multipart.next_field().await.context(MultipartSnafu)? {
            // The field's name borrows from the field & reading the field consumes it; copy the
            // name out first.
            let name = field.name().map(|s| s.to_string());
            match name.as_deref() {
                Some("title") => title = Some(field.text().await.context(MultipartSnafu)?),
                Some("author") => author = Some(field.text().await.context(MultipartSnafu)?),
                Some("url") => url = Some(field.text().await.context(MultipartSnafu)?),
                Some("tags") => tags = Some(field.text().await.context(MultipartSnafu)?),
                Some("image") => {
                    let file_name = field.file_name().map(|s| s.to_string());
                    let bytes = field.bytes().await.context(MultipartSnafu)?;
                    image = Some((file_name, bytes.to_vec()));
                }
                _ => (),
            }
        }

        let title = title
            .filter(|t| !t.is_empty())
            .context(MissingFieldSnafu { field: "title" })?;
        let url = url
            .filter(|u| !u.is_empty())
            .context(MissingFieldSnafu { field: "url" })?;
        let url = BlogUrl::new(&url).context(BadUrlSnafu)?;
        let tags = match tags.filter(|t| !t.is_empty()) {
            Some(text) => derive_tags(&text).context(BadTagsSnafu)?,
            None => HashSet::new(),
        };

        // The image goes to disk *before* the blog document is persisted
        let image_ref = match image {
            Some((file_name, bytes)) => Some(format!(
                "/uploads/{}",
                uploads::save_upload(&state.uploads, file_name.as_deref(), &bytes)
                    .await
                    .context(WriteImageSnafu)?
            )),
            None => None,
        };

        let storage: &(dyn StorageBackend + Send + Sync) = state.storage.as_ref();
        let blog = Blog::new(
            &title,
            author.as_deref(),
            &url,
            image_ref.as_deref(),
            &actor.id(),
            tags,
            Utc::now(),
        );
        storage.add_blog(&blog).await.context(StorageSnafu)?;
        actor.add_blog(blog.id());
        storage.update_user(&actor).await.context(StorageSnafu)?;

        views::resolve_blog(storage, &blog)
            .await
            .context(StorageSnafu)
    }

    let actor = match require_user(user) {
        Ok(actor) => actor,
        Err(err) => return err.into_response(),
    };
    let username = actor.username().clone();
    match create1(&state, actor, &mut multipart).await {
        Ok(rsp) => {
            info!("{} created blog {}", username, rsp.id);
            counter_add!(state.instruments, "blogs.created", 1, &[]);
            (StatusCode::CREATED, Json(rsp)).into_response()
        }
        Err(err) => {
            info!("Blog creation failed: {}", err);
            counter_add!(state.instruments, "blogs.creation.failures", 1, &[]);
            err.into_response()
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                     `PUT /api/blogs/{id}`                                      //
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Clone, Debug, Deserialize)]
struct UpdateBlogReq {
    title: Option<String>,
    author: Option<String>,
    url: Option<String>,
    likes: Option<Vec<UserId>>,
}

/// Replace any of title/author/url/likes; 404 if the blog is absent
async fn update(
    State(state): State<Arc<Blogroll>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateBlogReq>,
) -> axum::response::Response {
    async fn update1(state: &Blogroll, id: &str, req: &UpdateBlogReq) -> Result<ShapedBlog> {
        let id = parse_blog_id(id)?;
        let storage: &(dyn StorageBackend + Send + Sync) = state.storage.as_ref();
        let mut blog = storage
            .blog_for_id(&id)
            .await
            .context(StorageSnafu)?
            .context(NoSuchBlogSnafu { id })?;

        if let Some(ref title) = req.title {
            blog.set_title(title);
        }
        if let Some(ref author) = req.author {
            blog.set_author(author);
        }
        if let Some(ref url) = req.url {
            blog.set_url(BlogUrl::new(url).context(BadUrlSnafu)?);
        }
        if let Some(ref likes) = req.likes {
            blog.set_likes(likes.clone());
        }
        blog.touch(Utc::now());
        storage.update_blog(&blog).await.context(StorageSnafu)?;

        views::resolve_blog(storage, &blog)
            .await
            .context(StorageSnafu)
    }

    match update1(&state, &id, &req).await {
        Ok(rsp) => (StatusCode::OK, Json(rsp)).into_response(),
        Err(err) => err.into_response(),
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                   `PUT /api/blogs/{id}/like`                                   //
////////////////////////////////////////////////////////////////////////////////////////////////////

inventory::submit! { metrics::Registration::new("blogs.likes.toggled", Sort::IntegralCounter) }

/// Toggle the requester's like on a blog
///
/// Membership in the like list is tested by id; if present, remove, else append. When the blog's
/// owner isn't the actor, a `like` notification is emitted on *both* directions of the toggle--
/// the owner hears about engagement activity whether it's a like or an un-like.
async fn like(
    State(state): State<Arc<Blogroll>>,
    Path(id): Path<String>,
    user: StdResult<Extension<User>, ExtensionRejection>,
) -> axum::response::Response {
    async fn like1(state: &Blogroll, id: &str, actor: &User) -> Result<ShapedBlog> {
        let id = parse_blog_id(id)?;
        let storage: &(dyn StorageBackend + Send + Sync) = state.storage.as_ref();
        let mut blog = storage
            .blog_for_id(&id)
            .await
            .context(StorageSnafu)?
            .context(NoSuchBlogSnafu { id })?;

        blog.toggle_like(&actor.id());
        blog.touch(Utc::now());
        storage.update_blog(&blog).await.context(StorageSnafu)?;

        if blog.user() != actor.id() {
            storage
                .add_notification(&Notification::new(
                    &blog.user(),
                    &actor.id(),
                    NotificationKind::Like,
                    Some(blog.id()),
                    Utc::now(),
                ))
                .await
                .context(StorageSnafu)?;
        }

        views::resolve_blog(storage, &blog)
            .await
            .context(StorageSnafu)
    }

    let actor = match require_user(user) {
        Ok(actor) => actor,
        Err(err) => return err.into_response(),
    };
    match like1(&state, &id, &actor).await {
        Ok(rsp) => {
            counter_add!(state.instruments, "blogs.likes.toggled", 1, &[]);
            (StatusCode::OK, Json(rsp)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                `POST /api/blogs/{id}/comments`                                 //
////////////////////////////////////////////////////////////////////////////////////////////////////

inventory::submit! { metrics::Registration::new("blogs.comments.added", Sort::IntegralCounter) }

#[derive(Clone, Debug, Deserialize)]
struct CommentReq {
    content: String,
}

/// Append a comment to a blog
///
/// Creates the comment document, then appends its id to the blog's membership list (the blog
/// holds the authoritative list); comment-first, so a crash in between strands a comment nobody
/// references rather than referencing a comment that doesn't exist. Notifies the owner, unless
/// they're commenting on their own blog.
async fn comment(
    State(state): State<Arc<Blogroll>>,
    Path(id): Path<String>,
    user: StdResult<Extension<User>, ExtensionRejection>,
    Json(req): Json<CommentReq>,
) -> axum::response::Response {
    async fn comment1(state: &Blogroll, id: &str, actor: &User, content: &str) -> Result<ShapedBlog> {
        let id = parse_blog_id(id)?;
        let storage: &(dyn StorageBackend + Send + Sync) = state.storage.as_ref();
        let mut blog = storage
            .blog_for_id(&id)
            .await
            .context(StorageSnafu)?
            .context(NoSuchBlogSnafu { id })?;

        let comment = Comment::new(content, Some(blog.id()));
        storage.add_comment(&comment).await.context(StorageSnafu)?;
        blog.add_comment(comment.id());
        blog.touch(Utc::now());
        storage.update_blog(&blog).await.context(StorageSnafu)?;

        if blog.user() != actor.id() {
            storage
                .add_notification(&Notification::new(
                    &blog.user(),
                    &actor.id(),
                    NotificationKind::Comment,
                    Some(blog.id()),
                    Utc::now(),
                ))
                .await
                .context(StorageSnafu)?;
        }

        views::resolve_blog(storage, &blog)
            .await
            .context(StorageSnafu)
    }

    let actor = match require_user(user) {
        Ok(actor) => actor,
        Err(err) => return err.into_response(),
    };
    match comment1(&state, &id, &actor, &req.content).await {
        Ok(rsp) => {
            counter_add!(state.instruments, "blogs.comments.added", 1, &[]);
            (StatusCode::CREATED, Json(rsp)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                    `DELETE /api/blogs/{id}`                                    //
////////////////////////////////////////////////////////////////////////////////////////////////////

inventory::submit! { metrics::Registration::new("blogs.deleted", Sort::IntegralCounter) }

/// Delete a blog; owner-only; 204
///
/// Deleting an absent blog is also a 204 (idempotent-delete posture): from the caller's
/// perspective the blog is gone either way. The blog's comments & notifications are *not*
/// cascaded; the shapers drop the dangling references.
async fn delete(
    State(state): State<Arc<Blogroll>>,
    Path(id): Path<String>,
    user: StdResult<Extension<User>, ExtensionRejection>,
) -> axum::response::Response {
    async fn delete1(state: &Blogroll, id: &str, actor: &User) -> Result<()> {
        let id = parse_blog_id(id)?;
        let storage: &(dyn StorageBackend + Send + Sync) = state.storage.as_ref();
        let blog = match storage.blog_for_id(&id).await.context(StorageSnafu)? {
            Some(blog) => blog,
            None => return Ok(()),
        };
        ensure!(blog.user() == actor.id(), ForbiddenSnafu);
        storage.delete_blog(&id).await.context(StorageSnafu)?;

        // The owner's authored list is the one reference we do clean up; it's their own document
        // & we're already holding it
        if let Some(mut owner) = storage
            .user_for_id(&actor.id())
            .await
            .context(StorageSnafu)?
        {
            owner.remove_blog(&id);
            storage.update_user(&owner).await.context(StorageSnafu)?;
        }
        Ok(())
    }

    let actor = match require_user(user) {
        Ok(actor) => actor,
        Err(err) => return err.into_response(),
    };
    match delete1(&state, &id, &actor).await {
        Ok(_) => {
            counter_add!(state.instruments, "blogs.deleted", 1, &[]);
            StatusCode::NO_CONTENT.into_response()
        }
        Err(err) => {
            info!("Blog deletion failed: {}", err);
            err.into_response()
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                           Public API                                           //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Return a router for the Blog API
pub fn make_router(state: Arc<Blogroll>) -> Router<Arc<Blogroll>> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/trending", get(trending))
        .route("/feed", get(feed))
        .route("/tags/{tag}", get(by_tag))
        .route("/{id}", get(get_one).put(update).delete(delete))
        .route("/{id}/like", put(like))
        .route("/{id}/comments", axum::routing::post(comment))
        // All responses are JSON; add the appropriate Content-Type header (but leave the existing
        // Content-Type header should a handler set it specially).
        .layer(SetResponseHeaderLayer::if_not_present(
            CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        ))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
