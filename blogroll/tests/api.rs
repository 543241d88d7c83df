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
// You should have received a copy of the GNU General Public License along with mpdpopm.  If not,
// see <http://www.gnu.org/licenses/>.

//! # blogroll integration tests
//!
//! These drive the fully-assembled router (session middleware, route modules, the lot) against
//! the in-memory storage backend via `tower::ServiceExt::oneshot`-- no sockets, no containers,
//! no external state. The OAuth provider is a stub honoring one magic code.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use chrono::Duration;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use url::Url;
use uuid::Uuid;

use blogroll::{
    blogroll::{make_app, Blogroll},
    memory::Memory,
    metrics::Instruments,
    oauth::{ExternalIdentity, IdentityProvider},
    signing_keys::SigningKeys,
};

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                           fixtures                                             //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// An [IdentityProvider] honoring exactly one authorization code
struct StubProvider;

#[async_trait::async_trait]
impl IdentityProvider for StubProvider {
    fn authorize_url(&self) -> Url {
        Url::parse("https://accounts.example.com/o/oauth2/v2/auth").unwrap(/* known good */)
    }
    async fn exchange(
        &self,
        code: &str,
    ) -> Result<ExternalIdentity, Box<dyn std::error::Error + Send + Sync>> {
        if code == "good-code" {
            Ok(ExternalIdentity {
                id: "google-oauth2|1234".to_string(),
                display_name: "John Doe".to_string(),
            })
        } else {
            Err("no such code".into())
        }
    }
}

/// Assemble the application over a fresh in-memory backend; returns the app & the upload dir
/// (which must outlive it)
fn make_test_app() -> (Router, tempfile::TempDir) {
    let uploads = tempfile::tempdir().unwrap(/* known good */);
    let state = Arc::new(Blogroll {
        instance_id: Uuid::new_v4(),
        storage: Arc::new(Memory::new()),
        registry: prometheus::Registry::new(),
        instruments: Instruments::new("blogroll"),
        signing_keys: SigningKeys::default(),
        token_lifetime: Duration::hours(1),
        cookie_lifetime: Duration::hours(24),
        secure_cookies: false,
        client_origin: Url::parse("http://localhost:5173").unwrap(/* known good */),
        uploads: uploads.path().to_path_buf(),
        identity: Arc::new(StubProvider),
    });
    (make_app(state), uploads)
}

/// Fire one request at the app; return (status, Set-Cookie if any, body)
async fn request(
    app: &Router,
    method: &str,
    uri: &str,
    cookie: Option<&str>,
    body: Option<(&str, Vec<u8>)>,
) -> (StatusCode, Option<String>, Vec<u8>) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    let request = match body {
        Some((content_type, bytes)) => builder
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(bytes))
            .unwrap(/* known good */),
        None => builder.body(Body::empty()).unwrap(/* known good */),
    };
    let response = app.clone().oneshot(request).await.unwrap(/* infallible */);
    let status = response.status();
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .map(|v| v.to_str().unwrap().to_string());
    let bytes = response
        .into_body()
        .collect()
        .await
        .unwrap(/* known good */)
        .to_bytes()
        .to_vec();
    (status, set_cookie, bytes)
}

async fn request_json(
    app: &Router,
    method: &str,
    uri: &str,
    cookie: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Option<String>, Value) {
    let body = body.map(|v| {
        (
            "application/json",
            serde_json::to_vec(&v).unwrap(/* known good */),
        )
    });
    let (status, set_cookie, bytes) = request(app, method, uri, cookie, body).await;
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, set_cookie, json)
}

const BOUNDARY: &str = "X-BLOGROLL-TEST-BOUNDARY";

/// Hand-roll a multipart/form-data body; `file` is (field-name, file-name, bytes)
fn multipart_body(fields: &[(&str, &str)], file: Option<(&str, &str, &[u8])>) -> (String, Vec<u8>) {
    let mut body: Vec<u8> = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    if let Some((name, file_name, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n",
                BOUNDARY, name, file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    (
        format!("multipart/form-data; boundary={}", BOUNDARY),
        body,
    )
}

/// Extract the "token=..." pair from a Set-Cookie header value
fn cookie_pair(set_cookie: &str) -> String {
    set_cookie.split(';').next().unwrap(/* known good */).to_string()
}

/// Sign up & login; return (user id, cookie pair)
async fn signup_and_login(app: &Router, username: &str, password: &str) -> (String, String) {
    let (status, _, user) = request_json(
        app,
        "POST",
        "/api/users",
        None,
        Some(json!({"username": username, "password": password, "name": username})),
    )
    .await;
    assert_eq!(StatusCode::CREATED, status);
    let id = user["id"].as_str().unwrap(/* known good */).to_string();

    let (status, set_cookie, _) = request_json(
        app,
        "POST",
        "/api/login",
        None,
        Some(json!({"username": username, "password": password})),
    )
    .await;
    assert_eq!(StatusCode::OK, status);
    (id, cookie_pair(&set_cookie.expect("login must set the session cookie")))
}

/// Create a blog through the multipart endpoint; return its shaped JSON
async fn create_blog(app: &Router, cookie: &str, fields: &[(&str, &str)]) -> Value {
    let (content_type, body) = multipart_body(fields, None);
    let (status, _, blog) = {
        let (status, set_cookie, bytes) =
            request(app, "POST", "/api/blogs", Some(cookie), Some((&content_type, body))).await;
        let json: Value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, set_cookie, json)
    };
    assert_eq!(StatusCode::CREATED, status, "{:?}", blog);
    blog
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                        signup & login                                          //
////////////////////////////////////////////////////////////////////////////////////////////////////

#[tokio::test]
async fn signup_login_create_list() {
    let (app, _uploads) = make_test_app();

    // Register alice with a weak-but-legal password & login
    let (_id, cookie) = signup_and_login(&app, "alice", "secret").await;

    // Create a blog...
    let blog = create_blog(&app, &cookie, &[("title", "Hello"), ("url", "http://x")]).await;
    assert_eq!("Hello", blog["title"]);
    assert_eq!("http://x/", blog["url"]); // normalized by the URL refinement
    assert_eq!("alice", blog["user"]["username"]);

    // ...and a second; the listing comes back newest-created-first
    let _ = create_blog(&app, &cookie, &[("title", "Second"), ("url", "http://y")]).await;
    let (status, _, blogs) = request_json(&app, "GET", "/api/blogs", None, None).await;
    assert_eq!(StatusCode::OK, status);
    let blogs = blogs.as_array().unwrap(/* known good */).clone();
    assert_eq!(2, blogs.len());
    assert_eq!("Second", blogs[0]["title"]);
    assert_eq!("Hello", blogs[1]["title"]);

    // The password hash never appears in any shape
    assert!(blogs[0]["user"].get("passwordHash").is_none());
}

#[tokio::test]
async fn signups_enforce_validation() {
    let (app, _uploads) = make_test_app();

    // Username too short
    let (status, _, body) = request_json(
        &app,
        "POST",
        "/api/users",
        None,
        Some(json!({"username": "al", "password": "secret", "name": "Al"})),
    )
    .await;
    assert_eq!(StatusCode::BAD_REQUEST, status);
    assert!(body["error"].as_str().unwrap(/* known good */).contains("username"));

    // Password too short
    let (status, _, _) = request_json(
        &app,
        "POST",
        "/api/users",
        None,
        Some(json!({"username": "albert", "password": "abc", "name": "Al"})),
    )
    .await;
    assert_eq!(StatusCode::BAD_REQUEST, status);

    // Duplicate username
    let (status, _, _) = request_json(
        &app,
        "POST",
        "/api/users",
        None,
        Some(json!({"username": "albert", "password": "sesame", "name": "Al"})),
    )
    .await;
    assert_eq!(StatusCode::CREATED, status);
    let (status, _, body) = request_json(
        &app,
        "POST",
        "/api/users",
        None,
        Some(json!({"username": "albert", "password": "sesame2", "name": "Al2"})),
    )
    .await;
    assert_eq!(StatusCode::BAD_REQUEST, status);
    assert_eq!("expected `username` to be unique", body["error"]);
}

#[tokio::test]
async fn bad_credentials_are_rejected() {
    let (app, _uploads) = make_test_app();
    signup_and_login(&app, "alice", "secret").await;

    for (username, password) in [("alice", "wrong"), ("nobody", "secret"), ("!!", "secret")] {
        let (status, set_cookie, body) = request_json(
            &app,
            "POST",
            "/api/login",
            None,
            Some(json!({"username": username, "password": password})),
        )
        .await;
        assert_eq!(StatusCode::UNAUTHORIZED, status);
        assert_eq!("invalid username or password", body["error"]);
        assert!(set_cookie.is_none());
    }
}

#[tokio::test]
async fn sessions_round_trip() {
    let (app, _uploads) = make_test_app();
    let (id, cookie) = signup_and_login(&app, "alice", "secret").await;

    // status echoes the session's user
    let (status, _, user) = request_json(&app, "GET", "/api/login/status", Some(&cookie), None).await;
    assert_eq!(StatusCode::OK, status);
    assert_eq!("alice", user["username"]);
    assert_eq!(id, user["id"]);

    // no cookie, no session
    let (status, _, _) = request_json(&app, "GET", "/api/login/status", None, None).await;
    assert_eq!(StatusCode::UNAUTHORIZED, status);

    // garbage cookie: rejected outright
    let (status, _, body) =
        request_json(&app, "GET", "/api/login/status", Some("token=junk"), None).await;
    assert_eq!(StatusCode::UNAUTHORIZED, status);
    assert_eq!("token invalid or expired", body["error"]);

    // a valid token naming a deleted user is still an authentication failure
    let (status, _, _) = request_json(
        &app,
        "DELETE",
        &format!("/api/users/{}", id),
        Some(&cookie),
        None,
    )
    .await;
    assert_eq!(StatusCode::NO_CONTENT, status);
    let (status, _, body) = request_json(&app, "GET", "/api/login/status", Some(&cookie), None).await;
    assert_eq!(StatusCode::UNAUTHORIZED, status);
    assert_eq!("user not found", body["error"]);
}

#[tokio::test]
async fn logout_clears_the_cookie() {
    let (app, _uploads) = make_test_app();
    signup_and_login(&app, "alice", "secret").await;
    let (status, set_cookie, _) = request_json(&app, "POST", "/api/login/logout", None, None).await;
    assert_eq!(StatusCode::NO_CONTENT, status);
    // The clearing cookie has an empty value
    assert!(set_cookie.unwrap(/* known good */).starts_with("token=;"));
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                             OAuth                                              //
////////////////////////////////////////////////////////////////////////////////////////////////////

#[tokio::test]
async fn oauth_flow_converges_on_the_same_cookie() {
    let (app, _uploads) = make_test_app();

    // Kick-off redirects to the provider
    let (status, _, _) = request_json(&app, "GET", "/api/auth/google", None, None).await;
    assert_eq!(StatusCode::SEE_OTHER, status);

    // A successful callback sets the session cookie & bounces to the client
    let (status, set_cookie, _) = request_json(
        &app,
        "GET",
        "/api/auth/google/callback?code=good-code",
        None,
        None,
    )
    .await;
    assert_eq!(StatusCode::SEE_OTHER, status);
    let cookie = cookie_pair(&set_cookie.expect("callback must set the session cookie"));

    // The cookie is the same credential the password path vends
    let (status, _, user) = request_json(&app, "GET", "/api/login/status", Some(&cookie), None).await;
    assert_eq!(StatusCode::OK, status);
    let username = user["username"].as_str().unwrap(/* known good */).to_string();
    assert!(username.starts_with("johndoe"), "generated username: {}", username);
    let first_id = user["id"].as_str().unwrap(/* known good */).to_string();

    // A second login through the same external identity finds the same user
    let (_, set_cookie, _) = request_json(
        &app,
        "GET",
        "/api/auth/google/callback?code=good-code",
        None,
        None,
    )
    .await;
    let cookie = cookie_pair(&set_cookie.unwrap(/* known good */));
    let (_, _, user) = request_json(&app, "GET", "/api/login/status", Some(&cookie), None).await;
    assert_eq!(first_id, user["id"].as_str().unwrap(/* known good */));

    // A failed exchange bounces back to the client, sans cookie
    let (status, set_cookie, _) = request_json(
        &app,
        "GET",
        "/api/auth/google/callback?code=bad-code",
        None,
        None,
    )
    .await;
    assert_eq!(StatusCode::SEE_OTHER, status);
    assert!(set_cookie.is_none());
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                        the social graph                                        //
////////////////////////////////////////////////////////////////////////////////////////////////////

#[tokio::test]
async fn follow_and_unfollow_are_inverses() {
    let (app, _uploads) = make_test_app();
    let (a_id, _a_cookie) = signup_and_login(&app, "alice", "secret").await;
    let (_b_id, b_cookie) = signup_and_login(&app, "bob", "sesame").await;

    // bob follows alice; the response is alice's record with edges resolved to display shape
    let (status, _, target) = request_json(
        &app,
        "POST",
        &format!("/api/users/{}/follow", a_id),
        Some(&b_cookie),
        None,
    )
    .await;
    assert_eq!(StatusCode::OK, status);
    assert_eq!("alice", target["username"]);
    let followers = target["followers"].as_array().unwrap(/* known good */).clone();
    assert_eq!(1, followers.len());
    assert_eq!("bob", followers[0]["username"]);

    // idempotent: following again adds no duplicate edge
    let (status, _, target) = request_json(
        &app,
        "POST",
        &format!("/api/users/{}/follow", a_id),
        Some(&b_cookie),
        None,
    )
    .await;
    assert_eq!(StatusCode::OK, status);
    assert_eq!(1, target["followers"].as_array().unwrap(/* known good */).len());

    // bob's own following set reflects the edge
    let (_, _, bob) = request_json(&app, "GET", "/api/login/status", Some(&b_cookie), None).await;
    assert_eq!(1, bob["following"].as_array().unwrap(/* known good */).len());

    // ...and unfollow removes exactly the edges added, leaving both sets as before
    let (status, _, target) = request_json(
        &app,
        "DELETE",
        &format!("/api/users/{}/follow", a_id),
        Some(&b_cookie),
        None,
    )
    .await;
    assert_eq!(StatusCode::OK, status);
    assert!(target["followers"].as_array().unwrap(/* known good */).is_empty());
    let (_, _, bob) = request_json(&app, "GET", "/api/login/status", Some(&b_cookie), None).await;
    assert!(bob["following"].as_array().unwrap(/* known good */).is_empty());

    // removing an absent edge is a no-op, not an error
    let (status, _, _) = request_json(
        &app,
        "DELETE",
        &format!("/api/users/{}/follow", a_id),
        Some(&b_cookie),
        None,
    )
    .await;
    assert_eq!(StatusCode::OK, status);
}

#[tokio::test]
async fn self_follows_always_fail() {
    let (app, _uploads) = make_test_app();
    let (a_id, a_cookie) = signup_and_login(&app, "alice", "secret").await;
    let (status, _, body) = request_json(
        &app,
        "POST",
        &format!("/api/users/{}/follow", a_id),
        Some(&a_cookie),
        None,
    )
    .await;
    assert_eq!(StatusCode::BAD_REQUEST, status);
    assert_eq!("You cannot follow yourself.", body["error"]);
}

#[tokio::test]
async fn following_the_missing_and_the_anonymous() {
    let (app, _uploads) = make_test_app();
    let (_a_id, a_cookie) = signup_and_login(&app, "alice", "secret").await;

    // an extant session, but no such target
    let (status, _, _) = request_json(
        &app,
        "POST",
        &format!("/api/users/{}/follow", Uuid::new_v4()),
        Some(&a_cookie),
        None,
    )
    .await;
    assert_eq!(StatusCode::NOT_FOUND, status);

    // no session at all
    let (status, _, _) = request_json(
        &app,
        "POST",
        &format!("/api/users/{}/follow", Uuid::new_v4()),
        None,
        None,
    )
    .await;
    assert_eq!(StatusCode::UNAUTHORIZED, status);
}

#[tokio::test]
async fn follows_notify_the_target() {
    let (app, _uploads) = make_test_app();
    let (a_id, a_cookie) = signup_and_login(&app, "alice", "secret").await;
    let (_b_id, b_cookie) = signup_and_login(&app, "bob", "sesame").await;

    request_json(
        &app,
        "POST",
        &format!("/api/users/{}/follow", a_id),
        Some(&b_cookie),
        None,
    )
    .await;

    let (status, _, notifications) =
        request_json(&app, "GET", "/api/notifications", Some(&a_cookie), None).await;
    assert_eq!(StatusCode::OK, status);
    let notifications = notifications.as_array().unwrap(/* known good */).clone();
    assert_eq!(1, notifications.len());
    assert_eq!("follow", notifications[0]["type"]);
    assert_eq!("bob", notifications[0]["sender"]["username"]);
    assert!(notifications[0].get("blog").is_none());
    assert_eq!(false, notifications[0]["read"]);
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                           engagement                                           //
////////////////////////////////////////////////////////////////////////////////////////////////////

#[tokio::test]
async fn like_toggle_round_trips_but_notifies_twice() {
    let (app, _uploads) = make_test_app();
    let (_a_id, a_cookie) = signup_and_login(&app, "alice", "secret").await;
    let (_b_id, b_cookie) = signup_and_login(&app, "bob", "sesame").await;

    let blog = create_blog(&app, &a_cookie, &[("title", "Hello"), ("url", "http://x")]).await;
    let blog_id = blog["id"].as_str().unwrap(/* known good */).to_string();

    // bob likes alice's blog
    let (status, _, blog) = request_json(
        &app,
        "PUT",
        &format!("/api/blogs/{}/like", blog_id),
        Some(&b_cookie),
        None,
    )
    .await;
    assert_eq!(StatusCode::OK, status);
    let likes = blog["likes"].as_array().unwrap(/* known good */).clone();
    assert_eq!(1, likes.len());
    assert_eq!("bob", likes[0]["username"]);

    // alice hears about it
    let (_, _, notifications) =
        request_json(&app, "GET", "/api/notifications", Some(&a_cookie), None).await;
    let notifications = notifications.as_array().unwrap(/* known good */).clone();
    assert_eq!(1, notifications.len());
    assert_eq!("like", notifications[0]["type"]);
    assert_eq!("bob", notifications[0]["sender"]["username"]);
    assert_eq!(blog_id, notifications[0]["blog"]["id"]);

    // bob un-likes: the like is removed (idempotent round-trip on the membership)...
    let (status, _, blog) = request_json(
        &app,
        "PUT",
        &format!("/api/blogs/{}/like", blog_id),
        Some(&b_cookie),
        None,
    )
    .await;
    assert_eq!(StatusCode::OK, status);
    assert!(blog["likes"].as_array().unwrap(/* known good */).is_empty());

    // ...but a second notification fires anyway: the owner hears about engagement activity in
    // either direction
    let (_, _, notifications) =
        request_json(&app, "GET", "/api/notifications", Some(&a_cookie), None).await;
    assert_eq!(2, notifications.as_array().unwrap(/* known good */).len());
}

#[tokio::test]
async fn liking_your_own_blog_is_quiet() {
    let (app, _uploads) = make_test_app();
    let (_a_id, a_cookie) = signup_and_login(&app, "alice", "secret").await;
    let blog = create_blog(&app, &a_cookie, &[("title", "Hello"), ("url", "http://x")]).await;
    let blog_id = blog["id"].as_str().unwrap(/* known good */).to_string();

    let (status, _, _) = request_json(
        &app,
        "PUT",
        &format!("/api/blogs/{}/like", blog_id),
        Some(&a_cookie),
        None,
    )
    .await;
    assert_eq!(StatusCode::OK, status);

    let (_, _, notifications) =
        request_json(&app, "GET", "/api/notifications", Some(&a_cookie), None).await;
    assert!(notifications.as_array().unwrap(/* known good */).is_empty());
}

#[tokio::test]
async fn comments_append_and_notify() {
    let (app, _uploads) = make_test_app();
    let (_a_id, a_cookie) = signup_and_login(&app, "alice", "secret").await;
    let (_b_id, b_cookie) = signup_and_login(&app, "bob", "sesame").await;

    let blog = create_blog(&app, &a_cookie, &[("title", "Hello"), ("url", "http://x")]).await;
    let blog_id = blog["id"].as_str().unwrap(/* known good */).to_string();

    let (status, _, blog) = request_json(
        &app,
        "POST",
        &format!("/api/blogs/{}/comments", blog_id),
        Some(&b_cookie),
        Some(json!({"content": "nice link"})),
    )
    .await;
    assert_eq!(StatusCode::CREATED, status);
    let comments = blog["comments"].as_array().unwrap(/* known good */).clone();
    assert_eq!(1, comments.len());
    assert_eq!("nice link", comments[0]["content"]);

    let (_, _, notifications) =
        request_json(&app, "GET", "/api/notifications", Some(&a_cookie), None).await;
    let notifications = notifications.as_array().unwrap(/* known good */).clone();
    assert_eq!(1, notifications.len());
    assert_eq!("comment", notifications[0]["type"]);

    // commenting on an absent blog is a 404
    let (status, _, body) = request_json(
        &app,
        "POST",
        &format!("/api/blogs/{}/comments", Uuid::new_v4()),
        Some(&b_cookie),
        Some(json!({"content": "into the void"})),
    )
    .await;
    assert_eq!(StatusCode::NOT_FOUND, status);
    assert_eq!("blog doesn't exist", body["error"]);
}

#[tokio::test]
async fn only_the_owner_deletes_and_deletes_are_idempotent() {
    let (app, _uploads) = make_test_app();
    let (_a_id, a_cookie) = signup_and_login(&app, "alice", "secret").await;
    let (_b_id, b_cookie) = signup_and_login(&app, "bob", "sesame").await;

    let blog = create_blog(&app, &a_cookie, &[("title", "Hello"), ("url", "http://x")]).await;
    let blog_id = blog["id"].as_str().unwrap(/* known good */).to_string();

    // bob may not delete alice's blog...
    let (status, _, body) = request_json(
        &app,
        "DELETE",
        &format!("/api/blogs/{}", blog_id),
        Some(&b_cookie),
        None,
    )
    .await;
    assert_eq!(StatusCode::UNAUTHORIZED, status);
    assert_eq!("only the owner of the blog can delete it", body["error"]);

    // ...and the blog persists unchanged
    let (status, _, blog) =
        request_json(&app, "GET", &format!("/api/blogs/{}", blog_id), None, None).await;
    assert_eq!(StatusCode::OK, status);
    assert_eq!("Hello", blog["title"]);

    // alice may; and deleting the departed is a 204, not an error
    let (status, _, _) = request_json(
        &app,
        "DELETE",
        &format!("/api/blogs/{}", blog_id),
        Some(&a_cookie),
        None,
    )
    .await;
    assert_eq!(StatusCode::NO_CONTENT, status);
    let (status, _, _) = request_json(
        &app,
        "DELETE",
        &format!("/api/blogs/{}", blog_id),
        Some(&a_cookie),
        None,
    )
    .await;
    assert_eq!(StatusCode::NO_CONTENT, status);

    let (status, _, _) =
        request_json(&app, "GET", &format!("/api/blogs/{}", blog_id), None, None).await;
    assert_eq!(StatusCode::NOT_FOUND, status);
}

#[tokio::test]
async fn anonymous_writes_are_rejected() {
    let (app, _uploads) = make_test_app();
    let (content_type, body) = multipart_body(&[("title", "Hello"), ("url", "http://x")], None);
    let (status, _, _) = request(
        &app,
        "POST",
        "/api/blogs",
        None,
        Some((&content_type, body)),
    )
    .await;
    assert_eq!(StatusCode::UNAUTHORIZED, status);
}

#[tokio::test]
async fn blogs_require_title_and_url() {
    let (app, _uploads) = make_test_app();
    let (_a_id, a_cookie) = signup_and_login(&app, "alice", "secret").await;

    for fields in [
        vec![("url", "http://x")],
        vec![("title", "Hello")],
        vec![("title", ""), ("url", "http://x")],
    ] {
        let (content_type, body) = multipart_body(&fields, None);
        let (status, _, _) = request(
            &app,
            "POST",
            "/api/blogs",
            Some(&a_cookie),
            Some((&content_type, body)),
        )
        .await;
        assert_eq!(StatusCode::BAD_REQUEST, status);
    }
}

#[tokio::test]
async fn blog_images_land_on_disk_and_in_the_shape() {
    let (app, uploads) = make_test_app();
    let (_a_id, a_cookie) = signup_and_login(&app, "alice", "secret").await;

    let (content_type, body) = multipart_body(
        &[("title", "Hello"), ("url", "http://x")],
        Some(("image", "cat.png", b"pretend this is a png")),
    );
    let (status, _, bytes) = request(
        &app,
        "POST",
        "/api/blogs",
        Some(&a_cookie),
        Some((&content_type, body)),
    )
    .await;
    assert_eq!(StatusCode::CREATED, status);
    let blog: Value = serde_json::from_slice(&bytes).unwrap(/* known good */);
    let image_url = blog["imageUrl"].as_str().unwrap(/* known good */);
    assert!(image_url.starts_with("/uploads/"));

    // The file was written before the blog was persisted
    let name = image_url.trim_start_matches("/uploads/");
    let on_disk = std::fs::read(uploads.path().join(name)).unwrap(/* known good */);
    assert_eq!(b"pretend this is a png".to_vec(), on_disk);
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                          query/feed                                            //
////////////////////////////////////////////////////////////////////////////////////////////////////

#[tokio::test]
async fn tags_are_normalized_and_queryable() {
    let (app, _uploads) = make_test_app();
    let (_a_id, a_cookie) = signup_and_login(&app, "alice", "secret").await;

    let blog = create_blog(
        &app,
        &a_cookie,
        &[("title", "Hello"), ("url", "http://x"), ("tags", "A, a , B")],
    )
    .await;
    // trimmed, lower-cased, de-duplicated by value
    let tags = blog["tags"].as_array().unwrap(/* known good */).clone();
    assert_eq!(vec!["a", "b"], tags.iter().map(|t| t.as_str().unwrap()).collect::<Vec<&str>>());

    // case-insensitive exact membership
    let (status, _, blogs) = request_json(&app, "GET", "/api/blogs/tags/A", None, None).await;
    assert_eq!(StatusCode::OK, status);
    assert_eq!(1, blogs.as_array().unwrap(/* known good */).len());

    // "no matches" is a bare empty list...
    let (status, _, blogs) = request_json(&app, "GET", "/api/blogs/tags/zzz", None, None).await;
    assert_eq!(StatusCode::OK, status);
    assert!(blogs.as_array().unwrap(/* known good */).is_empty());
    assert!(blogs.get("message").is_none());
}

#[tokio::test]
async fn the_feed_is_exactly_the_follows() {
    let (app, _uploads) = make_test_app();
    let (a_id, a_cookie) = signup_and_login(&app, "alice", "secret").await;
    let (_b_id, b_cookie) = signup_and_login(&app, "bob", "sesame").await;
    let (_c_id, c_cookie) = signup_and_login(&app, "carol", "qwerty").await;

    create_blog(&app, &a_cookie, &[("title", "From alice"), ("url", "http://a")]).await;
    create_blog(&app, &c_cookie, &[("title", "From carol"), ("url", "http://c")]).await;

    // bob follows alice; his feed is exactly alice's blogs
    request_json(
        &app,
        "POST",
        &format!("/api/users/{}/follow", a_id),
        Some(&b_cookie),
        None,
    )
    .await;
    let (status, _, feed) = request_json(&app, "GET", "/api/blogs/feed", Some(&b_cookie), None).await;
    assert_eq!(StatusCode::OK, status);
    let blogs = feed["blogs"].as_array().unwrap(/* known good */).clone();
    assert_eq!(1, blogs.len());
    assert_eq!("From alice", blogs[0]["title"]);
    assert!(feed.get("message").is_none());

    // carol follows nobody: an explicit empty-feed signal, distinct from "no matches"
    let (status, _, feed) = request_json(&app, "GET", "/api/blogs/feed", Some(&c_cookie), None).await;
    assert_eq!(StatusCode::OK, status);
    assert!(feed["blogs"].as_array().unwrap(/* known good */).is_empty());
    assert_eq!("You are not following anyone yet.", feed["message"]);

    // no session, no feed
    let (status, _, _) = request_json(&app, "GET", "/api/blogs/feed", None, None).await;
    assert_eq!(StatusCode::UNAUTHORIZED, status);
}

#[tokio::test]
async fn trending_ranks_by_likes_with_recency_tie_break() {
    let (app, _uploads) = make_test_app();
    let (_a_id, a_cookie) = signup_and_login(&app, "alice", "secret").await;
    let (_b_id, b_cookie) = signup_and_login(&app, "bob", "sesame").await;
    let (_c_id, c_cookie) = signup_and_login(&app, "carol", "qwerty").await;

    // four blogs, created oldest-first
    let older_two = create_blog(&app, &a_cookie, &[("title", "older-two"), ("url", "http://1")]).await;
    let newer_two = create_blog(&app, &a_cookie, &[("title", "newer-two"), ("url", "http://2")]).await;
    let one = create_blog(&app, &a_cookie, &[("title", "one"), ("url", "http://3")]).await;
    let _zero = create_blog(&app, &a_cookie, &[("title", "zero"), ("url", "http://4")]).await;

    for (blog, cookies) in [
        (&older_two, vec![&b_cookie, &c_cookie]),
        (&newer_two, vec![&b_cookie, &c_cookie]),
        (&one, vec![&b_cookie]),
    ] {
        for cookie in cookies {
            let id = blog["id"].as_str().unwrap(/* known good */);
            request_json(
                &app,
                "PUT",
                &format!("/api/blogs/{}/like", id),
                Some(cookie),
                None,
            )
            .await;
        }
    }

    let (status, _, page) = request_json(&app, "GET", "/api/blogs/trending?page=1", None, None).await;
    assert_eq!(StatusCode::OK, status);
    assert_eq!(1, page["totalPages"]);
    assert_eq!(1, page["currentPage"]);
    let titles = page["blogs"]
        .as_array()
        .unwrap(/* known good */)
        .iter()
        .map(|b| b["title"].as_str().unwrap().to_string())
        .collect::<Vec<String>>();
    // the two-like blogs tie; the tie goes to the newer one
    assert_eq!(vec!["newer-two", "older-two", "one", "zero"], titles);
}

#[tokio::test]
async fn blog_updates_replace_fields() {
    let (app, _uploads) = make_test_app();
    let (_a_id, a_cookie) = signup_and_login(&app, "alice", "secret").await;
    let blog = create_blog(&app, &a_cookie, &[("title", "Hello"), ("url", "http://x")]).await;
    let blog_id = blog["id"].as_str().unwrap(/* known good */).to_string();

    let (status, _, updated) = request_json(
        &app,
        "PUT",
        &format!("/api/blogs/{}", blog_id),
        None,
        Some(json!({"title": "Hello, again"})),
    )
    .await;
    assert_eq!(StatusCode::OK, status);
    assert_eq!("Hello, again", updated["title"]);
    assert_eq!("http://x/", updated["url"]);

    let (status, _, _) = request_json(
        &app,
        "PUT",
        &format!("/api/blogs/{}", Uuid::new_v4()),
        None,
        Some(json!({"title": "nope"})),
    )
    .await;
    assert_eq!(StatusCode::NOT_FOUND, status);
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                            profiles                                            //
////////////////////////////////////////////////////////////////////////////////////////////////////

#[tokio::test]
async fn profiles_project_public_fields_only() {
    let (app, _uploads) = make_test_app();
    let (a_id, a_cookie) = signup_and_login(&app, "alice", "secret").await;
    create_blog(&app, &a_cookie, &[("title", "Hello"), ("url", "http://x")]).await;

    let (status, _, profile) =
        request_json(&app, "GET", &format!("/api/users/{}", a_id), None, None).await;
    assert_eq!(StatusCode::OK, status);
    assert_eq!("alice", profile["username"]);
    assert!(profile.get("passwordHash").is_none());
    let blogs = profile["blogs"].as_array().unwrap(/* known good */).clone();
    assert_eq!(1, blogs.len());
    assert_eq!("Hello", blogs[0]["title"]);
    assert_eq!(0, blogs[0]["likes"]);

    // unknown ids 404; malformed ids 400
    let (status, _, _) = request_json(
        &app,
        "GET",
        &format!("/api/users/{}", Uuid::new_v4()),
        None,
        None,
    )
    .await;
    assert_eq!(StatusCode::NOT_FOUND, status);
    let (status, _, _) = request_json(&app, "GET", "/api/users/not-an-id", None, None).await;
    assert_eq!(StatusCode::BAD_REQUEST, status);
}

#[tokio::test]
async fn bios_are_owner_only_and_bounded() {
    let (app, _uploads) = make_test_app();
    let (a_id, a_cookie) = signup_and_login(&app, "alice", "secret").await;
    let (_b_id, b_cookie) = signup_and_login(&app, "bob", "sesame").await;

    let (status, _, user) = request_json(
        &app,
        "PUT",
        &format!("/api/users/{}", a_id),
        Some(&a_cookie),
        Some(json!({"bio": "I write about Rust."})),
    )
    .await;
    assert_eq!(StatusCode::OK, status);
    assert_eq!("I write about Rust.", user["bio"]);

    // not bob's profile
    let (status, _, _) = request_json(
        &app,
        "PUT",
        &format!("/api/users/{}", a_id),
        Some(&b_cookie),
        Some(json!({"bio": "gotcha"})),
    )
    .await;
    assert_eq!(StatusCode::FORBIDDEN, status);

    // over the 300-character bound
    let (status, _, _) = request_json(
        &app,
        "PUT",
        &format!("/api/users/{}", a_id),
        Some(&a_cookie),
        Some(json!({"bio": "x".repeat(301)})),
    )
    .await;
    assert_eq!(StatusCode::BAD_REQUEST, status);
}

#[tokio::test]
async fn avatars_upload_and_serve() {
    let (app, uploads) = make_test_app();
    let (a_id, a_cookie) = signup_and_login(&app, "alice", "secret").await;

    let (content_type, body) =
        multipart_body(&[], Some(("avatar", "me.jpg", b"pretend this is a jpeg")));
    let (status, _, bytes) = request(
        &app,
        "PUT",
        &format!("/api/users/{}/avatar", a_id),
        Some(&a_cookie),
        Some((&content_type, body)),
    )
    .await;
    assert_eq!(StatusCode::OK, status);
    let user: Value = serde_json::from_slice(&bytes).unwrap(/* known good */);
    let avatar_url = user["avatarUrl"].as_str().unwrap(/* known good */).to_string();
    assert!(avatar_url.starts_with("/avatars/"));
    assert!(avatar_url.ends_with(".jpg"));

    // on disk under uploads/avatars...
    let name = avatar_url.trim_start_matches("/avatars/");
    assert!(uploads.path().join("avatars").join(name).exists());

    // ...and served back under the static path
    let (status, _, served) = request(&app, "GET", &avatar_url, None, None).await;
    assert_eq!(StatusCode::OK, status);
    assert_eq!(b"pretend this is a jpeg".to_vec(), served);
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                         notifications                                          //
////////////////////////////////////////////////////////////////////////////////////////////////////

#[tokio::test]
async fn notifications_read_flags_flip_once_and_stay() {
    let (app, _uploads) = make_test_app();
    let (a_id, a_cookie) = signup_and_login(&app, "alice", "secret").await;
    let (_b_id, b_cookie) = signup_and_login(&app, "bob", "sesame").await;

    request_json(
        &app,
        "POST",
        &format!("/api/users/{}/follow", a_id),
        Some(&b_cookie),
        None,
    )
    .await;

    let (_, _, notifications) =
        request_json(&app, "GET", "/api/notifications", Some(&a_cookie), None).await;
    let id = notifications[0]["id"].as_str().unwrap(/* known good */).to_string();

    // only the recipient may flip the flag
    let (status, _, _) = request_json(
        &app,
        "PUT",
        &format!("/api/notifications/{}/read", id),
        Some(&b_cookie),
        None,
    )
    .await;
    assert_eq!(StatusCode::FORBIDDEN, status);

    let (status, _, read) = request_json(
        &app,
        "PUT",
        &format!("/api/notifications/{}/read", id),
        Some(&a_cookie),
        None,
    )
    .await;
    assert_eq!(StatusCode::OK, status);
    assert_eq!(true, read["read"]);

    let (_, _, notifications) =
        request_json(&app, "GET", "/api/notifications", Some(&a_cookie), None).await;
    assert_eq!(true, notifications[0]["read"]);
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                          odds & ends                                           //
////////////////////////////////////////////////////////////////////////////////////////////////////

#[tokio::test]
async fn healthcheck_answers() {
    let (app, _uploads) = make_test_app();
    let (status, _, body) = request(&app, "GET", "/healthcheck", None, None).await;
    assert_eq!(StatusCode::OK, status);
    assert_eq!(b"GOOD".to_vec(), body);
}
