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

//! Application state & router assembly.

use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use axum::{extract::State, routing::get, Router};
use chrono::Duration;
use http::{HeaderName, HeaderValue};
use tap::Pipe;
use tower_http::{
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    services::ServeDir,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use url::Url;
use uuid::Uuid;

use crate::{
    authn, blogs, follows, logins, metrics, notifications, oauth::IdentityProvider,
    signing_keys::SigningKeys, storage::Backend as StorageBackend, users,
};

/// Application state available to all handlers
pub struct Blogroll {
    pub instance_id: Uuid,
    pub storage: Arc<dyn StorageBackend + Send + Sync>,
    pub registry: prometheus::Registry,
    pub instruments: metrics::Instruments,
    pub signing_keys: SigningKeys,
    /// How long a freshly-minted session token is good for
    pub token_lifetime: Duration,
    /// How long the cookie carrying it is good for; deliberately independent of
    /// `token_lifetime` (see [token](crate::token))
    pub cookie_lifetime: Duration,
    pub secure_cookies: bool,
    /// Where to send the browser once an OAuth flow completes
    pub client_origin: Url,
    /// Directory to which uploaded files are written (avatars under `avatars/` within)
    pub uploads: PathBuf,
    pub identity: Arc<dyn IdentityProvider + Send + Sync>,
}

async fn healthcheck() -> &'static str {
    "GOOD"
}

async fn metrics(State(state): State<Arc<Blogroll>>) -> String {
    use prometheus::Encoder;
    let mut output = Vec::new();
    prometheus::TextEncoder::new()
        .encode(&state.registry.gather(), &mut output)
        .expect("Failed to encode Prom metrics");
    String::from_utf8(output).expect("Non UTF-8 Prom exporter response?")
}

/// Counter for generating request IDs; a u64 gives a lot less information than a UUID (the
/// traditional type for request IDs), but it's enough, more easily readable, and a useful gauge
/// of how long the server's been up.
#[derive(Clone, Debug, Default)]
struct RequestIdGenerator {
    counter: Arc<AtomicU64>,
}

impl MakeRequestId for RequestIdGenerator {
    fn make_request_id<B>(&mut self, _request: &axum::extract::Request<B>) -> Option<RequestId> {
        self.counter
            .fetch_add(1, Ordering::SeqCst)
            .to_string()
            .pipe(|s| RequestId::new(HeaderValue::from_str(&s).unwrap(/* known good */)))
            .pipe(Some)
    }
}

/// Assemble the complete blogroll application
///
/// One route-module [Router] per API area, the session-resolution middleware over the lot, and
/// the tower-http plumbing outermost: incoming requests should hit `SetRequestIdLayer` first,
/// so it's the last layer applied.
pub fn make_app(state: Arc<Blogroll>) -> Router {
    Router::new()
        .route("/healthcheck", get(healthcheck))
        .route("/metrics", get(metrics))
        .nest(
            "/api/users",
            users::make_router(state.clone()).merge(follows::make_router(state.clone())),
        )
        .nest("/api/login", logins::make_router(state.clone()))
        .nest("/api/auth", crate::oauth::make_router(state.clone()))
        .nest("/api/blogs", blogs::make_router(state.clone()))
        .nest(
            "/api/notifications",
            notifications::make_router(state.clone()),
        )
        // Uploaded files are served back read-only under static paths: blog images under
        // /uploads, avatars under /avatars.
        .nest_service("/uploads", ServeDir::new(state.uploads.clone()))
        .nest_service("/avatars", ServeDir::new(state.uploads.join("avatars")))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            authn::authenticate,
        ))
        .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
            "x-request-id",
        )))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(SetRequestIdLayer::new(
            HeaderName::from_static("x-request-id"),
            RequestIdGenerator::default(),
        ))
        .with_state(state)
}
