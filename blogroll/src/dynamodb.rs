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

//! # dynamodb
//!
//! [Storage] implementation for DynamoDB: one table per entity ("users", "blogs", "comments",
//! "notifications"), each keyed by "id", with global secondary indexes for the non-key lookups
//! (users by username & by external identity, notifications by recipient).
//!
//! [Storage]: crate::storage
//!
//! Entities go on & off the wire via [serde_dynamo], so the table attributes are exactly the
//! entities' serde representations; in particular ids are stored in their hyphenated form, and
//! key conditions below must use the same form (i.e. `format!("{}", id)`, never anything else).

use async_trait::async_trait;
use aws_config::{meta::region::RegionProviderChain, BehaviorVersion, Region};
use aws_sdk_dynamodb::{config::Credentials as AwsCredentials, types::AttributeValue};
use either::Either;
use itertools::Itertools;
use secrecy::ExposeSecret;
use serde_dynamo::aws_sdk_dynamodb_1::{from_item, from_items, to_item};
use snafu::{prelude::*, Backtrace};
use tap::Pipe;
use url::Url;

use crate::{
    entities::{Blog, BlogId, Comment, CommentId, Notification, NotificationId, User, UserId},
    storage,
    util::Credentials,
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("No endpoint URLs specified"))]
    NoEndpoints { backtrace: Backtrace },
}

type Result<T> = std::result::Result<T, Error>;

type StdResult<T, E> = std::result::Result<T, E>;

/// Where to find DynamoDB
///
/// If you're truly talking to DynamoDB in AWS, you can give a region. You can also specify one or
/// more URLs (a local stack, say, or ScyllaDB speaking the Alternator dialect).
pub type Location = Either<String, Vec<Url>>;

pub struct Client {
    client: ::aws_sdk_dynamodb::Client,
}

impl Client {
    pub async fn new(location: &Location, credentials: &Option<Credentials>) -> Result<Client> {
        let creds = credentials.as_ref().map(|Credentials((id, secret))| {
            AwsCredentials::new(
                id.expose_secret(),
                secret.expose_secret(),
                None,
                None,
                "blogroll",
            )
        });

        let config = match location {
            Either::Left(region) => {
                let region_provider =
                    RegionProviderChain::first_try(Some(Region::new(region.clone())))
                        .or_default_provider()
                        .or_else(Region::new("us-west-2"));
                let mut loader = aws_config::defaults(BehaviorVersion::latest())
                    .region(region_provider);
                if let Some(creds) = creds {
                    loader = loader.credentials_provider(creds);
                }
                loader.load().await
            }
            Either::Right(endpoints) => {
                let ep_url = endpoints.first().ok_or(NoEndpointsSnafu {}.build())?;
                let mut loader = aws_config::defaults(BehaviorVersion::latest())
                    .endpoint_url(ep_url.as_str());
                if let Some(creds) = creds {
                    loader = loader.credentials_provider(creds);
                }
                loader.load().await
            }
        };
        Ok(Client {
            client: ::aws_sdk_dynamodb::Client::new(&config),
        })
    }

    /// Scan an entire table; pagination is handled here so callers see one Vec
    async fn scan_all<T: serde::de::DeserializeOwned>(
        &self,
        table: &str,
    ) -> StdResult<Vec<T>, storage::Error> {
        self.client
            .scan()
            .table_name(table)
            .into_paginator()
            .items()
            .send()
            .collect::<StdResult<Vec<_>, _>>()
            .await
            .map_err(storage::Error::new)?
            .pipe(from_items::<T>)
            .map_err(storage::Error::new)
    }

    async fn get_by_id<T: serde::de::DeserializeOwned>(
        &self,
        table: &str,
        id: String,
    ) -> StdResult<Option<T>, storage::Error> {
        let gio = self
            .client
            .get_item()
            .table_name(table)
            .key("id", AttributeValue::S(id))
            .send()
            .await
            .map_err(storage::Error::new)?;
        match gio.item {
            Some(item) => Ok(Some(from_item(item).map_err(storage::Error::new)?)),
            None => Ok(None),
        }
    }

    async fn delete_by_id(&self, table: &str, id: String) -> StdResult<(), storage::Error> {
        self.client
            .delete_item()
            .table_name(table)
            .key("id", AttributeValue::S(id))
            .send()
            .await
            .map_err(storage::Error::new)?;
        Ok(())
    }
}

#[async_trait]
impl storage::Backend for Client {
    async fn add_user(&self, user: &User) -> StdResult<(), storage::Error> {
        // Uniqueness has to be enforced in application logic: the username lives in a GSI, and
        // conditional writes can't see it. Check-then-put leaves a window for a racing signup to
        // slip in; like every other multi-step sequence in this service, that's tolerated.
        if self.user_for_name(user.username().as_ref()).await?.is_some() {
            return Err(storage::Error::UsernameClaimed {
                username: user.username().clone(),
            });
        }
        self.update_user(user).await
    }

    async fn update_user(&self, user: &User) -> StdResult<(), storage::Error> {
        self.client
            .put_item()
            .table_name("users")
            .set_item(Some(to_item(user).map_err(storage::Error::new)?))
            .send()
            .await
            .map_err(storage::Error::new)?;
        Ok(())
    }

    async fn delete_user(&self, id: &UserId) -> StdResult<(), storage::Error> {
        self.delete_by_id("users", format!("{}", id)).await
    }

    async fn user_for_id(&self, id: &UserId) -> StdResult<Option<User>, storage::Error> {
        self.get_by_id("users", format!("{}", id)).await
    }

    async fn user_for_name(&self, name: &str) -> StdResult<Option<User>, storage::Error> {
        // An "Item" is a HashMap<String, AttributeValue>; the interface hands us an
        // Option<Vec<Item>>, so both the None case & the zero-length case mean "no such user".
        let gio = self
            .client
            .query()
            .table_name("users")
            .index_name("users_by_username")
            .key_condition_expression("username = :val")
            .expression_attribute_values(":val", AttributeValue::S(name.to_string()))
            .send()
            .await
            .map_err(storage::Error::new)?;
        match gio.items {
            Some(items) => from_items::<User>(items)
                .map_err(storage::Error::new)?
                .into_iter()
                .at_most_one()
                .map_err(storage::Error::new)?
                .pipe(Ok),
            None => Ok(None),
        }
    }

    async fn user_for_external_id(
        &self,
        external_id: &str,
    ) -> StdResult<Option<User>, storage::Error> {
        let gio = self
            .client
            .query()
            .table_name("users")
            .index_name("users_by_external_id")
            .key_condition_expression("external_id = :val")
            .expression_attribute_values(":val", AttributeValue::S(external_id.to_string()))
            .send()
            .await
            .map_err(storage::Error::new)?;
        match gio.items {
            Some(items) => from_items::<User>(items)
                .map_err(storage::Error::new)?
                .into_iter()
                .at_most_one()
                .map_err(storage::Error::new)?
                .pipe(Ok),
            None => Ok(None),
        }
    }

    async fn get_users(&self) -> StdResult<Vec<User>, storage::Error> {
        self.scan_all("users").await
    }

    async fn add_blog(&self, blog: &Blog) -> StdResult<(), storage::Error> {
        self.update_blog(blog).await
    }

    async fn update_blog(&self, blog: &Blog) -> StdResult<(), storage::Error> {
        self.client
            .put_item()
            .table_name("blogs")
            .set_item(Some(to_item(blog).map_err(storage::Error::new)?))
            .send()
            .await
            .map_err(storage::Error::new)?;
        Ok(())
    }

    async fn delete_blog(&self, id: &BlogId) -> StdResult<(), storage::Error> {
        self.delete_by_id("blogs", format!("{}", id)).await
    }

    async fn blog_for_id(&self, id: &BlogId) -> StdResult<Option<Blog>, storage::Error> {
        self.get_by_id("blogs", format!("{}", id)).await
    }

    async fn get_blogs(&self) -> StdResult<Vec<Blog>, storage::Error> {
        self.scan_all("blogs").await
    }

    async fn add_comment(&self, comment: &Comment) -> StdResult<(), storage::Error> {
        self.client
            .put_item()
            .table_name("comments")
            .set_item(Some(to_item(comment).map_err(storage::Error::new)?))
            .send()
            .await
            .map_err(storage::Error::new)?;
        Ok(())
    }

    async fn comment_for_id(&self, id: &CommentId) -> StdResult<Option<Comment>, storage::Error> {
        self.get_by_id("comments", format!("{}", id)).await
    }

    async fn add_notification(
        &self,
        notification: &Notification,
    ) -> StdResult<(), storage::Error> {
        self.update_notification(notification).await
    }

    async fn update_notification(
        &self,
        notification: &Notification,
    ) -> StdResult<(), storage::Error> {
        self.client
            .put_item()
            .table_name("notifications")
            .set_item(Some(to_item(notification).map_err(storage::Error::new)?))
            .send()
            .await
            .map_err(storage::Error::new)?;
        Ok(())
    }

    async fn notification_for_id(
        &self,
        id: &NotificationId,
    ) -> StdResult<Option<Notification>, storage::Error> {
        self.get_by_id("notifications", format!("{}", id)).await
    }

    async fn notifications_for_recipient(
        &self,
        recipient: &UserId,
    ) -> StdResult<Vec<Notification>, storage::Error> {
        let gio = self
            .client
            .query()
            .table_name("notifications")
            .index_name("notifications_by_recipient")
            .key_condition_expression("recipient = :val")
            .expression_attribute_values(":val", AttributeValue::S(format!("{}", recipient)))
            .send()
            .await
            .map_err(storage::Error::new)?;
        match gio.items {
            Some(items) => from_items::<Notification>(items).map_err(storage::Error::new),
            None => Ok(Vec::new()),
        }
    }
}
