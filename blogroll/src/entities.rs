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

//! # blogroll models
//!
//! ## Introduction
//!
//! I hate these sort of "catch-all" modules named "models" or "entities", but these types are truly
//! foundational: every other module in the crate traffics in them. The persistence representations
//! live here; their display shapes live in [views](crate::views).

use std::{collections::HashSet, fmt::Display, ops::Deref, str::FromStr};

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use password_hash::{rand_core::OsRng, PasswordHashString, SaltString};
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize};
use snafu::{prelude::*, Backtrace, IntoError};
use unicode_segmentation::UnicodeSegmentation;
use url::Url;
use uuid::Uuid;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("bios may be at most {MAX_BIO_LENGTH} characters"))]
    BadBio { backtrace: Backtrace },
    #[snafu(display("Incorrect password"))]
    BadPassword { backtrace: Backtrace },
    #[snafu(display("{text} is not a valid tag name"))]
    BadTagname { text: String, backtrace: Backtrace },
    #[snafu(display("{name} is not a valid blogroll username"))]
    BadUsername { name: String },
    #[snafu(display("Failed to parse {text} as an URL: {source}"))]
    BlogUrl {
        text: String,
        source: url::ParseError,
        backtrace: Backtrace,
    },
    CheckPassword {
        username: Username,
        source: password_hash::errors::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to hash password: {source}"))]
    HashPassword {
        source: password_hash::errors::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Bad hash string: {source}"))]
    HashString {
        source: password_hash::errors::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("{username} has no password credential"))]
    NoPasswordCredential {
        username: Username,
        backtrace: Backtrace,
    },
    #[snafu(display("password must be longer than {MIN_PASSWORD_LENGTH} characters"))]
    PasswordTooShort { backtrace: Backtrace },
}

type Result<T> = std::result::Result<T, Error>;

type StdResult<T, E> = std::result::Result<T, E>;

fn mk_serde_de_err<'de, D: serde::Deserializer<'de>>(err: impl std::error::Error) -> D::Error {
    <D::Error as serde::de::Error>::custom(format!("{:?}", err))
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                          Identifiers                                           //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// identifier!
///
/// Use this to declare a type intended to be used as an opaque identifier for some other sort of
/// entity.
///
/// In a NoSQL world, we can't count on an auto-increment column in our tables to serve as an
/// opaque identifier; it is instead up to the application developer to assign their own ids, and
/// by far the most common approach is simply to move to a UUID. I could have just used [Uuid] to
/// represent this, but I couldn't bring myself to use the same type to represent identifiers for
/// users, blogs, comments & notifications all at the same time-- confusing two of them should be
/// a compile-time error.
macro_rules! identifier {
    ($type_name:ident) => {
        #[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
        #[serde(transparent)]
        pub struct $type_name(Uuid);
        impl $type_name {
            pub fn new() -> $type_name {
                $type_name(Uuid::new_v4())
            }
            pub fn from_raw_string(s: &str) -> StdResult<$type_name, uuid::Error> {
                Ok($type_name(Uuid::parse_str(s)?))
            }
            pub fn to_raw_string(&self) -> String {
                format!("{}", self.0.as_simple())
            }
        }
        impl Default for $type_name {
            fn default() -> Self {
                Self::new()
            }
        }
        impl Display for $type_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0.as_hyphenated())
            }
        }
    };
}

identifier!(UserId);
identifier!(BlogId);
identifier!(CommentId);
identifier!(NotificationId);

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                            Username                                            //
////////////////////////////////////////////////////////////////////////////////////////////////////

// blogroll usernames must be ASCII, may be from three to sixty-four characters in length, and
// must match the regex "^[a-zA-Z][-_.a-zA-Z0-9]+$".
const MIN_USERNAME_LENGTH: usize = 3;
const MAX_USERNAME_LENGTH: usize = 64;

lazy_static! {
    static ref USERNAME: Regex = Regex::new("^[a-zA-Z][-_.a-zA-Z0-9]+$").unwrap(/* known good */);
    static ref BANNED_USERNAMES: HashSet<&'static str> = HashSet::from(["login", "signup", "admin"]);
}

fn check_username(s: &str) -> bool {
    s.is_ascii()
        && s.len() >= MIN_USERNAME_LENGTH
        && s.len() <= MAX_USERNAME_LENGTH
        && USERNAME.is_match(s)
        && (!BANNED_USERNAMES.contains(s))
}

/// A refined type representing a blogroll username
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct Username(String);

impl Username {
    /// Construct a [Username] from a `&str`
    ///
    /// blogroll usernames must be ASCII, may be from three to sixty-four characters in length, and
    /// must match the regex "^[a-zA-Z][-_.a-zA-Z0-9]+$". Use this constructor to create a
    /// [Username] instance by copying from a reference to [str]. To *move* a [String] into a
    /// [Username] (with validity checking) use [TryFrom::try_from()]
    pub fn new(name: &str) -> Result<Username> {
        check_username(name)
            .then_some(Username(name.to_owned()))
            .ok_or(
                BadUsernameSnafu {
                    name: name.to_owned(),
                }
                .build(),
            )
    }
}

impl AsRef<str> for Username {
    fn as_ref(&self) -> &str {
        self.deref()
    }
}

impl Deref for Username {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// Implement `Deserialize` by hand to fail if the serialized value isn't a legit `Username`
impl<'de> Deserialize<'de> for Username {
    fn deserialize<D>(deserializer: D) -> StdResult<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        Username::try_from(s).map_err(mk_serde_de_err::<'de, D>)
    }
}

impl Display for Username {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Username {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Username::new(s)
    }
}

impl TryFrom<String> for Username {
    type Error = Error;

    fn try_from(name: String) -> std::result::Result<Self, Self::Error> {
        if check_username(&name) {
            Ok(Username(name))
        } else {
            BadUsernameSnafu { name }.fail()
        }
    }
}

/// Derive a username from an external identity's display name
///
/// OAuth-originated users never chose a blogroll username, so we make one up for them: the display
/// name, whitespace stripped, lower-cased, restricted to the characters a [Username] permits, and
/// suffixed with a random numeric discriminator to dodge collisions. Names that survive none of
/// that (e.g. all-CJK display names) fall back to "user".
pub fn generated_username(display_name: &str) -> Username {
    use rand::Rng;

    let stem: String = display_name
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_lowercase())
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    let stem = if stem.is_empty() || !stem.starts_with(|c: char| c.is_ascii_alphabetic()) {
        format!("user{}", stem)
    } else {
        stem
    };
    // 64 characters total, less up to four for the discriminator
    let stem: String = stem.chars().take(MAX_USERNAME_LENGTH - 4).collect();
    let disc = rand::thread_rng().gen_range(0..10000);
    Username::new(&format!("{}{}", stem, disc)).unwrap(/* known good by construction */)
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                              Bio                                               //
////////////////////////////////////////////////////////////////////////////////////////////////////

const MAX_BIO_LENGTH: usize = 300;

/// A refined type representing a user bio: arbitrary UTF-8 text of at most 300 characters
/// (i.e. Unicode graphemes), defaulting to the empty string.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Bio(String);

impl Bio {
    pub fn new(text: &str) -> Result<Bio> {
        (UnicodeSegmentation::graphemes(text, true).count() <= MAX_BIO_LENGTH)
            .then_some(Bio(text.to_owned()))
            .ok_or(BadBioSnafu.build())
    }
}

impl AsRef<str> for Bio {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for Bio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for Bio {
    fn deserialize<D>(deserializer: D) -> StdResult<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        Bio::new(&s).map_err(mk_serde_de_err::<'de, D>)
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                            Tagname                                             //
////////////////////////////////////////////////////////////////////////////////////////////////////

const MAX_TAGNAME_LENGTH: usize = 255;

fn check_tagname(s: &str) -> bool {
    [
        !s.is_empty(),
        UnicodeSegmentation::graphemes(s, true).count() <= MAX_TAGNAME_LENGTH,
        !s.contains(char::is_whitespace),
        !s.contains(','),
    ]
    .into_iter()
    .all(|x| x)
}

/// Tags may be up to 255 characters in length; "characters" meaning Unicode graphemes. Tags may
/// not include whitespace, and since the tag list goes over the wire comma-separated, commas are
/// out, too.
///
/// Note that a [Tagname] is *case-preserving*: the normalization blogroll applies at blog creation
/// (lower-casing) happens in [derive_tags], not here, so that the "by tag" query can refine its
/// path parameter without mangling it.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct Tagname(String);

impl Tagname {
    /// Correct-by-construction [Tagname] constructor
    pub fn new(text: &str) -> Result<Tagname> {
        check_tagname(text)
            .then_some(Tagname(text.to_string()))
            .ok_or(
                BadTagnameSnafu {
                    text: text.to_string(),
                }
                .build(),
            )
    }
}

impl AsRef<str> for Tagname {
    fn as_ref(&self) -> &str {
        self.deref()
    }
}

impl Deref for Tagname {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// Implement `Deserialize` by hand to fail if the serialized value isn't a legit `Tagname`
impl<'de> Deserialize<'de> for Tagname {
    fn deserialize<D>(deserializer: D) -> StdResult<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        Tagname::try_from(s).map_err(mk_serde_de_err::<'de, D>)
    }
}

impl std::fmt::Display for Tagname {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Tagname {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Tagname::new(s)
    }
}

impl TryFrom<String> for Tagname {
    type Error = Error;

    fn try_from(name: String) -> std::result::Result<Self, Self::Error> {
        if check_tagname(&name) {
            Ok(Tagname(name))
        } else {
            BadTagnameSnafu { text: name }.fail()
        }
    }
}

/// Derive a blog's tag set from the comma-separated list in which tags arrive on the wire
///
/// Split on commas, trim, lower-case, drop empties, and de-duplicate (by collecting into a
/// [HashSet]). The result is the *stored* representation: stored tags are always trimmed &
/// lower-cased.
pub fn derive_tags(text: &str) -> Result<HashSet<Tagname>> {
    text.split(',')
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .map(|t| Tagname::try_from(t))
        .collect::<Result<HashSet<Tagname>>>()
}

#[cfg(test)]
mod tagname_tests {
    use super::*;

    #[test]
    fn tagname() {
        assert!(Tagname::new("").is_err());
        assert!(Tagname::new("foo bar").is_err());
        assert!(Tagname::new("foo,bar").is_err());
        assert!(Tagname::new("aws").is_ok());
        assert!(Tagname::new("我不知道怕在哪里").is_ok());
    }

    #[test]
    fn derivation() {
        // Trimmed, lower-cased, de-duplicated by value:
        let tags = derive_tags("A, a , B").unwrap(/* known good */);
        assert_eq!(
            tags,
            HashSet::from([Tagname::new("a").unwrap(), Tagname::new("b").unwrap()])
        );
        // Empties dropped:
        let tags = derive_tags("rust,, ,systems").unwrap(/* known good */);
        assert_eq!(tags.len(), 2);
        // Normalization is idempotent:
        let once = derive_tags("Rust, WEB").unwrap(/* known good */);
        let text = once
            .iter()
            .map(|t| t.as_ref())
            .collect::<Vec<&str>>()
            .join(",");
        assert_eq!(once, derive_tags(&text).unwrap(/* known good */));
        // A tag with interior whitespace can't be refined:
        assert!(derive_tags("foo bar, baz").is_err());
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                         UserHashString                                         //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Newtype idiom to work around Rust's orphaned trait rule
///
/// I've chosen to serialize the hash string as a [PasswordHashString], rather than a
/// [PasswordHash], since the latter doesn't support serde.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(transparent)]
pub struct UserHashString(
    #[serde(serialize_with = "serde_hash_string::serialize")] PasswordHashString,
);

impl UserHashString {
    pub fn password_hash(&self) -> PasswordHash<'_> {
        self.0.password_hash()
    }
}

// Implement `Deserialize` by hand to fail if the serialized value isn't a legit hash string
impl<'de> Deserialize<'de> for UserHashString {
    fn deserialize<D>(deserializer: D) -> StdResult<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        UserHashString::try_from(s).map_err(mk_serde_de_err::<'de, D>)
    }
}

impl TryFrom<String> for UserHashString {
    type Error = Error;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        Ok(UserHashString(
            PasswordHashString::new(&s).context(HashStringSnafu)?,
        ))
    }
}

mod serde_hash_string {
    use super::*;
    use serde::Serializer;
    use tap::Pipe;

    pub fn serialize<S: Serializer>(
        hash_string: &PasswordHashString,
        ser: S,
    ) -> StdResult<S::Ok, S::Error> {
        hash_string
            .as_str()
            .pipe(|s| <str as serde::Serialize>::serialize(s, ser))
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                            BlogUrl                                             //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Newtype to work around Rust's orphaned traits rule
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct BlogUrl(Url);

impl BlogUrl {
    pub fn new(text: &str) -> Result<BlogUrl> {
        Ok(BlogUrl(Url::parse(text).context(BlogUrlSnafu {
            text: text.to_owned(),
        })?))
    }
}

// Implement `Deserialize` by hand to fail if the serialized value isn't a legit URL
impl<'de> Deserialize<'de> for BlogUrl {
    fn deserialize<D>(deserializer: D) -> StdResult<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        BlogUrl::try_from(s).map_err(mk_serde_de_err::<'de, D>)
    }
}

impl Deref for BlogUrl {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl AsRef<str> for BlogUrl {
    fn as_ref(&self) -> &str {
        self.deref()
    }
}

impl Display for BlogUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Url> for BlogUrl {
    fn from(value: Url) -> Self {
        Self(value)
    }
}

impl TryFrom<String> for BlogUrl {
    type Error = Error;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        Ok(BlogUrl(Url::parse(&s).context(BlogUrlSnafu { text: s })?))
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                              User                                              //
////////////////////////////////////////////////////////////////////////////////////////////////////

const MIN_PASSWORD_LENGTH: usize = 3;

/// Apply password validation rules
///
/// The only rule, at this time, is a length floor.
fn validate_password(password: &SecretString) -> Result<()> {
    if password.expose_secret().len() <= MIN_PASSWORD_LENGTH {
        return PasswordTooShortSnafu.fail();
    }
    Ok(())
}

/// Represents a blogroll user
///
/// A user has *either* a password credential (signed-up through the API) or an external identity
/// id (signed-up through an OAuth provider)-- or both, should an OAuth user later set a password.
/// The follower/following sets hold the social graph's edges; the invariant that a user never
/// appears in its own sets is enforced at the follow operation, not here.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct User {
    id: UserId,
    username: Username,
    password_hash: Option<UserHashString>,
    name: String,
    external_id: Option<String>,
    #[serde(default)]
    bio: Bio,
    #[serde(default)]
    avatar: String,
    #[serde(default)]
    blogs: Vec<BlogId>,
    #[serde(default)]
    followers: HashSet<UserId>,
    #[serde(default)]
    following: HashSet<UserId>,
}

impl User {
    /// Create a new [User] with a password credential
    ///
    /// This constructor will create a new [User] instance without validating uniqueness of the
    /// username (that's the storage layer's job). It *will* validate the password & store only
    /// its Argon2id hash.
    pub fn new(username: &Username, password: &SecretString, name: Option<&str>) -> Result<User> {
        validate_password(password)?;
        let password_hash = User::hash_password(password)?;
        Ok(User {
            id: UserId::new(),
            username: username.clone(),
            password_hash: Some(UserHashString(password_hash)),
            name: name.unwrap_or(username.as_ref()).to_string(),
            external_id: None,
            bio: Bio::default(),
            avatar: String::new(),
            blogs: Vec::new(),
            followers: HashSet::new(),
            following: HashSet::new(),
        })
    }
    /// Create a new [User] from an external identity; no password credential
    pub fn new_external(external_id: &str, display_name: &str) -> User {
        User {
            id: UserId::new(),
            username: generated_username(display_name),
            password_hash: None,
            name: display_name.to_string(),
            external_id: Some(external_id.to_string()),
            bio: Bio::default(),
            avatar: String::new(),
            blogs: Vec::new(),
            followers: HashSet::new(),
            following: HashSet::new(),
        }
    }
    /// Validate a password
    ///
    /// Verification is constant-time by way of Argon2id: the proferred password is hashed under
    /// the stored salt & parameters and the digests compared. A user with no password credential
    /// (OAuth-only) fails with [Error::NoPasswordCredential].
    pub fn check_password(&self, password: &SecretString) -> Result<()> {
        let hash = self
            .password_hash
            .as_ref()
            .context(NoPasswordCredentialSnafu {
                username: self.username.clone(),
            })?;
        match Argon2::default().verify_password(
            password.expose_secret().as_bytes(),
            &hash.password_hash(),
        ) {
            Ok(_) => Ok(()),
            Err(password_hash::errors::Error::Password) => BadPasswordSnafu.fail(),
            Err(err) => Err(CheckPasswordSnafu {
                username: self.username.clone(),
            }
            .into_error(err)),
        }
    }
    /// Hash a password
    ///
    /// Salt, then hash with Argon2id under the default version & parameters (v19, m=19456, t=2,
    /// p=1 at the time of this writing).
    fn hash_password(password: &SecretString) -> Result<PasswordHashString> {
        use argon2::PasswordHasher;
        let salt = SaltString::generate(&mut OsRng);
        Ok(Argon2::default()
            .hash_password(password.expose_secret().as_bytes(), &salt)
            .context(HashPasswordSnafu)?
            .serialize())
    }
    pub fn id(&self) -> UserId {
        self.id
    }
    pub fn username(&self) -> &Username {
        &self.username
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn external_id(&self) -> Option<&str> {
        self.external_id.as_deref()
    }
    pub fn bio(&self) -> &Bio {
        &self.bio
    }
    pub fn set_bio(&mut self, bio: Bio) {
        self.bio = bio;
    }
    pub fn avatar(&self) -> &str {
        &self.avatar
    }
    pub fn set_avatar(&mut self, avatar: String) {
        self.avatar = avatar;
    }
    pub fn blogs(&self) -> &[BlogId] {
        &self.blogs
    }
    pub fn add_blog(&mut self, id: BlogId) {
        self.blogs.push(id);
    }
    pub fn remove_blog(&mut self, id: &BlogId) {
        self.blogs.retain(|b| b != id);
    }
    pub fn followers(&self) -> &HashSet<UserId> {
        &self.followers
    }
    pub fn following(&self) -> &HashSet<UserId> {
        &self.following
    }
    /// Add an inbound edge; a no-op if already present (set semantics)
    pub fn add_follower(&mut self, id: UserId) {
        self.followers.insert(id);
    }
    /// Remove an inbound edge; removing an absent edge is a no-op, not an error
    pub fn remove_follower(&mut self, id: &UserId) {
        self.followers.remove(id);
    }
    pub fn add_following(&mut self, id: UserId) {
        self.following.insert(id);
    }
    pub fn remove_following(&mut self, id: &UserId) {
        self.following.remove(id);
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                              Blog                                              //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Represents a blogroll blog post
///
/// `author` is an external display name (free text, possibly naming someone other than the posting
/// user); `user` is the posting user. `likes` is ordered: insertion order is like order.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Blog {
    id: BlogId,
    title: String,
    author: Option<String>,
    url: BlogUrl,
    image: Option<String>,
    likes: Vec<UserId>,
    user: UserId,
    comments: Vec<CommentId>,
    tags: HashSet<Tagname>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Blog {
    pub fn new(
        title: &str,
        author: Option<&str>,
        url: &BlogUrl,
        image: Option<&str>,
        user: &UserId,
        tags: HashSet<Tagname>,
        now: DateTime<Utc>,
    ) -> Blog {
        Blog {
            id: BlogId::new(),
            title: title.to_string(),
            author: author.map(|s| s.to_string()),
            url: url.clone(),
            image: image.map(|s| s.to_string()),
            likes: Vec::new(),
            user: *user,
            comments: Vec::new(),
            tags,
            created_at: now,
            updated_at: now,
        }
    }
    pub fn id(&self) -> BlogId {
        self.id
    }
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn set_title(&mut self, title: &str) {
        self.title = title.to_string();
    }
    pub fn author(&self) -> Option<&str> {
        self.author.as_deref()
    }
    pub fn set_author(&mut self, author: &str) {
        self.author = Some(author.to_string());
    }
    pub fn url(&self) -> &BlogUrl {
        &self.url
    }
    pub fn set_url(&mut self, url: BlogUrl) {
        self.url = url;
    }
    pub fn image(&self) -> Option<&str> {
        self.image.as_deref()
    }
    pub fn likes(&self) -> &[UserId] {
        &self.likes
    }
    pub fn set_likes(&mut self, likes: Vec<UserId>) {
        self.likes = likes;
    }
    pub fn user(&self) -> UserId {
        self.user
    }
    pub fn comments(&self) -> &[CommentId] {
        &self.comments
    }
    pub fn add_comment(&mut self, id: CommentId) {
        self.comments.push(id);
    }
    pub fn tags(&self) -> &HashSet<Tagname> {
        &self.tags
    }
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
    /// Toggle `user`'s membership in the like list
    ///
    /// Membership is tested by id equality. If present, remove; else append (preserving like
    /// order). Returns true if the user now likes this blog, false if they no longer do.
    pub fn toggle_like(&mut self, user: &UserId) -> bool {
        if self.likes.contains(user) {
            self.likes.retain(|id| id != user);
            false
        } else {
            self.likes.push(*user);
            true
        }
    }
}

#[cfg(test)]
mod blog_tests {
    use super::*;

    #[test]
    fn like_toggle_round_trips() {
        let owner = UserId::new();
        let url = BlogUrl::new("http://x").unwrap(/* known good */);
        let mut blog = Blog::new("Hello", None, &url, None, &owner, HashSet::new(), Utc::now());

        let liker = UserId::new();
        let before = blog.likes().to_vec();
        assert!(blog.toggle_like(&liker));
        assert!(blog.likes().contains(&liker));
        assert!(!blog.toggle_like(&liker));
        assert_eq!(before, blog.likes().to_vec());
    }

    #[test]
    fn like_order_is_insertion_order() {
        let owner = UserId::new();
        let url = BlogUrl::new("http://x").unwrap(/* known good */);
        let mut blog = Blog::new("Hello", None, &url, None, &owner, HashSet::new(), Utc::now());

        let (a, b, c) = (UserId::new(), UserId::new(), UserId::new());
        blog.toggle_like(&a);
        blog.toggle_like(&b);
        blog.toggle_like(&c);
        assert_eq!(vec![a, b, c], blog.likes().to_vec());
        blog.toggle_like(&b);
        assert_eq!(vec![a, c], blog.likes().to_vec());
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                            Comment                                             //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Represents a comment on a blog
///
/// The blog holds the authoritative membership list; the back-reference here is a convenience.
/// Comments are never updated nor deleted independently of their blog.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Comment {
    id: CommentId,
    content: String,
    blog: Option<BlogId>,
}

impl Comment {
    pub fn new(content: &str, blog: Option<BlogId>) -> Comment {
        Comment {
            id: CommentId::new(),
            content: content.to_string(),
            blog,
        }
    }
    pub fn id(&self) -> CommentId {
        self.id
    }
    pub fn content(&self) -> &str {
        &self.content
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                          Notification                                          //
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Like,
    Comment,
    Follow,
}

/// Represents a notification: an append-only record that `sender` did something (`kind`) that
/// concerns `recipient`, optionally about a blog (always for like/comment, never for follow).
///
/// Only the read flag ever mutates; notifications are never deleted.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Notification {
    id: NotificationId,
    recipient: UserId,
    sender: UserId,
    kind: NotificationKind,
    blog: Option<BlogId>,
    read: bool,
    created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        recipient: &UserId,
        sender: &UserId,
        kind: NotificationKind,
        blog: Option<BlogId>,
        now: DateTime<Utc>,
    ) -> Notification {
        Notification {
            id: NotificationId::new(),
            recipient: *recipient,
            sender: *sender,
            kind,
            blog,
            read: false,
            created_at: now,
        }
    }
    pub fn id(&self) -> NotificationId {
        self.id
    }
    pub fn recipient(&self) -> UserId {
        self.recipient
    }
    pub fn sender(&self) -> UserId {
        self.sender
    }
    pub fn kind(&self) -> NotificationKind {
        self.kind
    }
    pub fn blog(&self) -> Option<BlogId> {
        self.blog
    }
    pub fn read(&self) -> bool {
        self.read
    }
    pub fn mark_read(&mut self) {
        self.read = true;
    }
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[cfg(test)]
mod user_tests {
    use super::*;

    #[test]
    fn username() {
        assert!(Username::new("al").is_err());
        assert!(Username::new("alice").is_ok());
        assert!(Username::new("9lives").is_err());
        assert!(Username::new("login").is_err());
        assert!(Username::new("a.b-c_d").is_ok());
        assert!(Username::new("no spaces").is_err());
    }

    #[test]
    fn generated_usernames_are_valid() {
        // Whatever the display name, the generated username must refine
        for name in ["John Doe", "我不知道", "  ", "42", "X Æ A-12"] {
            let username = generated_username(name);
            assert!(Username::new(username.as_ref()).is_ok());
        }
        assert!(generated_username("John Doe").as_ref().starts_with("johndoe"));
    }

    #[test]
    fn bio() {
        assert!(Bio::new("").is_ok());
        assert!(Bio::new(&"x".repeat(300)).is_ok());
        assert!(Bio::new(&"x".repeat(301)).is_err());
    }

    #[test]
    fn passwords() {
        let username = Username::new("alice").unwrap(/* known good */);
        // "secret" is weak, but it's longer than three characters & that's the bar
        let user = User::new(&username, &SecretString::from("secret".to_string()), Some("Alice"))
            .unwrap(/* known good */);
        assert!(user.check_password(&SecretString::from("secret".to_string())).is_ok());
        assert!(matches!(
            user.check_password(&SecretString::from("wrong".to_string())),
            Err(Error::BadPassword { .. })
        ));
        assert!(User::new(&username, &SecretString::from("abc".to_string()), None).is_err());
    }

    #[test]
    fn external_users_have_no_password() {
        let user = User::new_external("google-oauth2|1234", "John Doe");
        assert!(matches!(
            user.check_password(&SecretString::from("anything".to_string())),
            Err(Error::NoPasswordCredential { .. })
        ));
        assert_eq!(Some("google-oauth2|1234"), user.external_id());
    }
}
