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

//! # blogroll Session Tokens
//!
//! The blogroll session credential is a [JWT] signed with HMAC-SHA-256 under a versioned
//! [SigningKey]. Both issuance paths-- password login & the OAuth callback-- converge on
//! [mint_token]; the session-resolution middleware calls [verify_token].
//!
//! [JWT]: https://www.rfc-editor.org/rfc/rfc7519.html
//!
//! The token names both the username & the user id, is good for `lifetime` (one hour, by default,
//! per configuration), and travels in an HTTP-only cookie. Note that the *cookie* is good for
//! twenty-four hours: a live cookie can outlast its token, in which case the bearer is simply
//! asked to authenticate again.

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use jwt::{Header, SignWithKey, Token, VerifyWithKey};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use snafu::{prelude::*, Backtrace};

use crate::{
    entities::{UserId, Username},
    signing_keys::{self, KeyId, SigningKey, SigningKeys},
};

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                       module Error type                                        //
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Token expired at {expires}"))]
    Expired {
        expires: DateTime<Utc>,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to create an HMAC: {source}"))]
    Hmac {
        source: crypto_common::InvalidLength,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to refine a string to a KeyId: {source}"))]
    KeyId {
        source: signing_keys::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("The Key ID was missing from the JWT"))]
    MissingKeyId { backtrace: Backtrace },
    #[snafu(display("No signing key matching {keyid}: {source}"))]
    NoKey {
        keyid: KeyId,
        source: signing_keys::Error,
    },
    #[snafu(display("Invalid token: not before {not_before}"))]
    NotBefore {
        not_before: DateTime<Utc>,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to parse JWT: {source}"))]
    Parse {
        source: jwt::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to sign JWT claims: {source}"))]
    Signature {
        source: jwt::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Verification failure: {source}"))]
    Verification {
        source: jwt::Error,
        backtrace: Backtrace,
    },
}

type Result<T> = std::result::Result<T, Error>;

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                   the blogroll Session Token                                   //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// blogroll session [JWT] claims: the subject's username & user id, plus validity bounds
///
/// [JWT]: https://www.rfc-editor.org/rfc/rfc7519.html
#[derive(Clone, Debug, Deserialize, Serialize)]
struct SessionClaims {
    #[serde(rename = "iat")]
    issued_at: DateTime<Utc>,
    #[serde(rename = "nbf")]
    not_before: DateTime<Utc>,
    #[serde(rename = "exp")]
    expires: DateTime<Utc>,
    #[serde(rename = "sub")]
    subject: Username,
    #[serde(rename = "uid")]
    user_id: UserId,
}

/// Mint a new session JWT
///
/// Mint a new token naming `username`/`user_id`, signed using `signing_key` (identified by
/// `keyid`). The token will be valid for duration `lifetime`. The fully serialized JWT is
/// returned.
pub fn mint_token(
    username: &Username,
    user_id: &UserId,
    keyid: &KeyId,
    signing_key: &SigningKey,
    lifetime: &Duration,
) -> Result<String> {
    let key: Hmac<Sha256> =
        Hmac::new_from_slice(signing_key.as_ref().expose_secret()).context(HmacSnafu)?;
    let header = Header {
        key_id: Some(keyid.to_string()),
        ..Default::default()
    };
    let now = Utc::now();
    let claims = SessionClaims {
        issued_at: now,
        not_before: now,
        expires: now + *lifetime,
        subject: username.clone(),
        user_id: *user_id,
    };
    Ok(Token::new(header, claims)
        .sign_with_key(&key)
        .context(SignatureSnafu)?
        .as_str()
        .to_owned())
}

/// Verify a session JWT; on success, return the (username, user id) pair it names
///
/// The caller is responsible for resolving the user id to a live user record-- a valid token
/// naming a since-deleted user is still an authentication failure, but not one this module can
/// detect.
pub fn verify_token(token_string: &str, keys: &SigningKeys) -> Result<(Username, UserId)> {
    let token: Token<Header, SessionClaims, _ /* Unverified<'_> */> =
        Token::parse_unverified(token_string).context(ParseSnafu)?;
    let keyid = token
        .header()
        .key_id
        .clone()
        .ok_or(MissingKeyIdSnafu.build())?;
    let keyid = KeyId::new(&keyid).context(KeyIdSnafu)?;
    let signing_key = keys.find_by_version(&keyid).context(NoKeySnafu { keyid })?;
    let key: Hmac<Sha256> =
        Hmac::new_from_slice(signing_key.as_ref().expose_secret()).context(HmacSnafu)?;
    let token: Token<Header, SessionClaims, _> = token_string
        .verify_with_key(&key)
        .context(VerificationSnafu)?;
    let claims = token.claims();

    let now = Utc::now();

    if now < claims.not_before {
        return NotBeforeSnafu {
            not_before: claims.not_before,
        }
        .fail();
    }
    if now > claims.expires {
        return ExpiredSnafu {
            expires: claims.expires,
        }
        .fail();
    }

    Ok((claims.subject.clone(), claims.user_id))
}

#[cfg(test)]
mod session_token_tests {
    use super::*;

    #[test]
    fn verify_minted_token() {
        let username = Username::new("johndoe").unwrap(/* known good */);
        let user_id = UserId::new();
        let key_id = KeyId::new("keyid:20250817").unwrap(/* known good */);
        // With apologies to J.R.R. Tolkein, but I needed 64 bytes exactly.
        let signing_key = SigningKey::new(b"All that is gold does not glitter-- Not all who wander are lost.".to_vec()).unwrap(/* known good */);

        let token_result = mint_token(
            &username,
            &user_id,
            &key_id,
            &signing_key,
            &Duration::seconds(300),
        );
        assert!(token_result.is_ok());

        let token = token_result.unwrap(/* known good */);

        let keys = SigningKeys::from([(key_id, signing_key)]);

        let verify_result = verify_token(&token, &keys);
        assert!(verify_result.is_ok());

        let (verified_name, verified_id) = verify_result.unwrap(/* known good */);
        assert_eq!(username, verified_name);
        assert_eq!(user_id, verified_id);
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let username = Username::new("johndoe").unwrap(/* known good */);
        let user_id = UserId::new();
        let key_id = KeyId::new("keyid:20250817").unwrap(/* known good */);
        let signing_key = SigningKey::new(b"All that is gold does not glitter-- Not all who wander are lost.".to_vec()).unwrap(/* known good */);

        // A negative lifetime gives us an already-expired token without sleeping
        let token = mint_token(
            &username,
            &user_id,
            &key_id,
            &signing_key,
            &Duration::seconds(-300),
        )
        .unwrap(/* known good */);

        let keys = SigningKeys::from([(key_id, signing_key)]);
        assert!(matches!(
            verify_token(&token, &keys),
            Err(Error::Expired { .. })
        ));
    }

    #[test]
    fn tampered_tokens_are_rejected() {
        let username = Username::new("johndoe").unwrap(/* known good */);
        let user_id = UserId::new();
        let key_id = KeyId::new("keyid:20250817").unwrap(/* known good */);
        let signing_key = SigningKey::new(b"All that is gold does not glitter-- Not all who wander are lost.".to_vec()).unwrap(/* known good */);

        let token = mint_token(
            &username,
            &user_id,
            &key_id,
            &signing_key,
            &Duration::seconds(300),
        )
        .unwrap(/* known good */);

        // Verify under a *different* key
        let other = SigningKey::new(b"Speak, friend, and enter. Speak, friend, and enter. Mellon!!!!!!".to_vec()).unwrap(/* known good */);
        let keys = SigningKeys::from([(key_id, other)]);
        assert!(verify_token(&token, &keys).is_err());
    }
}
