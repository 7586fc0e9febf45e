use std::{error::Error, fmt, str::FromStr};

use axum::http::{
    header::{AUTHORIZATION, COOKIE},
    HeaderMap,
};
use rand::RngCore;
use tracing::{debug, warn};

pub mod database;

pub use database::Database;

use crate::id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UserId(pub [u8; id::ID_LEN]);

impl UserId {
    pub fn new(rng: &mut dyn RngCore) -> Self {
        Self(id::random(rng))
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        id::serialize(f, "user_", &self.0)
    }
}

impl FromStr for UserId {
    type Err = InvalidUserId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        id::deserialize(s, "user_")
            .map(Self)
            .map_err(|_| InvalidUserId)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidUserId;

impl fmt::Display for InvalidUserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid user ID")
    }
}

impl Error for InvalidUserId {}

/// Bearer credential handed out by the login flow.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionToken(pub [u8; id::ID_LEN]);

impl SessionToken {
    pub fn new(rng: &mut dyn RngCore) -> Self {
        Self(id::random(rng))
    }
}

// Never print the token itself into logs.
impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(..)")
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        id::serialize(f, "session_", &self.0)
    }
}

impl FromStr for SessionToken {
    type Err = InvalidSessionToken;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        id::deserialize(s, "session_")
            .map(Self)
            .map_err(|_| InvalidSessionToken)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidSessionToken;

impl fmt::Display for InvalidSessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid session token")
    }
}

impl Error for InvalidSessionToken {}

pub const SESSION_COOKIE: &str = "session";

/// Finds the session token in the `Authorization: Bearer` header, falling back to the session
/// cookie.
pub fn session_token(headers: &HeaderMap) -> Option<SessionToken> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));
    let raw = bearer.or_else(|| {
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == SESSION_COOKIE)
            .map(|(_, value)| value)
    })?;
    raw.trim().parse().ok()
}

/// Resolves the caller of a request to a user, if they hold a live session.
pub async fn identify(database: &Database, headers: &HeaderMap) -> Option<UserId> {
    let Some(token) = session_token(headers) else {
        debug!("request carries no session token");
        return None;
    };
    match database.session_user(token).await {
        Ok(user_id) => user_id,
        Err(error) => {
            warn!(?error, "cannot look up session");
            None
        }
    }
}
