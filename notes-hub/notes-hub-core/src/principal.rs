//! Identifiers for pages, users and tokens, and the principals access is
//! resolved for.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Page identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageId(pub u64);

impl PageId {
    /// The virtual library root. Never names a stored page.
    pub const ROOT: PageId = PageId(0);

    pub fn is_root(self) -> bool {
        self == Self::ROOT
    }
}

/// User account identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl UserId {
    /// Caller without an authenticated session.
    pub const ANONYMOUS: UserId = UserId(1);
    /// Stands in for every logged-in user.
    pub const AUTHENTICATED: UserId = UserId(2);

    /// True for the two reserved ids that are not real accounts.
    pub fn is_pseudo(self) -> bool {
        self == Self::ANONYMOUS || self == Self::AUTHENTICATED
    }
}

/// API token identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(pub u64);

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::ANONYMOUS => f.write_str("anonymous"),
            Self::AUTHENTICATED => f.write_str("authenticated"),
            UserId(id) => write!(f, "{}", id),
        }
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity whose access is being checked.
///
/// Tokens are scoped to the account that issued them but never inherit that
/// account's ownership rights: a token only sees what was granted to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Principal {
    User(UserId),
    Token { id: TokenId, owner: UserId },
}

impl Principal {
    pub fn user(id: u64) -> Self {
        Principal::User(UserId(id))
    }

    pub fn token(id: u64, owner: u64) -> Self {
        Principal::Token {
            id: TokenId(id),
            owner: UserId(owner),
        }
    }

    /// The raw identifying id, zero when none was provided.
    pub fn raw_id(&self) -> u64 {
        match self {
            Principal::User(user) => user.0,
            Principal::Token { id, .. } => id.0,
        }
    }
}

impl From<UserId> for Principal {
    fn from(user: UserId) -> Self {
        Principal::User(user)
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Principal::User(user) => write!(f, "user {}", user),
            Principal::Token { id, owner } => write!(f, "token {} (owner {})", id, owner),
        }
    }
}
