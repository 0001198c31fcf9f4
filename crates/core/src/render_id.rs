//! Stable, content-derived container identifiers.

use crate::IslandsError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Number of hex characters kept from the digest.
pub const RENDER_ID_LEN: usize = 8;

/// Eight lowercase hex characters identifying one container on a page.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RenderId(String);

impl RenderId {
    /// Validates and wraps an identifier.
    pub fn new(value: impl Into<String>) -> Result<Self, IslandsError> {
        let value = value.into();
        let valid = value.len() == RENDER_ID_LEN
            && value
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if valid {
            Ok(Self(value))
        } else {
            Err(IslandsError::InvalidRenderId(value))
        }
    }

    /// Derives the identifier for the `ordinal`-th occurrence on a page.
    pub fn derive(page_id: &str, ordinal: usize) -> Self {
        Self::derive_salted(page_id, ordinal, 0)
    }

    fn derive_salted(page_id: &str, ordinal: usize, salt: u32) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(page_id.as_bytes());
        hasher.update(b":");
        hasher.update(ordinal.to_string().as_bytes());
        if salt > 0 {
            hasher.update(b"#");
            hasher.update(salt.to_string().as_bytes());
        }
        let digest = hex::encode(hasher.finalize());
        Self(digest[..RENDER_ID_LEN].to_string())
    }

    /// Borrow as `&str`.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RenderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RenderId {
    type Err = IslandsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for RenderId {
    type Error = IslandsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RenderId> for String {
    fn from(value: RenderId) -> Self {
        value.0
    }
}

/// Hands out unique ids for one page, in occurrence order.
#[derive(Debug)]
pub struct RenderIdAllocator<'a> {
    page_id: &'a str,
    next_ordinal: usize,
    issued: HashSet<RenderId>,
}

impl<'a> RenderIdAllocator<'a> {
    /// Starts allocation for a page.
    pub fn new(page_id: &'a str) -> Self {
        Self {
            page_id,
            next_ordinal: 0,
            issued: HashSet::new(),
        }
    }

    /// Issues the id for the next occurrence.
    ///
    /// Truncated digests may collide; a colliding id is re-derived with an
    /// increasing salt so the page never holds the same id twice.
    pub fn next_id(&mut self) -> RenderId {
        let ordinal = self.next_ordinal;
        self.next_ordinal += 1;
        let mut salt = 0;
        loop {
            let id = RenderId::derive_salted(self.page_id, ordinal, salt);
            if self.issued.insert(id.clone()) {
                return id;
            }
            salt += 1;
        }
    }
}
