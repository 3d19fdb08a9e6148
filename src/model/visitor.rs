use std::fmt;
use std::str::FromStr;

use derive_new::new;
use serde::{Deserialize, Serialize};
use snafu::{ensure, Snafu};

use crate::time::{self, Timestamp};

const MAX_LENGTH: usize = 64;

/// An anonymous, client-generated identifier for a browser profile.
///
/// This is a soft hint used to key cooldowns, not an authenticated identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VisitorId(String);

impl VisitorId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Snafu, PartialEq)]
pub enum VisitorIdError {
    /// visitor id is empty
    Empty,

    #[snafu(display("visitor id is {length} characters long, at most {MAX_LENGTH} are allowed"))]
    TooLong { length: usize },

    #[snafu(display("visitor id contains the forbidden character {character:?}"))]
    ForbiddenCharacter { character: char },
}

impl FromStr for VisitorId {
    type Err = VisitorIdError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        ensure!(!text.is_empty(), EmptySnafu);
        ensure!(
            text.len() <= MAX_LENGTH,
            TooLongSnafu {
                length: text.len()
            }
        );

        if let Some(character) = text
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return ForbiddenCharacterSnafu { character }.fail();
        }

        Ok(Self(text.to_owned()))
    }
}

impl TryFrom<String> for VisitorId {
    type Error = VisitorIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<VisitorId> for String {
    fn from(id: VisitorId) -> Self {
        id.0
    }
}

impl AsRef<str> for VisitorId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VisitorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The cooldown record kept for each visitor under `likes/users/{visitor}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, new)]
pub struct VisitorLike {
    /// Epoch milliseconds of the visitor's last accepted like.
    pub last_like_timestamp: i64,
}

impl VisitorLike {
    pub fn at(timestamp: Timestamp) -> Self {
        Self::new(timestamp.timestamp_millis())
    }

    pub fn last_like(&self) -> Timestamp {
        time::from_millis(self.last_like_timestamp)
    }
}
