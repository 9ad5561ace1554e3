// File: src/cache/core/ids.rs

//! Identifier types for the message cache.
//!
//! Three handles flow through the engine:
//! - [`ConversationId`]: names a remote message source and its storage partition.
//! - [`MessageId`]: the source-assigned message number, unique within a conversation.
//! - [`MediaId`]: the opaque handle for a downloaded attachment. It is generated,
//!   never derived from a remote or local path, and is the only media handle that
//!   leaves the engine.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ===== Conversation IDs =====================================================

/// Errors returned when parsing/validating a [`ConversationId`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationIdError {
    /// Empty (or whitespace-only) identifier.
    Empty,
    /// Exceeds the maximum accepted length.
    TooLong {
        /// Maximum allowed length.
        max: usize,
        /// Actual length received.
        got: usize,
    },
    /// Contains a disallowed character.
    InvalidChar {
        /// The invalid character.
        ch: char,
        /// The index where it was found.
        index: usize,
    },
}

impl fmt::Display for ConversationIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "conversation id must not be empty"),
            Self::TooLong { max, got } => {
                write!(f, "conversation id too long: got {got}, max {max}")
            }
            Self::InvalidChar { ch, index } => {
                write!(
                    f,
                    "conversation id contains invalid character {ch:?} at index {index}"
                )
            }
        }
    }
}

impl std::error::Error for ConversationIdError {}

/// Identifier for a remote conversation (channel, group or chat).
///
/// The id doubles as the name of the conversation's storage directory, so it
/// is restricted to `[A-Za-z0-9_]` with an optional leading `-` (negative
/// numeric ids are common for channels).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ConversationId(String);

impl ConversationId {
    /// Hard ceiling to keep partition paths sane.
    pub const MAX_LEN: usize = 64;

    /// Build a validated `ConversationId`.
    ///
    /// # Errors
    /// Returns `ConversationIdError` if the input is empty, too long, or contains invalid characters.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, ConversationIdError> {
        let s = raw.as_ref().trim();

        if s.is_empty() {
            return Err(ConversationIdError::Empty);
        }
        if s.len() > Self::MAX_LEN {
            return Err(ConversationIdError::TooLong {
                max: Self::MAX_LEN,
                got: s.len(),
            });
        }

        for (i, ch) in s.chars().enumerate() {
            let ok = ch.is_ascii_alphanumeric() || ch == '_' || (ch == '-' && i == 0);
            if !ok {
                return Err(ConversationIdError::InvalidChar { ch, index: i });
            }
        }
        if s == "-" {
            return Err(ConversationIdError::InvalidChar { ch: '-', index: 0 });
        }

        Ok(Self(s.to_owned()))
    }

    /// Borrow as `&str`.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConversationId {
    type Err = ConversationIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ConversationId {
    type Error = ConversationIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ConversationId> for String {
    fn from(value: ConversationId) -> Self {
        value.0
    }
}

impl From<i64> for ConversationId {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

// ===== Message IDs ==========================================================

/// Source-assigned message identifier, unique within one conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct MessageId(pub i64);

impl MessageId {
    /// Raw integer value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for MessageId {
    #[inline]
    fn from(value: i64) -> Self {
        Self(value)
    }
}

// ===== Media IDs ============================================================

/// Opaque identifier for a downloaded attachment.
///
/// Always random (`UUIDv4`) so the handle leaks nothing about when or where the
/// file was stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct MediaId(pub Uuid);

impl Default for MediaId {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl MediaId {
    /// Create a new identifier.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[inline]
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Borrow the underlying UUID.
    #[inline]
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for MediaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for MediaId {
    #[inline]
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl FromStr for MediaId {
    type Err = uuid::Error;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}
