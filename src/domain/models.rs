//! Domain models
//!
//! Accounts, items (posts/comments), and votes as the rest of the
//! application knows them. These are owned and persisted by the external
//! repository; this crate only reads them to build wire objects, or
//! populates transient values extracted from wire objects before handing
//! them back for persistence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Votes are stored with a fixed-point multiplier; the wire score divides
/// it back out.
pub const SCORE_MULTIPLIER: i64 = 10_000;

/// Handle of the anonymous/unauthenticated actor
pub const ANONYMOUS_HANDLE: &str = "anonymous";

// =============================================================================
// Hash
// =============================================================================

/// Content-derived entity key (sha256 hex)
///
/// The canonical key is the full 64-character digest; collections and
/// identifiers use the 8-character short form. A zero-length hash denotes
/// the anonymous actor (for accounts) or an unsaved entity (for items).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hash(String);

impl Hash {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Derive a key from content bytes, timestamp, and submitter identity
    pub fn derive(data: &[u8], at: DateTime<Utc>, submitted_by: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        hasher.update(at.timestamp_nanos_opt().unwrap_or_default().to_string());
        hasher.update(submitted_by);
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 8-character short form used in identifiers
    ///
    /// Hashes minted locally are hex, but a hash can also be lifted from
    /// an arbitrary identifier segment, so truncation must stay on a
    /// character boundary.
    pub fn short(&self) -> &str {
        let mut end = self.0.len().min(8);
        while !self.0.is_char_boundary(end) {
            end -= 1;
        }
        &self.0[..end]
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Two hashes match when one is a prefix of the other. Lets an
    /// 8-character wire hash resolve a fully-keyed stored entity.
    pub fn matches(&self, other: &Hash) -> bool {
        if self.0.is_empty() || other.0.is_empty() {
            return false;
        }
        self.0.starts_with(&other.0) || other.0.starts_with(&self.0)
    }
}

impl From<&str> for Hash {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Account
// =============================================================================

/// A posting identity, local or federated
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Account {
    pub hash: Hash,
    pub handle: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub score: i64,
    pub metadata: Option<AccountMetadata>,
}

/// Federation metadata attached to an account
///
/// For local accounts only `key`, `blurb`, and `icon` are meaningful;
/// endpoint IRIs are derived deterministically from the hash. Federated
/// accounts carry their endpoints verbatim here and they are never
/// synthesized.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountMetadata {
    /// Remote actor identifier; `Some` marks the account as federated
    pub id: Option<String>,
    pub name: Option<String>,
    pub blurb: Option<String>,
    pub icon: Option<ImageMetadata>,
    pub inbox: Option<String>,
    pub outbox: Option<String>,
    pub liked: Option<String>,
    pub followers: Option<String>,
    pub following: Option<String>,
    pub url: Option<String>,
    /// DER-encoded public key bytes
    pub key: Option<Vec<u8>>,
}

/// Avatar metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub uri: String,
    pub mime_type: String,
}

impl Account {
    /// The fixed anonymous actor (zero-length hash)
    pub fn anonymous() -> Self {
        Self {
            handle: ANONYMOUS_HANDLE.to_string(),
            ..Self::default()
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.hash.is_empty()
    }

    /// An account is federated when it carries a remote identifier
    pub fn is_federated(&self) -> bool {
        self.metadata
            .as_ref()
            .is_some_and(|m| m.id.as_deref().is_some_and(|id| !id.is_empty()))
    }

    pub fn is_local(&self) -> bool {
        !self.is_federated()
    }

    pub fn is_valid(&self) -> bool {
        !self.hash.is_empty() || !self.handle.is_empty()
    }
}

// =============================================================================
// Item
// =============================================================================

/// Body media type of an item
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaType {
    #[default]
    Text,
    Html,
    Markdown,
    /// The item is a submitted link; the body holds the URL
    Url,
}

impl MediaType {
    pub fn as_mime(self) -> &'static str {
        match self {
            Self::Text => "text/plain",
            Self::Html => "text/html",
            Self::Markdown => "text/markdown",
            Self::Url => "application/url",
        }
    }

    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            "text/plain" => Some(Self::Text),
            "text/html" => Some(Self::Html),
            "text/markdown" => Some(Self::Markdown),
            "application/url" => Some(Self::Url),
            _ => None,
        }
    }
}

/// A content unit: top-level post or comment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Item {
    pub hash: Hash,
    pub title: String,
    /// Raw body: text, HTML, markdown source, or a URL per `media_type`
    pub body: String,
    pub media_type: MediaType,
    pub submitted_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub submitted_by: Option<Box<Account>>,
    /// Direct reply-to reference
    pub parent: Option<Box<Item>>,
    /// Conversation root reference
    pub root: Option<Box<Item>>,
    pub deleted: bool,
    pub score: i64,
    pub metadata: Option<ItemMetadata>,
}

/// Mentions and tags carried by an item
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemMetadata {
    pub mentions: Vec<Label>,
    pub tags: Vec<Label>,
}

/// A named, addressable annotation (mention or tag)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub url: String,
}

impl Item {
    pub fn is_link(&self) -> bool {
        self.media_type == MediaType::Url
    }

    /// Words in the body, used to pick Note vs Article on the wire
    pub fn word_count(&self) -> usize {
        self.body.split_whitespace().count()
    }
}

// =============================================================================
// Vote
// =============================================================================

/// A signed endorsement of an item
///
/// `weight` of zero means retracted, positive means in favor, negative
/// against. Exactly one wire shape (Undo/Like/Dislike) derives from the
/// sign.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Vote {
    pub submitted_by: Account,
    pub item: Item,
    pub weight: i64,
    pub submitted_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_hash_is_stable_and_hex() {
        let at = chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let a = Hash::derive(b"hello world", at, "someone");
        let b = Hash::derive(b"hello world", at, "someone");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
        assert_eq!(a.short().len(), 8);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn short_form_respects_character_boundaries() {
        assert_eq!(Hash::new("abc").short(), "abc");
        // a multi-byte character straddling the cutoff is dropped whole
        let lifted = Hash::new("abcdefgéxyz");
        assert!(lifted.short().len() <= 8);
        assert!(lifted.as_str().starts_with(lifted.short()));
    }

    #[test]
    fn short_hash_matches_full_hash() {
        let full = Hash::new("a40e048f6e5fbd1941f3d146b09d421da80c84f4f9829b39fa35e44dfb57a1c8");
        let short = Hash::new("a40e048f");
        assert!(short.matches(&full));
        assert!(full.matches(&short));
        assert!(!Hash::default().matches(&full));
    }

    #[test]
    fn anonymous_account_has_empty_hash() {
        let anon = Account::anonymous();
        assert!(anon.is_anonymous());
        assert!(anon.is_local());
        assert_eq!(anon.handle, ANONYMOUS_HANDLE);
    }

    #[test]
    fn federated_flag_follows_remote_id() {
        let mut acc = Account {
            hash: Hash::new("aabbccdd"),
            handle: "jdoe".to_string(),
            ..Account::default()
        };
        assert!(acc.is_local());

        acc.metadata = Some(AccountMetadata {
            id: Some("https://remote.example/users/jdoe".to_string()),
            ..AccountMetadata::default()
        });
        assert!(acc.is_federated());
    }

    #[test]
    fn media_type_mime_round_trip() {
        for mt in [
            MediaType::Text,
            MediaType::Html,
            MediaType::Markdown,
            MediaType::Url,
        ] {
            assert_eq!(MediaType::from_mime(mt.as_mime()), Some(mt));
        }
        assert_eq!(MediaType::from_mime("image/png"), None);
    }
}
