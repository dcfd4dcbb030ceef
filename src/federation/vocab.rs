//! Wire vocabulary
//!
//! Closed tagged representations of the activity-graph vocabulary this
//! instance speaks: objects (Note/Article/Document/Page/Tombstone), actors
//! (Person/Service), activities (Create/Update/Delete/Like/Dislike/Undo/
//! Follow), and ordered collections. Dispatch is pattern matching over the
//! discriminant, never open-ended type inspection.
//!
//! Serialized as JSON-LD with a fixed context that extends the base
//! vocabulary with the security extension and an instance-scoped `score`
//! term.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Content type for every federation response
pub const ACTIVITY_JSON: &str = "application/activity+json";

/// The well-known public audience collection
pub const PUBLIC_IRI: &str = "https://www.w3.org/ns/activitystreams#Public";

/// Fixed JSON-LD context declaration
///
/// Base vocabulary + security extension + the instance-scoped `score` term.
pub fn ld_context(base_url: &str) -> serde_json::Value {
    serde_json::json!([
        "https://www.w3.org/ns/activitystreams",
        "https://w3id.org/security/v1",
        { "score": format!("{}/ns#score", base_url) },
    ])
}

/// Serialize a wire value with the `@context` declaration attached
pub fn with_ld_context<T: Serialize>(value: &T, base_url: &str) -> serde_json::Value {
    let mut json = serde_json::to_value(value).unwrap_or_default();
    if let Some(map) = json.as_object_mut() {
        map.insert("@context".to_string(), ld_context(base_url));
    }
    json
}

// =============================================================================
// Discriminants
// =============================================================================

/// Object types this instance understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectKind {
    Note,
    Article,
    Document,
    Page,
    Tombstone,
}

/// Activity types this instance understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActivityKind {
    Create,
    Update,
    Delete,
    Like,
    Dislike,
    Undo,
    Follow,
}

impl ActivityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "Create",
            Self::Update => "Update",
            Self::Delete => "Delete",
            Self::Like => "Like",
            Self::Dislike => "Dislike",
            Self::Undo => "Undo",
            Self::Follow => "Follow",
        }
    }
}

/// Actor types this instance produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActorKind {
    Person,
    Service,
}

// =============================================================================
// Objects
// =============================================================================

/// A wire object: the content/subject of an activity
///
/// Tombstones reuse the same struct: `kind == Tombstone` with
/// `former_type`/`deleted` set and the active-content fields left empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Object {
    #[serde(rename = "type")]
    pub kind: Option<ObjectKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Display markup
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Media type of `content`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    /// Raw source alongside rendered content, separately tagged
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributed_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<String>,
    /// Conversation root link
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tag: Vec<Tag>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<i64>,
    /// Replies collection IRI, attached when replies exist
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replies: Option<String>,
    /// Former type of a tombstoned object
    #[serde(skip_serializing_if = "Option::is_none")]
    pub former_type: Option<ObjectKind>,
    /// Deletion timestamp of a tombstoned object
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted: Option<DateTime<Utc>>,
}

/// Raw source of a rendered object
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Source {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
}

/// Inline annotation: a mention or a tag
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Tag {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
}

// =============================================================================
// Actors
// =============================================================================

/// A wire actor document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    #[serde(rename = "type")]
    pub kind: ActorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Long-form rendered description (service actor)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<Image>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inbox: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outbox: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liked: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub followers: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub following: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<PublicKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoints: Option<Endpoints>,
}

impl Default for Actor {
    fn default() -> Self {
        Self {
            kind: ActorKind::Person,
            id: None,
            preferred_username: None,
            name: None,
            summary: None,
            content: None,
            icon: None,
            url: None,
            inbox: None,
            outbox: None,
            liked: None,
            followers: None,
            following: None,
            published: None,
            updated: None,
            score: None,
            public_key: None,
            endpoints: None,
        }
    }
}

/// Avatar image
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    pub url: String,
}

/// PEM public key advertised by an actor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKey {
    pub id: String,
    pub owner: String,
    pub public_key_pem: String,
}

/// Actor endpoint declarations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoints {
    pub shared_inbox: String,
    pub oauth_authorization_endpoint: String,
    pub oauth_token_endpoint: String,
}

// =============================================================================
// Reference-or-value wrappers
// =============================================================================

/// An object given inline or by reference
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ObjectOrLink {
    Link(String),
    Object(Box<Object>),
}

impl ObjectOrLink {
    pub fn iri(&self) -> &str {
        match self {
            Self::Link(iri) => iri,
            Self::Object(o) => o.id.as_deref().unwrap_or_default(),
        }
    }

    pub fn is_link(&self) -> bool {
        matches!(self, Self::Link(_))
    }

    pub fn object(&self) -> Option<&Object> {
        match self {
            Self::Object(o) => Some(o),
            Self::Link(_) => None,
        }
    }
}

/// An actor given inline or by reference
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActorOrLink {
    Link(String),
    Actor(Box<Actor>),
}

impl ActorOrLink {
    pub fn iri(&self) -> &str {
        match self {
            Self::Link(iri) => iri,
            Self::Actor(a) => a.id.as_deref().unwrap_or_default(),
        }
    }

    pub fn actor(&self) -> Option<&Actor> {
        match self {
            Self::Actor(a) => Some(a),
            Self::Link(_) => None,
        }
    }
}

// =============================================================================
// Activities
// =============================================================================

/// The wire envelope: a typed action wrapping a target object
///
/// Constructed once; never mutated after validation succeeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<ActorOrLink>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object: Option<ObjectOrLink>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributed_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub to: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub cc: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub bto: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub bcc: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<String>,
    /// Conversation root link
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl Activity {
    pub fn new(kind: ActivityKind) -> Self {
        Self {
            kind,
            id: None,
            actor: None,
            object: None,
            attributed_to: None,
            published: None,
            to: Vec::new(),
            cc: Vec::new(),
            bto: Vec::new(),
            bcc: Vec::new(),
            in_reply_to: None,
            context: None,
        }
    }

    pub fn actor_iri(&self) -> &str {
        self.actor.as_ref().map(ActorOrLink::iri).unwrap_or_default()
    }

    pub fn object_iri(&self) -> &str {
        self.object
            .as_ref()
            .map(ObjectOrLink::iri)
            .unwrap_or_default()
    }
}

/// Audience fields arrive as a single IRI, an array of IRIs, or an array
/// of objects carrying an `id`. Normalize all of them to a string list.
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Entry {
        Iri(String),
        Object { id: String },
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(Entry),
        Many(Vec<Entry>),
    }

    let entry_iri = |e: Entry| match e {
        Entry::Iri(iri) => iri,
        Entry::Object { id } => id,
    };

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(entry)) => vec![entry_iri(entry)],
        Some(OneOrMany::Many(entries)) => entries.into_iter().map(entry_iri).collect(),
    })
}

// =============================================================================
// Collections
// =============================================================================

/// Wire type tag of a collection document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollectionType {
    OrderedCollection,
    OrderedCollectionPage,
}

/// An ordered, counted view over a homogeneous sequence
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    #[serde(rename = "type")]
    pub kind: CollectionType,
    pub id: String,
    pub total_items: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ordered_items: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub part_of: Option<String>,
}

/// Named collections addressable under an actor or the service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    Inbox,
    Outbox,
    Liked,
    Followers,
    Following,
    Replies,
}

impl CollectionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inbox => "inbox",
            Self::Outbox => "outbox",
            Self::Liked => "liked",
            Self::Followers => "followers",
            Self::Following => "following",
            Self::Replies => "replies",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "inbox" => Some(Self::Inbox),
            "outbox" => Some(Self::Outbox),
            "liked" => Some(Self::Liked),
            "followers" => Some(Self::Followers),
            "following" => Some(Self::Following),
            "replies" => Some(Self::Replies),
            _ => None,
        }
    }
}

impl std::fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
