//! Entity <-> wire mapping
//!
//! Pure translation between domain entities and wire documents. Outbound
//! methods take finished entities and produce documents; inbound methods
//! take parsed documents plus the resolved caller and produce entities.
//! Nothing here touches storage.

use std::sync::Arc;

use chrono::Utc;
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey, LineEnding};
use rsa::RsaPublicKey;
use sha2::{Digest, Sha256};

use crate::config::InstanceConfig;
use crate::domain::{
    Account, AccountMetadata, ContentRenderer, Hash, ImageMetadata, Item, ItemMetadata, Label,
    MediaType, Vote, SCORE_MULTIPLIER,
};
use crate::error::{AppError, Result};
use crate::federation::ids::IriBuilder;
use crate::federation::vocab::{
    Activity, ActivityKind, Actor, ActorKind, ActorOrLink, CollectionKind, Endpoints, Image,
    Object, ObjectKind, ObjectOrLink, PublicKey, Source, Tag, PUBLIC_IRI,
};

/// Body length, in words, above which an item federates as an Article
const ARTICLE_WORD_THRESHOLD: usize = 300;

/// Translates between domain entities and wire documents
pub struct Mapper {
    ids: IriBuilder,
    renderer: Arc<dyn ContentRenderer>,
    instance: InstanceConfig,
}

impl Mapper {
    pub fn new(ids: IriBuilder, renderer: Arc<dyn ContentRenderer>, instance: InstanceConfig) -> Self {
        Self {
            ids,
            renderer,
            instance,
        }
    }

    pub fn ids(&self) -> &IriBuilder {
        &self.ids
    }

    /// Wire object type an item federates as
    ///
    /// Links become Pages; long bodies become Articles; everything else
    /// is a Note.
    fn object_kind(item: &Item) -> ObjectKind {
        if item.is_link() {
            ObjectKind::Page
        } else if item.word_count() > ARTICLE_WORD_THRESHOLD {
            ObjectKind::Article
        } else {
            ObjectKind::Note
        }
    }

    // =========================================================================
    // Outbound
    // =========================================================================

    /// Map an item to its wire object
    ///
    /// Deleted items map to a Tombstone that keeps only the identifier,
    /// former type, deletion time, and thread links. No content field
    /// survives deletion.
    pub fn item_to_object(&self, item: &Item) -> Object {
        let id = self.ids.item_object(item);
        let kind = Self::object_kind(item);
        let in_reply_to = item
            .parent
            .as_deref()
            .and_then(|p| self.ids.item_object(p));
        let context = item.root.as_deref().and_then(|r| self.ids.item_object(r));

        if item.deleted {
            return Object {
                kind: Some(ObjectKind::Tombstone),
                id,
                former_type: Some(kind),
                deleted: item.updated_at,
                in_reply_to,
                context,
                ..Object::default()
            };
        }

        let mut o = Object {
            kind: Some(kind),
            id,
            published: item.submitted_at,
            updated: item.updated_at,
            score: Some(item.score / SCORE_MULTIPLIER),
            in_reply_to,
            context,
            ..Object::default()
        };

        if item.is_link() {
            o.url = Some(item.body.clone());
        } else {
            match item.media_type {
                MediaType::Html => {
                    o.media_type = Some(MediaType::Html.as_mime().to_string());
                    o.content = Some(item.body.clone());
                }
                _ => {
                    o.media_type = Some(MediaType::Html.as_mime().to_string());
                    o.content = Some(self.renderer.render(&item.body));
                    o.source = Some(Source {
                        content: Some(item.body.clone()),
                        media_type: Some(item.media_type.as_mime().to_string()),
                    });
                }
            }
        }

        if !item.title.is_empty() {
            o.name = Some(item.title.clone());
        }
        if let Some(author) = item.submitted_by.as_deref() {
            o.attributed_to = Some(self.ids.actor(author));
        }
        if let Some(meta) = &item.metadata {
            for mention in &meta.mentions {
                o.tag.push(Tag {
                    kind: Some("Mention".to_string()),
                    id: Some(mention.url.clone()),
                    name: mention.name.clone(),
                });
            }
            for tag in &meta.tags {
                o.tag.push(Tag {
                    kind: None,
                    id: Some(tag.url.clone()),
                    name: tag.name.clone(),
                });
            }
        }
        o
    }

    /// Attach the replies collection link to an object
    ///
    /// Called by handlers once they know replies exist; the mapper itself
    /// never queries for them.
    pub fn attach_replies(&self, object: &mut Object) {
        if let Some(id) = &object.id {
            object.replies = Some(self.ids.replies(id));
        }
    }

    /// Wrap an item in its outbox activity
    ///
    /// Live items federate as Create; deleted ones as Delete carrying the
    /// tombstone, attributed to the anonymous actor.
    pub fn item_to_activity(&self, item: &Item) -> Activity {
        let object = self.item_to_object(item);
        let kind = if item.deleted {
            ActivityKind::Delete
        } else {
            ActivityKind::Create
        };
        let actor_iri = if item.deleted {
            self.ids.actor(&Account::anonymous())
        } else {
            item.submitted_by
                .as_deref()
                .map(|a| self.ids.actor(a))
                .unwrap_or_else(|| self.ids.actor(&Account::anonymous()))
        };

        let mut act = Activity::new(kind);
        act.id = self.ids.item_activity(item);
        act.published = item.submitted_at;
        act.to = vec![PUBLIC_IRI.to_string()];
        act.cc = vec![self.ids.global_outbox()];
        act.actor = Some(ActorOrLink::Link(actor_iri));
        act.object = Some(ObjectOrLink::Object(Box::new(object)));
        act
    }

    /// Map a vote to its wire activity
    ///
    /// The weight sign alone picks the shape: positive is Like, negative
    /// is Dislike, zero is Undo.
    pub fn vote_to_activity(&self, vote: &Vote) -> Activity {
        let kind = match vote.weight {
            0 => ActivityKind::Undo,
            w if w > 0 => ActivityKind::Like,
            _ => ActivityKind::Dislike,
        };
        let mut act = Activity::new(kind);
        act.id = Some(self.ids.vote(vote));
        act.published = vote.submitted_at;
        act.actor = Some(ActorOrLink::Link(self.ids.actor(&vote.submitted_by)));
        act.object = self
            .ids
            .item_object(&vote.item)
            .map(ObjectOrLink::Link);
        act
    }

    /// Map an account to its actor document
    pub fn account_to_actor(&self, account: &Account) -> Actor {
        let mut p = Actor {
            kind: ActorKind::Person,
            ..Actor::default()
        };
        p.preferred_username = Some(account.handle.clone());

        if let Some(meta) = &account.metadata {
            if let Some(blurb) = meta.blurb.as_deref().filter(|b| !b.is_empty()) {
                p.summary = Some(blurb.to_string());
            }
            if let Some(icon) = &meta.icon {
                p.icon = Some(Image {
                    kind: "Image".to_string(),
                    media_type: Some(icon.mime_type.clone()),
                    url: icon.uri.clone(),
                });
            }
        }

        if account.is_federated() {
            // endpoints arrive with the account and are echoed verbatim
            let meta = account.metadata.as_ref();
            p.id = meta.and_then(|m| m.id.clone());
            p.name = meta.and_then(|m| m.name.clone());
            p.inbox = meta.and_then(|m| m.inbox.clone());
            p.outbox = meta.and_then(|m| m.outbox.clone());
            p.liked = meta.and_then(|m| m.liked.clone());
            p.followers = meta.and_then(|m| m.followers.clone());
            p.following = meta.and_then(|m| m.following.clone());
            p.url = meta.and_then(|m| m.url.clone());
        } else {
            p.name = Some(account.handle.clone());
            p.inbox = Some(self.ids.collection(account, CollectionKind::Inbox));
            p.outbox = Some(self.ids.collection(account, CollectionKind::Outbox));
            p.liked = Some(self.ids.collection(account, CollectionKind::Liked));
            p.url = Some(format!("{}/~{}", self.ids.base_url(), account.handle));
            p.published = account.created_at;
            p.updated = account.updated_at;
        }

        if !account.hash.is_empty() {
            p.id = Some(self.ids.actor(account));
        }
        p.score = Some(account.score);

        if let Some(der) = account.metadata.as_ref().and_then(|m| m.key.as_deref()) {
            match Self::pem_from_der(der) {
                Ok(pem) => {
                    let owner = p.id.clone().unwrap_or_default();
                    p.public_key = Some(PublicKey {
                        id: format!("{owner}#main-key"),
                        owner,
                        public_key_pem: pem,
                    });
                }
                Err(err) => {
                    tracing::warn!(account = %account.hash.short(), %err, "stored public key is not valid DER, omitting");
                }
            }
        }

        p.endpoints = Some(self.endpoints());
        p
    }

    /// The actor document for the instance itself
    pub fn service_actor(&self) -> Actor {
        Actor {
            kind: ActorKind::Service,
            id: Some(self.ids.service_actor()),
            preferred_username: Some(self.instance.title.clone()),
            summary: Some(self.instance.summary.clone()),
            content: Some(self.renderer.render(&self.instance.description)),
            url: Some(self.ids.base_url().to_string()),
            inbox: Some(self.ids.shared_inbox()),
            outbox: Some(self.ids.global_outbox()),
            endpoints: Some(self.endpoints()),
            ..Actor::default()
        }
    }

    fn endpoints(&self) -> Endpoints {
        Endpoints {
            shared_inbox: self.ids.shared_inbox(),
            oauth_authorization_endpoint: self.ids.oauth_authorization(),
            oauth_token_endpoint: self.ids.oauth_token(),
        }
    }

    fn pem_from_der(der: &[u8]) -> Result<String> {
        let key = RsaPublicKey::from_public_key_der(der)
            .map_err(|e| AppError::NotValid(format!("invalid public key: {e}")))?;
        key.to_public_key_pem(LineEnding::LF)
            .map_err(|e| AppError::NotValid(format!("cannot encode public key: {e}")))
    }

    // =========================================================================
    // Inbound
    // =========================================================================

    /// Recover an entity key from one of our identifiers
    ///
    /// Takes the last path segment, stepping over a trailing `object`
    /// marker and dropping any fragment.
    pub fn hash_from_iri(iri: &str) -> Hash {
        let path = iri.split('#').next().unwrap_or_default();
        let mut segments = path.trim_end_matches('/').rsplit('/');
        let mut last = segments.next().unwrap_or_default();
        if last == "object" {
            last = segments.next().unwrap_or_default();
        }
        Hash::new(last)
    }

    /// Build an account from a remote actor document
    ///
    /// The local key is derived from the actor identifier so the same
    /// remote actor always resolves to the same account.
    pub fn account_from_actor(&self, actor: &Actor) -> Result<Account> {
        let iri = actor
            .id
            .clone()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AppError::NotValid("actor document has no identifier".to_string()))?;

        let handle = actor
            .preferred_username
            .clone()
            .or_else(|| actor.name.clone())
            .unwrap_or_default();

        let key = actor.public_key.as_ref().and_then(|pk| {
            match RsaPublicKey::from_public_key_pem(&pk.public_key_pem) {
                Ok(key) => key.to_public_key_der().ok().map(|der| der.as_bytes().to_vec()),
                Err(err) => {
                    tracing::warn!(actor = %iri, %err, "actor key is not a valid PEM public key");
                    None
                }
            }
        });

        let mut hasher = Sha256::new();
        hasher.update(iri.as_bytes());
        let hash = Hash::new(format!("{:x}", hasher.finalize()));

        Ok(Account {
            hash,
            handle,
            created_at: actor.published,
            updated_at: actor.updated,
            score: actor.score.unwrap_or_default(),
            metadata: Some(AccountMetadata {
                id: Some(iri),
                name: actor.name.clone(),
                blurb: actor.summary.as_deref().map(|s| ammonia::clean(s)),
                icon: actor.icon.as_ref().map(|i| ImageMetadata {
                    uri: i.url.clone(),
                    mime_type: i.media_type.clone().unwrap_or_default(),
                }),
                inbox: actor.inbox.clone(),
                outbox: actor.outbox.clone(),
                liked: actor.liked.clone(),
                followers: actor.followers.clone(),
                following: actor.following.clone(),
                url: actor.url.clone(),
                key,
            }),
        })
    }

    /// Build an item from an inbound Create/Update/Delete activity
    ///
    /// The caller becomes the author. Inline HTML is sanitized before it
    /// reaches the domain.
    pub fn item_from_activity(&self, activity: &Activity, caller: &Account) -> Result<Item> {
        let object = activity
            .object
            .as_ref()
            .and_then(ObjectOrLink::object)
            .ok_or_else(|| AppError::ObjectMissing {
                iri: activity.object_iri().to_string(),
            })?;

        let mut item = Item {
            hash: object
                .id
                .as_deref()
                .map(Self::hash_from_iri)
                .unwrap_or_default(),
            title: object.name.clone().unwrap_or_default(),
            submitted_at: object.published.or(activity.published),
            updated_at: object.updated,
            submitted_by: Some(Box::new(caller.clone())),
            score: object.score.unwrap_or_default() * SCORE_MULTIPLIER,
            ..Item::default()
        };

        match object.kind {
            Some(ObjectKind::Tombstone) => {
                item.deleted = true;
                item.updated_at = object.deleted.or(item.updated_at);
            }
            Some(ObjectKind::Page) => {
                item.media_type = MediaType::Url;
                item.body = object.url.clone().unwrap_or_default();
            }
            Some(_) => {
                let (raw, mime) = match &object.source {
                    Some(source) if source.content.is_some() => (
                        source.content.clone().unwrap_or_default(),
                        source.media_type.as_deref().unwrap_or("text/plain"),
                    ),
                    _ => (
                        object.content.clone().unwrap_or_default(),
                        object.media_type.as_deref().unwrap_or("text/html"),
                    ),
                };
                item.media_type = MediaType::from_mime(mime).unwrap_or_default();
                item.body = if item.media_type == MediaType::Html {
                    ammonia::clean(&raw)
                } else {
                    raw
                };
            }
            None => {
                return Err(AppError::NotValid(
                    "object carries no type".to_string(),
                ))
            }
        }

        let in_reply_to = object.in_reply_to.as_deref().or(activity.in_reply_to.as_deref());
        if let Some(parent) = in_reply_to {
            item.parent = Some(Box::new(Item {
                hash: Self::hash_from_iri(parent),
                ..Item::default()
            }));
        }
        let context = object.context.as_deref().or(activity.context.as_deref());
        if let Some(root) = context {
            item.root = Some(Box::new(Item {
                hash: Self::hash_from_iri(root),
                ..Item::default()
            }));
        }

        if !object.tag.is_empty() {
            let mut meta = ItemMetadata::default();
            for tag in &object.tag {
                let label = Label {
                    name: tag.name.clone(),
                    url: tag.id.clone().unwrap_or_default(),
                };
                if tag.kind.as_deref() == Some("Mention") {
                    meta.mentions.push(label);
                } else {
                    meta.tags.push(label);
                }
            }
            item.metadata = Some(meta);
        }

        Ok(item)
    }

    /// Build a vote from an inbound Like/Dislike/Undo activity
    pub fn vote_from_activity(&self, activity: &Activity, caller: &Account) -> Result<Vote> {
        let weight = match activity.kind {
            ActivityKind::Like => SCORE_MULTIPLIER,
            ActivityKind::Dislike => -SCORE_MULTIPLIER,
            ActivityKind::Undo => 0,
            other => {
                return Err(AppError::NotValid(format!(
                    "{} does not carry a vote",
                    other.as_str()
                )))
            }
        };

        let object_iri = activity.object_iri();
        let hash = Self::hash_from_iri(object_iri);
        if hash.is_empty() {
            return Err(AppError::ObjectMissing {
                iri: object_iri.to_string(),
            });
        }

        Ok(Vote {
            submitted_by: caller.clone(),
            item: Item {
                hash,
                ..Item::default()
            },
            weight,
            submitted_at: activity.published.or_else(|| Some(Utc::now())),
            updated_at: None,
        })
    }
}
