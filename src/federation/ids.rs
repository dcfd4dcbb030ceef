//! Identifier construction
//!
//! All federation IRIs are derived from the instance base URL by one
//! builder, so the shapes stay consistent across actor documents,
//! objects, activities and collections. Path segments that come from
//! user data are percent-encoded.

use crate::config::ServerConfig;
use crate::domain::{Account, Item, Vote, ANONYMOUS_HANDLE};
use crate::federation::vocab::CollectionKind;

/// Builds every IRI this instance mints
#[derive(Debug, Clone)]
pub struct IriBuilder {
    base_url: String,
    api_url: String,
    actors_url: String,
}

impl IriBuilder {
    pub fn new(server: &ServerConfig) -> Self {
        let base_url = server.base_url();
        let api_url = server.api_url();
        let actors_url = format!("{api_url}/actors");
        Self {
            base_url,
            api_url,
            actors_url,
        }
    }

    /// Instance root URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// API root, also the service actor identifier namespace
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Instance-wide inbox shared by every local actor
    pub fn shared_inbox(&self) -> String {
        format!("{}/self/inbox", self.api_url)
    }

    /// The service actor representing the instance itself
    pub fn service_actor(&self) -> String {
        format!("{}/self", self.api_url)
    }

    /// Instance-wide outbox aggregating every local submission
    pub fn global_outbox(&self) -> String {
        format!("{}/self/outbox", self.api_url)
    }

    /// An account's actor document
    ///
    /// Accounts without a stable hash collapse to the shared anonymous
    /// actor.
    pub fn actor(&self, account: &Account) -> String {
        if account.hash.is_empty() {
            return format!("{}/{}", self.actors_url, ANONYMOUS_HANDLE);
        }
        format!(
            "{}/{}",
            self.actors_url,
            urlencoding::encode(account.hash.as_str())
        )
    }

    /// A named collection under an actor, or directly under the API root
    /// when the account is unnamed
    pub fn collection(&self, account: &Account, kind: CollectionKind) -> String {
        if account.handle.is_empty() {
            return format!("{}/{}", self.api_url, kind);
        }
        format!(
            "{}/{}/{}",
            self.actors_url,
            urlencoding::encode(account.hash.as_str()),
            kind
        )
    }

    /// The activity identifier for an item inside its author's outbox
    pub fn item_activity(&self, item: &Item) -> Option<String> {
        if item.hash.is_empty() {
            return None;
        }
        let base = match item.submitted_by.as_deref() {
            Some(author) => format!(
                "{}/{}/outbox",
                self.actors_url,
                urlencoding::encode(author.hash.as_str())
            ),
            None => self.global_outbox(),
        };
        Some(format!(
            "{}/{}",
            base,
            urlencoding::encode(item.hash.as_str())
        ))
    }

    /// The object identifier for an item, one level under its activity
    pub fn item_object(&self, item: &Item) -> Option<String> {
        self.item_activity(item).map(|id| format!("{id}/object"))
    }

    /// Replies collection attached to an object
    pub fn replies(&self, object_id: &str) -> String {
        format!("{object_id}/replies")
    }

    /// The identifier for a vote under its author's liked collection,
    /// keyed by the voter's handle
    pub fn vote(&self, vote: &Vote) -> String {
        format!(
            "{}/{}/liked/{}",
            self.actors_url,
            urlencoding::encode(&vote.submitted_by.handle),
            urlencoding::encode(vote.item.hash.as_str())
        )
    }

    /// Location advertised for a freshly persisted item
    pub fn item_location(&self, item: &Item) -> Option<String> {
        if item.hash.is_empty() {
            return None;
        }
        let owner = item
            .submitted_by
            .as_deref()
            .map(|a| a.hash.as_str())
            .unwrap_or(ANONYMOUS_HANDLE);
        Some(format!(
            "{}/self/following/{}/outbox/{}",
            self.api_url,
            urlencoding::encode(owner),
            urlencoding::encode(item.hash.as_str())
        ))
    }

    /// Location advertised for a freshly persisted vote
    pub fn vote_location(&self, vote: &Vote) -> String {
        format!(
            "{}/self/following/{}/liked/{}",
            self.api_url,
            urlencoding::encode(vote.submitted_by.hash.as_str()),
            urlencoding::encode(vote.item.hash.as_str())
        )
    }

    /// Authorization endpoint, on the oauth sibling of the API root
    pub fn oauth_authorization(&self) -> String {
        format!("{}/authorize", self.oauth_url())
    }

    /// Token endpoint, on the oauth sibling of the API root
    pub fn oauth_token(&self) -> String {
        format!("{}/token", self.oauth_url())
    }

    fn oauth_url(&self) -> String {
        self.api_url.replacen("api", "oauth", 1)
    }
}
