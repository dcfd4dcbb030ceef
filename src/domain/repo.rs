//! Repository contract
//!
//! The relational persistence layer lives outside this crate. The
//! federation pipeline consumes it through this narrow async trait:
//! load/save accounts, items, and votes by filter, plus the activity
//! journal hook. An in-memory implementation backs development and tests.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::domain::models::{Account, Hash, Item, Vote};
use crate::error::{AppError, Result};
use crate::federation::vocab::Activity;

// =============================================================================
// Pagination cursor
// =============================================================================

/// Pagination cursor: 1-based page number plus page size
///
/// `page == 0` means "no page requested"; collection endpoints then return
/// a count-only collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub size: u32,
}

impl Page {
    pub fn new(page: u32, size: u32) -> Self {
        Self { page, size }
    }

    pub fn requested(self) -> bool {
        self.page >= 1
    }

    pub fn query_string(self) -> String {
        if self.page == 0 {
            String::new()
        } else {
            format!("?page={}", self.page)
        }
    }

    pub fn first(self) -> Self {
        Self { page: 1, ..self }
    }

    pub fn next(self) -> Self {
        Self {
            page: self.page + 1,
            ..self
        }
    }

    pub fn prev(self) -> Self {
        Self {
            page: self.page.saturating_sub(1).max(1),
            ..self
        }
    }

    /// Offset of the first element on this page
    pub fn offset(self) -> usize {
        (self.page.saturating_sub(1) as usize) * self.size as usize
    }
}

// =============================================================================
// Filters
// =============================================================================

/// Account lookup filter; set exactly the fields you want matched
#[derive(Debug, Clone, Default)]
pub struct AccountFilter {
    pub hash: Option<Hash>,
    pub handle: Option<String>,
    /// Remote actor identifier
    pub iri: Option<String>,
    /// DER-encoded public key bytes
    pub key: Option<Vec<u8>>,
}

impl AccountFilter {
    pub fn by_hash(hash: Hash) -> Self {
        Self {
            hash: Some(hash),
            ..Self::default()
        }
    }

    pub fn by_handle(handle: impl Into<String>) -> Self {
        Self {
            handle: Some(handle.into()),
            ..Self::default()
        }
    }

    pub fn by_iri(iri: impl Into<String>) -> Self {
        Self {
            iri: Some(iri.into()),
            ..Self::default()
        }
    }

    pub fn by_key(key: Vec<u8>) -> Self {
        Self {
            key: Some(key),
            ..Self::default()
        }
    }
}

/// Item listing filter
#[derive(Debug, Clone, Default)]
pub struct ItemFilter {
    pub hash: Option<Hash>,
    /// Submitter hash
    pub attributed_to: Option<Hash>,
    /// Parent hash, for reply counting/listing
    pub in_reply_to: Option<Hash>,
    pub page: Option<Page>,
}

/// Vote listing filter
#[derive(Debug, Clone, Default)]
pub struct VoteFilter {
    /// Voter hash
    pub attributed_to: Option<Hash>,
    /// Target item hash
    pub item: Option<Hash>,
    pub page: Option<Page>,
}

/// Account listing filter (following collections)
#[derive(Debug, Clone, Default)]
pub struct AccountsFilter {
    pub page: Option<Page>,
}

// =============================================================================
// Repository trait
// =============================================================================

/// Persistence operations the federation adapter depends on
///
/// All calls are synchronous with respect to the request: a storage
/// failure propagates immediately, nothing is retried here.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Load a single account; `NotFound` when nothing matches
    async fn load_account(&self, filter: AccountFilter) -> Result<Account>;

    /// List accounts with total count
    async fn load_accounts(&self, filter: AccountsFilter) -> Result<(Vec<Account>, u64)>;

    async fn save_account(&self, account: Account) -> Result<Account>;

    /// List items with total count (pre-pagination)
    async fn load_items(&self, filter: ItemFilter) -> Result<(Vec<Item>, u64)>;

    /// Save an item; the returned value carries repository-assigned state
    /// (hash, timestamps). `updated_at` stays `None` on first save.
    async fn save_item(&self, item: Item) -> Result<Item>;

    /// List votes with total count (pre-pagination)
    async fn load_votes(&self, filter: VoteFilter) -> Result<(Vec<Vote>, u64)>;

    /// Save a vote, keyed by (voter, item). `updated_at` stays `None` on
    /// first save.
    async fn save_vote(&self, vote: Vote) -> Result<Vote>;

    /// Journal a validated activity against its target collection IRI.
    /// Failures are logged by callers and are not fatal to the request.
    async fn save_activity(&self, activity: &Activity, target: &str) -> Result<()>;
}

// =============================================================================
// In-memory repository (development/test backend)
// =============================================================================

/// Hash-map backed repository for development and tests
///
/// Equality on hashes is prefix-tolerant so 8-character wire hashes
/// resolve fully-keyed entities.
#[derive(Default)]
pub struct MemoryRepository {
    inner: RwLock<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    accounts: Vec<Account>,
    items: Vec<Item>,
    votes: Vec<Vote>,
    activities: Vec<(String, String)>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an account, bypassing save semantics
    pub fn seed_account(&self, account: Account) {
        self.inner.write().unwrap().accounts.push(account);
    }

    pub fn seed_item(&self, item: Item) {
        self.inner.write().unwrap().items.push(item);
    }

    pub fn seed_vote(&self, vote: Vote) {
        self.inner.write().unwrap().votes.push(vote);
    }

    fn lock_poisoned() -> AppError {
        AppError::Repository("memory repository lock poisoned".to_string())
    }
}

fn paginate<T: Clone>(all: Vec<T>, page: Option<Page>) -> (Vec<T>, u64) {
    let count = all.len() as u64;
    match page {
        Some(p) if p.requested() => {
            let items = all
                .into_iter()
                .skip(p.offset())
                .take(p.size as usize)
                .collect();
            (items, count)
        }
        _ => (all, count),
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn load_account(&self, filter: AccountFilter) -> Result<Account> {
        let state = self.inner.read().map_err(|_| Self::lock_poisoned())?;
        state
            .accounts
            .iter()
            .find(|a| {
                let hash_ok = filter.hash.as_ref().is_none_or(|h| h.matches(&a.hash));
                let handle_ok = filter.handle.as_deref().is_none_or(|h| h == a.handle);
                let iri_ok = filter.iri.as_deref().is_none_or(|iri| {
                    a.metadata
                        .as_ref()
                        .and_then(|m| m.id.as_deref())
                        .is_some_and(|id| id == iri)
                });
                let key_ok = filter.key.as_deref().is_none_or(|k| {
                    a.metadata
                        .as_ref()
                        .and_then(|m| m.key.as_deref())
                        .is_some_and(|stored| stored == k)
                });
                hash_ok && handle_ok && iri_ok && key_ok
            })
            .cloned()
            .ok_or_else(|| AppError::NotFound("no account matches filter".to_string()))
    }

    async fn load_accounts(&self, filter: AccountsFilter) -> Result<(Vec<Account>, u64)> {
        let state = self.inner.read().map_err(|_| Self::lock_poisoned())?;
        Ok(paginate(state.accounts.clone(), filter.page))
    }

    async fn save_account(&self, account: Account) -> Result<Account> {
        let mut state = self.inner.write().map_err(|_| Self::lock_poisoned())?;
        let mut account = account;
        if let Some(existing) = state
            .accounts
            .iter_mut()
            .find(|a| a.hash.matches(&account.hash))
        {
            account.updated_at = Some(chrono::Utc::now());
            *existing = account.clone();
        } else {
            if account.created_at.is_none() {
                account.created_at = Some(chrono::Utc::now());
            }
            state.accounts.push(account.clone());
        }
        Ok(account)
    }

    async fn load_items(&self, filter: ItemFilter) -> Result<(Vec<Item>, u64)> {
        let state = self.inner.read().map_err(|_| Self::lock_poisoned())?;
        let matched: Vec<Item> = state
            .items
            .iter()
            .filter(|i| {
                let hash_ok = filter.hash.as_ref().is_none_or(|h| h.matches(&i.hash));
                let by_ok = filter.attributed_to.as_ref().is_none_or(|h| {
                    i.submitted_by
                        .as_ref()
                        .is_some_and(|a| h.matches(&a.hash))
                });
                let reply_ok = filter.in_reply_to.as_ref().is_none_or(|h| {
                    i.parent.as_ref().is_some_and(|p| h.matches(&p.hash))
                });
                hash_ok && by_ok && reply_ok
            })
            .cloned()
            .collect();
        Ok(paginate(matched, filter.page))
    }

    async fn save_item(&self, item: Item) -> Result<Item> {
        let mut state = self.inner.write().map_err(|_| Self::lock_poisoned())?;
        let mut item = item;
        if !item.hash.is_empty() {
            if let Some(existing) = state.items.iter_mut().find(|i| i.hash.matches(&item.hash)) {
                item.hash = existing.hash.clone();
                item.submitted_at = existing.submitted_at;
                item.updated_at = Some(chrono::Utc::now());
                *existing = item.clone();
                return Ok(item);
            }
        }
        let now = chrono::Utc::now();
        item.submitted_at = Some(item.submitted_at.unwrap_or(now));
        item.updated_at = None;
        if item.hash.is_empty() {
            let by = item
                .submitted_by
                .as_ref()
                .map(|a| a.hash.to_string())
                .unwrap_or_default();
            item.hash = Hash::derive(item.body.as_bytes(), now, &by);
        }
        state.items.push(item.clone());
        Ok(item)
    }

    async fn load_votes(&self, filter: VoteFilter) -> Result<(Vec<Vote>, u64)> {
        let state = self.inner.read().map_err(|_| Self::lock_poisoned())?;
        let matched: Vec<Vote> = state
            .votes
            .iter()
            .filter(|v| {
                let by_ok = filter
                    .attributed_to
                    .as_ref()
                    .is_none_or(|h| h.matches(&v.submitted_by.hash));
                let item_ok = filter.item.as_ref().is_none_or(|h| h.matches(&v.item.hash));
                by_ok && item_ok
            })
            .cloned()
            .collect();
        Ok(paginate(matched, filter.page))
    }

    async fn save_vote(&self, vote: Vote) -> Result<Vote> {
        let mut state = self.inner.write().map_err(|_| Self::lock_poisoned())?;
        let mut vote = vote;
        if let Some(existing) = state.votes.iter_mut().find(|v| {
            v.submitted_by.hash.matches(&vote.submitted_by.hash) && v.item.hash.matches(&vote.item.hash)
        }) {
            vote.submitted_at = existing.submitted_at;
            vote.updated_at = Some(chrono::Utc::now());
            *existing = vote.clone();
            return Ok(vote);
        }
        vote.submitted_at = Some(vote.submitted_at.unwrap_or_else(chrono::Utc::now));
        vote.updated_at = None;
        state.votes.push(vote.clone());
        Ok(vote)
    }

    async fn save_activity(&self, activity: &Activity, target: &str) -> Result<()> {
        let mut state = self.inner.write().map_err(|_| Self::lock_poisoned())?;
        let id = activity.id.clone().unwrap_or_default();
        state.activities.push((id, target.to_string()));
        Ok(())
    }
}
