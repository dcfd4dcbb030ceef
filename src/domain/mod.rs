//! Domain layer
//!
//! The application's own model of accounts, items, and votes, plus the
//! contracts through which external collaborators are consumed:
//! - `Repository`: the persistence layer
//! - `ContentRenderer`: markdown-to-HTML rendering

mod models;
mod render;
mod repo;

pub use models::{
    ANONYMOUS_HANDLE, Account, AccountMetadata, Hash, ImageMetadata, Item, ItemMetadata, Label,
    MediaType, SCORE_MULTIPLIER, Vote,
};
pub use render::{ContentRenderer, EscapingRenderer};
pub use repo::{
    AccountFilter, AccountsFilter, ItemFilter, MemoryRepository, Page, Repository, VoteFilter,
};
