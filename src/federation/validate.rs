//! Activity validation pipeline
//!
//! Runs every gate an inbound or outbound activity must clear before
//! anything is persisted: activity-type gate, blocklist gate, audience
//! gate, actor resolution, and object validation. Validation is
//! side-effect free; the caller decides what to do with the result.
//!
//! Actor and object failures on the inbox side are collected
//! independently and reported together. An unknown remote actor whose
//! document arrived inline is not a failure: it is returned as a
//! synchronization signal so the handler can save the account and
//! continue. A link-only actor that matches the signed request identity
//! resolves to that identity instead of failing.

use std::sync::Arc;

use crate::domain::{Account, AccountFilter, Repository};
use crate::error::{AppError, Result};
use crate::federation::audience::AudienceValidator;
use crate::federation::mapper::Mapper;
use crate::federation::vocab::{Activity, ActivityKind, ObjectKind, ObjectOrLink};

const INBOX_TYPES: &[ActivityKind] = &[
    ActivityKind::Create,
    ActivityKind::Like,
    ActivityKind::Dislike,
    ActivityKind::Follow,
];

const OUTBOX_TYPES: &[ActivityKind] = &[
    ActivityKind::Create,
    ActivityKind::Update,
    ActivityKind::Like,
    ActivityKind::Dislike,
    ActivityKind::Delete,
    ActivityKind::Undo,
];

/// Whether the signed request identity is the activity's unresolved actor
fn caller_matches(caller: &Account, iri: &str) -> bool {
    !caller.is_anonymous()
        && caller
            .metadata
            .as_ref()
            .and_then(|m| m.id.as_deref())
            .is_some_and(|id| id == iri)
}

/// Object types acceptable as the target of `kind`
fn valid_object_kinds(kind: ActivityKind) -> &'static [ObjectKind] {
    match kind {
        ActivityKind::Delete => &[
            ObjectKind::Note,
            ObjectKind::Article,
            ObjectKind::Document,
            ObjectKind::Page,
            ObjectKind::Tombstone,
        ],
        _ => &[
            ObjectKind::Note,
            ObjectKind::Article,
            ObjectKind::Document,
            ObjectKind::Page,
        ],
    }
}

/// A fully validated activity, ready for persistence
#[derive(Debug)]
pub struct Validated {
    pub activity: Activity,
    /// The acting account as resolved locally
    pub actor: Account,
    /// A remote actor seen for the first time; the handler saves it
    /// before persisting the activity itself
    pub missing_actor: Option<Account>,
}

/// Runs the validation gates against the repository
pub struct ActivityValidator {
    mapper: Arc<Mapper>,
    audience: AudienceValidator,
    repo: Arc<dyn Repository>,
}

impl ActivityValidator {
    pub fn new(mapper: Arc<Mapper>, audience: AudienceValidator, repo: Arc<dyn Repository>) -> Self {
        Self {
            mapper,
            audience,
            repo,
        }
    }

    /// Validate an activity arriving from a remote instance
    ///
    /// `caller` is the request identity resolved from the HTTP signature;
    /// it stands in for an actor the repository cannot resolve yet.
    pub async fn validate_inbox(
        &self,
        mut activity: Activity,
        caller: &Account,
    ) -> Result<Validated> {
        if !INBOX_TYPES.contains(&activity.kind) {
            return Err(AppError::MethodNotAllowed(format!(
                "{} activities are not accepted here",
                activity.kind.as_str()
            )));
        }
        self.audience.validate_recipients(&mut activity)?;

        let mut missing_actor = None;
        let (resolved, actor_err) = match self.resolve_actor(&activity).await {
            Ok(account) => (Some(account), None),
            // Blocklist hits are terminal, not aggregated
            Err(AppError::MethodNotAllowed(m)) => {
                return Err(AppError::MethodNotAllowed(m))
            }
            // Storage failures abort the request before any aggregation
            Err(err @ (AppError::Repository(_) | AppError::Config(_) | AppError::Internal(_))) => {
                return Err(err)
            }
            Err(AppError::ActorMissing { iri }) => {
                if let Some(doc) = activity.actor.as_ref().and_then(|a| a.actor()) {
                    let account = self.mapper.account_from_actor(doc)?;
                    match self.find_by_key(&account).await? {
                        // same key bytes, already stored under another identifier
                        Some(known) => (Some(known), None),
                        None => {
                            missing_actor = Some(account);
                            (None, None)
                        }
                    }
                } else if caller_matches(caller, &iri) {
                    // the signed request identity stands in for the
                    // unresolved actor and is re-persisted with it
                    missing_actor = Some(caller.clone());
                    (Some(caller.clone()), None)
                } else {
                    (None, Some(AppError::ActorMissing { iri }))
                }
            }
            Err(other) => (None, Some(other)),
        };

        let object_err = match self.validate_object(&activity) {
            Ok(()) => None,
            Err(AppError::MethodNotAllowed(m)) => {
                return Err(AppError::MethodNotAllowed(m))
            }
            Err(err) => Some(err),
        };

        if actor_err.is_some() || object_err.is_some() {
            return Err(AppError::Activity {
                actor: actor_err.map(Box::new),
                object: object_err.map(Box::new),
            });
        }

        let actor = match resolved {
            // unknown remote actor with an inline document
            None => missing_actor.clone().unwrap_or_else(Account::anonymous),
            Some(account) => account,
        };

        let activity = self.remap(activity, &actor)?;
        Ok(Validated {
            activity,
            actor,
            missing_actor,
        })
    }

    /// Validate an activity submitted by a local client
    ///
    /// The actor must be local and resolvable; there is no
    /// synchronization side path on this side.
    pub async fn validate_outbox(&self, mut activity: Activity) -> Result<Validated> {
        if !OUTBOX_TYPES.contains(&activity.kind) {
            return Err(AppError::MethodNotAllowed(format!(
                "{} activities cannot be submitted here",
                activity.kind.as_str()
            )));
        }

        let actor_iri = activity.actor_iri().to_string();
        if !self.audience.is_local(&actor_iri) {
            return Err(AppError::MethodNotAllowed(format!(
                "actor {actor_iri} is not local to this instance"
            )));
        }
        let actor = self.resolve_actor(&activity).await?;

        self.validate_object(&activity)?;
        if activity.kind == ActivityKind::Update {
            let hash = Mapper::hash_from_iri(activity.object_iri());
            if hash.is_empty()
                && activity
                    .object
                    .as_ref()
                    .and_then(ObjectOrLink::object)
                    .and_then(|o| o.id.as_deref())
                    .is_none()
            {
                return Err(AppError::ObjectMissing {
                    iri: activity.object_iri().to_string(),
                });
            }
        }

        let activity = self.remap(activity, &actor)?;
        Ok(Validated {
            activity,
            actor,
            missing_actor: None,
        })
    }

    /// A first-seen identifier may still belong to a known account when
    /// the advertised key bytes match a stored public key.
    async fn find_by_key(&self, account: &Account) -> Result<Option<Account>> {
        let Some(der) = account.metadata.as_ref().and_then(|m| m.key.clone()) else {
            return Ok(None);
        };
        match self.repo.load_account(AccountFilter::by_key(der)).await {
            Ok(known) => Ok(Some(known)),
            Err(AppError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Resolve the acting party against the repository
    async fn resolve_actor(&self, activity: &Activity) -> Result<Account> {
        let iri = activity.actor_iri().to_string();
        self.audience.check_blocked(&iri)?;

        let inline = activity.actor.as_ref().and_then(|a| a.actor());
        let handle = inline
            .and_then(|a| a.preferred_username.clone())
            .unwrap_or_default();

        if iri.is_empty() && handle.is_empty() {
            return Err(AppError::NotValid(
                "activity names no actor".to_string(),
            ));
        }

        let filter = if self.audience.is_local(&iri) {
            let hash = Mapper::hash_from_iri(&iri);
            if !hash.is_empty() {
                AccountFilter::by_hash(hash)
            } else if !handle.is_empty() {
                AccountFilter::by_handle(handle)
            } else {
                return Err(AppError::ActorMissing { iri });
            }
        } else {
            AccountFilter::by_iri(iri.clone())
        };

        match self.repo.load_account(filter).await {
            Ok(account) => Ok(account),
            Err(AppError::NotFound(_)) => Err(AppError::ActorMissing { iri }),
            Err(err) => Err(err),
        }
    }

    /// Validate the target object of an activity
    ///
    /// A reference to a non-local object cannot be resolved here and is
    /// reported as object-missing. Inline objects must carry a type
    /// acceptable for the activity.
    fn validate_object(&self, activity: &Activity) -> Result<()> {
        let Some(object) = &activity.object else {
            // Follow targets the actor's own collections
            if activity.kind == ActivityKind::Follow {
                return Ok(());
            }
            return Err(AppError::ObjectMissing {
                iri: String::new(),
            });
        };

        let iri = object.iri().to_string();
        self.audience.check_blocked(&iri)?;

        match object {
            ObjectOrLink::Link(iri) => {
                if !self.audience.is_local(iri) {
                    return Err(AppError::ObjectMissing { iri: iri.clone() });
                }
                Ok(())
            }
            ObjectOrLink::Object(inline) => {
                let kind = inline.kind.ok_or_else(|| {
                    AppError::NotValid("object carries no type".to_string())
                })?;
                if !valid_object_kinds(activity.kind).contains(&kind) {
                    return Err(AppError::NotValid(format!(
                        "object type {kind:?} is not valid for a {} activity",
                        activity.kind.as_str()
                    )));
                }
                Ok(())
            }
        }
    }

    /// Round-trip inline content through the domain mapping
    ///
    /// Normalizes whatever shape the sender used into the exact document
    /// this instance would serve back.
    fn remap(&self, mut activity: Activity, actor: &Account) -> Result<Activity> {
        let carries_content = matches!(
            activity.kind,
            ActivityKind::Create | ActivityKind::Update | ActivityKind::Delete
        );
        if carries_content {
            if let Some(ObjectOrLink::Object(_)) = &activity.object {
                let item = self.mapper.item_from_activity(&activity, actor)?;
                let object = self.mapper.item_to_object(&item);
                activity.object = Some(ObjectOrLink::Object(Box::new(object)));
            }
        }
        Ok(activity)
    }
}
