//! Federation endpoints
//!
//! The HTTP surface mounted under `/api`:
//! - `GET  /self` — service actor descriptor
//! - `GET  /self/{inbox|outbox|liked}` — paginated service-scope collections
//! - `GET  /actors` — known actors collection
//! - `GET  /actors/:handle` — actor document
//! - `GET  /actors/:handle/{inbox|outbox|liked}` — actor-scope collections
//! - `GET  /self/following/...` — the actor tree again, as the service's
//!   following collection; `Location` headers point here
//! - `GET  .../{collection}/:hash` — single activity view
//! - `GET  .../{collection}/:hash/object` — single object view
//! - `GET  .../{collection}/:hash/object/replies` — replies collection
//! - `POST /self/{inbox|outbox}`, `POST /actors/:handle/{inbox|outbox}` —
//!   activity submission
//! - `GET  /nodeinfo` — instance metadata

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Extension, Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::api::context::Caller;
use crate::domain::{
    Account, AccountFilter, AccountsFilter, Hash, Item, ItemFilter, Page, Vote, VoteFilter,
};
use crate::error::{AppError, Result};
use crate::federation::validate::Validated;
use crate::federation::vocab::{
    with_ld_context, Activity, ActivityKind, CollectionKind, ACTIVITY_JSON,
};
use crate::metrics::{
    ACTIVITIES_RECEIVED, ACTIVITIES_SUBMITTED, HTTP_REQUESTS_TOTAL, HTTP_REQUEST_DURATION_SECONDS,
};
use crate::AppState;

pub fn federation_router() -> Router<AppState> {
    Router::new()
        .route("/self", get(service))
        .route("/nodeinfo", get(nodeinfo))
        .route(
            "/self/:collection",
            get(service_collection).post(service_submit),
        )
        .route("/self/:collection/:hash", get(service_activity))
        .route("/self/:collection/:hash/object", get(service_object))
        .route(
            "/self/:collection/:hash/object/replies",
            get(service_replies),
        )
        .route("/actors", get(actors))
        .route("/actors/:handle", get(actor))
        .route(
            "/actors/:handle/:collection",
            get(actor_collection).post(actor_submit),
        )
        .route("/actors/:handle/:collection/:hash", get(actor_activity))
        .route(
            "/actors/:handle/:collection/:hash/object",
            get(actor_object),
        )
        .route(
            "/actors/:handle/:collection/:hash/object/replies",
            get(actor_replies),
        )
        // the actor tree is also reachable as the service's following
        // collection, where Location headers point
        .route("/self/following", get(actors))
        .route("/self/following/:handle", get(actor))
        .route(
            "/self/following/:handle/:collection",
            get(actor_collection).post(actor_submit),
        )
        .route(
            "/self/following/:handle/:collection/:hash",
            get(actor_activity),
        )
        .route(
            "/self/following/:handle/:collection/:hash/object",
            get(actor_object),
        )
        .route(
            "/self/following/:handle/:collection/:hash/object/replies",
            get(actor_replies),
        )
}

#[derive(Debug, Deserialize, Default)]
struct PageQuery {
    page: Option<u32>,
}

impl PageQuery {
    fn to_page(&self, size: u32) -> Option<Page> {
        self.page.map(|p| Page::new(p, size))
    }
}

/// Serialize a wire value with the context declaration and the federation
/// content type
fn activity_json<T: serde::Serialize>(state: &AppState, status: StatusCode, value: &T) -> Response {
    let body = with_ld_context(value, state.mapper.ids().base_url());
    (
        status,
        [(header::CONTENT_TYPE, ACTIVITY_JSON)],
        Json(body),
    )
        .into_response()
}

fn count_request(method: &str, endpoint: &str, status: StatusCode) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, endpoint, status.as_str()])
        .inc();
}

/// Load an account by its path segment, which names a handle or a hash
async fn load_actor_account(state: &AppState, handle: &str) -> Result<Account> {
    match state
        .repo
        .load_account(AccountFilter::by_handle(handle))
        .await
    {
        Ok(account) => Ok(account),
        Err(AppError::NotFound(_)) => {
            state
                .repo
                .load_account(AccountFilter::by_hash(Hash::from(handle)))
                .await
        }
        Err(err) => Err(err),
    }
}

// =============================================================================
// Actor documents
// =============================================================================

/// GET /api/self
async fn service(State(state): State<AppState>) -> Response {
    let actor = state.mapper.service_actor();
    count_request("GET", "/self", StatusCode::OK);
    activity_json(&state, StatusCode::OK, &actor)
}

/// GET /api/nodeinfo
async fn nodeinfo(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "version": "2.0",
        "software": {
            "name": state.config.instance.title,
            "version": env!("CARGO_PKG_VERSION"),
        },
        "protocols": ["activitypub"],
        "services": { "inbound": [], "outbound": [] },
        "openRegistrations": false,
        "metadata": {
            "nodeName": state.config.instance.title,
            "nodeDescription": state.config.instance.summary,
        },
    }))
}

/// GET /api/actors/:handle
async fn actor(
    State(state): State<AppState>,
    Path(handle): Path<String>,
) -> Result<Response> {
    let account = load_actor_account(&state, &handle).await?;
    let doc = state.mapper.account_to_actor(&account);
    count_request("GET", "/actors/:handle", StatusCode::OK);
    Ok(activity_json(&state, StatusCode::OK, &doc))
}

/// GET /api/actors
async fn actors(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Response> {
    let page = query.to_page(state.config.federation.page_size);
    let (accounts, count) = state
        .repo
        .load_accounts(AccountsFilter { page })
        .await?;
    let docs: Vec<_> = accounts
        .iter()
        .map(|a| state.mapper.account_to_actor(a))
        .collect();
    let base = format!("{}/actors", state.mapper.ids().api_url());
    let collection = crate::federation::build_collection(&base, &docs, count, page)?;
    count_request("GET", "/actors", StatusCode::OK);
    Ok(activity_json(&state, StatusCode::OK, &collection))
}

// =============================================================================
// Collections
// =============================================================================

/// Scope a collection request resolves under
enum Scope {
    Service,
    Actor(Account),
}

impl Scope {
    fn account(&self) -> Option<&Account> {
        match self {
            Self::Service => None,
            Self::Actor(a) => Some(a),
        }
    }
}

async fn service_collection(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Response> {
    collection_response(&state, Scope::Service, &collection, &query).await
}

async fn actor_collection(
    State(state): State<AppState>,
    Path((handle, collection)): Path<(String, String)>,
    Query(query): Query<PageQuery>,
) -> Result<Response> {
    let account = load_actor_account(&state, &handle).await?;
    collection_response(&state, Scope::Actor(account), &collection, &query).await
}

async fn collection_response(
    state: &AppState,
    scope: Scope,
    collection: &str,
    query: &PageQuery,
) -> Result<Response> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["GET", "/:collection"])
        .start_timer();
    let kind = CollectionKind::parse(collection)
        .ok_or_else(|| AppError::NotFound(format!("collection {collection} not found")))?;
    let page = query.to_page(state.config.federation.page_size);
    let ids = state.mapper.ids();
    let base = match scope.account() {
        Some(account) => ids.collection(account, kind),
        None => format!("{}/self/{kind}", ids.api_url()),
    };

    let collection_doc = match kind {
        CollectionKind::Inbox | CollectionKind::Outbox => {
            let filter = ItemFilter {
                attributed_to: scope.account().map(|a| a.hash.clone()),
                page,
                ..ItemFilter::default()
            };
            let (items, count) = state.repo.load_items(filter).await?;
            let activities: Vec<Activity> = items
                .iter()
                .map(|i| state.mapper.item_to_activity(i))
                .collect();
            crate::federation::build_collection(&base, &activities, count, page)?
        }
        CollectionKind::Liked => {
            let filter = VoteFilter {
                attributed_to: scope.account().map(|a| a.hash.clone()),
                page,
                ..VoteFilter::default()
            };
            let (votes, count) = state.repo.load_votes(filter).await?;
            let activities: Vec<Activity> = votes
                .iter()
                .map(|v| state.mapper.vote_to_activity(v))
                .collect();
            crate::federation::build_collection(&base, &activities, count, page)?
        }
        _ => {
            return Err(AppError::NotFound(format!(
                "collection {collection} not found"
            )))
        }
    };

    count_request("GET", "/:collection", StatusCode::OK);
    Ok(activity_json(state, StatusCode::OK, &collection_doc))
}

// =============================================================================
// Single activity and object views
// =============================================================================

async fn load_scoped_item(state: &AppState, scope: &Scope, hash: &str) -> Result<Item> {
    let filter = ItemFilter {
        hash: Some(Hash::from(hash)),
        attributed_to: scope.account().map(|a| a.hash.clone()),
        ..ItemFilter::default()
    };
    let (items, _) = state.repo.load_items(filter).await?;
    items
        .into_iter()
        .next()
        .ok_or_else(|| AppError::NotFound(format!("item {hash} not found")))
}

async fn load_scoped_vote(state: &AppState, scope: &Scope, hash: &str) -> Result<Vote> {
    let filter = VoteFilter {
        attributed_to: scope.account().map(|a| a.hash.clone()),
        item: Some(Hash::from(hash)),
        ..VoteFilter::default()
    };
    let (votes, _) = state.repo.load_votes(filter).await?;
    votes
        .into_iter()
        .next()
        .ok_or_else(|| AppError::NotFound(format!("vote on {hash} not found")))
}

async fn service_activity(
    State(state): State<AppState>,
    Path((collection, hash)): Path<(String, String)>,
) -> Result<Response> {
    activity_view(&state, Scope::Service, &collection, &hash).await
}

async fn actor_activity(
    State(state): State<AppState>,
    Path((handle, collection, hash)): Path<(String, String, String)>,
) -> Result<Response> {
    let account = load_actor_account(&state, &handle).await?;
    activity_view(&state, Scope::Actor(account), &collection, &hash).await
}

async fn activity_view(
    state: &AppState,
    scope: Scope,
    collection: &str,
    hash: &str,
) -> Result<Response> {
    let kind = CollectionKind::parse(collection)
        .ok_or_else(|| AppError::NotFound(format!("collection {collection} not found")))?;
    let activity = match kind {
        CollectionKind::Inbox | CollectionKind::Outbox => {
            let item = load_scoped_item(state, &scope, hash).await?;
            state.mapper.item_to_activity(&item)
        }
        CollectionKind::Liked => {
            let vote = load_scoped_vote(state, &scope, hash).await?;
            state.mapper.vote_to_activity(&vote)
        }
        _ => {
            return Err(AppError::NotFound(format!(
                "collection {collection} not found"
            )))
        }
    };
    Ok(activity_json(state, StatusCode::OK, &activity))
}

async fn service_object(
    State(state): State<AppState>,
    Path((collection, hash)): Path<(String, String)>,
) -> Result<Response> {
    object_view(&state, Scope::Service, &collection, &hash).await
}

async fn actor_object(
    State(state): State<AppState>,
    Path((handle, collection, hash)): Path<(String, String, String)>,
) -> Result<Response> {
    let account = load_actor_account(&state, &handle).await?;
    object_view(&state, Scope::Actor(account), &collection, &hash).await
}

async fn object_view(
    state: &AppState,
    scope: Scope,
    collection: &str,
    hash: &str,
) -> Result<Response> {
    let kind = CollectionKind::parse(collection)
        .ok_or_else(|| AppError::NotFound(format!("collection {collection} not found")))?;
    match kind {
        CollectionKind::Inbox | CollectionKind::Outbox => {
            let item = load_scoped_item(state, &scope, hash).await?;
            let mut object = state.mapper.item_to_object(&item);
            let (_, reply_count) = state
                .repo
                .load_items(ItemFilter {
                    in_reply_to: Some(item.hash.clone()),
                    ..ItemFilter::default()
                })
                .await?;
            if reply_count > 0 {
                state.mapper.attach_replies(&mut object);
            }
            Ok(activity_json(state, StatusCode::OK, &object))
        }
        CollectionKind::Liked => {
            let vote = load_scoped_vote(state, &scope, hash).await?;
            let activity = state.mapper.vote_to_activity(&vote);
            Ok(activity_json(state, StatusCode::OK, &activity))
        }
        _ => Err(AppError::NotFound(format!(
            "collection {collection} not found"
        ))),
    }
}

async fn service_replies(
    State(state): State<AppState>,
    Path((collection, hash)): Path<(String, String)>,
    Query(query): Query<PageQuery>,
) -> Result<Response> {
    replies_view(&state, Scope::Service, &collection, &hash, &query).await
}

async fn actor_replies(
    State(state): State<AppState>,
    Path((handle, collection, hash)): Path<(String, String, String)>,
    Query(query): Query<PageQuery>,
) -> Result<Response> {
    let account = load_actor_account(&state, &handle).await?;
    replies_view(&state, Scope::Actor(account), &collection, &hash, &query).await
}

async fn replies_view(
    state: &AppState,
    scope: Scope,
    collection: &str,
    hash: &str,
    query: &PageQuery,
) -> Result<Response> {
    if CollectionKind::parse(collection).is_none() {
        return Err(AppError::NotFound(format!(
            "collection {collection} not found"
        )));
    }
    let item = load_scoped_item(state, &scope, hash).await?;
    let page = query.to_page(state.config.federation.page_size);
    let (replies, count) = state
        .repo
        .load_items(ItemFilter {
            in_reply_to: Some(item.hash.clone()),
            page,
            ..ItemFilter::default()
        })
        .await?;
    let activities: Vec<Activity> = replies
        .iter()
        .map(|i| state.mapper.item_to_activity(i))
        .collect();
    let object_id = state
        .mapper
        .ids()
        .item_object(&item)
        .ok_or_else(|| AppError::NotFound(format!("item {hash} not found")))?;
    let base = state.mapper.ids().replies(&object_id);
    let collection_doc = crate::federation::build_collection(&base, &activities, count, page)?;
    Ok(activity_json(state, StatusCode::OK, &collection_doc))
}

// =============================================================================
// Activity submission
// =============================================================================

async fn service_submit(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Extension(Caller(caller)): Extension<Caller>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    submit(&state, &collection, caller, &headers, &body).await
}

async fn actor_submit(
    State(state): State<AppState>,
    Path((_handle, collection)): Path<(String, String)>,
    Extension(Caller(caller)): Extension<Caller>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    submit(&state, &collection, caller, &headers, &body).await
}

/// POST .../{inbox|outbox}
///
/// Runs the full pipeline: parse, validate, synchronize a newly seen
/// remote actor (inbox only), persist, journal. The response carries the
/// normalized activity; 201 with a Location header marks first
/// persistence, 200 an update, 202 an acknowledged Follow.
async fn submit(
    state: &AppState,
    collection: &str,
    caller: Account,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<Response> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["POST", "/:collection"])
        .start_timer();
    let kind = CollectionKind::parse(collection)
        .ok_or_else(|| AppError::NotFound(format!("collection {collection} not found")))?;
    if !matches!(kind, CollectionKind::Inbox | CollectionKind::Outbox) {
        return Err(AppError::MethodNotAllowed(format!(
            "cannot submit activities to {collection}"
        )));
    }
    if body.is_empty() {
        return Err(AppError::NotValid("unable to read request body".to_string()));
    }
    let activity: Activity = serde_json::from_slice(body)
        .map_err(|e| AppError::NotValid(format!("unable to parse activity: {e}")))?;

    let validated = match kind {
        CollectionKind::Inbox => {
            ACTIVITIES_RECEIVED
                .with_label_values(&[activity.kind.as_str()])
                .inc();
            let validated = state.validator.validate_inbox(activity, &caller).await?;
            if let Some(account) = &validated.missing_actor {
                tracing::info!(
                    actor = %account.handle,
                    iri = account.metadata.as_ref().and_then(|m| m.id.as_deref()).unwrap_or_default(),
                    "synchronizing newly seen remote actor"
                );
                state.repo.save_account(account.clone()).await?;
            }
            if !caller.is_anonymous() && !caller.hash.matches(&validated.actor.hash) {
                tracing::warn!(
                    signer = %caller.hash.short(),
                    actor = %validated.actor.hash.short(),
                    remote = headers.get("host").and_then(|h| h.to_str().ok()).unwrap_or_default(),
                    "activity actor differs from signature identity"
                );
            }
            validated
        }
        CollectionKind::Outbox => {
            ACTIVITIES_SUBMITTED
                .with_label_values(&[activity.kind.as_str()])
                .inc();
            let validated = state.validator.validate_outbox(activity).await?;
            if !caller.is_anonymous() && !caller.hash.matches(&validated.actor.hash) {
                return Err(AppError::Forbidden(
                    "activity actor does not match the authenticated caller".to_string(),
                ));
            }
            validated
        }
        _ => unreachable!(),
    };

    let target = match kind {
        CollectionKind::Inbox => state.mapper.ids().shared_inbox(),
        _ => state.mapper.ids().global_outbox(),
    };
    persist(state, validated, &target).await
}

async fn persist(state: &AppState, validated: Validated, target: &str) -> Result<Response> {
    let Validated {
        activity, actor, ..
    } = validated;

    let (status, location) = match activity.kind {
        ActivityKind::Follow => (StatusCode::ACCEPTED, None),
        ActivityKind::Create | ActivityKind::Update | ActivityKind::Delete => {
            let item = state.mapper.item_from_activity(&activity, &actor)?;
            let saved = state.repo.save_item(item).await?;
            if saved.updated_at.is_none() {
                (StatusCode::CREATED, state.mapper.ids().item_location(&saved))
            } else {
                (StatusCode::OK, None)
            }
        }
        ActivityKind::Like | ActivityKind::Dislike | ActivityKind::Undo => {
            let vote = state.mapper.vote_from_activity(&activity, &actor)?;
            let saved = state.repo.save_vote(vote).await?;
            if saved.updated_at.is_none() {
                (StatusCode::CREATED, Some(state.mapper.ids().vote_location(&saved)))
            } else {
                (StatusCode::OK, None)
            }
        }
    };

    // journal failures are logged, never fatal
    if let Err(err) = state.repo.save_activity(&activity, target).await {
        tracing::warn!(%err, target, "failed to journal activity");
    }

    count_request("POST", "/:collection", status);

    let mut response = activity_json(state, status, &activity);
    if let Some(location) = location {
        if let Ok(value) = header::HeaderValue::from_str(&location) {
            response.headers_mut().insert(header::LOCATION, value);
        }
    }
    Ok(response)
}
