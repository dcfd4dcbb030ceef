//! Kindling - federation adapter for a federated link aggregator
//!
//! Translates the application's domain model (accounts, posts, votes)
//! into the activity-graph wire vocabulary, validates inbound and
//! outbound federation messages, resolves callers from HTTP signatures,
//! and serves paginated activity collections.
//!
//! # Modules
//!
//! - `api`: HTTP handlers and request-identity middleware
//! - `federation`: wire vocabulary, mapping, validation, signatures
//! - `domain`: accounts, items, votes, and the repository contract
//! - `config`: configuration management
//! - `error`: error types
//! - `metrics`: Prometheus registry

pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod federation;
pub mod metrics;

use std::sync::Arc;

use crate::domain::{ContentRenderer, Repository};
use crate::federation::{
    ActivityValidator, AudienceValidator, IriBuilder, Mapper, SignatureResolver,
};

/// Application state shared across all handlers
///
/// Cloned per request; everything inside is read-only after startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::AppConfig>,
    pub repo: Arc<dyn Repository>,
    pub mapper: Arc<Mapper>,
    pub audience: AudienceValidator,
    pub validator: Arc<ActivityValidator>,
    pub resolver: Arc<SignatureResolver>,
}

impl AppState {
    /// Wire up the federation pipeline around a repository and renderer
    pub fn new(
        config: config::AppConfig,
        repo: Arc<dyn Repository>,
        renderer: Arc<dyn ContentRenderer>,
    ) -> Self {
        crate::error::set_verbose_errors(config.server.environment != config::Environment::Prod);

        let ids = IriBuilder::new(&config.server);
        let mapper = Arc::new(Mapper::new(ids, renderer, config.instance.clone()));
        let audience = AudienceValidator::new(config.server.domain.clone(), &config.federation);
        let validator = Arc::new(ActivityValidator::new(
            mapper.clone(),
            audience.clone(),
            repo.clone(),
        ));
        let resolver = Arc::new(SignatureResolver::new(repo.clone(), audience.clone()));

        Self {
            config: Arc::new(config),
            repo,
            mapper,
            audience,
            validator,
            resolver,
        }
    }
}

/// Build the Axum router with all routes.
///
/// Shared by the binary and integration tests to keep route composition
/// consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::Router;
    use tower_http::{compression::CompressionLayer, trace::TraceLayer};

    let cors_layer = build_cors_layer(&state.config.server);

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .nest("/api", api::federation_router())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            api::attach_caller,
        ))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
        .merge(api::metrics_router())
}

fn build_cors_layer(server: &config::ServerConfig) -> tower_http::cors::CorsLayer {
    use axum::http::HeaderValue;
    use tower_http::cors::{Any, CorsLayer};

    if !server.protocol.eq_ignore_ascii_case("https") {
        return CorsLayer::permissive();
    }

    let allowed_origin = server.base_url();
    match HeaderValue::from_str(&allowed_origin) {
        Ok(origin) => CorsLayer::new()
            .allow_origin([origin])
            .allow_methods(Any)
            .allow_headers(Any),
        Err(error) => {
            tracing::error!(
                %error,
                origin = %allowed_origin,
                "Failed to parse CORS origin from server base URL; denying cross-origin requests"
            );
            CorsLayer::new().allow_methods(Any).allow_headers(Any)
        }
    }
}

async fn health_check() -> &'static str {
    "OK"
}
