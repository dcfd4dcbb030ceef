//! Federation layer
//!
//! Everything that speaks the activity-graph protocol: the wire
//! vocabulary, identifier construction, entity mapping, collection
//! pagination, audience and blocklist gates, the activity validation
//! pipeline, and HTTP signature handling.

pub mod audience;
pub mod collection;
pub mod ids;
pub mod mapper;
pub mod signature;
pub mod validate;
pub mod vocab;

pub use audience::AudienceValidator;
pub use collection::build_collection;
pub use ids::IriBuilder;
pub use mapper::Mapper;
pub use signature::SignatureResolver;
pub use validate::{ActivityValidator, Validated};
