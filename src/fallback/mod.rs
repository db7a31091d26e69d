//! Fallback Module
//!
//! Retry-bounded live fetches with an ordered chain of degraded data sources
//! for offline operation, plus endpoint health probing.

mod datasets;
mod manager;
mod snapshot;

pub use datasets::DatasetClient;
pub use manager::{
    ApiFallbackManager, ApiResponse, EndpointHealth, EndpointStatus, RequestOptions,
};
pub use snapshot::{SnapshotProvider, StaticSnapshotProvider, DEFAULT_LOCALE};
