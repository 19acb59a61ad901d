pub mod config;
pub mod error;
pub mod extract;
pub mod gateway;
pub mod mqtt;
pub mod normalize;
pub mod poller;
pub mod reconcile;
pub mod schema;
pub mod snapshot;
pub mod state;

// Re-export commonly used items
pub use config::Config;
pub use error::{AppError, Result};
pub use gateway::IsgClient;
pub use normalize::PointValue;
pub use poller::Poller;
pub use reconcile::Reconciler;
pub use snapshot::Snapshot;
