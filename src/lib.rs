pub mod config;
pub mod fixture;
pub mod relay;

pub use config::{
    AggregationConfig, BroadcastConfig, DeriverConfig, LogConfig, RelayConfig, SchedulerConfig,
};
pub use fixture::{Fixture, FixtureClient, ProviderFixture};
pub use relay::{Relay, RelayError, SignatureEvent, SignatureResync};

// Re-export crate modules
pub use relay_aggregation as aggregation;
pub use relay_broadcast as broadcast;
pub use relay_scheduler as scheduler;
pub use relay_types as types;
pub use relay_valset as valset;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get client version string
pub fn client_version() -> String {
    format!("restaking-relay/v{}/rust", VERSION)
}
