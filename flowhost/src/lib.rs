//! Flowhost: configuration, logging, fixtures and the runner that host
//! Flowlisp scripts outside of a full agent deployment.

pub mod config;
pub mod fixture_bridge;
pub mod logging;
pub mod runner;

pub use config::{ConfigError, FlowConfig, FixturesConfig, LoggingConfig, RunConfig};
pub use fixture_bridge::{FixtureBridge, FixtureError};
pub use logging::{build_filter, init_tracing};
pub use runner::{RunError, ScriptRunner};
