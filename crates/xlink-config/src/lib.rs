//! TOML configuration loading (spec.md §6, ambient stack per
//! SPEC_FULL.md §2): a raw-then-validated two-struct pattern per block,
//! the same shape `services/forwarder/src/config.rs` uses — deserialize
//! an all-`Option` `RawXxxConfig`, then default/validate into a public
//! `XxxConfig` with no further `Option`s where spec.md gives a default.

mod discovery;
mod engine;
mod error;
mod schedule;
mod session;

pub use discovery::{expand_target, DiscoveryError, HostEndpoint};
pub use engine::{load_engine_config, load_engine_config_from_str, EngineConfig};
pub use error::ConfigError;
pub use schedule::{RawScheduleConfig, ScheduleConfig, ScheduleWindowConfig};
pub use session::{RawSessionConfig, SessionConfig};
