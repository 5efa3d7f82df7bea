//! Typed component container with dependency ordering and active/standby
//! failover (spec.md §4.H).
//!
//! Components are registered with a name, a factory, and a list of
//! dependency names; `initialize_all` walks the dependency DAG leaves
//! first (Kahn's algorithm), aborting and tearing down already-initialized
//! components if any factory fails. `@Singleton`-tagged component types
//! are modeled as a `singleton_type` key shared across registrations: the
//! first registration for a given singleton type wins and later
//! registrations for the same type alias that one instance instead of
//! invoking their own factory.

mod component;
mod container;
mod error;

pub use component::{Component, ComponentState};
pub use container::{Container, Registration};
pub use error::LifecycleError;
