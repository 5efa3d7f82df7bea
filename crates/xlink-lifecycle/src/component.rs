use crate::error::LifecycleError;

/// `UNINITIALIZED → INITIALIZED → {ACTIVE | STANDBY} → STOPPED`, with
/// `ACTIVE ↔ STANDBY` reachable via `become_active`/`become_standby`
/// (spec.md §4.H).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentState {
    Uninitialized,
    Initialized,
    Active,
    Standby,
    Stopped,
}

/// A component managed by a [`crate::Container`].
///
/// Every hook defaults to a no-op so simple components only implement the
/// ones they need; the container still drives every component through the
/// same state machine.
pub trait Component: std::any::Any {
    fn init(&mut self) -> Result<(), LifecycleError> {
        Ok(())
    }

    /// `INITIALIZED -> ACTIVE` for a component that starts out live.
    fn start(&mut self) -> Result<(), LifecycleError> {
        Ok(())
    }

    /// `INITIALIZED -> STANDBY` for a component that starts out passive.
    fn start_standby(&mut self) -> Result<(), LifecycleError> {
        Ok(())
    }

    fn become_active(&mut self) -> Result<(), LifecycleError> {
        Ok(())
    }

    fn become_standby(&mut self) -> Result<(), LifecycleError> {
        Ok(())
    }

    fn stop(&mut self) -> Result<(), LifecycleError> {
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any;

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any;
}
