use thiserror::Error;
use xlink_core::error::{codes, ErrorCode};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("illegal transition for component '{name}': {from:?} -> {attempted}")]
    IllegalTransition {
        name: String,
        from: crate::component::ComponentState,
        attempted: &'static str,
    },
    #[error("factory for component '{name}' failed: {reason}")]
    FactoryFailure { name: String, reason: String },
    #[error("dependency cycle detected among: {0:?}")]
    DependencyCycle(Vec<String>),
    #[error("component '{0}' is already registered")]
    DuplicateRegistration(String),
    #[error("no component named '{0}' is registered")]
    UnknownComponent(String),
}

impl ErrorCode for LifecycleError {
    fn code(&self) -> &'static str {
        match self {
            LifecycleError::IllegalTransition { .. } => codes::ILLEGAL_TRANSITION,
            LifecycleError::FactoryFailure { .. } => codes::FACTORY_FAILURE,
            LifecycleError::DependencyCycle(_) => codes::DEPENDENCY_CYCLE,
            LifecycleError::DuplicateRegistration(_) => codes::DUPLICATE_REGISTRATION,
            LifecycleError::UnknownComponent(_) => "UNKNOWN_COMPONENT",
        }
    }
}
