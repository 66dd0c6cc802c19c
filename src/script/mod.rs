//! Script engine domain — serialized execution of user automation
//! scripts against the bound capability surface.

pub mod api;
pub mod engine;
pub mod storage;

pub use engine::{Capabilities, ScriptEngine};
pub use storage::ScriptStorage;

/// Everything that can go wrong resolving or evaluating a script.
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("script not found: {0}")]
    NotFound(String),

    #[error("script source is empty")]
    EmptySource,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("script evaluation failed: {0}")]
    Eval(String),

    #[error("script worker is gone")]
    WorkerGone,
}
