//! Configuration and infrastructure error taxonomy.
//!
//! Everything in here is raised while the routing tree is being configured or
//! built, or while the server is binding its listener — always before the
//! first request is accepted. Runtime failures raised by handlers travel a
//! different path entirely: they become [`Fault`](crate::Fault)s, captured at
//! the chain boundary and converted into HTTP responses, and never surface as
//! an [`Error`].

use thiserror::Error;

/// The error type returned by rudder's fallible configuration operations.
///
/// A server must not start with a broken routing definition, so every variant
/// here is fatal: propagate it out of `main` and let the process exit.
#[derive(Debug, Error)]
pub enum Error {
    /// A scope prefix was blank: empty at a nested level, or whitespace-only
    /// anywhere.
    #[error("prefix must not be blank")]
    BlankPrefix,

    /// A route template was non-empty but whitespace-only.
    #[error("route template must not be blank")]
    BlankTemplate,

    /// A handler chain was configured with no handlers at all.
    #[error("handler chain must not be empty")]
    EmptyChain,

    /// The same handler instance appeared twice in one chain, which would make
    /// "advance to the next handler" ambiguous.
    #[error("handler chain must not contain duplicates")]
    DuplicateHandlers,

    /// A resolved route template was rejected by the routing table, either for
    /// invalid parameter syntax or because it conflicts with an already
    /// registered route.
    #[error("invalid route template `{template}`: {source}")]
    InvalidTemplate {
        template: String,
        source: matchit::InsertError,
    },

    /// The configured host/port pair does not form a valid socket address.
    #[error("invalid listen address `{0}`")]
    InvalidAddress(String),

    /// The connection low water mark was configured at or above the high
    /// water mark, so accept gating could never engage.
    #[error("connection low water mark ({low}) must be below the high water mark ({high})")]
    InvalidWaterMarks { high: usize, low: usize },

    /// Binding or accepting on the listener failed.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
