//! Runtime errors.

use thiserror::Error;

/// Errors that stop the runtime.
///
/// Session and chat failures are not here: they are handled by the state
/// machines and surfaced through state listeners and notices.
#[derive(Error, Debug)]
pub enum RuntimeError<E: std::error::Error + 'static> {
    /// Driver I/O failed.
    #[error("driver error: {0}")]
    Driver(#[source] E),

    /// Runtime was used after `stop`.
    #[error("runtime stopped")]
    Stopped,
}
