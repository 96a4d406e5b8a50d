use thiserror::Error;

/// Errors that abort a whole sync run.
///
/// Everything that can go wrong for a single playlist is recorded in the
/// [`RunReport`](crate::sync::report::RunReport) instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncEngineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication with Spotify failed")]
    Auth,

    #[error("Could not fetch the playlist catalog from Spotify")]
    Catalog,

    #[error("Could not read the local sync folder")]
    LocalState,
}

pub type SyncEngineResult<T> = error_stack::Result<T, SyncEngineError>;
