use thiserror::Error;

/// Errors surfaced by the permission engine.
///
/// Permission checks never fail because state is stale: a missing channel,
/// role or planet resolves to a deny. Errors only come from the data-access
/// collaborator or from invalid input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Data access error: {0}")]
    DataAccess(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error came from the storage collaborator
    #[must_use]
    pub const fn is_data_access(&self) -> bool {
        matches!(self, Self::DataAccess(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
