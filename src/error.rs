use thiserror::Error;

/// Failure taxonomy shared by the store, the coordinator and the commands.
///
/// A lost claim race is not an error; see [`crate::claims::ClaimOutcome`].
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("\"{name}\" is already on this registry")]
    DuplicateItem { name: String },
    #[error("incorrect PIN")]
    Unauthorized,
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("storage failure: {0:#}")]
    Persistence(#[from] anyhow::Error),
}

impl RegistryError {
    pub fn not_found(what: impl Into<String>) -> Self {
        RegistryError::NotFound(what.into())
    }

    /// Only storage failures are worth a manual retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RegistryError::Persistence(_))
    }
}

impl From<rusqlite::Error> for RegistryError {
    fn from(err: rusqlite::Error) -> Self {
        RegistryError::Persistence(anyhow::Error::new(err))
    }
}

pub type RegistryResult<T> = Result<T, RegistryError>;

/// Whether a failure that surfaced through `anyhow` is a registry storage
/// failure worth retrying by hand.
pub fn is_retryable_failure(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<RegistryError>()
            .is_some_and(RegistryError::is_retryable)
    })
}
