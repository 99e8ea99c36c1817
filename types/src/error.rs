//! Store errors shared by the service store traits.

/// Errors returned by the Metamorph and BlockTx stores.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested record does not exist.
    #[error("record not found")]
    NotFound,
    /// The store backend is temporarily unreachable.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// Any other backend failure.
    #[error("store error: {0}")]
    Internal(String),
}

impl StoreError {
    /// `true` for [`StoreError::NotFound`], the sentinel callers branch on.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}
