#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing service could not be reached.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
    /// A write conflicted with the stored state.
    #[error("Storage conflict: {0}")]
    Conflict(String),
}
