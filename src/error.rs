use thiserror::Error;

/// Errors surfaced by the checked scene operations.
///
/// Most of the core deliberately uses sentinel returns and silent no-ops
/// instead of errors (erasing an absent component, inserting at
/// [`INVALID_ENTITY`](crate::INVALID_ENTITY)); this enum only covers the
/// conditions a caller can meaningfully react to.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum EcsError {
    /// The 32-bit entity id space ran out and no freed ids are available.
    #[error("entity id space exhausted")]
    IdSpaceExhausted,
}
