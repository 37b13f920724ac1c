use thiserror::Error;

use crate::world::position::{ChunkKey, RegionKey};

/// Outcome of a metadata store call that could not be served.
///
/// `ChunkBusy` is routine: the chunk is mid load or persist and the caller
/// should deny or retry the action later. The other variants are usage
/// errors by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("chunk {0} is busy loading or persisting")]
    ChunkBusy(ChunkKey),

    #[error("chunk {0} is not loaded")]
    ChunkNotLoaded(ChunkKey),

    #[error("chunk {0} is already loaded")]
    ChunkAlreadyLoaded(ChunkKey),

    /// The region task carrying the operation went away before reporting
    /// back (runtime shutdown or a panicking operation).
    #[error("region task for {0} was interrupted")]
    Interrupted(RegionKey),
}
