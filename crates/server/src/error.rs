use softclaims_engine::StoreError;
use thiserror::Error;

use crate::faction::FactionError;

/// Why a durability or core action was refused.
///
/// Every variant is an expected outcome. Handlers turn them into a denied
/// action and a message for the player; none of them is fatal.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClaimError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Faction(#[from] FactionError),

    #[error("block is not a faction core")]
    InvalidCoreBlock,

    #[error("world is disabled")]
    WorldDisabled,

    #[error("player is not in a faction")]
    FactionDoesNotExist,

    #[error("faction permission denied")]
    FactionPermissionDenied,

    #[error("chunk is claimed by another faction")]
    ChunkClaimedByOtherFaction,

    #[error("chunk already holds a faction core")]
    MultipleCoresInChunk,

    #[error("faction lacks {deficiency} power")]
    NotEnoughPower { deficiency: f64 },
}

impl ClaimError {
    /// True for the transient busy condition, which callers may retry later.
    pub fn is_busy(&self) -> bool {
        matches!(self, ClaimError::Store(StoreError::ChunkBusy(_)))
    }
}
