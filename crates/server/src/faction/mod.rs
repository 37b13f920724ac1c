//! Faction capability: who owns which chunk, who may do what, and how much
//! power a faction has.
//!
//! Faction rules live in the backend; this crate only asks questions and
//! requests claims. A backend is picked once at start-up and shared as
//! `Arc<dyn FactionBackend>`.

mod memory;
mod none;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use softclaims_engine::ChunkKey;
use thiserror::Error;
use uuid::Uuid;

use crate::config::FactionBackendKind;

pub use memory::MemoryFactions;
pub use none::NoFactions;

/// Faction identifier, also the value stored for every core block.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FactionId(String);

impl FactionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for FactionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl fmt::Display for FactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayerId(pub Uuid);

impl PlayerId {
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Snapshot of a faction as the backend sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct Faction {
    pub id: FactionId,
    pub name: String,
    /// Upper bound on the number of chunks the faction may hold.
    pub power: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FactionPermission {
    BreakBlock,
    ClaimChunk,
    UnclaimChunk,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FactionError {
    #[error("faction {0} does not exist")]
    UnknownFaction(FactionId),

    #[error("chunk {chunk} is owned by {owner}")]
    ChunkOwnedByOther { chunk: ChunkKey, owner: FactionId },

    #[error("chunk {chunk} is not owned by {faction}")]
    ChunkNotOwned { chunk: ChunkKey, faction: FactionId },
}

pub trait FactionBackend: Send + Sync {
    fn all_factions(&self) -> Vec<Faction>;

    fn faction_by_id(&self, id: &FactionId) -> Option<Faction>;

    fn faction_of_player(&self, player: PlayerId) -> Option<Faction>;

    /// Owner of a chunk, `None` for wilderness.
    fn faction_at(&self, chunk: &ChunkKey) -> Option<Faction>;

    fn has_player_permission(
        &self,
        faction: &FactionId,
        player: PlayerId,
        permission: FactionPermission,
    ) -> Result<bool, FactionError>;

    fn faction_chunks(&self, faction: &FactionId) -> Result<Vec<ChunkKey>, FactionError>;

    fn claim_chunk(&self, faction: &FactionId, chunk: &ChunkKey) -> Result<(), FactionError>;

    fn unclaim_chunk(&self, faction: &FactionId, chunk: &ChunkKey) -> Result<(), FactionError>;

    /// Try to take `amount` from the faction. Returns whether it could pay.
    fn charge_faction(&self, faction: &FactionId, amount: f64) -> bool;

    fn is_in_faction_land(&self, chunk: &ChunkKey) -> bool {
        self.faction_at(chunk).is_some()
    }

    /// Whether `player` may break blocks outright in `chunk`. Wilderness is
    /// open to everyone.
    fn can_player_destroy_in(&self, player: PlayerId, chunk: &ChunkKey) -> bool {
        match self.faction_at(chunk) {
            None => true,
            Some(owner) => self
                .has_player_permission(&owner.id, player, FactionPermission::BreakBlock)
                .unwrap_or(false),
        }
    }
}

/// Build the backend named in the configuration.
pub fn backend_for(kind: FactionBackendKind) -> Arc<dyn FactionBackend> {
    match kind {
        FactionBackendKind::None => Arc::new(NoFactions),
        FactionBackendKind::Memory => Arc::new(MemoryFactions::new()),
    }
}
