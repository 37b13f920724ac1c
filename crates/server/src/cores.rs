//! Faction cores and territorial influence.
//!
//! A core claims the 3x3 chunks around it for its faction, as far as the
//! faction's power allows. Each core counts as one point of influence over
//! each of those chunks. When a core goes, every chunk its faction held in
//! that square is re-voted among the cores still standing nearby:
//!
//! - no influence left: the chunk is released;
//! - another faction now has strictly more influence: it takes the chunk;
//! - otherwise (including ties) the owner keeps it.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future;
use softclaims_engine::{BlockKey, ChunkKey, MetadataStore, StoreError};

use crate::config::Config;
use crate::error::ClaimError;
use crate::event_bus::{self, ClaimsEvent, EventBus};
use crate::faction::{FactionBackend, FactionId, FactionPermission, PlayerId};
use crate::host::HostWorld;
use crate::world_service::WorldService;

/// Cores per faction around one chunk.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Influence(BTreeMap<FactionId, usize>);

impl Influence {
    pub fn count(&self, faction: &FactionId) -> usize {
        self.0.get(faction).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn add(&mut self, faction: FactionId) {
        *self.0.entry(faction).or_default() += 1;
    }

    /// Remove one point of `faction`'s influence, dropping it at zero.
    pub fn withdraw(&mut self, faction: &FactionId) {
        if let Some(count) = self.0.get_mut(faction) {
            *count -= 1;
            if *count == 0 {
                self.0.remove(faction);
            }
        }
    }

    /// The faction with the most influence. `incumbent` wins ties; among
    /// other tied factions the lowest id wins.
    pub fn leader(&self, incumbent: &FactionId) -> Option<&FactionId> {
        let best = self.0.values().copied().max()?;
        if self.count(incumbent) == best {
            return self.0.get_key_value(incumbent).map(|(id, _)| id);
        }
        self.0.iter().find(|(_, count)| **count == best).map(|(id, _)| id)
    }
}

impl FromIterator<FactionId> for Influence {
    fn from_iter<I: IntoIterator<Item = FactionId>>(iter: I) -> Self {
        let mut influence = Influence::default();
        for faction in iter {
            influence.add(faction);
        }
        influence
    }
}

/// What a core removal did to one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkVote {
    /// Not held by the core's faction; left alone.
    Untouched,
    /// The core's faction keeps the chunk.
    Kept,
    Unclaimed,
    Transferred(FactionId),
    /// The neighbourhood could not be read; the chunk was left as it was.
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoreCreated {
    pub faction: FactionId,
    pub claimed: Vec<ChunkKey>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoreRemoved {
    pub faction: FactionId,
    pub votes: Vec<(ChunkKey, ChunkVote)>,
}

impl CoreRemoved {
    fn tally(&self, f: impl Fn(&ChunkVote) -> bool) -> usize {
        self.votes.iter().filter(|(_, vote)| f(vote)).count()
    }

    pub fn unclaimed(&self) -> usize {
        self.tally(|vote| *vote == ChunkVote::Unclaimed)
    }

    pub fn transferred(&self) -> usize {
        self.tally(|vote| matches!(vote, ChunkVote::Transferred(_)))
    }
}

pub struct FactionCoreService {
    config: Arc<Config>,
    worlds: Arc<WorldService>,
    factions: Arc<dyn FactionBackend>,
    host: Arc<dyn HostWorld>,
    bus: EventBus,
}

impl FactionCoreService {
    pub fn new(
        config: Arc<Config>,
        worlds: Arc<WorldService>,
        factions: Arc<dyn FactionBackend>,
        host: Arc<dyn HostWorld>,
        bus: EventBus,
    ) -> Self {
        Self {
            config,
            worlds,
            factions,
            host,
            bus,
        }
    }

    pub fn store(&self) -> &MetadataStore<FactionId> {
        self.worlds.core_store()
    }

    /// The chunks a core at `block` influences.
    pub fn influenced_chunks(&self, block: &BlockKey) -> [ChunkKey; 9] {
        block.chunk().neighborhood()
    }

    /// Chunks of the 3x3 square around `chunk` that nobody owns.
    pub fn unclaimed_chunks_around(&self, chunk: &ChunkKey) -> Vec<ChunkKey> {
        chunk
            .neighborhood()
            .into_iter()
            .filter(|neighbor| !self.factions.is_in_faction_land(neighbor))
            .collect()
    }

    /// Cores per faction in the 3x3 square around `chunk`, its own core
    /// included. Neighbours need not be loaded.
    pub async fn chunk_influences(&self, chunk: &ChunkKey) -> Result<Influence, StoreError> {
        let reads = chunk
            .neighborhood()
            .into_iter()
            .map(|neighbor| self.store().fetch_chunk(neighbor));
        let sections = future::try_join_all(reads).await?;
        Ok(sections
            .into_iter()
            .flatten()
            .flat_map(|cores| cores.into_values())
            .collect())
    }

    // ── Placement ───────────────────────────────────────────────────────────

    /// Turn the block just placed at `block` into a core for `creator`'s
    /// faction and claim the free chunks around it.
    ///
    /// Either every check passes and the core is recorded with all its
    /// claims, or nothing changes.
    ///
    /// Free neighbours are found by asking the faction backend about each of
    /// the nine chunks in turn. The backend answers synchronously, so placing
    /// a core never waits on region I/O and needs no neighbour chunks loaded.
    pub fn create_core(&self, block: &BlockKey, creator: PlayerId) -> Result<CoreCreated, ClaimError> {
        if self.host.material_at(block) != self.config.core_material {
            return Err(ClaimError::InvalidCoreBlock);
        }
        if self.worlds.is_world_disabled(&block.world) {
            return Err(ClaimError::WorldDisabled);
        }
        let faction = self
            .factions
            .faction_of_player(creator)
            .ok_or(ClaimError::FactionDoesNotExist)?;
        if !self
            .factions
            .has_player_permission(&faction.id, creator, FactionPermission::ClaimChunk)?
        {
            return Err(ClaimError::FactionPermissionDenied);
        }

        let chunk = block.chunk();
        if let Some(owner) = self.factions.faction_at(&chunk) {
            if owner.id != faction.id {
                return Err(ClaimError::ChunkClaimedByOtherFaction);
            }
        }
        if self.store().has_metadata_for_chunk(&chunk)? {
            return Err(ClaimError::MultipleCoresInChunk);
        }

        let unclaimed = self.unclaimed_chunks_around(&chunk);
        let claims = self.factions.faction_chunks(&faction.id)?.len();
        let deficiency = (claims + unclaimed.len()) as f64 - faction.power;
        if deficiency > 0.0 {
            return Err(ClaimError::NotEnoughPower { deficiency });
        }

        self.store().set_metadata(block, faction.id.clone())?;
        let mut claimed = Vec::with_capacity(unclaimed.len());
        for neighbor in unclaimed {
            match self.factions.claim_chunk(&faction.id, &neighbor) {
                Ok(()) => claimed.push(neighbor),
                Err(e) => tracing::warn!("Core at {} could not claim {}: {}", block, neighbor, e),
            }
        }

        tracing::info!("Core created at {} for {} ({} chunks claimed)", block, faction.id, claimed.len());
        event_bus::publish(
            &self.bus,
            ClaimsEvent::CoreCreated {
                block: block.clone(),
                faction: faction.id.clone(),
                claimed: claimed.len(),
            },
        );
        Ok(CoreCreated {
            faction: faction.id,
            claimed,
        })
    }

    // ── Removal ─────────────────────────────────────────────────────────────

    /// Remove the core at `block` on behalf of `remover`. Members of the
    /// core's own faction need the unclaim permission; anyone else may
    /// destroy it.
    pub async fn remove_core_as_player(&self, block: &BlockKey, remover: PlayerId) -> Result<CoreRemoved, ClaimError> {
        let core_faction = self.core_at(block)?;
        if let Some(faction) = self.factions.faction_of_player(remover) {
            if faction.id == core_faction
                && !self
                    .factions
                    .has_player_permission(&faction.id, remover, FactionPermission::UnclaimChunk)?
            {
                return Err(ClaimError::FactionPermissionDenied);
            }
        }
        self.remove_core(block).await
    }

    /// Remove the core at `block` and re-vote the ownership of every chunk
    /// it influenced.
    pub async fn remove_core(&self, block: &BlockKey) -> Result<CoreRemoved, ClaimError> {
        let core_faction = self.core_at(block)?;
        tracing::info!("Removing core at {} for {}", block, core_faction);

        let influenced = self.influenced_chunks(block);
        let votes = future::join_all(
            influenced
                .iter()
                .map(|chunk| self.revote(chunk, block, &core_faction)),
        )
        .await;

        if let Err(e) = self.store().remove_metadata(block) {
            tracing::error!("Core at {} was re-voted but its record could not be removed: {}", block, e);
            return Err(e.into());
        }

        let removed = CoreRemoved {
            faction: core_faction,
            votes: influenced.into_iter().zip(votes).collect(),
        };
        event_bus::publish(
            &self.bus,
            ClaimsEvent::CoreRemoved {
                block: block.clone(),
                faction: removed.faction.clone(),
                unclaimed: removed.unclaimed(),
                transferred: removed.transferred(),
            },
        );
        Ok(removed)
    }

    /// Remove every core recorded in a chunk and break the core blocks.
    /// Returns how many cores were removed.
    pub async fn clear_and_destroy_cores_in_chunk(&self, chunk: &ChunkKey) -> Result<usize, ClaimError> {
        let Some(cores) = self.store().get_metadata_in_chunk(chunk)? else {
            return Ok(0);
        };
        let mut removed = 0;
        for local in cores.into_keys() {
            let block = chunk.block(local);
            match self.remove_core(&block).await {
                Ok(_) => {
                    self.host.break_block(&block, true);
                    removed += 1;
                }
                Err(e) => tracing::warn!("Could not remove core at {}: {}", block, e),
            }
        }
        Ok(removed)
    }

    fn core_at(&self, block: &BlockKey) -> Result<FactionId, ClaimError> {
        self.store().get_metadata(block)?.ok_or(ClaimError::InvalidCoreBlock)
    }

    /// Decide one influenced chunk after the core at `core` is gone.
    async fn revote(&self, chunk: &ChunkKey, core: &BlockKey, core_faction: &FactionId) -> ChunkVote {
        let held = self
            .factions
            .faction_at(chunk)
            .is_some_and(|owner| owner.id == *core_faction);
        if !held {
            return ChunkVote::Untouched;
        }

        let mut influence = match self.chunk_influences(chunk).await {
            Ok(influence) => influence,
            Err(e) => {
                tracing::warn!("Cannot re-vote {} after removing {}: {}", chunk, core, e);
                return ChunkVote::Failed;
            }
        };
        influence.withdraw(core_faction);

        let Some(winner) = influence.leader(core_faction).cloned() else {
            return match self.factions.unclaim_chunk(core_faction, chunk) {
                Ok(()) => ChunkVote::Unclaimed,
                Err(e) => {
                    tracing::warn!("Failed to release {}: {}", chunk, e);
                    ChunkVote::Failed
                }
            };
        };
        if winner == *core_faction {
            return ChunkVote::Kept;
        }

        if let Err(e) = self.factions.unclaim_chunk(core_faction, chunk) {
            tracing::warn!("Failed to release {} for transfer: {}", chunk, e);
            return ChunkVote::Failed;
        }
        match self.factions.claim_chunk(&winner, chunk) {
            Ok(()) => {
                tracing::debug!("{} transferred from {} to {}", chunk, core_faction, winner);
                ChunkVote::Transferred(winner)
            }
            Err(e) => {
                tracing::warn!("{} released but {} could not claim it: {}", chunk, winner, e);
                ChunkVote::Unclaimed
            }
        }
    }
}
