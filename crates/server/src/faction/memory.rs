//! Self-contained faction backend keeping everything in concurrent maps.
//!
//! Used when no external faction system is attached, by the demo binary and
//! by tests.

use std::collections::{HashMap, HashSet};

use dashmap::DashMap;
use softclaims_engine::ChunkKey;

use super::{Faction, FactionBackend, FactionError, FactionId, FactionPermission, PlayerId};

struct FactionRecord {
    name: String,
    power: f64,
    bank: f64,
    members: HashMap<PlayerId, HashSet<FactionPermission>>,
}

#[derive(Default)]
pub struct MemoryFactions {
    factions: DashMap<FactionId, FactionRecord>,
    membership: DashMap<PlayerId, FactionId>,
    claims: DashMap<ChunkKey, FactionId>,
}

impl MemoryFactions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace a faction.
    pub fn create_faction(&self, id: impl Into<FactionId>, name: &str, power: f64) -> FactionId {
        let id = id.into();
        self.factions.insert(
            id.clone(),
            FactionRecord {
                name: name.to_string(),
                power,
                bank: 0.0,
                members: HashMap::new(),
            },
        );
        id
    }

    pub fn set_power(&self, faction: &FactionId, power: f64) -> Result<(), FactionError> {
        self.record_mut(faction, |record| record.power = power)
    }

    pub fn deposit(&self, faction: &FactionId, amount: f64) -> Result<(), FactionError> {
        self.record_mut(faction, |record| record.bank += amount)
    }

    pub fn balance(&self, faction: &FactionId) -> Option<f64> {
        self.factions.get(faction).map(|record| record.bank)
    }

    /// Add `player` to `faction`, leaving any previous faction.
    pub fn add_member(
        &self,
        faction: &FactionId,
        player: PlayerId,
        permissions: &[FactionPermission],
    ) -> Result<(), FactionError> {
        if let Some(previous) = self.membership.get(&player).map(|f| f.value().clone()) {
            if let Some(mut record) = self.factions.get_mut(&previous) {
                record.members.remove(&player);
            }
        }
        self.record_mut(faction, |record| {
            record.members.insert(player, permissions.iter().copied().collect());
        })?;
        self.membership.insert(player, faction.clone());
        Ok(())
    }

    pub fn owner_of(&self, chunk: &ChunkKey) -> Option<FactionId> {
        self.claims.get(chunk).map(|owner| owner.value().clone())
    }

    fn record_mut(&self, faction: &FactionId, f: impl FnOnce(&mut FactionRecord)) -> Result<(), FactionError> {
        let mut record = self
            .factions
            .get_mut(faction)
            .ok_or_else(|| FactionError::UnknownFaction(faction.clone()))?;
        f(&mut record);
        Ok(())
    }

    fn snapshot(&self, id: &FactionId) -> Option<Faction> {
        self.factions.get(id).map(|record| Faction {
            id: id.clone(),
            name: record.name.clone(),
            power: record.power,
        })
    }

    fn ensure_exists(&self, faction: &FactionId) -> Result<(), FactionError> {
        if self.factions.contains_key(faction) {
            Ok(())
        } else {
            Err(FactionError::UnknownFaction(faction.clone()))
        }
    }
}

impl FactionBackend for MemoryFactions {
    fn all_factions(&self) -> Vec<Faction> {
        let mut factions: Vec<_> = self
            .factions
            .iter()
            .map(|entry| Faction {
                id: entry.key().clone(),
                name: entry.name.clone(),
                power: entry.power,
            })
            .collect();
        factions.sort_by(|a, b| a.id.cmp(&b.id));
        factions
    }

    fn faction_by_id(&self, id: &FactionId) -> Option<Faction> {
        self.snapshot(id)
    }

    fn faction_of_player(&self, player: PlayerId) -> Option<Faction> {
        let id = self.membership.get(&player)?.value().clone();
        self.snapshot(&id)
    }

    fn faction_at(&self, chunk: &ChunkKey) -> Option<Faction> {
        let id = self.claims.get(chunk)?.value().clone();
        self.snapshot(&id)
    }

    fn has_player_permission(
        &self,
        faction: &FactionId,
        player: PlayerId,
        permission: FactionPermission,
    ) -> Result<bool, FactionError> {
        let record = self
            .factions
            .get(faction)
            .ok_or_else(|| FactionError::UnknownFaction(faction.clone()))?;
        Ok(record
            .members
            .get(&player)
            .is_some_and(|permissions| permissions.contains(&permission)))
    }

    fn faction_chunks(&self, faction: &FactionId) -> Result<Vec<ChunkKey>, FactionError> {
        self.ensure_exists(faction)?;
        let mut chunks: Vec<_> = self
            .claims
            .iter()
            .filter(|entry| entry.value() == faction)
            .map(|entry| entry.key().clone())
            .collect();
        chunks.sort();
        Ok(chunks)
    }

    fn claim_chunk(&self, faction: &FactionId, chunk: &ChunkKey) -> Result<(), FactionError> {
        self.ensure_exists(faction)?;
        let owner = self.claims.entry(chunk.clone()).or_insert_with(|| faction.clone());
        if owner.value() != faction {
            return Err(FactionError::ChunkOwnedByOther {
                chunk: chunk.clone(),
                owner: owner.value().clone(),
            });
        }
        Ok(())
    }

    fn unclaim_chunk(&self, faction: &FactionId, chunk: &ChunkKey) -> Result<(), FactionError> {
        self.ensure_exists(faction)?;
        self.claims
            .remove_if(chunk, |_, owner| owner == faction)
            .map(|_| ())
            .ok_or_else(|| FactionError::ChunkNotOwned {
                chunk: chunk.clone(),
                faction: faction.clone(),
            })
    }

    fn charge_faction(&self, faction: &FactionId, amount: f64) -> bool {
        let Some(mut record) = self.factions.get_mut(faction) else {
            return false;
        };
        if record.bank < amount {
            return false;
        }
        record.bank -= amount;
        true
    }
}
