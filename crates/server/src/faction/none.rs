use softclaims_engine::ChunkKey;

use super::{Faction, FactionBackend, FactionError, FactionId, FactionPermission, PlayerId};

/// Backend for servers without factions: nobody owns anything, nothing is
/// denied and every request succeeds without effect.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFactions;

impl FactionBackend for NoFactions {
    fn all_factions(&self) -> Vec<Faction> {
        Vec::new()
    }

    fn faction_by_id(&self, _id: &FactionId) -> Option<Faction> {
        None
    }

    fn faction_of_player(&self, _player: PlayerId) -> Option<Faction> {
        None
    }

    fn faction_at(&self, _chunk: &ChunkKey) -> Option<Faction> {
        None
    }

    fn has_player_permission(
        &self,
        _faction: &FactionId,
        _player: PlayerId,
        _permission: FactionPermission,
    ) -> Result<bool, FactionError> {
        Ok(true)
    }

    fn faction_chunks(&self, _faction: &FactionId) -> Result<Vec<ChunkKey>, FactionError> {
        Ok(Vec::new())
    }

    fn claim_chunk(&self, _faction: &FactionId, _chunk: &ChunkKey) -> Result<(), FactionError> {
        Ok(())
    }

    fn unclaim_chunk(&self, _faction: &FactionId, _chunk: &ChunkKey) -> Result<(), FactionError> {
        Ok(())
    }

    fn charge_faction(&self, _faction: &FactionId, _amount: f64) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use softclaims_engine::{ChunkPos, WorldId};

    #[test]
    fn everything_is_wilderness() {
        let chunk = ChunkKey::new(WorldId::new("world"), ChunkPos::new(0, 0));
        assert!(!NoFactions.is_in_faction_land(&chunk));
        assert!(NoFactions.can_player_destroy_in(PlayerId::random(), &chunk));
        assert!(NoFactions.charge_faction(&FactionId::from("any"), 10.0));
    }
}
