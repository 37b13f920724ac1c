//! Host world capability: what a block is made of, and breaking blocks.
//!
//! The game server owns the blocks; services only look at materials and ask
//! for blocks to be broken.

use std::sync::Mutex;

use dashmap::DashMap;
use softclaims_engine::{BlockKey, BlockPos, ChunkKey, WorldId};

use crate::block::Material;

pub trait HostWorld: Send + Sync {
    /// Material at a block. Unknown blocks are air.
    fn material_at(&self, block: &BlockKey) -> Material;

    /// Break a block as if mined, dropping its items if `drop_items`.
    fn break_block(&self, block: &BlockKey, drop_items: bool);
}

/// A block the host was asked to break.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokenBlock {
    pub block: BlockKey,
    pub material: Material,
    pub dropped_items: bool,
}

/// Concurrent in-memory world, lock-sharded by block.
#[derive(Default)]
pub struct MemoryWorld {
    blocks: DashMap<BlockKey, Material>,
    /// Blocks broken since the last [`MemoryWorld::take_broken`].
    broken: Mutex<Vec<BrokenBlock>>,
}

impl MemoryWorld {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a block. Placing air clears it.
    pub fn set_block(&self, block: BlockKey, material: Material) {
        if material.is_air() {
            self.blocks.remove(&block);
        } else {
            self.blocks.insert(block, material);
        }
    }

    /// Fill every column of a chunk between `min_y` and `max_y` inclusive.
    pub fn fill_chunk(&self, chunk: &ChunkKey, min_y: i64, max_y: i64, material: &Material) {
        let origin = chunk.pos.block_origin(0);
        for x in 0..16 {
            for z in 0..16 {
                for y in min_y..=max_y {
                    let pos = BlockPos::new(origin.x + x, y, origin.z + z);
                    self.set_block(BlockKey::new(chunk.world.clone(), pos), material.clone());
                }
            }
        }
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn blocks_in(&self, world: &WorldId) -> usize {
        self.blocks.iter().filter(|entry| entry.key().world == *world).count()
    }

    /// Drain the log of broken blocks.
    pub fn take_broken(&self) -> Vec<BrokenBlock> {
        std::mem::take(&mut *self.broken.lock().expect("broken block log poisoned"))
    }
}

impl HostWorld for MemoryWorld {
    fn material_at(&self, block: &BlockKey) -> Material {
        self.blocks
            .get(block)
            .map(|material| material.value().clone())
            .unwrap_or_else(Material::air)
    }

    fn break_block(&self, block: &BlockKey, drop_items: bool) {
        let Some((_, material)) = self.blocks.remove(block) else {
            return;
        };
        self.broken
            .lock()
            .expect("broken block log poisoned")
            .push(BrokenBlock {
                block: block.clone(),
                material,
                dropped_items: drop_items,
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block;
    use softclaims_engine::ChunkPos;

    fn key(x: i64, y: i64, z: i64) -> BlockKey {
        BlockKey::new(WorldId::new("world"), BlockPos::new(x, y, z))
    }

    #[test]
    fn unknown_blocks_are_air() {
        let world = MemoryWorld::new();
        assert!(world.material_at(&key(0, 0, 0)).is_air());
    }

    #[test]
    fn breaking_logs_and_clears() {
        let world = MemoryWorld::new();
        world.set_block(key(1, 2, 3), Material::new(block::STONE));
        world.break_block(&key(1, 2, 3), true);
        // Breaking air does nothing.
        world.break_block(&key(9, 9, 9), true);

        assert!(world.material_at(&key(1, 2, 3)).is_air());
        let broken = world.take_broken();
        assert_eq!(broken.len(), 1);
        assert_eq!(broken[0].material.name(), block::STONE);
        assert!(world.take_broken().is_empty());
    }

    #[test]
    fn fill_covers_whole_chunk() {
        let world = MemoryWorld::new();
        let chunk = ChunkKey::new(WorldId::new("world"), ChunkPos::new(-1, 2));
        world.fill_chunk(&chunk, 60, 61, &Material::new(block::STONE));
        assert_eq!(world.block_count(), 16 * 16 * 2);
        assert_eq!(world.material_at(&key(-16, 60, 32)).name(), block::STONE);
        assert!(world.material_at(&key(0, 60, 32)).is_air());
    }
}
