//! Block durability: a protected block's remaining hit points.
//!
//! The store keeps a relative fraction in `(0, 1)` per damaged block; blocks
//! at full health have no entry at all. Absolute values are derived on the
//! fly from the material's configured maximum, so changing the configuration
//! rescales every stored block.

use std::sync::Arc;

use rand::Rng;
use softclaims_engine::{BlockKey, ChunkKey, LocalBlockPos, MetadataStore, StoreError};

use crate::block::Material;
use crate::config::Config;
use crate::event_bus::{self, ClaimsEvent, EventBus};
use crate::faction::FactionBackend;
use crate::host::HostWorld;
use crate::policy::HealthPolicy;
use crate::world_service::WorldService;

/// A block with stored (partial) durability.
#[derive(Debug, Clone, PartialEq)]
pub struct DamagedBlock {
    pub block: BlockKey,
    pub durability: f64,
}

pub struct DurabilityService {
    config: Arc<Config>,
    worlds: Arc<WorldService>,
    factions: Arc<dyn FactionBackend>,
    host: Arc<dyn HostWorld>,
    health: Box<dyn HealthPolicy>,
    bus: EventBus,
}

impl DurabilityService {
    pub fn new(
        config: Arc<Config>,
        worlds: Arc<WorldService>,
        factions: Arc<dyn FactionBackend>,
        host: Arc<dyn HostWorld>,
        health: Box<dyn HealthPolicy>,
        bus: EventBus,
    ) -> Self {
        Self {
            config,
            worlds,
            factions,
            host,
            health,
            bus,
        }
    }

    pub fn store(&self) -> &MetadataStore<f64> {
        self.worlds.durability_store()
    }

    // ── Queries ─────────────────────────────────────────────────────────────

    /// Whether the block takes part in durability at all: enabled world,
    /// durable material, claimed land.
    pub fn has_durability(&self, block: &BlockKey) -> bool {
        if self.worlds.is_world_disabled(&block.world) {
            return false;
        }
        if !self.is_material_durable(&self.host.material_at(block)) {
            return false;
        }
        self.factions.is_in_faction_land(&block.chunk())
    }

    pub fn is_material_durable(&self, material: &Material) -> bool {
        self.config.is_material_durable(material)
    }

    pub fn total_durability(&self, material: &Material) -> i64 {
        self.config.total_durability(material)
    }

    /// Relative durability in `[0, 1]`. Blocks without durability report 0,
    /// undamaged durable blocks 1.
    pub fn durability_relative(&self, block: &BlockKey) -> Result<f64, StoreError> {
        if !self.has_durability(block) {
            return Ok(0.0);
        }
        Ok(self.store().get_metadata(block)?.unwrap_or(1.0))
    }

    pub fn durability_absolute(&self, block: &BlockKey) -> Result<i64, StoreError> {
        let relative = self.durability_relative(block)?;
        if relative == 0.0 {
            return Ok(0);
        }
        Ok(self.absolute_for(&self.host.material_at(block), relative))
    }

    pub fn absolute_for(&self, material: &Material, relative: f64) -> i64 {
        (relative * self.total_durability(material) as f64).round() as i64
    }

    /// Relative value of `absolute` for a material. NaN or infinite when the
    /// material has no durability, which setters treat as "clear".
    pub fn relative_for(&self, material: &Material, absolute: i64) -> f64 {
        absolute as f64 / self.total_durability(material) as f64
    }

    pub fn damaged_blocks_in_chunk(&self, chunk: &ChunkKey) -> Result<Vec<DamagedBlock>, StoreError> {
        let Some(values) = self.store().get_metadata_in_chunk(chunk)? else {
            return Ok(Vec::new());
        };
        Ok(values
            .into_iter()
            .map(|(local, durability)| DamagedBlock {
                block: chunk.block(local),
                durability,
            })
            .collect())
    }

    /// One roll of the health policy. Not cached: asking twice may answer
    /// differently.
    pub fn is_block_healthy(&self, relative_durability: f64) -> bool {
        rand::thread_rng().r#gen::<f64>() < self.health.healthy_probability(relative_durability)
    }

    // ── Updates ─────────────────────────────────────────────────────────────

    /// Store a relative durability. Values at or beyond either end of
    /// `(0, 1)` clear the entry; non-finite values are ignored.
    pub fn set_durability_relative(&self, block: &BlockKey, durability: f64) -> Result<(), StoreError> {
        if !durability.is_finite() {
            return Ok(());
        }
        if durability <= 0.0 || durability >= 1.0 {
            return self.clear_durability(block);
        }
        self.store().set_metadata(block, durability)?;
        self.announce(block, durability);
        Ok(())
    }

    pub fn set_durability_absolute(&self, block: &BlockKey, durability: i64) -> Result<(), StoreError> {
        let relative = self.relative_for(&self.host.material_at(block), durability);
        self.set_durability_relative(block, relative)
    }

    /// Back to full health.
    pub fn clear_durability(&self, block: &BlockKey) -> Result<(), StoreError> {
        if self.store().remove_metadata(block)?.is_some() {
            self.announce(block, 1.0);
        }
        Ok(())
    }

    /// Add `delta` absolute durability to every damaged block of a loaded
    /// chunk. Blocks leaving `(0, 1)` are cleared. Returns the blocks that
    /// still carry a changed value.
    pub fn modify_durabilities_in_chunk(
        &self,
        chunk: &ChunkKey,
        delta: i64,
    ) -> Result<Vec<LocalBlockPos>, StoreError> {
        if !self.store().has_metadata_for_chunk(chunk)? {
            return Ok(Vec::new());
        }
        self.store().modify_chunk(chunk, |values| {
            let mut modified = Vec::with_capacity(values.len());
            values.retain(|local, durability| {
                let material = self.host.material_at(&chunk.block(*local));
                let absolute = self.absolute_for(&material, *durability);
                let updated = self.relative_for(&material, absolute + delta);
                if !updated.is_finite() || updated <= 0.0 || updated >= 1.0 {
                    return false;
                }
                *durability = updated;
                modified.push(*local);
                true
            });
            modified
        })
    }

    /// Drop all durability data of a chunk and break every block that fails
    /// its health roll. Returns the number of blocks broken.
    pub fn clear_and_break_unhealthy_blocks_in_chunk(&self, chunk: &ChunkKey) -> Result<usize, StoreError> {
        let Some(values) = self.store().remove_metadata_for_chunk(chunk)? else {
            return Ok(0);
        };
        let mut broken = 0;
        for (local, durability) in values {
            if !self.is_block_healthy(durability) {
                self.host.break_block(&chunk.block(local), true);
                broken += 1;
            }
        }
        tracing::debug!("Cleared durability in {}, {} unhealthy blocks broken", chunk, broken);
        Ok(broken)
    }

    fn announce(&self, block: &BlockKey, relative: f64) {
        let total = self.total_durability(&self.host.material_at(block));
        event_bus::publish(
            &self.bus,
            ClaimsEvent::DurabilityChanged {
                block: block.clone(),
                current: (relative * total as f64).round() as i64,
                total,
            },
        );
    }
}
