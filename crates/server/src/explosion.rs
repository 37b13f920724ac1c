//! Explosions against protected blocks.
//!
//! A durable block caught in an explosion loses durability instead of being
//! destroyed outright; only when it runs out does it break.

use std::sync::Arc;

use softclaims_engine::{BlockKey, BlockPos, StoreError, WorldId};

use crate::config::Config;
use crate::durability::DurabilityService;
use crate::host::HostWorld;
use crate::policy::DamagePolicy;

/// What an explosion did to the blocks it was given.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ExplosionOutcome {
    /// Durable blocks that took damage and survived. The host must not
    /// destroy these.
    pub protected: Vec<BlockKey>,
    /// Durable blocks that ran out of durability and were broken.
    pub destroyed: Vec<BlockKey>,
    /// Blocks without durability, left to the host's explosion.
    pub unprotected: Vec<BlockKey>,
    /// Durable blocks in busy chunks, left untouched and protected.
    pub skipped: usize,
}

pub struct ExplosionService {
    config: Arc<Config>,
    durability: Arc<DurabilityService>,
    host: Arc<dyn HostWorld>,
    damage: Box<dyn DamagePolicy>,
}

impl ExplosionService {
    pub fn new(
        config: Arc<Config>,
        durability: Arc<DurabilityService>,
        host: Arc<dyn HostWorld>,
        damage: Box<dyn DamagePolicy>,
    ) -> Self {
        Self {
            config,
            durability,
            host,
            damage,
        }
    }

    /// Apply an explosion of the configured power for `source`, centred at
    /// `origin`, to `blocks`.
    pub fn explode(&self, world: &WorldId, origin: [f64; 3], source: &str, blocks: &[BlockPos]) -> ExplosionOutcome {
        let keys = blocks.iter().map(|pos| BlockKey::new(world.clone(), *pos));
        let mut outcome = ExplosionOutcome::default();
        if self.is_disabled(world) {
            outcome.unprotected = keys.collect();
            return outcome;
        }

        let power = self.config.explosion_power(source);
        for block in keys {
            if !self.durability.has_durability(&block) {
                outcome.unprotected.push(block);
                continue;
            }
            let distance = block.pos.center_distance(origin);
            let damage = self.damage.damage(power, distance);
            match self.apply(&block, damage) {
                Ok(true) => outcome.destroyed.push(block),
                Ok(false) => outcome.protected.push(block),
                Err(e) => {
                    tracing::debug!("Explosion skipped {}: {}", block, e);
                    outcome.skipped += 1;
                    outcome.protected.push(block);
                }
            }
        }

        for block in &outcome.destroyed {
            let drops = self.config.drops(&self.host.material_at(block));
            self.host.break_block(block, drops);
        }
        tracing::debug!(
            "Explosion ({}, power {}): {} damaged, {} destroyed, {} skipped",
            source,
            power,
            outcome.protected.len() - outcome.skipped,
            outcome.destroyed.len(),
            outcome.skipped
        );
        outcome
    }

    /// Take `damage` from a block. Returns whether the block is destroyed.
    fn apply(&self, block: &BlockKey, damage: i64) -> Result<bool, StoreError> {
        let remaining = self.durability.durability_absolute(block)? - damage;
        if remaining > 0 {
            self.durability.set_durability_absolute(block, remaining)?;
            Ok(false)
        } else {
            self.durability.clear_durability(block)?;
            Ok(true)
        }
    }

    fn is_disabled(&self, world: &WorldId) -> bool {
        self.config.is_world_disabled(world.as_str())
    }
}
