//! Automatic repair of damaged blocks in faction land.
//!
//! Every repair tick, each faction that can afford its land heals all
//! damaged blocks in its loaded chunks by a fixed amount. Healed blocks are
//! queued and handed to the presentation layer a few at a time.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use softclaims_engine::{ChunkKey, LocalBlockPos};

use crate::config::RepairConfig;
use crate::durability::DurabilityService;
use crate::event_bus::{self, ClaimsEvent, EventBus};
use crate::faction::FactionBackend;
use crate::simulation::PeriodicTask;

/// Maximum number of heal animations per animation tick.
pub const ANIMATIONS_PER_TICK: usize = 15;

/// Interval of the heal animation task.
pub const ANIMATION_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RepairReport {
    pub factions: usize,
    pub chunks: usize,
    pub blocks: usize,
}

pub struct RepairService {
    config: RepairConfig,
    factions: Arc<dyn FactionBackend>,
    durability: Arc<DurabilityService>,
    bus: EventBus,
    /// Healed blocks still waiting for their animation, per chunk.
    healed: Mutex<HashMap<ChunkKey, VecDeque<LocalBlockPos>>>,
}

impl RepairService {
    pub fn new(
        config: RepairConfig,
        factions: Arc<dyn FactionBackend>,
        durability: Arc<DurabilityService>,
        bus: EventBus,
    ) -> Self {
        Self {
            config,
            factions,
            durability,
            bus,
            healed: Mutex::new(HashMap::new()),
        }
    }

    /// Heal every eligible faction's loaded chunks by `repairDelta`.
    pub fn repair_tick(&self) -> RepairReport {
        let mut report = RepairReport::default();
        let delta = self.config.repair_delta;
        if delta <= 0 {
            return report;
        }

        let store = self.durability.store();
        for faction in self.factions.all_factions() {
            let chunks = match self.factions.faction_chunks(&faction.id) {
                Ok(chunks) => chunks,
                Err(e) => {
                    tracing::warn!("Skipping repair for {}: {}", faction.id, e);
                    continue;
                }
            };

            // Overclaimed factions don't heal.
            if faction.power < chunks.len() as f64 {
                continue;
            }
            if self.config.repair_cost > 0.0 && !self.factions.charge_faction(&faction.id, self.config.repair_cost) {
                tracing::debug!("Faction {} cannot pay for repair", faction.id);
                continue;
            }
            report.factions += 1;

            for chunk in chunks {
                if !store.is_chunk_loaded(&chunk) || store.is_chunk_busy(&chunk) {
                    continue;
                }
                match self.durability.modify_durabilities_in_chunk(&chunk, delta) {
                    Ok(modified) if modified.is_empty() => {}
                    Ok(modified) => {
                        report.chunks += 1;
                        report.blocks += modified.len();
                        self.queue(chunk, modified);
                    }
                    Err(e) => tracing::debug!("Repair skipped {}: {}", chunk, e),
                }
            }
        }

        if report.blocks > 0 {
            tracing::info!(
                "Repair tick healed {} blocks in {} chunks of {} factions",
                report.blocks,
                report.chunks,
                report.factions
            );
        }
        report
    }

    fn queue(&self, chunk: ChunkKey, blocks: Vec<LocalBlockPos>) {
        // A newer repair of the same chunk supersedes its pending animations.
        self.healed
            .lock()
            .expect("heal queue poisoned")
            .insert(chunk, blocks.into());
    }

    /// Publish up to [`ANIMATIONS_PER_TICK`] queued heals, one
    /// `BlocksHealed` event per chunk. Returns how many were published.
    pub fn animation_tick(&self) -> usize {
        let mut batches = Vec::new();
        let mut budget = ANIMATIONS_PER_TICK;
        {
            let mut healed = self.healed.lock().expect("heal queue poisoned");
            let chunks: Vec<ChunkKey> = healed.keys().cloned().collect();
            for chunk in chunks {
                if budget == 0 {
                    break;
                }
                let Some(queue) = healed.get_mut(&chunk) else {
                    continue;
                };
                let take = budget.min(queue.len());
                let blocks: Vec<LocalBlockPos> = queue.drain(..take).collect();
                budget -= take;
                if queue.is_empty() {
                    healed.remove(&chunk);
                }
                if !blocks.is_empty() {
                    batches.push((chunk, blocks));
                }
            }
        }

        let published = ANIMATIONS_PER_TICK - budget;
        for (chunk, blocks) in batches {
            event_bus::publish(
                &self.bus,
                ClaimsEvent::BlocksHealed {
                    chunk,
                    blocks: blocks.into(),
                },
            );
        }
        published
    }

    pub fn pending_animations(&self) -> usize {
        self.healed
            .lock()
            .expect("heal queue poisoned")
            .values()
            .map(VecDeque::len)
            .sum()
    }
}

/// Runs [`RepairService::repair_tick`] every `repairFrequency` seconds.
pub struct RepairTask {
    pub service: Arc<RepairService>,
    pub interval: Duration,
}

impl PeriodicTask for RepairTask {
    fn name(&self) -> &'static str {
        "repair"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn run(&self) {
        self.service.repair_tick();
    }
}

/// Runs [`RepairService::animation_tick`] twice a second.
pub struct HealAnimationTask {
    pub service: Arc<RepairService>,
}

impl PeriodicTask for HealAnimationTask {
    fn name(&self) -> &'static str {
        "heal-animations"
    }

    fn interval(&self) -> Duration {
        ANIMATION_INTERVAL
    }

    fn run(&self) {
        self.service.animation_tick();
    }
}
