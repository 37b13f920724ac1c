//! Application context: every service, built once and passed around
//! explicitly.

use std::sync::Arc;

use softclaims_engine::MetadataStore;

use crate::config::Config;
use crate::cores::FactionCoreService;
use crate::durability::DurabilityService;
use crate::event_bus::{self, EventBus};
use crate::explosion::ExplosionService;
use crate::faction::{self, FactionBackend};
use crate::host::HostWorld;
use crate::policy::{ExponentialFalloff, ExponentialHealth};
use crate::repair::{HealAnimationTask, RepairService, RepairTask};
use crate::simulation::PeriodicTask;
use crate::world_service::WorldService;

pub struct AppContext {
    pub config: Arc<Config>,
    pub bus: EventBus,
    pub factions: Arc<dyn FactionBackend>,
    pub host: Arc<dyn HostWorld>,
    pub worlds: Arc<WorldService>,
    pub durability: Arc<DurabilityService>,
    pub explosions: Arc<ExplosionService>,
    pub repair: Arc<RepairService>,
    pub cores: Arc<FactionCoreService>,
}

impl AppContext {
    /// Wire every service against the given faction backend and host.
    pub fn new(config: Config, factions: Arc<dyn FactionBackend>, host: Arc<dyn HostWorld>) -> Self {
        let config = Arc::new(config);
        let bus = event_bus::channel();

        let flush_delay = config.region_flush_delay();
        let durabilities = Arc::new(MetadataStore::new(
            "durability",
            config.store_dir("durability"),
            flush_delay,
        ));
        let core_store = Arc::new(MetadataStore::new("cores", config.store_dir("cores"), flush_delay));
        let worlds = Arc::new(WorldService::new(
            config.disabled_worlds.clone(),
            durabilities,
            core_store,
        ));

        let durability = Arc::new(DurabilityService::new(
            Arc::clone(&config),
            Arc::clone(&worlds),
            Arc::clone(&factions),
            Arc::clone(&host),
            Box::new(ExponentialHealth::default()),
            bus.clone(),
        ));
        let explosions = Arc::new(ExplosionService::new(
            Arc::clone(&config),
            Arc::clone(&durability),
            Arc::clone(&host),
            Box::new(ExponentialFalloff),
        ));
        let repair = Arc::new(RepairService::new(
            config.repair.clone(),
            Arc::clone(&factions),
            Arc::clone(&durability),
            bus.clone(),
        ));
        let cores = Arc::new(FactionCoreService::new(
            Arc::clone(&config),
            Arc::clone(&worlds),
            Arc::clone(&factions),
            Arc::clone(&host),
            bus.clone(),
        ));

        tracing::info!(
            "Context ready: data in {}, {} durable materials, {} disabled worlds",
            config.data_dir.display(),
            config.blocks.values().filter(|m| m.durability.is_some()).count(),
            config.disabled_worlds.len()
        );

        Self {
            config,
            bus,
            factions,
            host,
            worlds,
            durability,
            explosions,
            repair,
            cores,
        }
    }

    /// Like [`AppContext::new`], with the faction backend named in the
    /// configuration.
    pub fn from_config(config: Config, host: Arc<dyn HostWorld>) -> Self {
        let factions = faction::backend_for(config.faction_backend);
        Self::new(config, factions, host)
    }

    pub fn periodic_tasks(&self) -> Vec<Box<dyn PeriodicTask>> {
        vec![
            Box::new(RepairTask {
                service: Arc::clone(&self.repair),
                interval: self.config.repair_interval(),
            }),
            Box::new(HealAnimationTask {
                service: Arc::clone(&self.repair),
            }),
        ]
    }

    /// Persist every loaded chunk and flush all regions to disk.
    pub async fn shutdown(&self) {
        self.worlds.shutdown().await;
    }
}
