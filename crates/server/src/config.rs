//! Runtime configuration, read from a JSON file.
//!
//! Every key is optional; a missing file is the same as an empty object.
//!
//! ```json
//! {
//!   "dataDir": "softclaims-data",
//!   "disabledWorlds": ["creative"],
//!   "coreMaterial": "RESPAWN_ANCHOR",
//!   "blocks": { "STONE": { "durability": 100, "drop": true } },
//!   "repair": { "repairDelta": 5, "repairFrequency": 300, "repairCost": 0 },
//!   "explosionDamage": { "CREEPER": 60, "TNT": 100 },
//!   "regionFlushDelayMs": 2000,
//!   "factionBackend": "memory"
//! }
//! ```

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::block::{self, Material};

/// Explosion power for sources without an `explosionDamage` entry.
pub const DEFAULT_EXPLOSION_POWER: i64 = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Root directory for region files of both metadata kinds.
    pub data_dir: PathBuf,
    pub disabled_worlds: HashSet<String>,
    pub core_material: Material,
    pub blocks: HashMap<Material, MaterialConfig>,
    pub repair: RepairConfig,
    pub explosion_damage: HashMap<String, i64>,
    pub region_flush_delay_ms: u64,
    pub faction_backend: FactionBackendKind,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("softclaims-data"),
            disabled_worlds: HashSet::new(),
            core_material: Material::new(block::RESPAWN_ANCHOR),
            blocks: HashMap::new(),
            repair: RepairConfig::default(),
            explosion_damage: HashMap::new(),
            region_flush_delay_ms: 2000,
            faction_backend: FactionBackendKind::None,
        }
    }
}

/// Per-material settings. A material without `durability` is not protected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MaterialConfig {
    pub durability: Option<i64>,
    /// Whether the block may drop items when broken.
    pub drop: bool,
}

impl Default for MaterialConfig {
    fn default() -> Self {
        Self {
            durability: None,
            drop: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RepairConfig {
    /// Absolute durability restored per repair tick. Zero disables repair.
    pub repair_delta: i64,
    /// Seconds between repair ticks.
    pub repair_frequency: u64,
    /// Power charged to each faction per repair tick.
    pub repair_cost: f64,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            repair_delta: 0,
            repair_frequency: 300,
            repair_cost: 0.0,
        }
    }
}

/// Which faction backend to run with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactionBackendKind {
    #[default]
    None,
    Memory,
}

impl Config {
    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn is_world_disabled(&self, world: &str) -> bool {
        self.disabled_worlds.contains(world)
    }

    /// Configured maximum durability, 0 when the material has none.
    pub fn total_durability(&self, material: &Material) -> i64 {
        self.blocks
            .get(material)
            .and_then(|m| m.durability)
            .unwrap_or(0)
    }

    pub fn is_material_durable(&self, material: &Material) -> bool {
        self.blocks
            .get(material)
            .and_then(|m| m.durability)
            .is_some_and(|d| d > 0)
    }

    pub fn drops(&self, material: &Material) -> bool {
        self.blocks.get(material).is_none_or(|m| m.drop)
    }

    pub fn explosion_power(&self, source: &str) -> i64 {
        self.explosion_damage
            .get(&source.to_ascii_uppercase())
            .copied()
            .unwrap_or(DEFAULT_EXPLOSION_POWER)
    }

    pub fn region_flush_delay(&self) -> Duration {
        Duration::from_millis(self.region_flush_delay_ms)
    }

    pub fn repair_interval(&self) -> Duration {
        Duration::from_secs(self.repair.repair_frequency.max(1))
    }

    /// Region file root for one metadata kind.
    pub fn store_dir(&self, kind: &str) -> PathBuf {
        self.data_dir.join(kind)
    }

    /// Set the maximum durability of a material, keeping its drop flag.
    pub fn with_durability(mut self, material: &str, durability: i64) -> Self {
        self.blocks.entry(Material::new(material)).or_default().durability = Some(durability);
        self
    }
}
