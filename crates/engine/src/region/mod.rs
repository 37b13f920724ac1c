pub mod file;
pub mod scheduler;
pub mod stats;

pub use file::{ChunkMetadata, RegionData, RegionFiles};
pub use scheduler::{DEFAULT_FLUSH_DELAY, MetadataValue, RegionBuffer, RegionScheduler};
pub use stats::{RegionStats, RegionStatsSnapshot};
