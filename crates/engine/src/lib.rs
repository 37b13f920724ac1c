//! Region-locked per-block metadata storage.
//!
//! Values are partitioned by chunk and persisted in region files (16x16
//! chunks per file). All I/O for a region runs on a single ordered chain of
//! tasks, so loads, persists and file writes for that region never overlap
//! and a burst of persists ends in one write.

pub mod error;
pub mod metadata;
pub mod region;
pub mod world;

pub use error::StoreError;
pub use metadata::MetadataStore;
pub use region::{MetadataValue, RegionScheduler};
pub use world::position::{BlockKey, BlockPos, ChunkKey, ChunkPos, LocalBlockPos, RegionKey, WorldId};
