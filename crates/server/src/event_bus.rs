//! Presentation event bus.
//!
//! Services publish [`ClaimsEvent`]s to a shared `tokio::sync::broadcast`
//! channel; whatever renders progress bars, particles or chat messages
//! subscribes. Publishing never fails: with no subscribers the event is
//! simply dropped.

use std::sync::Arc;

use softclaims_engine::{BlockKey, ChunkKey, LocalBlockPos};
use tokio::sync::broadcast;

use crate::faction::FactionId;

/// Recommended capacity for the broadcast channel.
/// Repair bursts publish one batch per chunk, so this leaves plenty of room.
pub const BUS_CAPACITY: usize = 256;

pub type EventBus = broadcast::Sender<ClaimsEvent>;

#[derive(Clone, Debug, PartialEq)]
pub enum ClaimsEvent {
    /// A block's stored durability changed (progress bar update).
    DurabilityChanged {
        block: BlockKey,
        current: i64,
        total: i64,
    },
    /// Blocks healed by repair, batched per chunk (particle animation).
    ///
    /// Uses `Arc<[...]>` so cloning per subscriber is a refcount bump.
    BlocksHealed {
        chunk: ChunkKey,
        blocks: Arc<[LocalBlockPos]>,
    },
    CoreCreated {
        block: BlockKey,
        faction: FactionId,
        claimed: usize,
    },
    CoreRemoved {
        block: BlockKey,
        faction: FactionId,
        unclaimed: usize,
        transferred: usize,
    },
}

pub fn channel() -> EventBus {
    broadcast::channel(BUS_CAPACITY).0
}

/// Publish, ignoring the no-subscriber case.
pub fn publish(bus: &EventBus, event: ClaimsEvent) {
    let _ = bus.send(event);
}
