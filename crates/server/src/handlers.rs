//! Glue between host game events and the services.
//!
//! Handlers never return errors: every refusal becomes a decision for the
//! host (cancel, drop items) plus an optional message for the player.

use softclaims_engine::{BlockKey, BlockPos, ChunkKey, StoreError, WorldId};

use crate::context::AppContext;
use crate::error::ClaimError;
use crate::explosion::ExplosionOutcome;
use crate::faction::PlayerId;

/// How the host should treat a block break.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakDecision {
    pub cancel: bool,
    pub drop_items: bool,
}

impl BreakDecision {
    pub const ALLOW: BreakDecision = BreakDecision {
        cancel: false,
        drop_items: true,
    };

    pub const DENY: BreakDecision = BreakDecision {
        cancel: true,
        drop_items: false,
    };
}

/// Outcome of a core placement or removal attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionResult {
    pub cancel: bool,
    pub message: Option<String>,
}

impl ActionResult {
    fn done(message: String) -> Self {
        Self {
            cancel: false,
            message: Some(message),
        }
    }

    fn refused(error: &ClaimError) -> Self {
        Self {
            cancel: true,
            message: Some(message_for(error)),
        }
    }
}

/// Player-facing text for a refusal.
pub fn message_for(error: &ClaimError) -> String {
    match error {
        ClaimError::Store(StoreError::ChunkBusy(_)) => "This area is still loading, try again in a moment.".into(),
        ClaimError::Store(_) | ClaimError::Faction(_) => "Something went wrong, try again later.".into(),
        ClaimError::InvalidCoreBlock => "That block is not a faction core.".into(),
        ClaimError::WorldDisabled => "Faction cores are disabled in this world.".into(),
        ClaimError::FactionDoesNotExist => {
            "You must be part of a faction to be able to place a faction core!".into()
        }
        ClaimError::FactionPermissionDenied => "Your faction doesn't allow you to do that!".into(),
        ClaimError::ChunkClaimedByOtherFaction => "You can't place a core in another faction's territory!".into(),
        ClaimError::MultipleCoresInChunk => "There is already a faction core in this chunk!".into(),
        ClaimError::NotEnoughPower { deficiency } => format!(
            "Your faction doesn't have enough power to take over more land! ({deficiency} more needed)"
        ),
    }
}

// ── Chunk lifecycle ─────────────────────────────────────────────────────────

pub async fn on_chunk_load(ctx: &AppContext, chunk: ChunkKey) {
    if let Err(e) = ctx.worlds.load_metadata_for_chunks([chunk.clone()]).await {
        tracing::warn!("Failed to load metadata for {}: {}", chunk, e);
    }
}

pub async fn on_chunk_unload(ctx: &AppContext, chunk: ChunkKey) {
    if let Err(e) = ctx.worlds.save_metadata_for_chunks([chunk.clone()], true).await {
        tracing::warn!("Failed to save metadata for {}: {}", chunk, e);
    }
}

// ── Blocks ──────────────────────────────────────────────────────────────────

/// A player broke a block.
///
/// Blocks without durability are none of our business. A protected block
/// breaks only for players allowed to destroy in that chunk, and then drops
/// its items only if it passes a health roll. Anything unreadable is denied.
pub fn on_block_break(ctx: &AppContext, block: &BlockKey, player: PlayerId) -> BreakDecision {
    let durability = match ctx.durability.durability_relative(block) {
        Ok(durability) => durability,
        Err(e) => {
            tracing::debug!("Denied break at {}: {}", block, e);
            return BreakDecision::DENY;
        }
    };
    if durability == 0.0 {
        return BreakDecision::ALLOW;
    }

    if !ctx.factions.can_player_destroy_in(player, &block.chunk()) {
        return BreakDecision::DENY;
    }
    if let Err(e) = ctx.durability.clear_durability(block) {
        tracing::debug!("Denied break at {}: {}", block, e);
        return BreakDecision::DENY;
    }
    let material = ctx.host.material_at(block);
    BreakDecision {
        cancel: false,
        drop_items: ctx.config.drops(&material) && ctx.durability.is_block_healthy(durability),
    }
}

/// A block was destroyed by the environment (fire, decay, pistons...).
pub fn on_block_destroyed(ctx: &AppContext, block: &BlockKey) {
    if let Err(e) = ctx.durability.clear_durability(block) {
        tracing::debug!("Could not clear durability at {}: {}", block, e);
    }
}

/// Whether a non-player entity may turn this block into air.
pub fn may_entity_change_block(ctx: &AppContext, block: &BlockKey) -> bool {
    !ctx.durability.has_durability(block)
}

// ── Cores ───────────────────────────────────────────────────────────────────

/// A player placed a block of the core material.
///
/// When the faction lacks power or the land belongs to someone else the
/// block stays placed but is broken back out by the host.
pub fn on_core_placed(ctx: &AppContext, block: &BlockKey, player: PlayerId) -> ActionResult {
    if ctx.host.material_at(block) != ctx.config.core_material || ctx.worlds.is_world_disabled(&block.world) {
        return ActionResult {
            cancel: false,
            message: None,
        };
    }

    match ctx.cores.create_core(block, player) {
        Ok(created) => ActionResult::done(format!(
            "Faction core placed, {} chunks claimed.",
            created.claimed.len()
        )),
        Err(e @ (ClaimError::NotEnoughPower { .. } | ClaimError::ChunkClaimedByOtherFaction)) => {
            ctx.host.break_block(block, true);
            ActionResult {
                cancel: false,
                message: Some(message_for(&e)),
            }
        }
        Err(e) => {
            tracing::debug!("Core placement at {} refused: {}", block, e);
            ActionResult::refused(&e)
        }
    }
}

/// A player broke a core block.
pub async fn on_core_broken(ctx: &AppContext, block: &BlockKey, player: PlayerId) -> ActionResult {
    match ctx.cores.remove_core_as_player(block, player).await {
        Ok(removed) => ActionResult::done(format!(
            "Core of {} destroyed: {} chunks released, {} taken over.",
            removed.faction,
            removed.unclaimed(),
            removed.transferred()
        )),
        Err(ClaimError::InvalidCoreBlock) => ActionResult {
            cancel: false,
            message: None,
        },
        Err(e) => {
            tracing::debug!("Core removal at {} refused: {}", block, e);
            ActionResult::refused(&e)
        }
    }
}

/// An explosion went off. Durable blocks absorb damage; destroyed cores are
/// removed with their influence. Returns what happened so the host can drop
/// protected blocks from its own explosion.
///
/// A core whose record cannot be touched right now (busy or unloaded chunk)
/// is protected, so the block never outlives or predeceases its claims.
pub async fn on_explosion(
    ctx: &AppContext,
    world: &WorldId,
    origin: [f64; 3],
    source: &str,
    blocks: &[BlockPos],
) -> ExplosionOutcome {
    if ctx.config.is_world_disabled(world.as_str()) {
        return ctx.explosions.explode(world, origin, source, blocks);
    }

    let mut cores = Vec::new();
    let mut locked = Vec::new();
    for pos in blocks {
        let block = BlockKey::new(world.clone(), *pos);
        if ctx.host.material_at(&block) != ctx.config.core_material {
            continue;
        }
        match ctx.cores.store().get_metadata(&block) {
            Ok(_) => cores.push(block),
            Err(e) => {
                tracing::debug!("Explosion spared core at {}: {}", block, e);
                locked.push(*pos);
            }
        }
    }

    let exposed: Vec<BlockPos> = blocks.iter().filter(|pos| !locked.contains(pos)).copied().collect();
    let mut outcome = ctx.explosions.explode(world, origin, source, &exposed);
    outcome.skipped += locked.len();
    outcome
        .protected
        .extend(locked.into_iter().map(|pos| BlockKey::new(world.clone(), pos)));

    let targets: Vec<BlockKey> = cores.into_iter().filter(|core| !outcome.protected.contains(core)).collect();
    for core in targets {
        match ctx.cores.remove_core(&core).await {
            Ok(removed) => tracing::info!("Explosion destroyed the core of {} at {}", removed.faction, core),
            Err(ClaimError::InvalidCoreBlock) => {}
            Err(e) => {
                tracing::warn!("Explosion could not remove core at {}: {}", core, e);
                outcome.unprotected.retain(|block| *block != core);
                if !outcome.protected.contains(&core) {
                    outcome.skipped += 1;
                    outcome.protected.push(core);
                }
            }
        }
    }
    outcome
}
