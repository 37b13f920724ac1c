use std::path::PathBuf;
use std::sync::Arc;

use softclaims_engine::{BlockKey, BlockPos, ChunkKey, ChunkPos, WorldId};
use softclaims_server::block::{self, Material};
use softclaims_server::config::Config;
use softclaims_server::context::AppContext;
use softclaims_server::event_bus::ClaimsEvent;
use softclaims_server::faction::{FactionBackend, FactionPermission, MemoryFactions, PlayerId};
use softclaims_server::handlers;
use softclaims_server::host::{HostWorld, MemoryWorld};
use softclaims_server::simulation;
use tokio_util::sync::CancellationToken;

fn arg_value(flag: &str) -> Option<String> {
    std::env::args().skip_while(|a| a != flag).nth(1)
}

#[tokio::main]
async fn main() {
    let demo_mode = std::env::args().any(|a| a == "--demo");
    let config_path: PathBuf = arg_value("--config")
        .unwrap_or_else(|| "softclaims.json".into())
        .into();
    let data_dir = arg_value("--data-dir");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {:#}", e);
            return;
        }
    };
    if let Some(dir) = data_dir {
        config.data_dir = dir.into();
    }

    if demo_mode {
        run_demo(config).await;
        return;
    }

    tracing::info!("SoftClaims -- block durability and faction cores");

    let host = Arc::new(MemoryWorld::new());
    let ctx = AppContext::from_config(config, host);

    // ── Periodic repair and heal animations ─────────────────────────────
    let stop = CancellationToken::new();
    let tasks = simulation::start(ctx.periodic_tasks(), stop.clone());

    tracing::info!("Running; press Ctrl+C to stop");
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
    }
    tracing::info!("Ctrl+C received, shutting down...");

    stop.cancel();
    tasks.wait().await;

    // ── Flush on shutdown ────────────────────────────────────────────────
    tracing::info!("Saving metadata before exit...");
    ctx.shutdown().await;
    tracing::info!("Shutdown complete");
}

/// Two factions, a flat stone world, a few cores and an explosion.
async fn run_demo(mut config: Config) {
    if config.blocks.is_empty() {
        config = config
            .with_durability(block::STONE, 100)
            .with_durability(block::OBSIDIAN, 400);
    }
    if config.repair.repair_delta <= 0 {
        config.repair.repair_delta = 10;
    }

    tracing::info!("SoftClaims demo, data in {}", config.data_dir.display());

    let world_id = WorldId::new("world");
    let host = Arc::new(MemoryWorld::new());
    let factions = Arc::new(MemoryFactions::new());
    let ctx = AppContext::new(config, factions.clone(), host.clone());

    let mut events = ctx.bus.subscribe();
    let printer = tokio::spawn(async move {
        let mut healed = 0;
        while let Ok(event) = events.recv().await {
            match event {
                ClaimsEvent::CoreCreated { block, faction, claimed } => {
                    tracing::info!("[event] core of {} at {} claimed {} chunks", faction, block, claimed)
                }
                ClaimsEvent::CoreRemoved {
                    block,
                    faction,
                    unclaimed,
                    transferred,
                } => tracing::info!(
                    "[event] core of {} at {} removed: {} released, {} transferred",
                    faction,
                    block,
                    unclaimed,
                    transferred
                ),
                ClaimsEvent::BlocksHealed { blocks, .. } => healed += blocks.len(),
                ClaimsEvent::DurabilityChanged { .. } => {}
            }
        }
        healed
    });

    // ── Factions and players ────────────────────────────────────────────
    let all = [
        FactionPermission::BreakBlock,
        FactionPermission::ClaimChunk,
        FactionPermission::UnclaimChunk,
    ];
    let red = factions.create_faction("red", "Red", 20.0);
    let blue = factions.create_faction("blue", "Blue", 20.0);
    let alice = PlayerId::random();
    let bob = PlayerId::random();
    let setup = factions
        .add_member(&red, alice, &all)
        .and_then(|()| factions.add_member(&blue, bob, &all));
    if let Err(e) = setup {
        tracing::error!("Demo setup failed: {}", e);
        return;
    }

    // ── Terrain and metadata ─────────────────────────────────────────────
    let stone = Material::new(block::STONE);
    let mut chunks = Vec::new();
    for cx in -3..=5 {
        for cz in -3..=3 {
            let chunk = ChunkKey::new(world_id.clone(), ChunkPos::new(cx, cz));
            host.fill_chunk(&chunk, 60, 62, &stone);
            chunks.push(chunk);
        }
    }
    tracing::info!("World ready: {} blocks in {} chunks", host.block_count(), chunks.len());
    if let Err(e) = ctx.worlds.load_metadata_for_chunks(chunks.clone()).await {
        tracing::error!("Failed to load metadata: {}", e);
        return;
    }

    // ── Cores ───────────────────────────────────────────────────────────
    let anchor = Material::new(block::RESPAWN_ANCHOR);
    let red_core = BlockKey::new(world_id.clone(), BlockPos::new(8, 63, 8));
    let blue_core = BlockKey::new(world_id.clone(), BlockPos::new(56, 63, 8));
    for (core, player) in [(&red_core, alice), (&blue_core, bob)] {
        host.set_block(core.clone(), anchor.clone());
        let result = handlers::on_core_placed(&ctx, core, player);
        if let Some(message) = result.message {
            tracing::info!("{}", message);
        }
    }

    // ── Explosion on red land ───────────────────────────────────────────
    let origin = [24.5, 63.0, 8.5];
    let blast: Vec<BlockPos> = (-2..=2)
        .flat_map(|dx| (-2..=2).map(move |dz| BlockPos::new(24 + dx, 62, 8 + dz)))
        .collect();
    let outcome = handlers::on_explosion(&ctx, &world_id, origin, "TNT", &blast).await;
    tracing::info!(
        "Explosion: {} blocks held, {} destroyed, {} unprotected",
        outcome.protected.len(),
        outcome.destroyed.len(),
        outcome.unprotected.len()
    );

    let blast_chunk = ChunkKey::new(world_id.clone(), ChunkPos::new(1, 0));
    match ctx.durability.damaged_blocks_in_chunk(&blast_chunk) {
        Ok(damaged) => tracing::info!("{} damaged blocks in {}", damaged.len(), blast_chunk),
        Err(e) => tracing::warn!("Cannot inspect {}: {}", blast_chunk, e),
    }

    // ── Repair ──────────────────────────────────────────────────────────
    let report = ctx.repair.repair_tick();
    tracing::info!("Repair healed {} blocks", report.blocks);
    while ctx.repair.animation_tick() > 0 {}

    // ── Bob breaks the red core ─────────────────────────────────────────
    let result = handlers::on_core_broken(&ctx, &red_core, bob).await;
    if let Some(message) = result.message {
        tracing::info!("{}", message);
    }
    host.break_block(&red_core, true);
    tracing::info!(
        "Red holds {} chunks, blue holds {}",
        factions.faction_chunks(&red).map_or(0, |c| c.len()),
        factions.faction_chunks(&blue).map_or(0, |c| c.len())
    );

    // ── Save and flush ──────────────────────────────────────────────────
    ctx.shutdown().await;
    drop(ctx);
    if let Ok(healed) = printer.await {
        tracing::info!("{} heal animations published", healed);
    }
    tracing::info!("Demo complete");
}
