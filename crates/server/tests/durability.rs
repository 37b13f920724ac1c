//! Durability bookkeeping, explosions and repair on claimed land.

use std::sync::Arc;

use softclaims_engine::{BlockKey, BlockPos, ChunkKey, ChunkPos, WorldId};
use softclaims_server::block::{self, Material};
use softclaims_server::config::Config;
use softclaims_server::context::AppContext;
use softclaims_server::event_bus::ClaimsEvent;
use softclaims_server::faction::{FactionBackend, FactionId, FactionPermission, MemoryFactions, PlayerId};
use softclaims_server::handlers::{self, BreakDecision};
use softclaims_server::host::{HostWorld, MemoryWorld};
use softclaims_server::repair::ANIMATIONS_PER_TICK;

struct Fixture {
    dir: tempfile::TempDir,
    ctx: AppContext,
    factions: Arc<MemoryFactions>,
    host: Arc<MemoryWorld>,
    red: FactionId,
    alice: PlayerId,
}

/// Red owns chunks (0, 0) and (1, 0) of "world"; y = 62 is stone
/// everywhere from chunk -1 to 2. Only chunks -1..=1 are loaded.
async fn fixture_with(tweak: impl FnOnce(&mut Config)) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default()
        .with_durability(block::STONE, 100)
        .with_durability(block::OBSIDIAN, 400);
    config.data_dir = dir.path().to_path_buf();
    config.region_flush_delay_ms = 20;
    config.disabled_worlds.insert("nether".to_string());
    tweak(&mut config);

    let factions = Arc::new(MemoryFactions::new());
    let host = Arc::new(MemoryWorld::new());
    let red = factions.create_faction("red", "Red", 10.0);
    let alice = PlayerId::random();
    factions
        .add_member(&red, alice, &[FactionPermission::BreakBlock])
        .unwrap();
    factions.claim_chunk(&red, &chunk(0)).unwrap();
    factions.claim_chunk(&red, &chunk(1)).unwrap();

    let stone = Material::new(block::STONE);
    for x in -1..=2 {
        host.fill_chunk(&chunk(x), 62, 62, &stone);
    }

    let ctx = AppContext::new(config, factions.clone(), host.clone());
    ctx.worlds
        .load_metadata_for_chunks((-1..=1).map(chunk))
        .await
        .unwrap();

    Fixture {
        dir,
        ctx,
        factions,
        host,
        red,
        alice,
    }
}

async fn fixture() -> Fixture {
    fixture_with(|_| {}).await
}

fn chunk(x: i32) -> ChunkKey {
    ChunkKey::new(WorldId::new("world"), ChunkPos::new(x, 0))
}

fn stone(x: i64, z: i64) -> BlockKey {
    BlockKey::new(WorldId::new("world"), BlockPos::new(x, 62, z))
}

fn stored(fx: &Fixture, block: &BlockKey) -> Option<f64> {
    fx.ctx.durability.store().get_metadata(block).unwrap()
}

// ---------------------------------------------------------------------------
// Durability values
// ---------------------------------------------------------------------------

#[tokio::test]
async fn absolute_and_relative_agree() {
    let fx = fixture().await;
    let block = stone(3, 3);
    let durability = &fx.ctx.durability;

    assert_eq!(durability.durability_relative(&block), Ok(1.0));
    durability.set_durability_absolute(&block, 40).unwrap();
    assert_eq!(stored(&fx, &block), Some(0.4));
    assert_eq!(durability.durability_absolute(&block), Ok(40));

    // Healing past the maximum clears the entry.
    let modified = durability.modify_durabilities_in_chunk(&chunk(0), 70).unwrap();
    assert!(modified.is_empty());
    assert_eq!(stored(&fx, &block), None);
    assert_eq!(durability.durability_relative(&block), Ok(1.0));
    fx.ctx.shutdown().await;
}

#[tokio::test]
async fn only_durable_blocks_on_claimed_land_have_durability() {
    let fx = fixture().await;
    let durability = &fx.ctx.durability;

    assert!(durability.has_durability(&stone(3, 3)));
    // Wilderness.
    assert_eq!(durability.durability_relative(&stone(-3, 3)), Ok(0.0));
    // Air and undurable materials.
    let above = BlockKey::new(WorldId::new("world"), BlockPos::new(3, 63, 3));
    assert_eq!(durability.durability_relative(&above), Ok(0.0));
    fx.host.set_block(above.clone(), Material::new(block::DIRT));
    assert_eq!(durability.durability_relative(&above), Ok(0.0));
    assert!(!durability.has_durability(&above));
    // Disabled world.
    let nether = BlockKey::new(WorldId::new("nether"), BlockPos::new(3, 62, 3));
    fx.host.set_block(nether.clone(), Material::new(block::STONE));
    assert!(!durability.has_durability(&nether));
    fx.ctx.shutdown().await;
}

#[tokio::test]
async fn values_outside_the_open_interval_are_not_stored() {
    let fx = fixture().await;
    let block = stone(5, 5);
    let durability = &fx.ctx.durability;

    for value in [0.0, 1.0, 1.5, -0.2] {
        durability.set_durability_relative(&block, value).unwrap();
        assert_eq!(stored(&fx, &block), None, "{value} was stored");
    }

    durability.set_durability_relative(&block, 0.3).unwrap();
    durability.set_durability_relative(&block, f64::NAN).unwrap();
    assert_eq!(stored(&fx, &block), Some(0.3));
    durability.set_durability_relative(&block, 1.0).unwrap();
    assert_eq!(stored(&fx, &block), None);
    fx.ctx.shutdown().await;
}

#[tokio::test]
async fn modify_reports_blocks_still_damaged() {
    let fx = fixture().await;
    let durability = &fx.ctx.durability;
    durability.set_durability_relative(&stone(1, 1), 0.4).unwrap();
    durability.set_durability_relative(&stone(2, 1), 0.95).unwrap();

    let modified = durability.modify_durabilities_in_chunk(&chunk(0), 10).unwrap();
    assert_eq!(modified, vec![stone(1, 1).local()]);
    assert_eq!(stored(&fx, &stone(1, 1)), Some(0.5));
    assert_eq!(stored(&fx, &stone(2, 1)), None);

    // Damage that empties a block clears it too.
    let modified = durability.modify_durabilities_in_chunk(&chunk(0), -80).unwrap();
    assert!(modified.is_empty());
    assert!(durability.damaged_blocks_in_chunk(&chunk(0)).unwrap().is_empty());
    fx.ctx.shutdown().await;
}

#[tokio::test]
async fn point_changes_are_announced() {
    let fx = fixture().await;
    let mut events = fx.ctx.bus.subscribe();
    let block = stone(4, 4);

    fx.ctx.durability.set_durability_absolute(&block, 40).unwrap();
    fx.ctx.durability.clear_durability(&block).unwrap();
    // Clearing an undamaged block says nothing.
    fx.ctx.durability.clear_durability(&block).unwrap();

    assert_eq!(
        events.try_recv().unwrap(),
        ClaimsEvent::DurabilityChanged {
            block: block.clone(),
            current: 40,
            total: 100,
        }
    );
    assert_eq!(
        events.try_recv().unwrap(),
        ClaimsEvent::DurabilityChanged {
            block,
            current: 100,
            total: 100,
        }
    );
    assert!(events.try_recv().is_err());
    fx.ctx.shutdown().await;
}

#[tokio::test]
async fn damage_survives_a_restart() {
    let fx = fixture().await;
    fx.ctx.durability.set_durability_absolute(&stone(7, 7), 25).unwrap();
    fx.ctx.shutdown().await;

    let mut config = Config::default().with_durability(block::STONE, 100);
    config.data_dir = fx.dir.path().to_path_buf();
    let ctx = AppContext::new(config, fx.factions.clone(), fx.host.clone());
    ctx.worlds.load_metadata_for_chunks([chunk(0)]).await.unwrap();
    assert_eq!(ctx.durability.durability_absolute(&stone(7, 7)), Ok(25));
    ctx.shutdown().await;
}

// ---------------------------------------------------------------------------
// Block breaking
// ---------------------------------------------------------------------------

#[tokio::test]
async fn members_break_protected_blocks_and_clear_them() {
    let fx = fixture().await;
    let block = stone(6, 6);
    fx.ctx.durability.set_durability_relative(&block, 0.5).unwrap();

    let stranger = PlayerId::random();
    assert_eq!(handlers::on_block_break(&fx.ctx, &block, stranger), BreakDecision::DENY);
    assert_eq!(stored(&fx, &block), Some(0.5));

    let decision = handlers::on_block_break(&fx.ctx, &block, fx.alice);
    assert!(!decision.cancel);
    assert_eq!(stored(&fx, &block), None);

    // Wilderness is nobody's business.
    assert_eq!(
        handlers::on_block_break(&fx.ctx, &stone(-6, 6), stranger),
        BreakDecision::ALLOW
    );
    fx.ctx.shutdown().await;
}

#[tokio::test]
async fn busy_chunks_refuse_breaks() {
    let fx = fixture().await;
    let block = BlockKey::new(WorldId::new("world"), BlockPos::new(40, 62, 3));
    fx.factions.claim_chunk(&fx.red, &chunk(2)).unwrap();

    let load = fx.ctx.durability.store().load_chunk(chunk(2));
    assert!(fx.ctx.durability.store().is_chunk_busy(&chunk(2)));
    assert_eq!(handlers::on_block_break(&fx.ctx, &block, fx.alice), BreakDecision::DENY);
    assert!(!handlers::may_entity_change_block(&fx.ctx, &block));

    load.await.unwrap();
    assert_eq!(fx.ctx.durability.durability_relative(&block), Ok(1.0));
    fx.ctx.shutdown().await;
}

#[tokio::test]
async fn clearing_a_chunk_drops_all_damage() {
    let fx = fixture().await;
    for x in 0..8 {
        fx.ctx.durability.set_durability_relative(&stone(x, 0), 0.5).unwrap();
    }

    let broken = fx
        .ctx
        .durability
        .clear_and_break_unhealthy_blocks_in_chunk(&chunk(0))
        .unwrap();
    assert!(broken <= 8);
    assert_eq!(fx.host.take_broken().len(), broken);
    assert_eq!(fx.ctx.durability.store().has_metadata_for_chunk(&chunk(0)), Ok(false));
    fx.ctx.shutdown().await;
}

// ---------------------------------------------------------------------------
// Explosions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn explosion_damages_with_distance() {
    let fx = fixture().await;
    let world = WorldId::new("world");
    let origin = [8.5, 62.5, 8.5];
    let blocks = [
        BlockPos::new(8, 62, 8),
        BlockPos::new(9, 62, 8),
        BlockPos::new(10, 62, 8),
        BlockPos::new(-8, 62, 8),
    ];

    let outcome = fx.ctx.explosions.explode(&world, origin, "tnt", &blocks);
    assert_eq!(outcome.destroyed, vec![stone(8, 8), stone(9, 8)]);
    assert_eq!(outcome.protected, vec![stone(10, 8)]);
    assert_eq!(outcome.unprotected, vec![stone(-8, 8)]);
    assert_eq!(outcome.skipped, 0);

    // Power 100 at distance 2 takes 36.
    assert_eq!(fx.ctx.durability.durability_absolute(&stone(10, 8)), Ok(64));
    let broken = fx.host.take_broken();
    assert_eq!(broken.len(), 2);
    assert!(broken.iter().all(|b| b.dropped_items));
    assert!(fx.host.material_at(&stone(8, 8)).is_air());
    fx.ctx.shutdown().await;
}

#[tokio::test]
async fn configured_power_applies_per_source() {
    let fx = fixture_with(|config| {
        config.explosion_damage.insert("CREEPER".to_string(), 10);
    })
    .await;
    let world = WorldId::new("world");
    let outcome = fx
        .ctx
        .explosions
        .explode(&world, [8.5, 62.5, 8.5], "creeper", &[BlockPos::new(9, 62, 8)]);
    assert_eq!(outcome.protected, vec![stone(9, 8)]);
    assert_eq!(fx.ctx.durability.durability_absolute(&stone(9, 8)), Ok(90));
    fx.ctx.shutdown().await;
}

#[tokio::test]
async fn disabled_worlds_are_unprotected() {
    let fx = fixture().await;
    let nether = WorldId::new("nether");
    let outcome = fx
        .ctx
        .explosions
        .explode(&nether, [0.5, 62.5, 0.5], "tnt", &[BlockPos::new(0, 62, 0)]);
    assert!(outcome.protected.is_empty());
    assert_eq!(outcome.unprotected.len(), 1);
    fx.ctx.shutdown().await;
}

// ---------------------------------------------------------------------------
// Repair
// ---------------------------------------------------------------------------

#[tokio::test]
async fn repair_heals_and_animates_in_batches() {
    let fx = fixture_with(|config| config.repair.repair_delta = 10).await;
    let mut events = fx.ctx.bus.subscribe();
    let damaged: Vec<BlockKey> = (0..16)
        .map(|x| stone(x, 0))
        .chain((0..4).map(|x| stone(x, 1)))
        .collect();
    for block in &damaged {
        fx.ctx.durability.set_durability_relative(block, 0.5).unwrap();
    }
    while events.try_recv().is_ok() {}

    let report = fx.ctx.repair.repair_tick();
    assert_eq!(report.factions, 1);
    assert_eq!(report.chunks, 1);
    assert_eq!(report.blocks, 20);
    assert!(damaged.iter().all(|block| stored(&fx, block) == Some(0.6)));

    assert_eq!(fx.ctx.repair.animation_tick(), ANIMATIONS_PER_TICK);
    assert_eq!(fx.ctx.repair.animation_tick(), 5);
    assert_eq!(fx.ctx.repair.animation_tick(), 0);
    assert_eq!(fx.ctx.repair.pending_animations(), 0);

    let mut healed = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            ClaimsEvent::BlocksHealed { chunk: healed_chunk, blocks } => {
                assert_eq!(healed_chunk, chunk(0));
                healed += blocks.len();
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert_eq!(healed, 20);
    fx.ctx.shutdown().await;
}

#[tokio::test]
async fn overclaimed_factions_do_not_repair() {
    let fx = fixture_with(|config| config.repair.repair_delta = 10).await;
    fx.factions.set_power(&fx.red, 1.0).unwrap();
    fx.ctx.durability.set_durability_relative(&stone(1, 1), 0.5).unwrap();

    let report = fx.ctx.repair.repair_tick();
    assert_eq!(report.factions, 0);
    assert_eq!(stored(&fx, &stone(1, 1)), Some(0.5));
    fx.ctx.shutdown().await;
}

#[tokio::test]
async fn repair_costs_are_charged_from_the_bank() {
    let fx = fixture_with(|config| {
        config.repair.repair_delta = 10;
        config.repair.repair_cost = 5.0;
    })
    .await;
    fx.ctx.durability.set_durability_relative(&stone(1, 1), 0.5).unwrap();

    // Broke.
    assert_eq!(fx.ctx.repair.repair_tick().factions, 0);
    assert_eq!(stored(&fx, &stone(1, 1)), Some(0.5));

    fx.factions.deposit(&fx.red, 7.0).unwrap();
    assert_eq!(fx.ctx.repair.repair_tick().blocks, 1);
    assert_eq!(fx.factions.balance(&fx.red), Some(2.0));
    assert_eq!(stored(&fx, &stone(1, 1)), Some(0.6));
    fx.ctx.shutdown().await;
}
