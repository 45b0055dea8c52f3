use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use ashfall::config::Config;
use ashfall::engine::harvest as harvest_engine;
use ashfall::event::dispatcher::DISPATCH_BATCH_SIZE;
use ashfall::event::{handler, Event, EventKind, EventPayload};
use ashfall::net::{acceptor, upstream};
use ashfall::scheduler::Scheduler;
use ashfall::services::GameServices;
use ashfall::worker::WorkerPool;

use ashfall_world::harvest::CORPSE_MAX_AGE_SECS;
use ashfall_world::loot::DROPPED_ITEM_MAX_AGE_SECS;

#[tokio::main]
async fn main() {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .with_threads(true)
        .env()
        .init()
        .expect("logger init cannot fail before any logging happened");

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.json".to_owned());
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(err) => {
            log::error!("{err}");
            std::process::exit(1);
        }
    };

    let (services, upstream_outbound) = GameServices::new(config);
    let pool = Arc::new(WorkerPool::new());

    start_event_loops(&services, &pool);
    let scheduler = start_scheduler(&services, &pool);

    tokio::spawn(upstream::run_upstream_link(
        services.clone(),
        upstream_outbound,
    ));
    upstream::request_initial_state(&services);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let acceptor_services = services.clone();
    let acceptor_task = tokio::spawn(async move {
        if let Err(err) = acceptor::run_acceptor(acceptor_services, shutdown_rx).await {
            log::error!("acceptor failed: {err}");
            std::process::exit(1);
        }
    });

    match tokio::signal::ctrl_c().await {
        Ok(()) => log::info!("shutdown signal received"),
        Err(err) => log::error!("signal listener failed: {err}"),
    }

    // Drain: stop intake first, then let the queue consumers run dry.
    let _ = shutdown_tx.send(true);
    let _ = acceptor_task.await;
    scheduler.stop();
    services.close_queues();
    tokio::time::sleep(Duration::from_millis(200)).await;
    log::info!(
        "shutdown complete ({} events dropped over the run)",
        services.main_queue.dropped()
    );
}

/// Three consumers: the batched main loop and upstream loop dispatch onto
/// the worker pool; the ping loop answers inline for latency.
fn start_event_loops(services: &Arc<GameServices>, pool: &Arc<WorkerPool>) {
    {
        let services = services.clone();
        let pool = pool.clone();
        std::thread::Builder::new()
            .name("main-events".into())
            .spawn(move || loop {
                let batch = services.main_queue.pop_batch(DISPATCH_BATCH_SIZE);
                if batch.is_empty() {
                    return;
                }
                for event in batch {
                    dispatch_to_pool(&services, &pool, event);
                }
            })
            .expect("thread spawn");
    }

    {
        let services = services.clone();
        let pool = pool.clone();
        std::thread::Builder::new()
            .name("upstream-events".into())
            .spawn(move || loop {
                let batch = services.upstream_queue.pop_batch(DISPATCH_BATCH_SIZE);
                if batch.is_empty() {
                    return;
                }
                for event in batch {
                    dispatch_to_pool(&services, &pool, event);
                }
            })
            .expect("thread spawn");
    }

    {
        let services = services.clone();
        std::thread::Builder::new()
            .name("ping-events".into())
            .spawn(move || loop {
                let Some(event) = services.ping_queue.pop() else {
                    return;
                };
                handler::client::handle_ping(&services, &event);
            })
            .expect("thread spawn");
    }
}

fn dispatch_to_pool(services: &Arc<GameServices>, pool: &Arc<WorkerPool>, event: Event) {
    let services = services.clone();
    let kind = event.kind;
    if let Err(err) = pool.spawn(move || handler::dispatch(&services, event)) {
        log::warn!("dropping {kind:?}: {err}");
    }
}

/// The five periodic simulation tasks. Each pulse is one pool job; a slow
/// pulse delays only itself.
fn start_scheduler(services: &Arc<GameServices>, pool: &Arc<WorkerPool>) -> Arc<Scheduler> {
    let scheduler = Arc::new(Scheduler::new());

    // 1: keep every zone at its target population, broadcast new spawns.
    {
        let services = services.clone();
        let pool = pool.clone();
        scheduler.schedule(1, Duration::from_secs(15), move || {
            let services = services.clone();
            let _ = pool.spawn(move || {
                for zone_id in services.zones.zone_ids() {
                    let spawned = services.zones.spawn_mobs_in_zone(
                        zone_id,
                        &services.mob_templates,
                        &services.mobs,
                        &services.mob_uids,
                    );
                    if !spawned.is_empty() {
                        services.main_queue.push(Event::new(
                            EventKind::SpawnMobsInZone,
                            0,
                            EventPayload::Mobs(spawned),
                        ));
                    }
                }
            });
        });
    }

    // 2: mob movement and aggro, broadcast moved positions.
    {
        let services = services.clone();
        let pool = pool.clone();
        scheduler.schedule(2, Duration::from_secs(3), move || {
            let services = services.clone();
            let _ = pool.spawn(move || {
                for zone_id in services.zones.zone_ids() {
                    let moved = services.movement.move_mobs_in_zone(&services, zone_id);
                    if !moved.is_empty() {
                        services.main_queue.push(Event::new(
                            EventKind::MoveMobsInZone,
                            0,
                            EventPayload::Mobs(moved),
                        ));
                    }
                }
            });
        });
    }

    // 3: finish due casts, prune cooldowns.
    {
        let services = services.clone();
        let pool = pool.clone();
        scheduler.schedule(3, Duration::from_millis(200), move || {
            let services = services.clone();
            let _ = pool.spawn(move || {
                services.skills.update_ongoing_actions(&services);
                services.skills.update_cooldowns(&services);
            });
        });
    }

    // 4: harvest completion pulses.
    {
        let services = services.clone();
        let pool = pool.clone();
        scheduler.schedule(4, Duration::from_millis(500), move || {
            let services = services.clone();
            let _ = pool.spawn(move || harvest_engine::update_harvest_progress(&services));
        });
    }

    // 5: sweeps.
    {
        let services = services.clone();
        let pool = pool.clone();
        scheduler.schedule(5, Duration::from_secs(60), move || {
            let services = services.clone();
            let _ = pool.spawn(move || {
                let now = services.clock.now_secs();
                let corpses = services.harvest.cleanup_old_corpses(now, CORPSE_MAX_AGE_SECS);
                let drops = services.loot.cleanup_old(now, DROPPED_ITEM_MAX_AGE_SECS);
                if corpses + drops > 0 {
                    log::info!("swept {corpses} corpses and {drops} stale drops");
                }
                services.main_queue.force_cleanup();
                services.upstream_queue.force_cleanup();
                services.ping_queue.force_cleanup();
            });
        });
    }

    let runner = scheduler.clone();
    std::thread::Builder::new()
        .name("scheduler".into())
        .spawn(move || runner.run())
        .expect("thread spawn");

    scheduler
}
