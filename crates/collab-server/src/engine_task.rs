//! Central engine loop.
//!
//! This task owns the `SessionEngine` instance and processes all
//! `EngineRequest`s coming from connections, strictly in arrival order.
//! That single owner is what serializes every room mutation.
//!
//! Besides requests it ticks two timers:
//! - the trailing-flush timer (every broadcast interval), and
//! - the idle-room sweep (only when a room TTL is configured).
//!
//! Routing is already decided by the engine (`Delivery::to`); this loop
//! only pushes each message onto the listed connections' channels.

use std::time::{Duration, Instant};

use collab_core::{Delivery, EngineConfig, SessionEngine};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::types::{ClientRegistry, EngineRequest, EngineRx};

/// Flush tick used when throttling is disabled (nothing is ever pending then).
const IDLE_FLUSH_TICK: Duration = Duration::from_millis(250);

/// Upper bound on how often empty rooms are swept.
const MAX_SWEEP_PERIOD: Duration = Duration::from_secs(30);

/// Run the central engine processing loop.
///
/// - `engine_rx`: receives requests from all connection tasks.
/// - `clients`: registry of connected clients and their outbound channels.
/// - `room_idle_ttl`: zero disables eviction.
pub async fn run_engine_loop(
    mut engine_rx: EngineRx,
    clients: ClientRegistry,
    engine_config: EngineConfig,
    room_idle_ttl: Duration,
) {
    let flush_period = if engine_config.broadcast_interval.is_zero() {
        IDLE_FLUSH_TICK
    } else {
        engine_config.broadcast_interval
    };
    let sweep_enabled = !room_idle_ttl.is_zero();
    let sweep_period = if sweep_enabled {
        room_idle_ttl.min(MAX_SWEEP_PERIOD)
    } else {
        MAX_SWEEP_PERIOD
    };

    let mut engine = SessionEngine::new(engine_config);

    let mut flush = interval(flush_period);
    flush.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut sweep = interval(sweep_period);
    sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            req = engine_rx.recv() => {
                let Some(req) = req else { break };
                let deliveries = match req {
                    EngineRequest::Message { conn, msg } => {
                        debug!(conn = conn.0, ?msg, "engine request");
                        engine.process_message(conn, msg)
                    }
                    EngineRequest::Disconnected(conn) => {
                        debug!(conn = conn.0, "engine disconnect");
                        engine.disconnect(conn)
                    }
                };
                route_deliveries(deliveries, &clients).await;
            }

            _ = flush.tick() => {
                let deliveries = engine.flush_pending(Instant::now());
                route_deliveries(deliveries, &clients).await;
            }

            _ = sweep.tick(), if sweep_enabled => {
                let evicted = engine.evict_idle_rooms(Instant::now(), room_idle_ttl);
                if evicted > 0 {
                    info!(evicted, rooms = engine.room_count(), "evicted idle rooms");
                }
            }
        }
    }

    info!("Engine loop shutting down (engine_rx closed)");
}

/// Push each delivery onto its recipients' outbound channels.
///
/// Sends never block. A recipient whose channel is gone (or who has
/// already left the registry) is skipped; the rest still get the message.
async fn route_deliveries(deliveries: Vec<Delivery>, clients: &ClientRegistry) {
    if deliveries.is_empty() {
        return;
    }

    let guard = clients.read().await;

    for Delivery { to, message } in deliveries {
        for conn in to {
            match guard.get(&conn) {
                Some(tx) => {
                    if tx.send(message.clone()).is_err() {
                        debug!(conn = conn.0, "outbound channel closed, dropping message");
                    }
                }
                None => debug!(conn = conn.0, "recipient no longer registered"),
            }
        }
    }
}
