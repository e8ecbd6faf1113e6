//! # STARFALL Headless Driver
//!
//! Runs the simulation without a presentation layer: spawns waves, lets the
//! player fire straight ahead, and logs what happened.
//!
//! ```text
//! headless [CONFIG.toml] [SECONDS]
//! RUST_LOG=starfall=debug headless config/starfall.toml 30
//! ```

use std::f32::consts::PI;
use std::time::{Duration, Instant};

use starfall::core::{EntityId, SpawnOverrides};
use starfall::shared::{Color, FireRequest, MissileType, ProjectileFlags, SimEvent, Vec3, WeaponType};
use starfall::{SimConfig, SimError, SimResult, Session};
use tracing::info;
use tracing_subscriber::EnvFilter;

// ============================================================================
// CONSTANTS
// ============================================================================

const DEFAULT_SECONDS: u64 = 10;
const WAVE_INTERVAL_MS: u64 = 3_000;
const WAVE: [&str; 6] = ["scout", "armored", "elite", "bomber", "fast", "asteroid"];
const PLAYER_FIRE_INTERVAL_MS: u64 = 250;
const REPORT_INTERVAL_MS: u64 = 1_000;

fn main() -> SimResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => SimConfig::load(path)?,
        None => SimConfig::default(),
    };
    let seconds = match args.next() {
        Some(raw) => raw
            .parse::<u64>()
            .map_err(|err| SimError::InvalidConfig(format!("bad duration {raw:?}: {err}")))?,
        None => DEFAULT_SECONDS,
    };

    let tick = Duration::from_micros(1_000_000 / u64::from(config.tick_rate_hz));
    let mut session = Session::new(config)?;
    session.set_player_position(Some(Vec3::ZERO));

    let mut score = 0u32;
    let mut player_hits = 0u32;
    let events = session.events();

    let start = Instant::now();
    let end_ms = seconds * 1_000;
    let mut next_wave_ms = 0;
    let mut next_fire_ms = 0;
    let mut next_report_ms = REPORT_INTERVAL_MS;

    info!(seconds, threaded = session.is_threaded(), "headless run starting");

    loop {
        let frame_start = Instant::now();
        let now_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        if now_ms >= end_ms {
            break;
        }

        if now_ms >= next_wave_ms {
            spawn_wave(&mut session)?;
            next_wave_ms += WAVE_INTERVAL_MS;
        }
        if now_ms >= next_fire_ms {
            session.fire_player(player_shot());
            next_fire_ms += PLAYER_FIRE_INTERVAL_MS;
        }

        session.tick(now_ms);

        for event in events.drain() {
            match event {
                SimEvent::ScoreAwarded { points, .. } => score += points,
                SimEvent::PlayerHit { .. } => player_hits += 1,
                SimEvent::WorkerDegraded { reason } => info!(%reason, "running degraded"),
                _ => {}
            }
        }

        if now_ms >= next_report_ms {
            let stats = session.last_stats();
            let workers = session.orchestrator_stats();
            info!(
                entities = stats.active_entities,
                projectiles = stats.active_projectiles,
                score,
                player_hits,
                applied = workers.results_applied,
                stale = workers.results_stale,
                "tick {}",
                stats.tick
            );
            next_report_ms += REPORT_INTERVAL_MS;
        }

        if let Some(rest) = tick.checked_sub(frame_start.elapsed()) {
            std::thread::sleep(rest);
        }
    }

    session.shutdown();
    let workers = *session.orchestrator_stats();
    info!(
        ticks = session.tick_count(),
        score,
        player_hits,
        dispatches = workers.dispatches,
        applied = workers.results_applied,
        stale = workers.results_stale,
        max_age_ms = workers.max_applied_age_ms,
        degraded = workers.degraded,
        "headless run finished"
    );
    Ok(())
}

fn spawn_wave(session: &mut Session) -> SimResult<Vec<EntityId>> {
    let mut spawned = Vec::with_capacity(WAVE.len());
    for (i, archetype) in WAVE.iter().enumerate() {
        #[allow(clippy::cast_precision_loss)]
        let x = -500.0 + 200.0 * i as f32;
        let overrides = SpawnOverrides::at(Vec3::new(x, 0.0, 800.0)).with_yaw(PI);
        let overrides = if *archetype == "asteroid" {
            overrides.with_velocity(Vec3::new(0.0, 0.0, -40.0))
        } else {
            overrides
        };
        spawned.push(session.spawn(archetype, overrides)?);
    }
    info!(count = spawned.len(), agents = session.agent_count(), "wave spawned");
    Ok(spawned)
}

fn player_shot() -> FireRequest {
    FireRequest {
        owner: EntityId::NULL.raw(),
        origin: Vec3::new(0.0, 0.0, 20.0),
        velocity: Vec3::new(0.0, 0.0, 420.0),
        damage: 1.0,
        size: 5.0,
        color: Color::rgb(255, 255, 0),
        weapon: WeaponType::Blaster,
        missile: MissileType::Standard,
        flags: ProjectileFlags::NONE,
    }
}
