use std::cell::Cell;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use glam::Vec3;
use serde::Serialize;
use tether_event::Disposables;
use tether_kernel::{
    CollisionDetector, Contact, DrawCommand, Entity, EntityKind, EntityRef, RecordingTerrain,
    SimulationConfig, Surface, World, projectile,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tether-cli", about = "Headless driver for tether simulations")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print crate versions
    Info,
    /// Print the default simulation config as YAML
    Config,
    /// Run a projectile barrage and print a summary
    Run {
        /// Number of frames to simulate
        #[arg(short, long, default_value = "600")]
        steps: u64,
        /// Number of projectiles to launch
        #[arg(short, long, default_value = "8")]
        projectiles: usize,
        /// YAML config file; flags below override it
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// RNG seed
        #[arg(long)]
        seed: Option<u64>,
        /// Seconds per step
        #[arg(long)]
        dt: Option<f32>,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Flat ground of finite extent at y = 0. Anything past the edge keeps falling.
struct GroundPlane {
    half_extent: f32,
}

impl CollisionDetector for GroundPlane {
    fn detect(&mut self, entities: &[EntityRef]) -> Vec<Contact> {
        entities
            .iter()
            .filter(|e| {
                let p = e.position();
                p.y <= 0.0 && p.x.abs() <= self.half_extent && p.z.abs() <= self.half_extent
            })
            .map(|e| {
                let p = e.position();
                Contact {
                    entity: e.clone(),
                    other: Surface::Terrain,
                    intersection: Vec3::new(p.x, 0.0, p.z),
                }
            })
            .collect()
    }
}

#[derive(Debug, Serialize)]
struct RunSummary {
    ticks: u64,
    spawned: usize,
    live_entities: usize,
    live_projectiles: usize,
    removed: usize,
    explosions: usize,
    collision_tests: usize,
    collision_stops: usize,
    draw_calls: usize,
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<SimulationConfig> {
    let Some(path) = path else {
        return Ok(SimulationConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let config = serde_yaml::from_str(&text)
        .with_context(|| format!("parsing config {}", path.display()))?;
    Ok(config)
}

fn run(config: SimulationConfig, steps: u64, projectiles: usize) -> anyhow::Result<RunSummary> {
    let terrain = Rc::new(RecordingTerrain::new());
    let world = World::with_terrain(config.clone(), terrain.clone())?;

    let views = Disposables::new();
    let rockets = world
        .entities()
        .derive_filtered_by(|e| e.kind() == EntityKind::Projectile, &views);
    let removed = Rc::new(Cell::new(0usize));
    let counter = removed.clone();
    views.add(world.entities().on_remove(move |_| {
        counter.set(counter.get() + 1);
        Ok(())
    }));

    // Props sit just above the ground and get knocked around by explosions.
    for i in 0..4 {
        let x = i as f32 * 6.0 - 9.0;
        world.spawn(
            Entity::builder(EntityKind::Prop)
                .position(Vec3::new(x, 0.5, 0.0))
                .build(),
        )?;
    }
    // Every third projectile overshoots the ground and hits the kill floor.
    for i in 0..projectiles {
        let x = i as f32 * 4.0 - 2.0 * projectiles as f32;
        let drift = if i % 3 == 2 { 100.0 } else { 0.0 };
        world.spawn(projectile(
            &config.projectile,
            Vec3::new(x, 20.0 + i as f32 * 5.0, 0.0),
            Vec3::new(drift, -30.0, 0.0),
        ))?;
    }
    let spawned = world.entity_count();
    tracing::info!(spawned, steps, "simulation start");

    let mut ground = GroundPlane { half_extent: 50.0 };
    let mut draws: Vec<DrawCommand> = Vec::new();
    let (mut tests, mut stops, mut draw_calls) = (0, 0, 0);
    for _ in 0..steps {
        let frame = world.advance_frame(&mut ground, &mut draws)?;
        tests += frame.collisions.tested;
        stops += frame.collisions.stopped;
        draw_calls += frame.draw_calls;
        draws.clear();
        if rockets.is_empty() {
            tracing::info!(tick = frame.tick, "all projectiles resolved");
            break;
        }
    }

    Ok(RunSummary {
        ticks: world.tick(),
        spawned,
        live_entities: world.entity_count(),
        live_projectiles: rockets.len(),
        removed: removed.get(),
        explosions: terrain.explosions().len(),
        collision_tests: tests,
        collision_stops: stops,
        draw_calls,
    })
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Info => {
            println!("tether-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("event: {}", tether_event::crate_info());
            println!("kernel: {}", tether_kernel::crate_info());
        }
        Commands::Config => {
            print!("{}", serde_yaml::to_string(&SimulationConfig::default())?);
        }
        Commands::Run {
            steps,
            projectiles,
            config,
            seed,
            dt,
            json,
        } => {
            let mut config = load_config(config.as_ref())?;
            if let Some(seed) = seed {
                config.seed = seed;
            }
            if let Some(dt) = dt {
                config.dt = dt;
            }

            let summary = run(config, steps, projectiles)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!(
                    "ticks={} spawned={} live={} (projectiles={}) removed={}",
                    summary.ticks,
                    summary.spawned,
                    summary.live_entities,
                    summary.live_projectiles,
                    summary.removed
                );
                println!(
                    "explosions={} collision_tests={} stops={} draw_calls={}",
                    summary.explosions,
                    summary.collision_tests,
                    summary.collision_stops,
                    summary.draw_calls
                );
            }
        }
    }

    Ok(())
}
