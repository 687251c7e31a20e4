mod demo;

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use roomworld_common::CollisionGroup;
use roomworld_kernel::{World, WorldConfig, WorldError, WorldEvent};
use roomworld_tools::{EntityInfo, WorldInspector, WorldSummary};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "roomworld-cli", about = "CLI tool for roomworld simulations")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print crate versions and the canonical collision layer table
    Info,
    /// Run the demo rooms headless for a number of frames
    Run {
        /// Number of frames to simulate
        #[arg(short, long, default_value = "600")]
        frames: u64,
        /// Frames per simulated second
        #[arg(long, default_value = "60")]
        fps: u32,
        /// YAML world configuration
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Room the player starts in
        #[arg(short, long, default_value = demo::START_ROOM)]
        room: String,
        /// Print the final report as JSON
        #[arg(long)]
        json: bool,
    },
}

/// What `run` prints at the end.
#[derive(Debug, Serialize)]
struct RunReport {
    summary: WorldSummary,
    census: Vec<(String, usize)>,
    player: Option<EntityInfo>,
    rooms_entered: Vec<String>,
    spawned: usize,
    despawned: usize,
    failed_transitions: usize,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Info => {
            println!("roomworld-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("common: {}", roomworld_common::crate_info());
            println!("physics: {}", roomworld_physics::crate_info());
            println!("kernel: {}", roomworld_kernel::crate_info());
            println!("tools: {}", roomworld_tools::crate_info());
            println!();
            println!("Canonical collision layers:");
            for group in CollisionGroup::ALL {
                let touches: Vec<String> = group
                    .canonical_layers()
                    .groups()
                    .map(|g| g.to_string())
                    .collect();
                println!("  {:<14} {}", group.to_string(), touches.join(", "));
            }
        }
        Commands::Run {
            frames,
            fps,
            config,
            room,
            json,
        } => {
            let config = load_config(config.as_ref())?;
            let report = run(config, frames, fps, &room)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }
    }

    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<WorldConfig> {
    let Some(path) = path else {
        return Ok(WorldConfig::default());
    };
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let config = WorldConfig::from_yaml_str(&source)
        .with_context(|| format!("parsing config {}", path.display()))?;
    tracing::info!(path = %path.display(), "loaded world config");
    Ok(config)
}

fn run(config: WorldConfig, frames: u64, fps: u32, room: &str) -> anyhow::Result<RunReport> {
    anyhow::ensure!(fps > 0, "fps must be at least 1");
    let dt = 1.0 / fps as f32;

    let mut world = World::with_config(config)?;
    world.install_default_handlers();
    demo::populate(&mut world)?;
    let player = world.set_player(demo::player());
    world
        .request_transition(room, demo::SPAWN)
        .with_context(|| format!("starting room {room:?}"))?;

    let mut rooms_entered = Vec::new();
    let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
    for _ in 0..frames {
        match world.update(dt) {
            Ok(_) => {}
            // The frame itself completed; the world stays in its room.
            Err(WorldError::UnknownRoom(name)) => {
                tracing::warn!(room = %name, "transition to unknown room dropped");
            }
            Err(err) => {
                return Err(err).with_context(|| format!("frame {}", world.tick()));
            }
        }
        for event in world.drain_events() {
            match event {
                WorldEvent::Spawned { .. } => *counts.entry("spawned").or_default() += 1,
                WorldEvent::Despawned { .. } => *counts.entry("despawned").or_default() += 1,
                WorldEvent::TransitionFailed { .. } => *counts.entry("failed").or_default() += 1,
                WorldEvent::RoomEntered { room, .. } => rooms_entered.push(room),
                WorldEvent::Stepped { .. } => {}
            }
        }
        if !world.contains(player) {
            tracing::info!(tick = world.tick(), "player gone, stopping");
            break;
        }
    }

    Ok(RunReport {
        summary: WorldInspector::summary(&world),
        census: WorldInspector::census(&world),
        player: WorldInspector::inspect_entity(&world, player),
        rooms_entered,
        spawned: counts.get("spawned").copied().unwrap_or(0),
        despawned: counts.get("despawned").copied().unwrap_or(0),
        failed_transitions: counts.get("failed").copied().unwrap_or(0),
    })
}

fn print_report(report: &RunReport) {
    println!("{}", report.summary);
    println!(
        "Lifecycle: spawned={} despawned={} failed_transitions={}",
        report.spawned, report.despawned, report.failed_transitions
    );
    println!("Rooms entered: {}", report.rooms_entered.join(" -> "));
    for (kind, count) in &report.census {
        println!("  {kind:<8} x{count}");
    }
    match &report.player {
        Some(info) => println!("Player: {info} points={}", info.points),
        None => println!("Player: gone"),
    }
}
