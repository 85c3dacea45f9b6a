use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use terrastream_common::{TerrainConfig, TileCoord};
use terrastream_elevation::ElevationSampler;
use terrastream_mesh::TileMeshBuilder;
use terrastream_noise::NoiseField;
use terrastream_stream::{TileEvent, TileStreamingManager};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "terrastream-cli", about = "CLI tool for terrastream terrain streaming")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// YAML terrain configuration; defaults are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print crate info and the effective configuration
    Info,
    /// Generate a single tile and describe it
    Tile {
        #[arg(long, allow_hyphen_values = true)]
        x: i32,
        #[arg(long, allow_hyphen_values = true)]
        z: i32,
        /// Level of detail for the mesh
        #[arg(long, default_value = "0")]
        lod: u8,
    },
    /// Query terrain height at a world position
    Height {
        #[arg(long, allow_hyphen_values = true)]
        x: f32,
        #[arg(long, allow_hyphen_values = true)]
        z: f32,
    },
    /// Move a viewer in a straight line and report streaming activity
    Walk {
        /// Number of ticks to simulate
        #[arg(short, long, default_value = "20")]
        steps: u64,
        /// World units moved along X per tick
        #[arg(long, default_value = "25.0", allow_hyphen_values = true)]
        dx: f32,
        /// World units moved along Z per tick
        #[arg(long, default_value = "0.0", allow_hyphen_values = true)]
        dz: f32,
    },
}

/// Read and validate a configuration file, or fall back to defaults.
fn load_config(path: Option<&Path>) -> anyhow::Result<TerrainConfig> {
    let config = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_yaml::from_str::<TerrainConfig>(&text)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => TerrainConfig::default(),
    };
    config.validate().context("invalid terrain configuration")?;
    Ok(config)
}

fn sampler(config: &TerrainConfig) -> ElevationSampler {
    ElevationSampler::new(Arc::new(NoiseField::new(config.noise.clone())), config)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Info => {
            println!("terrastream-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("common: {}", terrastream_common::crate_info());
            println!("noise: {}", terrastream_noise::crate_info());
            println!("elevation: {}", terrastream_elevation::crate_info());
            println!("mesh: {}", terrastream_mesh::crate_info());
            println!("stream: {}", terrastream_stream::crate_info());
            println!();
            print!("{}", serde_yaml::to_string(&config)?);
        }
        Commands::Tile { x, z, lod } => {
            let coord = TileCoord::new(x, z);
            let sampler = sampler(&config);
            let grid = sampler.generate(coord, config.tile_size, config.base_resolution)?;
            let mesh = TileMeshBuilder::new(config.height_scale).build(&grid, lod)?;
            let (lo, hi) = grid.min_max();

            println!("Tile {coord}: region {:?}", sampler.region_archetype(coord));
            println!(
                "Grid: {res}x{res}, range [{lo:.4}, {hi:.4}], span {span:.4}",
                res = grid.resolution(),
                span = hi - lo
            );
            println!(
                "Mesh: lod {lod}, {0}x{0} vertices, {1} triangles",
                mesh.resolution,
                mesh.triangle_count()
            );
        }
        Commands::Height { x, z } => {
            let sampler = sampler(&config);
            let tile = TileCoord::from_world(x, z, config.tile_size);
            println!(
                "Height at ({x}, {z}) in tile {tile}: {:.3}",
                sampler.elevation_at_point(x, z)
            );
        }
        Commands::Walk { steps, dx, dz } => {
            println!("Walk: {steps} ticks, step ({dx}, {dz})");
            let mut manager = TileStreamingManager::new(config)?;
            let mut position = glam::Vec3::ZERO;

            for _ in 0..steps {
                let stats = manager.update_from_position(position);
                let failed = manager
                    .drain_events()
                    .iter()
                    .filter(|e| matches!(e, TileEvent::Failed { .. }))
                    .count();
                println!(
                    "tick {:>3}: viewer {}, +{} -{} ~{} resident={} queued={} failed={failed} ({:?})",
                    stats.tick,
                    manager.viewer().unwrap_or_default(),
                    stats.loaded,
                    stats.unloaded,
                    stats.relevelled,
                    stats.resident,
                    stats.queued,
                    stats.update_time
                );
                position += glam::Vec3::new(dx, 0.0, dz);
            }

            let timer = manager.generation_timer();
            println!(
                "Resident tiles: {} (visible {}), tile generation mean {:?}, worst {:?}",
                manager.resident_count(),
                manager.visible_tiles().count(),
                timer.mean(),
                timer.worst()
            );
        }
    }

    Ok(())
}
