//! fastrollout CLI
//!
//! Command-line tools for the rollout engine: synthesize datasets, print
//! dataset summaries, and run headless throughput benchmarks.

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use flate2::write::GzEncoder;
use flate2::Compression;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use fastrollout::config::RolloutConfig;
use fastrollout::dataset::Dataset;
use fastrollout::engine::RolloutGenerator;
use fastrollout::nav::PlanePathFinder;
use fastrollout::render::{HeadlessBackend, RenderBackend};

#[derive(Parser)]
#[command(name = "fastrollout")]
#[command(version, about = "fastrollout - batched rollout generation for navigation agents", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a synthetic flat-ground dataset
    Synth {
        /// Output directory for the .json.gz files
        out: PathBuf,

        /// Number of scenes
        #[arg(long, default_value = "4")]
        scenes: u32,

        /// Episodes per scene
        #[arg(long, default_value = "16")]
        episodes: u32,

        /// Half-extent of the spawn square, in meters
        #[arg(long, default_value = "5.0")]
        extent: f32,

        /// RNG seed
        #[arg(long, default_value = "0")]
        seed: u64,
    },

    /// Print a dataset summary
    Inspect {
        /// Dataset directory
        dataset: PathBuf,

        /// Asset directory scene ids resolve against
        #[arg(long)]
        assets: Option<PathBuf>,
    },

    /// Run a headless throughput benchmark
    Bench {
        /// Dataset directory
        dataset: PathBuf,

        /// Asset directory scene ids resolve against
        #[arg(long)]
        assets: Option<PathBuf>,

        /// Total environments
        #[arg(long, default_value = "64")]
        envs: u32,

        /// Active scenes
        #[arg(long, default_value = "2")]
        active_scenes: u32,

        /// Worker threads (-1 = auto)
        #[arg(long, default_value = "-1")]
        workers: i32,

        /// Steps to run
        #[arg(long, default_value = "1000")]
        steps: u32,

        /// RNG seed
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Pin threads to cores
        #[arg(long)]
        pin: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Synth {
            out,
            scenes,
            episodes,
            extent,
            seed,
        } => synth(&out, scenes, episodes, extent, seed),
        Commands::Inspect { dataset, assets } => {
            let assets = assets.unwrap_or_else(|| dataset.clone());
            inspect(&dataset, assets)
        }
        Commands::Bench {
            dataset,
            assets,
            envs,
            active_scenes,
            workers,
            steps,
            seed,
            pin,
        } => bench(
            &dataset,
            assets.unwrap_or_else(|| dataset.clone()),
            envs,
            active_scenes,
            workers,
            steps,
            seed,
            pin,
        ),
    }
}

fn synth(out: &PathBuf, scenes: u32, episodes: u32, extent: f32, seed: u64) -> Result<()> {
    std::fs::create_dir_all(out)
        .with_context(|| format!("creating output directory {}", out.display()))?;
    let mut rng = StdRng::seed_from_u64(seed);

    for scene in 0..scenes {
        let entries: Vec<_> = (0..episodes)
            .map(|_| {
                let spawn = |rng: &mut StdRng| {
                    [
                        rng.gen_range(-extent..extent),
                        0.0f32,
                        rng.gen_range(-extent..extent),
                    ]
                };
                let yaw: f32 = rng.gen_range(-std::f32::consts::PI..std::f32::consts::PI);
                json!({
                    "scene_id": format!("scene_{scene:03}.ply"),
                    "start_position": spawn(&mut rng),
                    "start_rotation": [0.0, (yaw / 2.0).sin(), 0.0, (yaw / 2.0).cos()],
                    "goals": [{"position": spawn(&mut rng)}],
                })
            })
            .collect();
        let body = json!({ "episodes": entries }).to_string();

        let path = out.join(format!("scene_{scene:03}.json.gz"));
        let file = File::create(&path)
            .with_context(|| format!("creating {}", path.display()))?;
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(body.as_bytes())?;
        encoder.finish()?;
    }

    println!("wrote {scenes} scenes x {episodes} episodes to {}", out.display());
    Ok(())
}

fn inspect(dataset_dir: &PathBuf, assets: PathBuf) -> Result<()> {
    let dataset = Dataset::load(dataset_dir, &assets, HeadlessBackend::MESH_EXT)?;

    println!("Dataset summary: {}", dataset_dir.display());
    println!("  scenes:   {}", dataset.num_scenes());
    println!("  episodes: {}", dataset.num_episodes());
    for scene in 0..dataset.num_scenes() as u32 {
        let (first, count) = dataset.episode_span(scene);
        println!(
            "  scene {scene:>4}: {count:>6} episodes (from {first}), mesh {}",
            dataset.mesh_path(scene).display()
        );
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn bench(
    dataset: &PathBuf,
    assets: PathBuf,
    envs: u32,
    active_scenes: u32,
    workers: i32,
    steps: u32,
    seed: u64,
    pin: bool,
) -> Result<()> {
    let config = RolloutConfig::new(dataset, assets)
        .with_envs(envs)
        .with_active_scenes(active_scenes)
        .with_workers(workers)
        .with_seed(seed)
        .with_pinning(pin)
        .with_outputs(false, true);
    let mut engine = RolloutGenerator::<HeadlessBackend, PlanePathFinder>::new(config)?;

    println!(
        "Benchmarking: {envs} envs, {active_scenes} active scenes, {} workers, {steps} steps",
        engine.num_workers()
    );

    engine.reset(0);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut actions = vec![0i64; envs as usize];

    let begin = Instant::now();
    for _ in 0..steps {
        for action in actions.iter_mut() {
            *action = rng.gen_range(0..4);
        }
        engine.step(0, &actions);
    }
    let elapsed = begin.elapsed().as_secs_f64();

    let total = steps as f64 * envs as f64;
    println!(
        "{total:.0} env-steps in {elapsed:.2}s: {:.0} steps/sec",
        total / elapsed
    );
    Ok(())
}
