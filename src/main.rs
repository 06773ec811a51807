use std::error::Error;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use umbra_bake::{BakeConfig, BakePipeline, LightmapResolution, Scene, bake_scene};
use umbra_geom::Vec3;
use umbra_io::LightmapStore;
use umbra_trace::Lightmap;

#[derive(Parser, Debug)]
#[command(name = "umbra", version, about = "Shadow-mask lightmap baker")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Bake every receiver mesh of a scene into the lightmap store
    Bake {
        /// Scene description (scene.toml)
        scene: PathBuf,
        #[arg(short, long)]
        /// Bake settings (bake.toml); defaults apply when omitted
        config: Option<PathBuf>,
        #[arg(short, long)]
        /// Override the output directory
        out: Option<PathBuf>,
        #[arg(short, long)]
        /// Override the lightmap edge length
        resolution: Option<u32>,
    },
    /// Decode stored lightmaps and print per-channel coverage
    Inspect {
        /// Scene name inside the store
        scene: String,
        #[arg(short, long, default_value = "lightmaps")]
        dir: PathBuf,
        #[arg(short, long)]
        /// Only this mesh id; all meshes in the manifest otherwise
        mesh: Option<u32>,
    },
    /// Print the channel mask visible from a world point
    Probe {
        scene: PathBuf,
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(long, value_parser = parse_vec3)]
        /// x,y,z
        point: Vec3,
        #[arg(long, value_parser = parse_vec3)]
        /// Surface normal x,y,z; omitted means every direction counts
        normal: Option<Vec3>,
    },
}

fn parse_vec3(s: &str) -> Result<Vec3, String> {
    let parts: Vec<f32> = s
        .split(',')
        .map(|p| p.trim().parse::<f32>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("'{s}': {e}"))?;
    match parts[..] {
        [x, y, z] => Ok(Vec3::new(x, y, z)),
        _ => Err(format!("'{s}': expected three comma-separated numbers")),
    }
}

fn load_config(path: Option<&Path>) -> Result<BakeConfig, Box<dyn Error>> {
    Ok(match path {
        Some(p) => BakeConfig::load(p)?,
        None => BakeConfig::default(),
    })
}

fn run_bake(
    scene: &Path,
    config: Option<&Path>,
    out: Option<PathBuf>,
    resolution: Option<u32>,
) -> Result<(), Box<dyn Error>> {
    let mut cfg = load_config(config)?;
    if let Some(out) = out {
        cfg.output_dir = out;
    }
    if let Some(n) = resolution {
        cfg.resolution = LightmapResolution::Fixed(n);
    }
    cfg.validate()?;
    let scene = Scene::load(scene)?;
    log::info!(
        target: "bake",
        "scene '{}': {} lights, {} meshes -> {}",
        scene.name,
        scene.lights.len(),
        scene.meshes.len(),
        cfg.output_dir.display()
    );

    let report = bake_scene(cfg, &scene)?;
    for m in &report.baked {
        println!(
            "mesh {:>6}  {:>5}x{:<5}  {:>9} bytes  {:>10} rays  {:>8} texels",
            m.id, m.size, m.size, m.entry.bytes, m.stats.rays, m.stats.texels_written
        );
    }
    for (id, err) in &report.failed {
        println!("mesh {id:>6}  FAILED: {err}");
    }
    for &li in &report.overflowed_lights {
        println!("light {li} has no shadow channel (more than 32 overlapping lights)");
    }
    if !report.failed.is_empty() {
        return Err(format!("{} mesh(es) failed to bake", report.failed.len()).into());
    }
    Ok(())
}

fn print_coverage(id: u32, map: &Lightmap) {
    let total = map.texels().len().max(1);
    println!(
        "mesh {id}: {}x{}, {} of {} texels covered",
        map.size(),
        map.size(),
        map.covered(),
        map.texels().len()
    );
    for (c, n) in map.channel_coverage().iter().enumerate() {
        if *n > 0 {
            println!("  channel {c:>2}: {n:>9} texels ({:.1}%)", *n as f64 * 100.0 / total as f64);
        }
    }
}

fn run_inspect(scene: &str, dir: &Path, mesh: Option<u32>) -> Result<(), Box<dyn Error>> {
    let store = LightmapStore::new(dir);
    let ids: Vec<u32> = match mesh {
        Some(id) => vec![id],
        None => store.manifest(scene)?.meshes.iter().map(|e| e.id).collect(),
    };
    if ids.is_empty() {
        println!("scene '{scene}' has no stored lightmaps in {}", dir.display());
        return Ok(());
    }
    // Start every decode before waiting on any of them.
    let mut pending = Vec::with_capacity(ids.len());
    for id in ids {
        pending.push(store.load_async(scene, id)?);
    }
    for p in pending {
        let id = p.id;
        let stored = p.wait()?;
        let map = Lightmap::from_texels(stored.size, stored.texels)
            .ok_or_else(|| format!("mesh {id}: texel count does not match size"))?;
        print_coverage(id, &map);
    }
    Ok(())
}

fn run_probe(
    scene: &Path,
    config: Option<&Path>,
    point: Vec3,
    normal: Option<Vec3>,
) -> Result<(), Box<dyn Error>> {
    let cfg = load_config(config)?;
    let scene = Scene::load(scene)?;
    let mut pipeline = BakePipeline::for_scene(cfg, &scene)?;
    let mask = pipeline.probe(point, normal.unwrap_or(Vec3::ZERO));
    pipeline.finish();
    println!("{mask:#034b}");
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    match cli.cmd {
        Command::Bake {
            scene,
            config,
            out,
            resolution,
        } => run_bake(&scene, config.as_deref(), out, resolution),
        Command::Inspect { scene, dir, mesh } => run_inspect(&scene, &dir, mesh),
        Command::Probe {
            scene,
            config,
            point,
            normal,
        } => run_probe(&scene, config.as_deref(), point, normal),
    }
}
