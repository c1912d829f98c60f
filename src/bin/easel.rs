use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use easel::compile::task::dump;
use easel::{
    DocumentContext, ExecuteOptions, NoCache, RenderOverrides, Renderer, RendererOpts, SceneDef,
    schedule, to_rgba_image,
};

#[derive(Parser, Debug)]
#[command(name = "easel", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the compiled task list of a scene.
    Schedule(ScheduleArgs),
    /// Render a scene to a PNG.
    Render(RenderArgs),
}

#[derive(Parser, Debug)]
struct ScheduleArgs {
    /// Input scene JSON.
    #[arg(long = "in")]
    in_path: PathBuf,
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Input scene JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,

    /// Override the scene's viewport zoom.
    #[arg(long)]
    zoom: Option<f64>,

    /// Print per-layer bounding boxes after rendering.
    #[arg(long)]
    boxes: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Schedule(args) => cmd_schedule(args),
        Command::Render(args) => cmd_render(args),
    }
}

fn load_scene(path: &Path) -> anyhow::Result<SceneDef> {
    SceneDef::from_path(path).with_context(|| format!("load scene '{}'", path.display()))
}

fn assets_root(path: &Path) -> &Path {
    path.parent().unwrap_or_else(|| Path::new("."))
}

fn cmd_schedule(args: ScheduleArgs) -> anyhow::Result<()> {
    let scene = load_scene(&args.in_path)?;
    let doc = scene
        .into_document(assets_root(&args.in_path))
        .with_context(|| "build document")?;
    let root = doc.resolve_root()?;
    let tasks = schedule(&root, scene.viewport(), &RenderOverrides::none(), &NoCache);
    print!("{}", dump(&tasks));
    Ok(())
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let mut scene = load_scene(&args.in_path)?;
    let mut doc = scene
        .into_document(assets_root(&args.in_path))
        .with_context(|| "build document")?;

    if let Some(zoom) = args.zoom {
        anyhow::ensure!(zoom.is_finite() && zoom > 0.0, "--zoom must be positive");
        scene.viewport.zoom = zoom;
    }
    let viewport = scene.viewport();

    let renderer = Renderer::cpu(RendererOpts {
        background: scene.background.map(|c| c.to_rgba8_premul()),
        ..RendererOpts::default()
    });
    let mut ctx = DocumentContext::new();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .with_context(|| "start runtime")?;
    let (bitmap, out) = runtime
        .block_on(renderer.render_bitmap(&mut doc, &mut ctx, ExecuteOptions::new(viewport)))
        .with_context(|| "render scene")?;

    if let Some(parent) = args.out.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    to_rgba_image(&bitmap)?
        .save_with_format(&args.out, image::ImageFormat::Png)
        .with_context(|| format!("write png '{}'", args.out.display()))?;

    if args.boxes {
        for uid in ctx.metrics.z_order() {
            if let Some(r) = ctx.metrics.bounding_box(uid) {
                println!("{uid}: {:.1} {:.1} {:.1} {:.1}", r.x0, r.y0, r.x1, r.y1);
            }
        }
    }

    tracing::debug!(
        tasks = out.stats.tasks_executed,
        draws = out.stats.draws,
        "render finished"
    );
    eprintln!("wrote {}", args.out.display());
    Ok(())
}
