use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "framecast", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Turn a directory of PNG frames into a video, gif or live photo.
    Encode(EncodeArgs),
    /// Print frame count and delays of an animated gif.
    GifInfo(GifInfoArgs),
    /// Print the pairing identifier of a still or video.
    Identifier(IdentifierArgs),
}

#[derive(Parser, Debug)]
struct EncodeArgs {
    /// Directory of PNG frames, encoded in file-name order.
    #[arg(long)]
    frames: PathBuf,

    /// Output directory.
    #[arg(long)]
    out_dir: PathBuf,

    /// File stem of the generated artifacts.
    #[arg(long, default_value = "framecast")]
    name: String,

    #[arg(long, value_enum, default_value_t = KindChoice::Video)]
    kind: KindChoice,

    /// Pipeline config JSON.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Frames per second (overrides the config).
    #[arg(long)]
    fps: Option<u32>,

    /// Backend to use (overrides the config).
    #[arg(long, value_enum)]
    backend: Option<BackendChoice>,

    /// Still image for live photos; extracted from the video when omitted.
    #[arg(long)]
    still: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct GifInfoArgs {
    path: PathBuf,
}

#[derive(Parser, Debug)]
struct IdentifierArgs {
    path: PathBuf,

    #[arg(long, value_enum, default_value_t = BackendChoice::Ffmpeg)]
    backend: BackendChoice,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum KindChoice {
    Video,
    Gif,
    LivePhoto,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BackendChoice {
    Ffmpeg,
    Manifest,
}

impl From<BackendChoice> for framecast::BackendKind {
    fn from(choice: BackendChoice) -> Self {
        match choice {
            BackendChoice::Ffmpeg => Self::Ffmpeg,
            BackendChoice::Manifest => Self::Manifest,
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Encode(args) => cmd_encode(args),
        Command::GifInfo(args) => cmd_gif_info(args),
        Command::Identifier(args) => cmd_identifier(args),
    }
}

fn read_frames(dir: &Path, scale: f64) -> anyhow::Result<framecast::FrameQueue> {
    let mut paths = std::fs::read_dir(dir)
        .with_context(|| format!("read frame directory '{}'", dir.display()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()?;
    paths.retain(|p| {
        p.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("png"))
    });
    paths.sort();

    let mut queue = framecast::FrameQueue::new();
    for path in &paths {
        let img = image::open(path).with_context(|| format!("decode '{}'", path.display()))?;
        queue.push(framecast::Frame::new(img.to_rgba8(), scale));
    }
    Ok(queue)
}

fn cmd_encode(args: EncodeArgs) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => framecast::PipelineConfig::from_path(path)?,
        None => framecast::PipelineConfig::default(),
    };
    if let Some(fps) = args.fps {
        config.preferred_fps = fps;
    }
    if let Some(backend) = args.backend {
        config.backend = backend.into();
    }
    config.cache_dir = Some(args.out_dir.clone());

    let queue = read_frames(&args.frames, config.capture_scale)?;
    eprintln!("read {} frames from {}", queue.len(), args.frames.display());

    let timing = framecast::TimingModel::Preferred(config.preferred_fps);
    let kind = match args.kind {
        KindChoice::Video => framecast::OutputKind::Video,
        KindChoice::Gif => framecast::OutputKind::Gif,
        KindChoice::LivePhoto => framecast::OutputKind::LivePhoto,
    };
    let mut request =
        framecast::AssetRequest::new(framecast::FrameSource::frames(queue, timing), kind)
            .with_name(args.name);
    if let Some(still) = &args.still {
        let img = image::open(still).with_context(|| format!("decode '{}'", still.display()))?;
        request = request.with_still(img.to_rgba8());
    }

    let orchestrator = framecast::AssetOrchestrator::new(config)?;
    let last_decile = Arc::new(AtomicU32::new(0));
    let progress: framecast::ProgressFn = Arc::new(move |p: f64| {
        let decile = (p * 10.0).floor() as u32;
        if decile > last_decile.swap(decile, Ordering::Relaxed) {
            eprintln!("{:>3}%", decile * 10);
        }
    });
    let asset = orchestrator.generate_blocking(request, progress)?;

    match asset {
        framecast::Asset::Video(path) | framecast::Asset::Gif(path) => {
            eprintln!("wrote {}", path.display());
        }
        framecast::Asset::LivePhoto {
            still,
            video,
            identifier,
        } => {
            eprintln!("wrote {}", still.display());
            eprintln!("wrote {}", video.display());
            println!("{identifier}");
        }
    }
    Ok(())
}

fn cmd_gif_info(args: GifInfoArgs) -> anyhow::Result<()> {
    let info = framecast::GifEncoder::decode(&args.path)?;
    println!("frames: {}", info.frame_count);
    println!("delay:  {:.3}s", info.delay_sec);
    match info.loop_count {
        Some(0) => println!("loop:   forever"),
        Some(n) => println!("loop:   {n}"),
        None => println!("loop:   once"),
    }
    if let Some(first) = info.frames.first() {
        println!("size:   {}x{}", first.pixel_width(), first.pixel_height());
    }
    Ok(())
}

fn cmd_identifier(args: IdentifierArgs) -> anyhow::Result<()> {
    let is_jpeg = args
        .path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("jpg") || e.eq_ignore_ascii_case("jpeg"));

    let id = if is_jpeg {
        framecast::read_still_identifier(&args.path)?
    } else {
        let backend = framecast::create_backend(args.backend.into());
        let info = backend
            .probe(&args.path)
            .with_context(|| format!("probe '{}'", args.path.display()))?;
        info.content_identifier().map(str::to_string)
    };

    match id {
        Some(id) => println!("{id}"),
        None => anyhow::bail!("'{}' carries no pairing identifier", args.path.display()),
    }
    Ok(())
}
