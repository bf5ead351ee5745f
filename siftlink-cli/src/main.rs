//! siftlink CLI entrypoint.
//!
//! ```bash
//! siftlink probe --json
//! siftlink detect --image frame.png --json --keypoints
//! siftlink match --left a.png --right b.png --ratio-max 0.7 --json
//! SIFTLINK_MODULE=/opt/siftgpu/lib/libsiftgpu.so siftlink probe
//! ```

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use tracing::info;

use siftlink_core::config::{MatchParams, SessionConfig};
use siftlink_core::error::{BridgeError, Result};
use siftlink_core::types::{ElementType, Features, HostArray, Keypoint};
use siftlink_session::Session;

const JSON_SCHEMA_VERSION: u32 = 1;

#[derive(Parser, Debug)]
#[command(
    name = "siftlink",
    version,
    about = "GPU SIFT detection and matching through the SiftGPU engine",
    arg_required_else_help = true,
    after_help = "Examples:\n  siftlink probe --json\n  siftlink detect --image frame.png --keypoints --json\n  siftlink match --left a.png --right b.png --json"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load the engine, configure a session and report its state.
    Probe(ProbeArgs),
    /// Detect keypoints and compute descriptors on one image.
    Detect(DetectArgs),
    /// Detect on two images and match their descriptors.
    Match(MatchArgs),
}

#[derive(Args, Debug, Clone)]
struct SessionArgs {
    /// JSON session configuration file. Flags override its values.
    #[arg(long = "config")]
    config: Option<PathBuf>,

    /// Engine module path (overrides SIFTLINK_MODULE).
    #[arg(long = "module")]
    module: Option<PathBuf>,

    /// Feature cap forwarded to the engine (0 = unbounded).
    #[arg(long = "max-features")]
    max_features: Option<u32>,

    /// DOG levels per octave.
    #[arg(long = "octave-layers")]
    octave_layers: Option<i32>,

    /// Contrast threshold.
    #[arg(long = "contrast-threshold")]
    contrast_threshold: Option<f32>,

    /// Edge threshold.
    #[arg(long = "edge-threshold")]
    edge_threshold: Option<f32>,

    /// Do not construct the matcher.
    #[arg(long = "no-match", default_value_t = false)]
    no_match: bool,

    /// Emit machine-readable JSON on stdout.
    #[arg(long = "json", default_value_t = false)]
    json: bool,
}

#[derive(Args, Debug, Clone)]
struct ProbeArgs {
    #[command(flatten)]
    session: SessionArgs,
}

#[derive(Args, Debug, Clone)]
struct DetectArgs {
    #[command(flatten)]
    session: SessionArgs,

    /// Input image (decoded to a single channel).
    #[arg(short = 'i', long = "image")]
    image: PathBuf,

    /// Include every keypoint in the output.
    #[arg(long = "keypoints", default_value_t = false)]
    keypoints: bool,
}

#[derive(Args, Debug, Clone)]
struct MatchArgs {
    #[command(flatten)]
    session: SessionArgs,

    /// First image.
    #[arg(long = "left")]
    left: PathBuf,

    /// Second image.
    #[arg(long = "right")]
    right: PathBuf,

    /// Maximum descriptor distance.
    #[arg(long = "distance-max", default_value_t = MatchParams::default().distance_max)]
    distance_max: f32,

    /// Maximum best/second-best distance ratio.
    #[arg(long = "ratio-max", default_value_t = MatchParams::default().ratio_max)]
    ratio_max: f32,

    /// Accept one-directional best matches too.
    #[arg(long = "no-mutual", default_value_t = false)]
    no_mutual: bool,
}

fn main() {
    init_tracing();

    let cli = Cli::parse();
    let json_error_command = match &cli.command {
        Commands::Probe(args) if args.session.json => Some("probe"),
        Commands::Detect(args) if args.session.json => Some("detect"),
        Commands::Match(args) if args.session.json => Some("match"),
        _ => None,
    };

    let result = match cli.command {
        Commands::Probe(args) => run_probe(args),
        Commands::Detect(args) => run_detect(args),
        Commands::Match(args) => run_match(args),
    };

    match result {
        Ok(()) => std::process::exit(0),
        Err(err) => {
            if let Some(command) = json_error_command {
                println!("{}", command_error_json(command, &err));
            } else {
                tracing::error!(error = %err, code = err.error_code(), "Command failed");
            }
            std::process::exit(exit_status(&err));
        }
    }
}

fn init_tracing() {
    use std::io::IsTerminal;

    let ansi_enabled = std::env::var_os("NO_COLOR").is_none() && std::io::stderr().is_terminal();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_ansi(ansi_enabled)
        .init();
}

/// Process exit status: the error category (`error_code() / 100`). The full
/// code is carried in the JSON error line and the log record.
fn exit_status(err: &BridgeError) -> i32 {
    (err.error_code() / 100) as i32
}

fn command_error_json(command: &str, err: &BridgeError) -> String {
    json!({
        "schema_version": JSON_SCHEMA_VERSION,
        "command": command,
        "ok": false,
        "error": err.to_string(),
        "code": err.error_code(),
    })
    .to_string()
}

// ─── Session setup ──────────────────────────────────────────────────────

fn resolve_config(args: &SessionArgs) -> Result<SessionConfig> {
    let mut cfg = match &args.config {
        Some(path) => SessionConfig::from_json_file(path)?,
        None => SessionConfig::default(),
    };
    if let Some(module) = &args.module {
        cfg.module = Some(module.clone());
    }
    if let Some(v) = args.max_features {
        cfg.max_features = v;
    }
    if let Some(v) = args.octave_layers {
        cfg.octave_layers = v;
    }
    if let Some(v) = args.contrast_threshold {
        cfg.contrast_threshold = v;
    }
    if let Some(v) = args.edge_threshold {
        cfg.edge_threshold = v;
    }
    if args.no_match {
        cfg.enable_matching = false;
    }
    // A standalone process has no GL context of its own to share.
    cfg.share_caller_context = false;
    Ok(cfg)
}

fn open_session(cfg: SessionConfig) -> Result<Session> {
    let mut session = Session::native();
    session.configure(cfg)?;
    Ok(session)
}

// ─── Image loading ──────────────────────────────────────────────────────

/// Single-channel pixels in the narrowest supported element type.
enum LumaPixels {
    U8(Vec<u8>),
    U16(Vec<u16>),
    F32(Vec<f32>),
}

struct LumaImage {
    pixels: LumaPixels,
    width: usize,
    height: usize,
}

impl LumaImage {
    fn open(path: &Path) -> Result<Self> {
        use image::DynamicImage;

        let img = image::open(path)
            .map_err(|e| BridgeError::Image(format!("{}: {e}", path.display())))?;
        let (width, height) = (img.width() as usize, img.height() as usize);
        let pixels = match img {
            DynamicImage::ImageLuma8(buf) => LumaPixels::U8(buf.into_raw()),
            DynamicImage::ImageLuma16(buf) => LumaPixels::U16(buf.into_raw()),
            img @ (DynamicImage::ImageRgb32F(_) | DynamicImage::ImageRgba32F(_)) => {
                LumaPixels::F32(img.to_luma32f().into_raw())
            }
            img @ (DynamicImage::ImageLumaA16(_)
            | DynamicImage::ImageRgb16(_)
            | DynamicImage::ImageRgba16(_)) => LumaPixels::U16(img.to_luma16().into_raw()),
            other => LumaPixels::U8(other.to_luma8().into_raw()),
        };
        info!(
            image = %path.display(),
            width,
            height,
            dtype = %LumaImage::dtype_of(&pixels),
            "image decoded"
        );
        Ok(Self {
            pixels,
            width,
            height,
        })
    }

    fn dtype_of(pixels: &LumaPixels) -> ElementType {
        match pixels {
            LumaPixels::U8(_) => ElementType::Uint8,
            LumaPixels::U16(_) => ElementType::Uint16,
            LumaPixels::F32(_) => ElementType::Float32,
        }
    }

    fn as_host_array(&self) -> HostArray<'_> {
        let shape = [self.height, self.width];
        match &self.pixels {
            LumaPixels::U8(p) => HostArray::from_slice(p, &shape),
            LumaPixels::U16(p) => HostArray::from_slice(p, &shape),
            LumaPixels::F32(p) => HostArray::from_slice(p, &shape),
        }
    }

    fn summary(&self, path: &Path) -> ImageSummary {
        ImageSummary {
            path: path.display().to_string(),
            width: self.width,
            height: self.height,
            dtype: Self::dtype_of(&self.pixels),
        }
    }
}

#[derive(Serialize)]
struct ImageSummary {
    path: String,
    width: usize,
    height: usize,
    dtype: ElementType,
}

fn detect(session: &mut Session, path: &Path) -> Result<(ImageSummary, Features)> {
    let image = LumaImage::open(path)?;
    let features = session.detect_and_compute(&image.as_host_array())?;
    info!(image = %path.display(), features = features.len(), "detection finished");
    Ok((image.summary(path), features))
}

// ─── Commands ───────────────────────────────────────────────────────────

fn run_probe(args: ProbeArgs) -> Result<()> {
    let cfg = resolve_config(&args.session)?;
    let session = open_session(cfg)?;
    let module = session.module_name().unwrap_or_default();
    if args.session.json {
        println!(
            "{}",
            json!({
                "schema_version": JSON_SCHEMA_VERSION,
                "command": "probe",
                "ok": true,
                "state": session.state().as_str(),
                "module": module,
                "matching": session.has_matcher(),
                "shared_context": session.shares_caller_context(),
                "config": session.config(),
            })
        );
    } else {
        println!("state:    {}", session.state().as_str());
        println!("module:   {module}");
        println!("matching: {}", session.has_matcher());
    }
    Ok(())
}

fn run_detect(args: DetectArgs) -> Result<()> {
    let mut cfg = resolve_config(&args.session)?;
    cfg.enable_matching = false;
    let mut session = open_session(cfg)?;
    let (image, features) = detect(&mut session, &args.image)?;

    if args.session.json {
        let keypoints: Option<&[Keypoint]> = args.keypoints.then_some(features.keypoints.as_slice());
        println!(
            "{}",
            json!({
                "schema_version": JSON_SCHEMA_VERSION,
                "command": "detect",
                "ok": true,
                "image": image,
                "features": features.len(),
                "descriptor_shape": features.descriptors.shape(),
                "keypoints": keypoints,
            })
        );
    } else {
        println!(
            "{}: {}x{} {} -> {} features",
            image.path,
            image.width,
            image.height,
            image.dtype,
            features.len()
        );
        if args.keypoints {
            for (i, kp) in features.keypoints.iter().enumerate() {
                println!(
                    "{i:>5} x={:.2} y={:.2} scale={:.3} orientation={:.3}",
                    kp.x, kp.y, kp.scale, kp.orientation
                );
            }
        }
    }
    Ok(())
}

fn run_match(args: MatchArgs) -> Result<()> {
    let cfg = resolve_config(&args.session)?;
    if !cfg.enable_matching {
        return Err(BridgeError::MatcherUnavailable);
    }
    let params = MatchParams {
        distance_max: args.distance_max,
        ratio_max: args.ratio_max,
        mutual_best_match: !args.no_mutual,
    };
    let mut session = open_session(cfg)?;
    let (left_image, left) = detect(&mut session, &args.left)?;
    let (right_image, right) = detect(&mut session, &args.right)?;

    // Matching needs at least one descriptor on each side.
    let result = if left.is_empty() || right.is_empty() {
        Default::default()
    } else {
        session.match_features(&left, &right, &params)?
    };
    info!(matches = result.len(), "matching finished");

    if args.session.json {
        let pairs: Vec<[u32; 2]> = result.pairs().map(|(i, j)| [i, j]).collect();
        println!(
            "{}",
            json!({
                "schema_version": JSON_SCHEMA_VERSION,
                "command": "match",
                "ok": true,
                "left": { "image": left_image, "features": left.len() },
                "right": { "image": right_image, "features": right.len() },
                "params": params,
                "matches": result.len(),
                "pairs": pairs,
            })
        );
    } else {
        println!(
            "{} ({} features) <-> {} ({} features): {} matches",
            left_image.path,
            left.len(),
            right_image.path,
            right.len(),
            result.len()
        );
    }
    Ok(())
}
