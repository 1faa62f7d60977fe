use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about = "View a GLB model with stencil shadow volumes")]
struct Args {
    /// Binary glTF file to display
    model: PathBuf,

    /// JSON options file (see `umbra::Options`)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Shadow-volume capacity as a multiple of the vertex count
    #[arg(long)]
    multiplier: Option<u32>,

    /// Light position in world space: x,y,z
    #[arg(long, value_parser = parse_vec3)]
    light: Option<umbra::Vec3>,

    /// Point the camera at the model bounds instead of the configured eye
    #[arg(long)]
    fit: bool,

    /// Read shadow-volume counters back every frame and warn on overflow
    #[arg(long)]
    diagnostics: bool,

    /// Window width in logical pixels
    #[arg(long)]
    width: Option<u32>,

    /// Window height in logical pixels
    #[arg(long)]
    height: Option<u32>,
}

fn parse_vec3(s: &str) -> Result<umbra::Vec3, String> {
    let parts: Vec<f32> = s
        .split(',')
        .map(|p| p.trim().parse::<f32>().map_err(|e| format!("{p:?}: {e}")))
        .collect::<Result<_, _>>()?;
    match parts.as_slice() {
        [x, y, z] => Ok(umbra::Vec3::new(*x, *y, *z)),
        _ => Err(format!("expected x,y,z, got {s:?}")),
    }
}

fn main() -> umbra::Result<()> {
    umbra::init_logging();
    let args = Args::parse();

    let mut options = umbra::load_options(args.config.as_deref())?;
    if let Some(multiplier) = args.multiplier {
        options.volume.multiplier = multiplier;
    }
    if let Some(light) = args.light {
        options.light.position = light;
    }
    if args.fit {
        options.camera.fit_to_model = true;
    }
    if args.diagnostics {
        options.volume.diagnostics = true;
    }
    if let Some(width) = args.width {
        options.window_width = width;
    }
    if let Some(height) = args.height {
        options.window_height = height;
    }

    let bytes = umbra::read_file(&args.model)?;
    // Fail on a malformed file before any window opens.
    umbra::decode_model(&bytes)?;
    log::info!("viewing {}", args.model.display());
    umbra::show(options, bytes)
}
