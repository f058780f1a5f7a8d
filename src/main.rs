use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use orthoblend::pipeline::{self, PipelineConfig};

/// Stitch a directory of georeferenced raster tiles into one seamless
/// composite.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The directory containing the world files and their TIFF rasters.
    input_dir: PathBuf,

    /// The path to save the blended composite.
    output: PathBuf,

    /// Number of pyramid bands (0 disables multi-band blending).
    #[arg(long, default_value_t = 14, value_parser = clap::value_parser!(u32).range(0..=50))]
    num_bands: u32,

    /// Feather distance in pixels for validity-mask weight ramps.
    #[arg(long, default_value_t = 512.0)]
    feather_radius: f64,

    /// Half-width in pixels of the seam band between neighbouring tiles.
    #[arg(long, default_value_t = 20.0)]
    overlap_margin: f64,

    /// Blend with feathered weight masks only, skipping ownership masks.
    #[arg(long)]
    no_voronoi: bool,

    /// Write the per-tile weight and blend masks next to the output.
    #[arg(long)]
    debug: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    if args.feather_radius < 0.0 || args.overlap_margin < 0.0 {
        eprintln!("feather radius and overlap margin must be non-negative");
        return ExitCode::FAILURE;
    }

    let config = PipelineConfig {
        num_bands: args.num_bands,
        feather_radius: args.feather_radius,
        overlap_margin: args.overlap_margin,
        use_voronoi: !args.no_voronoi,
        debug: args.debug,
    };

    match pipeline::run(&args.input_dir, &args.output, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("{error}");
            ExitCode::FAILURE
        }
    }
}
