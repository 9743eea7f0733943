// ----------------------------------- CLI -----------------------------------
use std::path::PathBuf;

use clap::Parser;

use tomosim::filter::ReconstructionFilter;

#[derive(Parser, Debug, Clone)]
#[command(name = "scan", about = "Simulate a tomographic scan and reconstruct the image")]
pub struct Cli {
    /// Scanner and phantom description (TOML)
    #[arg(short, long)]
    pub config: PathBuf,

    /// Directory where the grid files are written
    #[arg(short, long, default_value = "data/out")]
    pub out_dir: PathBuf,

    /// Reconstruction filter: ram-lak, shepp-logan or constant
    #[arg(short, long, default_value = "ram-lak")]
    pub filter: ReconstructionFilter,

    /// Maximum number of rayon threads; 0 lets rayon decide
    #[arg(short = 'j', long, default_value = "4")]
    pub num_threads: usize,

    /// Seed for the transport random streams
    #[arg(short, long, default_value = "0")]
    pub seed: u64,
}

// --------------------------------------------------------------------------------

use std::error::Error;
use std::fs::create_dir_all;
use std::time::Instant;

use tomosim::backprojection::Backprojection;
use tomosim::config::read_config_file;
use tomosim::filter::FilteredProjections;
use tomosim::gantry::Gantry;
use tomosim::io;
use tomosim::progress::ConsoleProgress;
use tomosim::transport::RayTransportSimulation;
use tomosim::{FrameRegistry, GLOBAL_FRAME};

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Cli::parse();

    rayon::ThreadPoolBuilder::new()
        .num_threads(args.num_threads)
        .build_global()?;

    let mut now = Instant::now();
    let mut report_time = |message: &str| {
        println!("{}: {} ms", message, now.elapsed().as_millis());
        now = Instant::now();
    };

    let config = read_config_file(&args.config)?;
    create_dir_all(&args.out_dir)?;
    report_time("Loaded configuration");

    let mut registry = FrameRegistry::new();
    let model = config.model.build(GLOBAL_FRAME);
    let mut gantry = Gantry::new(&mut registry, &config.tube,
                                 &config.projections, &config.detector)?;
    report_time("Built phantom and gantry");

    let progress = ConsoleProgress::new(1);
    let simulation = RayTransportSimulation::new(
        &model, &config.tube, &config.tomography, &config.detector, args.seed);
    let projections = simulation.project(
        &mut registry, &mut gantry, &config.projections, &progress)?;
    progress.finish();
    io::write_projections(&projections, &args.out_dir.join("projections.bin"))?;
    report_time("Simulated projections");

    let filtered = FilteredProjections::new(&projections, args.filter);
    io::write_filtered(&filtered, &args.out_dir.join("filtered.bin"))?;
    report_time(&format!("Filtered sinogram ({})", args.filter));

    let image = Backprojection::new(&filtered);
    io::write_backprojection(&image, &args.out_dir.join("backprojection.bin"))?;
    report_time("Backprojected image");

    let ((mx, my), peak) = image.max_pixel();
    let (x, y) = image.pixel_centre(mx, my);
    println!("Peak reconstruction value {peak:.4} at pixel ({mx}, {my}) = ({x:.1} mm, {y:.1} mm)");

    Ok(())
}
