//! tipmorph CLI - blind tip estimation and tip morphology for SPM scans

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use tipmorph_algorithms::morphology::CertaintyParams;
use tipmorph_algorithms::tip::{
    blind_estimate, blind_estimate_stripes, reconstruct_surface, simulate_scan, tip_certainty_map,
    tip_model, tip_model_with_resolution, tip_radius, BlindParams, EstimateMethod, EstimateReport,
    StripeSummary, TipModel, TipModelParams,
};
use tipmorph_core::io::{read_tiff, write_tiff};
use tipmorph_core::{Calibration, Progress, Raster, RasterElement};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "tipmorph")]
#[command(author, version, about = "Blind tip estimation and tip-surface morphology", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show information about a height field
    Info {
        /// Input TIFF file
        input: PathBuf,
    },
    /// Simulate scanning a surface with a tip (dilation)
    Dilate {
        /// Tip height field
        #[arg(short, long)]
        tip: PathBuf,
        /// Surface height field
        surface: PathBuf,
        /// Output image
        output: PathBuf,
    },
    /// Reconstruct the surface under an image (erosion)
    Erode {
        /// Tip height field
        #[arg(short, long)]
        tip: PathBuf,
        /// Measured image
        image: PathBuf,
        /// Output surface
        output: PathBuf,
    },
    /// Mark pixels reconstructed with a single tip contact
    Cmap {
        /// Tip height field
        #[arg(short, long)]
        tip: PathBuf,
        /// Measured image
        image: PathBuf,
        /// Output mask (1 = certain)
        output: PathBuf,
        /// Touch tolerance in height units (default: 1% of the image range)
        #[arg(long)]
        tolerance: Option<f64>,
    },
    /// Estimate the tip blindly from an image
    Estimate {
        /// Measured image
        image: PathBuf,
        /// Output tip (with --stripes, one file per stripe)
        output: PathBuf,
        /// Outer loop strategy
        #[arg(short, long, value_enum, default_value = "partial")]
        method: Method,
        /// Stop partial estimation once at most this many locations refine
        #[arg(long, default_value = "20")]
        max_count: usize,
        /// Noise threshold in height units
        #[arg(long, default_value = "0.0")]
        threshold: f64,
        /// Also use locations near the image border
        #[arg(long, default_value = "true", action = ArgAction::Set)]
        use_edges: bool,
        /// Tip size in pixels, COLSxROWS
        #[arg(long, default_value = "10x10")]
        size: String,
        /// Starting tip (default: flat tip of --size)
        #[arg(long)]
        start: Option<PathBuf>,
        /// Estimate one tip per horizontal stripe
        #[arg(long)]
        stripes: Option<usize>,
        /// Run on raw heights instead of integer levels
        #[arg(long)]
        no_quantize: bool,
        /// Write a JSON report
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Generate a model tip
    Model {
        /// Output tip
        output: PathBuf,
        /// Tip shape
        #[arg(short, long, value_enum, default_value = "pyramid")]
        preset: Preset,
        /// Number of pyramid sides
        #[arg(long, default_value = "4")]
        sides: u32,
        /// Pyramid half-angle in degrees
        #[arg(long, default_value = "54.73561032")]
        angle: f64,
        /// Apex radius in metres
        #[arg(short, long, default_value = "200e-9")]
        radius: f64,
        /// Tip height in metres (default: range of --surface)
        #[arg(long)]
        height: Option<f64>,
        /// Rotation about the tip axis in degrees
        #[arg(long, default_value = "0.0")]
        rotation: f64,
        /// Surface whose pitch (and height range) the tip should match
        #[arg(short, long)]
        surface: Option<PathBuf>,
        /// Pixel pitch in metres when no surface is given
        #[arg(long, default_value = "1e-9")]
        pitch: f64,
        /// Tip size in pixels, COLSxROWS (default: guessed from the shape)
        #[arg(long)]
        size: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Method {
    Full,
    Partial,
}

#[derive(Clone, Copy, ValueEnum)]
enum Preset {
    Pyramid,
    Contact,
    Noncontact,
    Delta,
}

// ─── Reports ────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct EstimateSummary {
    cols: usize,
    rows: usize,
    radius: Option<f64>,
    report: EstimateReport,
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("Logging was already initialised");
    }
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Progress bar receiving estimator progress
struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    const STEPS: u64 = 1000;

    fn new() -> Self {
        let bar = ProgressBar::new(Self::STEPS);
        if let Ok(style) = ProgressStyle::default_bar().template("{bar:40.cyan/blue} {percent:>3}% {msg}") {
            bar.set_style(style);
        }
        Self { bar }
    }
}

impl Progress for BarProgress {
    fn set_message(&mut self, message: &str) -> ControlFlow<()> {
        self.bar.set_message(message.to_string());
        ControlFlow::Continue(())
    }

    fn set_fraction(&mut self, fraction: f64) -> ControlFlow<()> {
        self.bar.set_position((fraction.clamp(0.0, 1.0) * Self::STEPS as f64) as u64);
        ControlFlow::Continue(())
    }
}

fn read_field(path: &Path) -> Result<Raster<f64>> {
    let pb = spinner("Reading field...");
    let field: Raster<f64> =
        read_tiff(path).with_context(|| format!("Failed to read {}", path.display()))?;
    pb.finish_and_clear();
    info!("Input: {} x {}", field.cols(), field.rows());
    Ok(field)
}

fn write_result<T: RasterElement>(field: &Raster<T>, path: &Path) -> Result<()> {
    let pb = spinner("Writing output...");
    write_tiff(field, path, None).with_context(|| format!("Failed to write {}", path.display()))?;
    pb.finish_and_clear();
    Ok(())
}

fn write_report<S: Serialize>(report: &S, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialise report")?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

fn done(name: &str, path: &Path, elapsed: std::time::Duration) {
    println!("{} saved to: {} ({:.2?})", name, path.display(), elapsed);
}

fn parse_size(s: &str) -> Result<(usize, usize)> {
    let (cols, rows) = s
        .split_once(['x', 'X'])
        .with_context(|| format!("Size must be COLSxROWS, got '{}'", s))?;
    let cols: usize = cols.trim().parse().context("Invalid column count")?;
    let rows: usize = rows.trim().parse().context("Invalid row count")?;
    if cols == 0 || rows == 0 {
        bail!("Tip size must be positive, got {}x{}", cols, rows);
    }
    Ok((cols, rows))
}

/// `tip.tif` -> `tip_stripe03.tif`
fn stripe_path(output: &Path, index: usize) -> PathBuf {
    let stem = output.file_stem().and_then(|s| s.to_str()).unwrap_or("tip");
    let ext = output.extension().and_then(|s| s.to_str()).unwrap_or("tif");
    output.with_file_name(format!("{}_stripe{:02}.{}", stem, index, ext))
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        // ── Info ─────────────────────────────────────────────────────
        Commands::Info { input } => {
            let field = read_field(&input)?;
            let (rows, cols) = field.shape();
            let cal = field.calibration();
            let stats = field.statistics();

            println!("File: {}", input.display());
            println!("Dimensions: {} x {} ({} samples)", cols, rows, field.len());
            println!("Pixel pitch: {:e} x {:e}", cal.dx, cal.dy);
            println!("Physical size: {:e} x {:e}", field.xreal(), field.yreal());
            println!("Origin: ({:e}, {:e})", cal.origin_x, cal.origin_y);
            println!("\nStatistics:");
            if let Some(min) = stats.min {
                println!("  Min: {:e}", min);
            }
            if let Some(max) = stats.max {
                println!("  Max: {:e}", max);
            }
            if let Some(mean) = stats.mean {
                println!("  Mean: {:e}", mean);
            }
        }

        // ── Morphology ───────────────────────────────────────────────
        Commands::Dilate { tip, surface, output } => {
            let tip = read_field(&tip)?;
            let surface = read_field(&surface)?;
            let start = Instant::now();
            let result = simulate_scan(&tip, &surface).context("Failed to simulate scan")?;
            let elapsed = start.elapsed();
            write_result(&result, &output)?;
            done("Simulated image", &output, elapsed);
        }

        Commands::Erode { tip, image, output } => {
            let tip = read_field(&tip)?;
            let image = read_field(&image)?;
            let start = Instant::now();
            let result = reconstruct_surface(&tip, &image).context("Failed to reconstruct surface")?;
            let elapsed = start.elapsed();
            write_result(&result, &output)?;
            done("Reconstructed surface", &output, elapsed);
        }

        Commands::Cmap {
            tip,
            image,
            output,
            tolerance,
        } => {
            let tip = read_field(&tip)?;
            let image = read_field(&image)?;
            let start = Instant::now();
            let result = tip_certainty_map(&tip, &image, &CertaintyParams { tolerance })
                .context("Failed to compute certainty map")?;
            let elapsed = start.elapsed();
            let certain = result.data().iter().filter(|&&v| v == 1).count();
            info!("{} of {} pixels certain", certain, result.len());
            write_result(&result, &output)?;
            done("Certainty map", &output, elapsed);
        }

        // ── Estimation ───────────────────────────────────────────────
        Commands::Estimate {
            image,
            output,
            method,
            max_count,
            threshold,
            use_edges,
            size,
            start,
            stripes,
            no_quantize,
            report,
        } => {
            let image = read_field(&image)?;
            let tip = match start {
                Some(path) => read_field(&path)?,
                None => {
                    let (cols, rows) = parse_size(&size)?;
                    let mut tip = Raster::try_filled(rows, cols, 0.0).context("Cannot allocate tip")?;
                    let cal = image.calibration();
                    tip.set_calibration(Calibration::new(cal.dx, cal.dy));
                    tip
                }
            };
            let params = BlindParams {
                threshold,
                use_edges,
                method: match method {
                    Method::Full => EstimateMethod::Full,
                    Method::Partial => EstimateMethod::Partial { max_count },
                },
                quantize: !no_quantize,
                ..Default::default()
            };

            let mut progress = BarProgress::new();
            let t0 = Instant::now();
            match stripes {
                None => {
                    let result = blind_estimate(&tip, &image, &params, &mut progress)
                        .context("Blind estimation failed")?;
                    progress.bar.finish_and_clear();
                    let elapsed = t0.elapsed();
                    let radius = tip_radius(&result.tip);
                    if let Some(r) = radius {
                        info!("Apex radius: {:e}", r);
                    }
                    write_result(&result.tip, &output)?;
                    if let Some(path) = report {
                        let summary = EstimateSummary {
                            cols: result.tip.cols(),
                            rows: result.tip.rows(),
                            radius,
                            report: result.report,
                        };
                        write_report(&summary, &path)?;
                    }
                    done("Estimated tip", &output, elapsed);
                }
                Some(n) => {
                    let tips = blind_estimate_stripes(&tip, &image, n, &params, &mut progress)
                        .context("Stripe estimation failed")?;
                    progress.bar.finish_and_clear();
                    let elapsed = t0.elapsed();
                    for (i, stripe) in tips.iter().enumerate() {
                        let path = stripe_path(&output, i);
                        write_result(&stripe.tip, &path)?;
                        println!(
                            "Stripe {:>2}: rows {}..{}  good={}  radius={}",
                            i,
                            stripe.row,
                            stripe.row + stripe.height,
                            stripe.good,
                            stripe.radius.map_or("-".to_string(), |r| format!("{:e}", r)),
                        );
                    }
                    if let Some(path) = report {
                        let summaries: Vec<StripeSummary> = tips.iter().map(StripeSummary::from).collect();
                        write_report(&summaries, &path)?;
                    }
                    done("Stripe tips", &output, elapsed);
                }
            }
        }

        // ── Models ───────────────────────────────────────────────────
        Commands::Model {
            output,
            preset,
            sides,
            angle,
            radius,
            height,
            rotation,
            surface,
            pitch,
            size,
        } => {
            let (cal, mut params) = match surface {
                Some(path) => {
                    let surface = read_field(&path)?;
                    let cal = *surface.calibration();
                    (Calibration::new(cal.dx, cal.dy), TipModelParams::for_surface(&surface))
                }
                None => (Calibration::new(pitch, pitch), TipModelParams::default()),
            };
            params.radius = radius;
            params.rotation = rotation.to_radians();
            if let Some(h) = height {
                params.height = h;
            }
            let model = match preset {
                Preset::Pyramid => TipModel::Pyramid {
                    sides,
                    angle: angle.to_radians(),
                },
                Preset::Contact => TipModel::Contact,
                Preset::Noncontact => TipModel::NonContact,
                Preset::Delta => TipModel::Delta,
            };

            let start = Instant::now();
            let tip = match size {
                Some(s) => {
                    let (cols, rows) = parse_size(&s)?;
                    tip_model_with_resolution(&model, &cal, &params, cols, rows)
                }
                None => tip_model(&model, &cal, &params),
            }
            .context("Failed to create tip model")?;
            let elapsed = start.elapsed();
            info!("Tip: {} x {}", tip.cols(), tip.rows());
            write_result(&tip, &output)?;
            done("Model tip", &output, elapsed);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("12x9").unwrap(), (12, 9));
        assert_eq!(parse_size("5X5").unwrap(), (5, 5));
        assert!(parse_size("12").is_err());
        assert!(parse_size("0x4").is_err());
    }

    #[test]
    fn test_stripe_path() {
        let p = stripe_path(Path::new("/tmp/out/tip.tif"), 3);
        assert_eq!(p, PathBuf::from("/tmp/out/tip_stripe03.tif"));
    }

    #[test]
    fn test_cli_parses_estimate() {
        let cli = Cli::try_parse_from([
            "tipmorph", "estimate", "img.tif", "tip.tif", "--method", "full", "--use-edges", "false",
            "--stripes", "4",
        ])
        .unwrap();
        match cli.command {
            Commands::Estimate {
                use_edges, stripes, ..
            } => {
                assert!(!use_edges);
                assert_eq!(stripes, Some(4));
            }
            _ => panic!("wrong subcommand"),
        }
    }
}
