//! Blind tip estimation demo on a synthetic scan
//!
//! Builds a 200x200 surface at 2 nm pitch with:
//! - Gentle sinusoidal background (amplitude 5 nm)
//! - Sharp single-pixel spikes (60 nm) that image the whole tip
//!
//! Scans it with a rounded contact-mode pyramid, then recovers the tip
//! blindly from the image alone and writes each stage to TIFF:
//!   1. surface.tif        : the synthetic ground truth
//!   2. true_tip.tif       : the model tip used for scanning
//!   3. image.tif          : simulated scan (dilation)
//!   4. estimated_tip.tif  : blind estimate from the image
//!   5. reconstructed.tif  : erosion of the image by the estimate
//!   6. certainty.tif      : pixels reconstructed with a single contact
//!
//! Run:
//!   cargo run -p tipmorph-algorithms --example blind_tip_demo

use std::fs;
use std::path::Path;

use tipmorph_algorithms::morphology::CertaintyParams;
use tipmorph_algorithms::tip::{
    blind_estimate, reconstruct_surface, simulate_scan, tip_certainty_map, tip_model_with_resolution,
    tip_radius, BlindParams, EstimateMethod, TipModel, TipModelParams,
};
use tipmorph_core::io::write_tiff;
use tipmorph_core::{Calibration, Raster, RasterElement, Silent};

const ROWS: usize = 200;
const COLS: usize = 200;
const PITCH: f64 = 2e-9;
const TIP_SIZE: usize = 21;

fn main() {
    let out_dir = Path::new("output/blind_tip_demo");
    fs::create_dir_all(out_dir).expect("Cannot create output directory");

    // --- 1. Ground truth ---
    let surface = build_synthetic_surface();
    println!("Synthetic surface: {}x{} at {} nm pitch", COLS, ROWS, PITCH * 1e9);
    print_stats("  surface", &surface);
    save(out_dir, "surface.tif", &surface);

    // --- 2. Model tip ---
    let model_params = TipModelParams {
        height: 40e-9,
        radius: 10e-9,
        rotation: 0.0,
    };
    let pitch = Calibration::new(PITCH, PITCH);
    let true_tip = tip_model_with_resolution(&TipModel::Contact, &pitch, &model_params, TIP_SIZE, TIP_SIZE)
        .expect("tip model failed");
    print_stats("  true tip", &true_tip);
    save(out_dir, "true_tip.tif", &true_tip);

    // --- 3. Scan ---
    let image = simulate_scan(&true_tip, &surface).expect("scan simulation failed");
    print_stats("  image", &image);
    save(out_dir, "image.tif", &image);

    // --- 4. Blind estimation from a flat start ---
    let mut start = Raster::filled(TIP_SIZE, TIP_SIZE, 0.0);
    start.set_calibration(pitch);
    let params = BlindParams {
        method: EstimateMethod::partial(),
        ..Default::default()
    };
    let result = blind_estimate(&start, &image, &params, &mut Silent).expect("blind estimation failed");
    println!(
        "\nEstimation: {} passes, refinements per pass {:?}",
        result.report.iterations, result.report.counts
    );
    print_stats("  estimate", &result.tip);
    save(out_dir, "estimated_tip.tif", &result.tip);

    // --- 5. Reconstruction ---
    let recon = reconstruct_surface(&result.tip, &image).expect("reconstruction failed");
    print_stats("  recon", &recon);
    save(out_dir, "reconstructed.tif", &recon);

    // --- 6. Certainty ---
    let cmap = tip_certainty_map(&result.tip, &image, &CertaintyParams::default())
        .expect("certainty map failed");
    let certain = cmap.data().iter().filter(|&&v| v == 1).count();
    println!("  certain     {} of {} pixels", certain, ROWS * COLS);
    save(out_dir, "certainty.tif", &cmap);

    println!("\n6 TIFF files written to {}/", out_dir.display());

    // --- 7. Compare tips ---
    verify_estimate(&true_tip, &result.tip);
}

/// Background waves plus deterministic spikes.
fn build_synthetic_surface() -> Raster<f64> {
    let mut surface = Raster::new(ROWS, COLS);
    surface.set_calibration(Calibration::new(PITCH, PITCH));

    for r in 0..ROWS {
        for c in 0..COLS {
            let v = 5e-9 * ((r as f64 / 17.0).sin() * (c as f64 / 23.0).cos());
            surface.set(r, c, v).unwrap();
        }
    }

    // Spikes at positions from a simple LCG, kept clear of the border
    let mut seed: u64 = 42;
    let margin = TIP_SIZE;
    for _ in 0..12 {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
        let r = margin + ((seed >> 33) as usize) % (ROWS - 2 * margin);
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
        let c = margin + ((seed >> 33) as usize) % (COLS - 2 * margin);
        surface.set(r, c, 60e-9).unwrap();
    }

    surface
}

fn print_stats(label: &str, raster: &Raster<f64>) {
    let s = raster.statistics();
    println!(
        "{:<12} min={:>8.2} nm  max={:>8.2} nm  mean={:>8.2} nm",
        label,
        s.min.unwrap_or(f64::NAN) * 1e9,
        s.max.unwrap_or(f64::NAN) * 1e9,
        s.mean.unwrap_or(f64::NAN) * 1e9,
    );
}

fn save<T: RasterElement>(dir: &Path, name: &str, raster: &Raster<T>) {
    let path = dir.join(name);
    write_tiff(raster, &path, None).unwrap_or_else(|e| panic!("Failed to write {}: {}", path.display(), e));
}

/// Compare the estimate against the true tip, both shifted to a zero apex.
fn verify_estimate(truth: &Raster<f64>, estimate: &Raster<f64>) {
    println!("\n--- Verification ---");

    let shift = |t: &Raster<f64>| {
        let mut t = t.clone();
        let max = t.max();
        t.add_scalar(-max);
        t
    };
    let truth = shift(truth);
    let estimate = shift(estimate);

    let mut below = 0usize;
    let mut worst = 0.0f64;
    for (e, t) in estimate.data().iter().zip(truth.data().iter()) {
        if *e < *t - 1e-11 {
            below += 1;
        }
        worst = worst.max((e - t).abs());
    }

    println!("  largest deviation   {:.3} nm", worst * 1e9);
    println!("  pixels below truth  {}", below);
    match (tip_radius(&truth), tip_radius(&estimate)) {
        (Some(a), Some(b)) => println!("  apex radius         {:.2} nm (true {:.2} nm)", b * 1e9, a * 1e9),
        _ => println!("  apex radius         not fitted"),
    }
}
