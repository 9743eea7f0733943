//! End-to-end scans of a homogeneous cube phantom: simulate the sinogram,
//! filter it, backproject it, and check the reconstruction against the known
//! absorption coefficient.

use float_eq::assert_float_eq;

use tomosim::backprojection::Backprojection;
use tomosim::config::Config;
use tomosim::filter::{FilteredProjections, ReconstructionFilter};
use tomosim::gantry::Gantry;
use tomosim::progress::Silent;
use tomosim::projections::Projections;
use tomosim::transport::RayTransportSimulation;
use tomosim::{io, FrameRegistry, GLOBAL_FRAME};

const ABSORPTION: f32 = 0.03;

/// 6 mm homogeneous cube in a 20 mm field, monoenergetic beam at the
/// reference energy. 16 angles x 20 distances resolve the cube well enough
/// for quantitative reconstruction checks.
fn cube_config(scattering: bool) -> Config {
    toml::from_str::<Config>(&format!(r#"
        [tube]
        peak_energy = 100.0
        spectrum_bins = 1

        [projections]
        number_of_angles = 16
        number_of_distances = 20
        measuring_field_size = 20.0

        [detector]
        detector_focus_distance = 100.0

        [tomography]
        scattering = {scattering}

        [model]
        nvoxels = [6, 6, 6]
        voxel_size = [1.0, 1.0, 1.0]
        background_absorption = {ABSORPTION}
    "#)).unwrap().validated()
}

/// 3 mm cube in a 10 mm field at the minimal sampling: 8 angles x 5
/// distances. Too coarse for a quantitative estimate of the coefficient,
/// but the sinogram and the peak location are still exact.
fn coarse_cube_config() -> Config {
    toml::from_str::<Config>(&format!(r#"
        [tube]
        peak_energy = 100.0
        spectrum_bins = 1

        [projections]
        number_of_angles = 8
        number_of_distances = 5
        measuring_field_size = 10.0

        [detector]
        detector_focus_distance = 100.0

        [tomography]
        scattering = false

        [model]
        nvoxels = [3, 3, 3]
        voxel_size = [1.0, 1.0, 1.0]
        background_absorption = {ABSORPTION}
    "#)).unwrap().validated()
}

fn scan(config: &Config, seed: u64) -> Projections {
    let mut registry = FrameRegistry::new();
    let model = config.model.build(GLOBAL_FRAME);
    let mut gantry = Gantry::new(&mut registry, &config.tube,
                                 &config.projections, &config.detector).unwrap();
    let simulation = RayTransportSimulation::new(
        &model, &config.tube, &config.tomography, &config.detector, seed);
    simulation.project(&mut registry, &mut gantry, &config.projections, &Silent).unwrap()
}

#[test]
fn sinogram_follows_beer_lambert() {
    let config = cube_config(false);
    let sinogram = scan(&config, 0);

    assert_eq!(sinogram.n_angles(), 16);
    assert_eq!(sinogram.n_distances(), 20);

    // Central rays cross the full 6 mm of material: ln(I0/I) = mu * 6,
    // with a sub-percent excess from the fan-beam slant
    for i in [9, 10] {
        assert_float_eq!(sinogram.value(0, i), ABSORPTION * 6.0, rmax <= 2e-3);
    }
    // Rays outside the cube's shadow are unattenuated
    for i in (0..7).chain(13..20) {
        assert_float_eq!(sinogram.value(0, i), 0.0, abs <= 1e-4);
    }
    // The phantom is symmetric about the rotation axis, so the sinogram
    // column is symmetric about its centre
    for i in 0..10 {
        assert_float_eq!(sinogram.value(0, i), sinogram.value(0, 19 - i), abs <= 1e-3);
    }
}

#[test]
fn quarter_turn_sees_the_same_cube() {
    let config = cube_config(false);
    let sinogram = scan(&config, 0);
    // 16 angles over half a turn: frame 8 looks along x instead of y, and
    // the cube phantom is invariant under that rotation
    for i in 0..20 {
        assert_float_eq!(sinogram.value(0, i), sinogram.value(8, i), abs <= 1e-3);
    }
}

#[test]
fn reconstruction_recovers_the_absorption_coefficient() {
    let config = cube_config(false);
    let sinogram = scan(&config, 0);
    let filtered = FilteredProjections::new(&sinogram, ReconstructionFilter::RamLak);
    let image = Backprojection::new(&filtered);

    let n = image.side();
    assert_eq!(n, 14);

    // The four pixels around the origin sit deep inside the cube; filtered
    // backprojection recovers the absorption coefficient there
    for (ix, iy) in [(6, 6), (6, 7), (7, 6), (7, 7)] {
        assert_float_eq!(image.value(ix, iy), ABSORPTION, rmax <= 0.1);
    }

    // Far outside the cube the image returns to (nearly) zero
    assert_float_eq!(image.value(0, 0), 0.0, abs <= 2e-3);

    // The brightest pixel lies within the cube's footprint (|x|, |y| < 3 mm)
    let ((mx, my), peak) = image.max_pixel();
    assert!((4..=9).contains(&mx) && (4..=9).contains(&my),
            "peak at ({mx}, {my}) outside the cube footprint");
    assert!(peak < 2.0 * ABSORPTION);
}

#[test]
fn shepp_logan_filter_also_recovers_the_coefficient() {
    let config = cube_config(false);
    let sinogram = scan(&config, 0);
    let filtered = FilteredProjections::new(&sinogram, ReconstructionFilter::SheppLogan);
    let image = Backprojection::new(&filtered);
    for (ix, iy) in [(6, 6), (6, 7), (7, 6), (7, 7)] {
        assert_float_eq!(image.value(ix, iy), ABSORPTION, rmax <= 0.1);
    }
}

#[test]
fn diagonal_views_of_the_coarse_scan_measure_the_diagonal_chord() {
    // With 5 distances the central ray of the 45 and 135 degree frames runs
    // corner to corner through the cube. Its value is mu times the diagonal
    // chord; no ray may be lost to the corner crossings
    let config = coarse_cube_config();
    let sinogram = scan(&config, 0);

    let chord = 3.0 * std::f32::consts::SQRT_2;
    for frame in [2, 6] {
        assert_float_eq!(sinogram.value(frame, 2), ABSORPTION * chord, rmax <= 2e-3);
    }
    // A lost ray shows up as a huge clamped-intensity value
    for a in 0..8 {
        for i in 0..5 {
            let v = sinogram.value(a, i);
            assert!(v.is_finite() && v < 1.0, "implausible value {v} at ({a}, {i})");
        }
    }
}

#[test]
fn coarse_scan_reconstruction_peaks_at_the_cube_centre() {
    let config = coarse_cube_config();
    let sinogram = scan(&config, 0);
    let filtered = FilteredProjections::new(&sinogram, ReconstructionFilter::RamLak);
    let image = Backprojection::new(&filtered);

    assert_eq!(image.side(), 4);

    // The peak stays within one pixel of the origin even at this sampling
    let ((mx, my), _) = image.max_pixel();
    assert!((1..=2).contains(&mx) && (1..=2).contains(&my),
            "peak at ({mx}, {my}) away from the cube centre");

    // The 2 mm distance resolution under-resolves the 3 mm cube: the edge
    // rolloff of the filtered rows reaches the centre pixels, which sit only
    // 0.5 mm inside the cube, so they recover about half of mu. The peak
    // location survives the coarse sampling; the amplitude does not.
    for (ix, iy) in [(1, 1), (1, 2), (2, 1), (2, 2)] {
        assert_float_eq!(image.value(ix, iy), 0.0155, rmax <= 5e-2);
    }
    // Corner pixels lie outside the cube and fall well below the peak
    assert!(image.value(0, 0) < 0.005);
}

#[test]
fn scattering_perturbs_but_does_not_break_the_sinogram() {
    let config = cube_config(true);
    let sinogram = scan(&config, 1);
    for a in 0..sinogram.n_angles() {
        for i in 0..sinogram.n_distances() {
            assert!(sinogram.value(a, i).is_finite());
        }
    }
    // Attenuation through the cube still dominates the central rays
    assert!(sinogram.value(0, 9) > 0.05);
    assert!(sinogram.value(0, 10) > 0.05);
}

#[test]
fn all_three_grids_survive_a_disk_roundtrip() {
    let config = cube_config(false);
    let sinogram = scan(&config, 0);
    let filtered = FilteredProjections::new(&sinogram, ReconstructionFilter::RamLak);
    let image = Backprojection::new(&filtered);

    let dir = tempfile::tempdir().unwrap();
    let p_path = dir.path().join("projections.bin");
    let f_path = dir.path().join("filtered.bin");
    let b_path = dir.path().join("backprojection.bin");

    io::write_projections(&sinogram, &p_path).unwrap();
    io::write_filtered(&filtered, &f_path).unwrap();
    io::write_backprojection(&image, &b_path).unwrap();

    assert_eq!(io::read_projections(&p_path).unwrap(), sinogram);
    assert_eq!(io::read_filtered(&f_path).unwrap(), filtered);
    assert_eq!(io::read_backprojection(&b_path).unwrap(), image);
}
