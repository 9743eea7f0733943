//! Configuration file parser for the scanner pipeline.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::warn;

use crate::model::{VoxelData, VoxelModel};
use crate::{Anglef32, Energyf32, Error, FrameId, Intensityf32, Lengthf32, Vector};

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub tube: TubeProperties,

    pub projections: ProjectionsProperties,

    #[serde(default)]
    pub detector: PhysicalDetectorProperties,

    #[serde(default)]
    pub tomography: TomographyProperties,

    pub model: ModelConfig,
}

/// Emitter description: spectrum shape and focal-spot size.
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct TubeProperties {
    /// Peak photon energy in keV (anode voltage)
    #[serde(default = "default_peak_energy")]
    pub peak_energy: Energyf32,

    /// Low-energy cutoff of the emitted spectrum, keV
    #[serde(default = "default_min_energy")]
    pub min_energy: Energyf32,

    /// Number of spectrum bins; 1 gives a monoenergetic beam at the peak
    #[serde(default = "default_spectrum_bins")]
    pub spectrum_bins: usize,

    /// Photon flow carried by each emitted ray
    #[serde(default = "default_photons_per_ray")]
    pub photons_per_ray: Intensityf32,

    /// Focal-spot diameter in mm; 0 disables emission-point jitter
    #[serde(default)]
    pub focal_spot_size: Lengthf32,
}

fn default_peak_energy()     -> Energyf32     { 120.0 }
fn default_min_energy()      -> Energyf32     { 20.0 }
fn default_spectrum_bins()   -> usize         { 16 }
fn default_photons_per_ray() -> Intensityf32  { 1000.0 }

impl Default for TubeProperties {
    fn default() -> Self {
        Self {
            peak_energy: default_peak_energy(),
            min_energy: default_min_energy(),
            spectrum_bins: default_spectrum_bins(),
            photons_per_ray: default_photons_per_ray(),
            focal_spot_size: 0.0,
        }
    }
}

/// Shape of the sinogram and the measuring field it covers.
#[derive(Deserialize, Debug, Clone, Copy)]
#[serde(deny_unknown_fields)]
pub struct ProjectionsProperties {
    pub number_of_angles: usize,
    pub number_of_distances: usize,
    /// Diameter of the measuring field, mm
    pub measuring_field_size: Lengthf32,
}

impl ProjectionsProperties {
    /// Angular step between gantry frames. Angles cover half a turn, which
    /// together with the symmetric distance range spans the full sinogram.
    pub fn angle_resolution(&self) -> Anglef32 {
        std::f32::consts::PI / self.number_of_angles as f32
    }

    pub fn distance_resolution(&self) -> Lengthf32 {
        self.measuring_field_size / self.number_of_distances as f32
    }

    pub fn number_of_frames_to_fill(&self) -> usize { self.number_of_angles }

    /// Signed distance coordinate of detector pixel `i`.
    pub fn distance_of(&self, i: usize) -> Lengthf32 {
        (i as f32 - (self.number_of_distances as f32 - 1.0) / 2.0) * self.distance_resolution()
    }

    fn validated(self) -> Self {
        let mut v = self;
        if v.number_of_angles == 0 {
            warn!("number_of_angles may not be zero; using 8");
            v.number_of_angles = 8;
        }
        if v.number_of_distances == 0 {
            warn!("number_of_distances may not be zero; using 8");
            v.number_of_distances = 8;
        }
        if v.measuring_field_size <= 0.0 {
            warn!("measuring_field_size must be positive; using 100 mm");
            v.measuring_field_size = 100.0;
        }
        v
    }
}

/// Arc and focus geometry of the physical detector.
#[derive(Deserialize, Debug, Clone, Copy)]
#[serde(deny_unknown_fields)]
pub struct PhysicalDetectorProperties {
    /// Distance from the tube focus to the detector arc, mm
    #[serde(default = "default_focus_distance")]
    pub detector_focus_distance: Lengthf32,

    /// Axial (z) extent of each detector pixel, mm
    #[serde(default = "default_pixel_depth")]
    pub pixel_depth: Lengthf32,

    /// Whether an anti-scatter structure restricts the incidence cone
    #[serde(default)]
    pub anti_scatter: bool,

    /// Half-opening of the acceptance cone, degrees
    #[serde(default = "default_max_incidence")]
    pub max_incidence_angle_deg: f32,
}

fn default_focus_distance() -> Lengthf32 { 400.0 }
fn default_pixel_depth()    -> Lengthf32 { 10.0 }
fn default_max_incidence()  -> f32       { 15.0 }

impl PhysicalDetectorProperties {
    pub fn max_incidence_angle(&self) -> Anglef32 {
        self.max_incidence_angle_deg.to_radians()
    }

    fn validated(self, field: Lengthf32) -> Self {
        let mut v = self;
        if v.detector_focus_distance <= field {
            warn!("detector_focus_distance must exceed the measuring field; using {}", 4.0 * field);
            v.detector_focus_distance = 4.0 * field;
        }
        if v.pixel_depth <= 0.0 {
            warn!("pixel_depth must be positive; using 10 mm");
            v.pixel_depth = 10.0;
        }
        v
    }
}

/// Transport-simulation tuning knobs.
#[derive(Deserialize, Debug, Clone, Copy)]
#[serde(deny_unknown_fields)]
pub struct TomographyProperties {
    #[serde(default = "default_true")]
    pub scattering: bool,

    #[serde(default = "default_max_scattering")]
    pub max_scattering_occurrences: usize,

    /// Multiplier on the per-voxel scatter probability
    #[serde(default = "default_one")]
    pub scatter_probability_correction: f32,

    #[serde(default = "default_rays_per_pixel")]
    pub rays_per_pixel: usize,

    /// Strength of metal artifacts (scales metal-voxel absorption)
    #[serde(default = "default_one")]
    pub artifact_impact_factor: f32,

    /// Scattered rays deflected further than this out of the detector plane
    /// are resampled, degrees
    #[serde(default = "default_plane_angle")]
    pub max_angle_to_lie_in_plane_deg: f32,
}

fn default_true()           -> bool  { true }
fn default_max_scattering() -> usize { 1 }
fn default_one()            -> f32   { 1.0 }
fn default_rays_per_pixel() -> usize { 1 }
fn default_plane_angle()    -> f32   { 5.0 }

impl Default for TomographyProperties {
    fn default() -> Self {
        Self {
            scattering: true,
            max_scattering_occurrences: default_max_scattering(),
            scatter_probability_correction: 1.0,
            rays_per_pixel: default_rays_per_pixel(),
            artifact_impact_factor: 1.0,
            max_angle_to_lie_in_plane_deg: default_plane_angle(),
        }
    }
}

impl Default for PhysicalDetectorProperties {
    fn default() -> Self {
        Self {
            detector_focus_distance: default_focus_distance(),
            pixel_depth: default_pixel_depth(),
            anti_scatter: false,
            max_incidence_angle_deg: default_max_incidence(),
        }
    }
}

impl TomographyProperties {
    pub fn max_angle_to_lie_in_plane(&self) -> Anglef32 {
        self.max_angle_to_lie_in_plane_deg.to_radians()
    }

    fn validated(self) -> Self {
        let mut v = self;
        if v.rays_per_pixel == 0 {
            warn!("rays_per_pixel may not be zero; using 1");
            v.rays_per_pixel = 1;
        }
        if v.scatter_probability_correction < 0.0 {
            warn!("scatter_probability_correction must be non-negative; using 1");
            v.scatter_probability_correction = 1.0;
        }
        v
    }
}

/// Phantom description: a uniform background plus homogeneous blocks.
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
    pub nvoxels: (usize, usize, usize),

    /// Voxel edge lengths in mm
    pub voxel_size: (f32, f32, f32),

    /// Absorption of voxels not covered by any block, 1/mm
    #[serde(default)]
    pub background_absorption: f32,

    #[serde(default)]
    pub blocks: Vec<BlockConfig>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct BlockConfig {
    /// Inclusive voxel-index corners
    pub from: [usize; 3],
    pub to: [usize; 3],
    pub absorption: f32,
    #[serde(default)]
    pub metal: bool,
}

impl ModelConfig {
    pub fn build(&self, frame: FrameId) -> VoxelModel {
        let (nx, ny, nz) = self.nvoxels;
        let (sx, sy, sz) = self.voxel_size;
        let mut model = VoxelModel::new([nx, ny, nz], Vector::new(sx, sy, sz), frame);
        let background = self.background_absorption;
        model.fill_with(|_| VoxelData::new(background));
        for block in &self.blocks {
            for ix in block.from[0]..=block.to[0].min(nx.saturating_sub(1)) {
                for iy in block.from[1]..=block.to[1].min(ny.saturating_sub(1)) {
                    for iz in block.from[2]..=block.to[2].min(nz.saturating_sub(1)) {
                        let mut v = VoxelData::new(block.absorption);
                        v.metal = block.metal;
                        model.set_voxel([ix, iy, iz], v);
                    }
                }
            }
        }
        model
    }
}

impl Config {
    /// Replace malformed values with safe defaults (logged), rather than
    /// aborting a long batch run over a bad knob.
    pub fn validated(mut self) -> Self {
        self.projections = self.projections.validated();
        self.detector = self.detector.validated(self.projections.measuring_field_size);
        self.tomography = self.tomography.validated();
        self
    }
}

pub fn read_config_file(path: &Path) -> Result<Config, Error> {
    let text = fs::read_to_string(path)?;
    let config: Config = toml::from_str(&text).map_err(|e| Error::Config(e.to_string()))?;
    Ok(config.validated())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GLOBAL_FRAME;
    use float_eq::assert_float_eq;
    use pretty_assertions::assert_eq;

    fn parse(input: &str) -> Config {
        toml::from_str::<Config>(input).unwrap().validated()
    }

    const MINIMAL: &str = r#"
        [projections]
        number_of_angles = 8
        number_of_distances = 5
        measuring_field_size = 10.0

        [model]
        nvoxels = [3, 3, 3]
        voxel_size = [1.0, 1.0, 1.0]
    "#;

    #[test]
    fn minimal_config_fills_defaults() {
        let config = parse(MINIMAL);
        assert_eq!(config.tube.spectrum_bins, 16);
        assert_eq!(config.tomography.rays_per_pixel, 1);
        assert!(!config.detector.anti_scatter);
        assert_float_eq!(config.projections.distance_resolution(), 2.0, abs <= 1e-6);
        assert_float_eq!(config.projections.angle_resolution(),
                         std::f32::consts::PI / 8.0, abs <= 1e-6);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let text = format!("{MINIMAL}\nunknown_field = 666\n");
        assert!(toml::from_str::<Config>(&text).is_err());
    }

    #[test]
    fn zero_counts_are_replaced_with_defaults() {
        let config = parse(r#"
            [projections]
            number_of_angles = 0
            number_of_distances = 0
            measuring_field_size = -1.0

            [model]
            nvoxels = [1, 1, 1]
            voxel_size = [1.0, 1.0, 1.0]
        "#);
        assert_eq!(config.projections.number_of_angles, 8);
        assert_eq!(config.projections.number_of_distances, 8);
        assert!(config.projections.measuring_field_size > 0.0);
    }

    #[test]
    fn distances_are_centred_on_zero() {
        let config = parse(MINIMAL);
        let p = config.projections;
        assert_float_eq!(p.distance_of(2), 0.0, abs <= 1e-6);
        assert_float_eq!(p.distance_of(0), -p.distance_of(4), abs <= 1e-6);
    }

    #[test]
    fn blocks_are_painted_over_background() {
        let config = parse(r#"
            [projections]
            number_of_angles = 4
            number_of_distances = 4
            measuring_field_size = 10.0

            [model]
            nvoxels = [3, 3, 3]
            voxel_size = [1.0, 1.0, 1.0]
            background_absorption = 0.001

            [[model.blocks]]
            from = [1, 1, 1]
            to = [1, 1, 1]
            absorption = 0.03
            metal = true
        "#);
        let model = config.model.build(GLOBAL_FRAME);
        assert_float_eq!(model.voxel_data([0, 0, 0]).absorption, 0.001, abs <= 1e-9);
        let centre = model.voxel_data([1, 1, 1]);
        assert_float_eq!(centre.absorption, 0.03, abs <= 1e-9);
        assert!(centre.metal);
    }
}
