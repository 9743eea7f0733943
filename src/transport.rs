//! Photon transport: emission, voxel traversal, attenuation, Compton
//! scattering and detection, producing one sinogram column per gantry angle.

use nalgebra::{Rotation3, Unit};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use geometry::{ray_box_intersection, Line};

use crate::config::{PhysicalDetectorProperties, ProjectionsProperties, TomographyProperties, TubeProperties};
use crate::gantry::{DetectorPixel, Gantry};
use crate::model::VoxelModel;
use crate::progress::ProgressReport;
use crate::projections::Projections;
use crate::scatter::{scattered_energy, ComptonTables};
use crate::spectrum::EnergySpectrum;
use crate::{Error, FrameRegistry, Intensityf32, Point, Vector, TWOPI};

/// Advance past a voxel boundary by this much before re-intersecting.
const STEP_EPS: f32 = 1e-4;

/// Intensity fraction handed to the deflected ray at a scatter event; the
/// continuing ray keeps the rest.
const SCATTER_SPLIT: f32 = 0.5;

/// Attempts at drawing a deflection that stays close to the detector plane.
const MAX_ANGLE_RESAMPLES: usize = 16;

/// One simulated photon path. Created at tube emission or at a scattering
/// event; consumed by detection, loss, or exhaustion of the budgets.
#[derive(Clone, Debug)]
pub struct Ray {
    /// Model-frame origin and unit direction
    pub line: Line,
    pub spectrum: EnergySpectrum,
    /// Beer-Lambert intensity at the reference energy only
    pub simple_intensity: Intensityf32,
    pub voxel_hits: usize,
    pub scatter_count: usize,
    /// Fast-path detection hint: the pixel this ray was aimed at
    pub expected_pixel: Option<usize>,
}

/// Ray properties appended to a pixel's detection list.
#[derive(Clone, Copy, Debug)]
pub struct Detection {
    pub pixel: usize,
    pub intensity: Intensityf32,
}

pub struct RayTransportSimulation<'a> {
    pub model: &'a VoxelModel,
    pub tomography: &'a TomographyProperties,
    pub detector: &'a PhysicalDetectorProperties,
    pub compton: ComptonTables,
    pub seed: u64,
}

impl<'a> RayTransportSimulation<'a> {
    pub fn new(
        model: &'a VoxelModel,
        tube: &TubeProperties,
        tomography: &'a TomographyProperties,
        detector: &'a PhysicalDetectorProperties,
        seed: u64,
    ) -> Self {
        let compton = ComptonTables::new(10.0, tube.peak_energy.max(150.0), 64, 90);
        Self { model, tomography, detector, compton, seed }
    }

    /// Fill the whole sinogram, one column per completed gantry frame.
    pub fn project(
        &self,
        registry: &mut FrameRegistry,
        gantry: &mut Gantry,
        projections: &ProjectionsProperties,
        progress: &dyn ProgressReport,
    ) -> Result<Projections, Error> {
        let mut sinogram = Projections::new(projections);
        let frames = projections.number_of_frames_to_fill();
        for frame in 0..frames {
            gantry.rotate_to(registry, frame as f32 * projections.angle_resolution())?;
            progress.update(0, &format!("frame {}/{}", frame + 1, frames));
            let column = self.simulate_frame(registry, gantry, frame)?;
            sinogram.set_column(frame, &column);
        }
        info!("simulated {frames} gantry frames");
        Ok(sinogram)
    }

    /// One gantry position: trace every emitted ray to completion, then
    /// reduce each pixel's accumulated detections to its sinogram value.
    pub fn simulate_frame(
        &self,
        registry: &FrameRegistry,
        gantry: &Gantry,
        frame: usize,
    ) -> Result<Vec<Intensityf32>, Error> {
        let frame_id = self.model.frame;
        let focus = registry.convert_point(gantry.tube.focus, gantry.frame, frame_id)?;
        let across = registry.convert_vector(Vector::x(), gantry.frame, frame_id)?;
        let axial = registry.convert_vector(Vector::z(), gantry.frame, frame_id)?;
        let pixels = gantry.pixels_in(registry, frame_id)?;

        let rays_per_pixel = self.tomography.rays_per_pixel;
        let jitter = rays_per_pixel > 1;
        let n_work = pixels.len() * rays_per_pixel;

        // Every work item owns its rays outright; per-thread detection lists
        // are merged at the end, so no locks are held during tracing.
        let detections: Vec<Detection> = (0..n_work).into_par_iter()
            .fold(Vec::new, |mut acc: Vec<Detection>, item| {
                let pixel = item / rays_per_pixel;
                let mut rng = StdRng::seed_from_u64(
                    self.seed ^ ((frame as u64) << 40) ^ item as u64);
                let ray = emit(focus, across, axial, &gantry.tube.spectrum,
                               gantry.tube.focal_spot_size,
                               &pixels[pixel], pixel, jitter, &mut rng);
                self.trace(ray, &pixels, &mut acc, &mut rng);
                acc
            })
            .reduce(Vec::new, |mut l, mut r| { l.append(&mut r); l });

        let initial = gantry.tube.spectrum.total_intensity() * rays_per_pixel as f32;
        let mut detected = vec![0.0; pixels.len()];
        for d in detections {
            detected[d.pixel] += d.intensity;
        }
        Ok(detected.iter().map(|&i| attenuation_value(initial, i)).collect())
    }

    /// Run one ray, and every ray it spawns, to completion.
    fn trace(&self, ray: Ray, pixels: &[DetectorPixel], out: &mut Vec<Detection>, rng: &mut impl Rng) {
        let mut pending = vec![ray];
        while let Some(ray) = pending.pop() {
            if let Some(survivor) = self.transport_through_model(ray, &mut pending, rng) {
                if let Some(detection) = detect(&survivor, pixels, self.detector) {
                    out.push(detection);
                }
            }
        }
    }

    /// Traverse the model voxel by voxel, stepping past each exit into the
    /// voxel containing the advanced position.
    /// Returns the ray once it leaves the volume, or `None` when it
    /// terminates inside (degenerate intersection or budget exhaustion).
    /// Scattered rays are pushed onto `spawned`.
    pub fn transport_through_model(
        &self,
        mut ray: Ray,
        spawned: &mut Vec<Ray>,
        rng: &mut impl Rng,
    ) -> Option<Ray> {
        let bounds = self.model.bounding_box();
        let Some(hit) = ray_box_intersection(&ray.line, &bounds) else {
            // Never meets the model: straight to detection
            return Some(ray);
        };
        let mut position = ray.line.point_at(hit.entry.t + STEP_EPS);
        let Some(mut index) = self.model.voxel_index_at(position) else {
            return Some(ray);
        };

        let [nx, ny, nz] = self.model.n;
        let traversal_budget = (nx + ny + nz) * 4;

        loop {
            if ray.voxel_hits > traversal_budget {
                debug!("ray exceeded its traversal budget; dropped");
                return None;
            }

            let segment = Line { origin: position, direction: ray.line.direction };
            let voxel = self.model.voxel_box(index);
            let Some(crossing) = ray_box_intersection(&segment, &voxel) else {
                // Degenerate (singular or grazing) intersection: drop, never retry
                debug!("degenerate voxel intersection; ray dropped");
                return None;
            };

            // Origin lies inside the voxel, so the entry parameter is 0 and
            // the exit parameter is the traversed distance. Each segment
            // starts STEP_EPS past the previous boundary; adding it back
            // makes the segment lengths sum to the true chord.
            let distance = crossing.exit.t + STEP_EPS;
            let data = self.model.voxel_data(index);
            let artifact = self.tomography.artifact_impact_factor;
            ray.spectrum.attenuate(distance, |e| data.absorption_at(e, artifact));
            ray.simple_intensity *= (-data.absorption * distance).exp();
            ray.voxel_hits += 1;

            if self.tomography.scattering
                && ray.scatter_count < self.tomography.max_scattering_occurrences
                && data.absorption > 0.0
            {
                let mean = ray.spectrum.mean_energy();
                let mu_scatter = data.absorption
                    * self.compton.relative_cross_section(mean)
                    * self.tomography.scatter_probability_correction;
                let probability = 1.0 - (-mu_scatter * distance).exp();
                if rng.gen::<f32>() < probability {
                    let site = segment.point_at(rng.gen::<f32>() * distance);
                    if let Some(deflected) = self.spawn_scattered(&ray, site, rng) {
                        spawned.push(deflected);
                        ray.spectrum.scale(1.0 - SCATTER_SPLIT);
                        ray.simple_intensity *= 1.0 - SCATTER_SPLIT;
                    }
                    ray.scatter_count += 1;
                }
            }

            // The advanced position, not the exit face, decides the next
            // voxel: a crossing through an edge or a corner moves more than
            // one index at once
            position = segment.point_at(crossing.exit.t + STEP_EPS);
            match self.model.voxel_index_at(position) {
                Some(next) => index = next,
                None => {
                    ray.line = Line { origin: position, direction: ray.line.direction };
                    return Some(ray);
                }
            }
        }
    }

    /// New ray at a scatter site, deflected by a Compton-sampled angle.
    /// Deflections leaving the detector plane by more than the configured
    /// angle are resampled; if none succeeds, no ray is spawned.
    fn spawn_scattered(&self, parent: &Ray, site: Point, rng: &mut impl Rng) -> Option<Ray> {
        let mean = parent.spectrum.mean_energy();
        let max_out_of_plane = self.tomography.max_angle_to_lie_in_plane();
        let direction = parent.line.direction;
        let perpendicular = perpendicular_to(direction);

        for _ in 0..MAX_ANGLE_RESAMPLES {
            let theta = self.compton.sample_angle(mean, rng);
            let phi = rng.gen::<f32>() * TWOPI;
            let axis = Rotation3::from_axis_angle(&Unit::new_normalize(direction), phi) * perpendicular;
            let deflected = (Rotation3::from_axis_angle(&Unit::new_normalize(axis), theta) * direction)
                .normalize();

            let out_of_plane = deflected.z.clamp(-1.0, 1.0).asin().abs();
            if out_of_plane > max_out_of_plane { continue; }

            let mut spectrum = parent.spectrum.clone();
            spectrum.map_energies(|e| scattered_energy(e, theta));
            spectrum.scale(SCATTER_SPLIT);
            return Some(Ray {
                line: Line { origin: site, direction: deflected },
                spectrum,
                simple_intensity: parent.simple_intensity * SCATTER_SPLIT,
                voxel_hits: parent.voxel_hits,
                scatter_count: parent.scatter_count + 1,
                expected_pixel: None,
            });
        }
        None
    }
}

/// Emit one ray from the (possibly jittered) focus toward a point on the
/// target pixel, carrying a copy of the tube spectrum.
#[allow(clippy::too_many_arguments)]
fn emit(
    focus: Point,
    across: Vector,
    axial: Vector,
    spectrum: &EnergySpectrum,
    focal_spot_size: f32,
    pixel: &DetectorPixel,
    pixel_index: usize,
    jitter: bool,
    rng: &mut impl Rng,
) -> Ray {
    let mut origin = focus;
    if focal_spot_size > 0.0 {
        if let Ok(spread) = Normal::new(0.0f32, focal_spot_size / 2.0) {
            origin += across * spread.sample(rng) + axial * spread.sample(rng);
        }
    }
    let (u, v) = if jitter {
        (rng.gen::<f32>(), rng.gen::<f32>())
    } else {
        (0.5, 0.5)
    };
    let target = pixel.surface.point_at(u, v);
    Ray {
        line: Line::new(origin, target - origin),
        spectrum: spectrum.clone(),
        simple_intensity: 1.0,
        voxel_hits: 0,
        scatter_count: 0,
        expected_pixel: Some(pixel_index),
    }
}

/// Test a ray that left the model against the detector: the expected pixel
/// first, then every pixel. Rays outside the anti-scatter acceptance cone
/// are rejected.
fn detect(ray: &Ray, pixels: &[DetectorPixel], detector: &PhysicalDetectorProperties) -> Option<Detection> {
    let hits_pixel = |i: usize| -> bool {
        let surface = &pixels[i].surface;
        match surface.intersect_line(&ray.line) {
            Some(hit) => hit.t > 0.0 && surface.contains_params(hit.u, hit.v),
            None => false,
        }
    };

    let index = ray.expected_pixel.filter(|&i| hits_pixel(i))
        .or_else(|| (0..pixels.len()).find(|&i| hits_pixel(i)))?;

    if detector.anti_scatter {
        let cosine = (-ray.line.direction).dot(&pixels[index].normal).clamp(-1.0, 1.0);
        if cosine.acos() > detector.max_incidence_angle() {
            debug!("ray outside the anti-scatter acceptance cone; rejected");
            return None;
        }
    }

    Some(Detection {
        pixel: index,
        intensity: ray.spectrum.total_intensity(),
    })
}

/// Per-pixel sinogram statistic: `ln(initial / detected)`.
fn attenuation_value(initial: Intensityf32, detected: Intensityf32) -> Intensityf32 {
    const INTENSITY_FLOOR: f32 = 1e-9;
    let floor = initial * INTENSITY_FLOOR;
    let detected = if detected <= floor {
        warn!("pixel detected (almost) no intensity; clamping to the floor");
        floor
    } else {
        detected
    };
    (initial / detected).ln()
}

/// Any unit vector perpendicular to `v`.
fn perpendicular_to(v: Vector) -> Vector {
    let helper = if v.x.abs() < 0.9 { Vector::x() } else { Vector::y() };
    v.cross(&helper).normalize()
}
